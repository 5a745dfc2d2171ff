//! Tool dispatch.
//!
//! Maps a tool name plus a JSON arguments object onto a [`MicrobitClient`]
//! operation and renders the outcome as a [`ToolReply`].

use std::sync::Arc;

use microbit_client::{ClientError, MicrobitClient};
use microbit_protocol::{validate_image_pattern, validate_note, Button};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ToolError, ToolResult};
use crate::tools::{
    ToolReply, TOOL_DISPLAY_IMAGE, TOOL_DISPLAY_MESSAGE, TOOL_GET_TEMPERATURE, TOOL_PLAY_MUSIC,
    TOOL_WAIT_FOR_BUTTON,
};

/// Button wait timeout when the caller gives none.
pub const DEFAULT_BUTTON_TIMEOUT_SECS: f64 = 10.0;

#[derive(Debug, Deserialize)]
struct DisplayMessageArgs {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DisplayImageArgs {
    image: String,
}

#[derive(Debug, Deserialize)]
struct WaitForButtonArgs {
    #[serde(default = "default_button")]
    button: Button,
    #[serde(default = "default_button_timeout")]
    timeout: f64,
}

fn default_button() -> Button {
    Button::Any
}

fn default_button_timeout() -> f64 {
    DEFAULT_BUTTON_TIMEOUT_SECS
}

#[derive(Debug, Deserialize)]
struct PlayMusicArgs {
    #[serde(default)]
    notes: Vec<String>,
}

/// Runs tool calls against one client.
#[derive(Debug, Clone)]
pub struct ToolHandler {
    client: Arc<MicrobitClient>,
}

impl ToolHandler {
    /// Create a handler over a connected client.
    pub fn new(client: Arc<MicrobitClient>) -> Self {
        ToolHandler { client }
    }

    /// The client this handler drives.
    pub fn client(&self) -> &Arc<MicrobitClient> {
        &self.client
    }

    /// Run one tool.
    ///
    /// Unknown tools and malformed arguments are errors; a device failure is
    /// also an error and is reported by the caller as a failed tool run.
    pub async fn call(&self, name: &str, arguments: Value) -> ToolResult<ToolReply> {
        debug!(tool = name, %arguments, "tool call");

        match name {
            TOOL_DISPLAY_MESSAGE => {
                let args: DisplayMessageArgs = parse_args(arguments)?;
                self.client.send_message(&args.message).await?;
                Ok(ToolReply::text(format!("Displayed: {}", args.message)))
            }
            TOOL_DISPLAY_IMAGE => {
                let args: DisplayImageArgs = parse_args(arguments)?;
                validate_image_pattern(&args.image)
                    .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
                self.client.send_image(&args.image).await?;
                Ok(ToolReply::text("Displayed image"))
            }
            TOOL_GET_TEMPERATURE => {
                let reading = self.client.get_temperature().await?;
                Ok(ToolReply::text(to_json(&reading)?))
            }
            TOOL_WAIT_FOR_BUTTON => {
                let args: WaitForButtonArgs = parse_args(arguments)?;
                let result = self
                    .client
                    .wait_for_button(args.button, args.timeout)
                    .await
                    .map_err(|e| match e {
                        ClientError::InvalidArgument(msg) => ToolError::InvalidArguments(msg),
                        other => ToolError::Client(other),
                    })?;
                Ok(ToolReply::text(to_json(&result)?))
            }
            TOOL_PLAY_MUSIC => {
                let args: PlayMusicArgs = parse_args(arguments)?;
                if args.notes.is_empty() {
                    return Ok(ToolReply::text("Error: No notes provided"));
                }
                for note in &args.notes {
                    validate_note(note).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
                }
                self.client.send_music(&args.notes).await?;
                info!(notes = args.notes.len(), "playing music");
                Ok(ToolReply::text(format!(
                    "Playing {} notes on micro:bit",
                    args.notes.len()
                )))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

/// Deserialize an arguments object; a missing object counts as empty.
fn parse_args<T: DeserializeOwned>(arguments: Value) -> ToolResult<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> ToolResult<String> {
    serde_json::to_string(value).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
