//! Tool catalog and reply types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Scroll a text message.
pub const TOOL_DISPLAY_MESSAGE: &str = "display_message";
/// Show a 5x5 image.
pub const TOOL_DISPLAY_IMAGE: &str = "display_image";
/// Read the temperature sensor.
pub const TOOL_GET_TEMPERATURE: &str = "get_temperature";
/// Wait for a button press.
pub const TOOL_WAIT_FOR_BUTTON: &str = "wait_for_button_press";
/// Play a note sequence.
pub const TOOL_PLAY_MUSIC: &str = "play_music";

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// JSON schema of the arguments object.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// All tools the server offers.
pub fn tool_catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: TOOL_DISPLAY_MESSAGE,
            description: "Display a text message on micro:bit LED matrix",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "Message to display"
                    }
                },
                "required": ["message"]
            }),
        },
        ToolDefinition {
            name: TOOL_DISPLAY_IMAGE,
            description: "Display an image on the micro:bit LED matrix.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "image": {
                        "type": "string",
                        "description": "Five rows of five brightness digits (0-9) separated by colons, \
                                        e.g. 00300:03630:36963:03630:00300 is a star"
                    }
                },
                "required": ["image"]
            }),
        },
        ToolDefinition {
            name: TOOL_GET_TEMPERATURE,
            description: "Get the current temperature reading from the micro:bit sensor",
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        },
        ToolDefinition {
            name: TOOL_WAIT_FOR_BUTTON,
            description: "Wait for a button press on the micro:bit",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "button": {
                        "type": "string",
                        "enum": ["a", "b", "any"],
                        "description": "Which button to wait for. Defaults to any button."
                    },
                    "timeout": {
                        "type": "number",
                        "default": 10.0,
                        "description": "Maximum time to wait in seconds"
                    }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: TOOL_PLAY_MUSIC,
            description: "Play music on the micro:bit using an array of notes",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "notes": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Notes in micro:bit format NOTE[#]OCTAVE:DURATION, e.g. \
                                        [\"C4:4\", \"D4:4\", \"E4:2\"]. Octaves 0-8 (4 is middle), \
                                        durations in beats. Use \"R:4\" for a rest."
                    }
                },
                "required": ["notes"]
            }),
        },
    ]
}

/// One content block of a tool reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
}

/// The `result` of a `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReply {
    /// Content blocks.
    pub content: Vec<ToolContent>,
    /// Whether the tool itself failed.
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolReply {
    /// A successful text reply.
    pub fn text(text: impl Into<String>) -> Self {
        ToolReply {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// A failed tool run, reported to the caller as content.
    pub fn error(text: impl Into<String>) -> Self {
        ToolReply {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Concatenated text of all blocks.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
