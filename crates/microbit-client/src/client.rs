//! Device operations.
//!
//! [`MicrobitClient`] is one session with one device: it owns the write half
//! of the link, the [`Router`] and the reader task. Operations that expect a
//! reply register their wait before the command goes out.

use std::sync::Arc;
use std::time::Duration;

use microbit_link::{LineWriter, SerialLink};
use microbit_protocol::{Button, Command, Response};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{seconds, ClientConfig};
use crate::error::{ClientError, ClientResult};
use crate::reader::spawn_reader;
use crate::router::{Expectation, Router, WaitError};

/// Status prefix the firmware announces once it is listening.
pub const READY_STATUS: &str = "ready";

/// A temperature reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureReading {
    /// Whole degrees Celsius.
    #[serde(rename = "temperature_celsius")]
    pub celsius: i32,
    /// Device uptime in milliseconds.
    pub timestamp: u64,
}

/// Outcome of waiting for a button.
///
/// A timeout is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonWaitResult {
    /// The button that was pressed, if any.
    pub button_pressed: Option<Button>,
    /// Whether the wait ended without a press.
    #[serde(rename = "timeout")]
    pub timed_out: bool,
    /// Device uptime of the press in milliseconds.
    pub timestamp: Option<u64>,
    /// The button filter that was waited for.
    pub waited_for: Button,
    /// Timeout that applied, present when `timed_out` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_duration: Option<f64>,
}

impl ButtonWaitResult {
    fn pressed(button: Button, timestamp: u64, waited_for: Button) -> Self {
        ButtonWaitResult {
            button_pressed: Some(button),
            timed_out: false,
            timestamp: Some(timestamp),
            waited_for,
            timeout_duration: None,
        }
    }

    fn timed_out(waited_for: Button, timeout_secs: f64) -> Self {
        ButtonWaitResult {
            button_pressed: None,
            timed_out: true,
            timestamp: None,
            waited_for,
            timeout_duration: Some(timeout_secs),
        }
    }
}

/// A status line reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Status message.
    pub message: String,
    /// Device uptime in milliseconds.
    pub timestamp: u64,
}

/// A connected micro:bit.
#[derive(Debug)]
pub struct MicrobitClient {
    writer: LineWriter,
    router: Arc<Router>,
    reader_task: JoinHandle<()>,
    config: ClientConfig,
}

impl MicrobitClient {
    /// Open the serial port and start the reader loop.
    ///
    /// With `ready_timeout_secs` configured, also waits for the firmware's
    /// ready announcement; a missing announcement is logged, not fatal.
    pub async fn connect(port: &str, config: &ClientConfig) -> ClientResult<MicrobitClient> {
        config.validate()?;
        let link = SerialLink::open(port, &config.serial_settings())?;
        info!(port, "connected to micro:bit");

        let router = Router::new();
        let ready = config.ready_timeout().map(|timeout| {
            router.register(
                Expectation::Status {
                    prefix: Some(READY_STATUS.to_string()),
                },
                timeout,
            )
        });

        let client = MicrobitClient::start(link, config.clone(), router);

        if let Some(ready) = ready {
            match ready.wait().await {
                Ok(response) => debug!(?response, "micro:bit reported ready"),
                Err(WaitError::TimedOut) => {
                    warn!(port, "micro:bit did not report ready, continuing anyway")
                }
                Err(WaitError::Closed) => return Err(ClientError::Disconnected),
            }
        }

        Ok(client)
    }

    /// Build a client over an already open link.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_link(link: SerialLink, config: ClientConfig) -> MicrobitClient {
        MicrobitClient::start(link, config, Router::new())
    }

    fn start(link: SerialLink, config: ClientConfig, router: Arc<Router>) -> MicrobitClient {
        let (reader, writer) = link.split();
        let reader_task = spawn_reader(reader, Arc::clone(&router));
        MicrobitClient {
            writer,
            router,
            reader_task,
            config,
        }
    }

    /// Port name of the link.
    pub fn port(&self) -> &str {
        self.writer.name()
    }

    /// Settings this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Check whether the session is still operational.
    pub fn is_connected(&self) -> bool {
        self.writer.is_open() && !self.router.is_closed()
    }

    /// Number of operations currently awaiting a reply.
    pub fn pending_waits(&self) -> usize {
        self.router.pending_count()
    }

    /// End the session. Idempotent.
    pub fn close(&self) {
        if self.writer.is_open() {
            info!(port = self.port(), "closing micro:bit connection");
        }
        self.writer.close();
        self.router.close();
    }

    fn ensure_connected(&self) -> ClientResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    // ------------------------------------------------------------------------
    // Fire-and-forget
    // ------------------------------------------------------------------------

    /// Send any command without waiting for a reply.
    pub async fn send_command(&self, command: &Command) -> ClientResult<()> {
        self.ensure_connected()?;
        let line = command.to_line();
        self.writer.send_line(&line).await?;
        debug!(command = command.tag(), "sent command");
        Ok(())
    }

    /// Send a `Message` or `Image` command.
    pub async fn send_display(&self, command: &Command) -> ClientResult<()> {
        match command {
            Command::Message { .. } | Command::Image { .. } => self.send_command(command).await,
            other => Err(ClientError::InvalidArgument(format!(
                "{} is not a display command",
                other.tag()
            ))),
        }
    }

    /// Scroll a text message.
    pub async fn send_message(&self, text: &str) -> ClientResult<()> {
        self.send_command(&Command::Message {
            text: text.to_string(),
        })
        .await
    }

    /// Show a 5x5 image, e.g. `00300:03630:36963:03630:00300`.
    pub async fn send_image(&self, pattern: &str) -> ClientResult<()> {
        self.send_command(&Command::Image {
            pattern: pattern.to_string(),
        })
        .await
    }

    /// Play a sequence of notes.
    pub async fn send_music(&self, notes: &[String]) -> ClientResult<()> {
        self.send_command(&Command::Music {
            notes: notes.to_vec(),
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Request/response
    // ------------------------------------------------------------------------

    /// Read the device temperature.
    ///
    /// Fails with [`ClientError::DeviceTimeout`] if no reply arrives within
    /// the configured deadline.
    pub async fn get_temperature(&self) -> ClientResult<TemperatureReading> {
        self.ensure_connected()?;
        let timeout = self.config.temperature_timeout();
        let handle = self.router.register(Expectation::Temperature, timeout);
        self.send_command(&Command::Temperature).await?;

        match handle.wait().await {
            Ok(Response::Temperature {
                celsius,
                timestamp_ms,
            }) => Ok(TemperatureReading {
                celsius,
                timestamp: timestamp_ms,
            }),
            Ok(other) => Err(ClientError::UnexpectedResponse(other)),
            Err(WaitError::TimedOut) => Err(ClientError::DeviceTimeout {
                operation: "temperature",
                timeout,
            }),
            Err(WaitError::Closed) => Err(ClientError::Disconnected),
        }
    }

    /// Wait for a button press.
    ///
    /// The device applies `timeout_secs` itself; locally the wait runs for
    /// an extra grace period. Either timeout yields a result with
    /// `timed_out` set.
    pub async fn wait_for_button(
        &self,
        button: Button,
        timeout_secs: f64,
    ) -> ClientResult<ButtonWaitResult> {
        let device_timeout = seconds("timeout", timeout_secs)?;
        self.ensure_connected()?;

        let deadline = device_timeout.saturating_add(self.config.button_grace());
        let handle = self.router.register(Expectation::Button(button), deadline);
        self.send_command(&Command::WaitButton {
            button,
            timeout_secs,
        })
        .await?;

        match handle.wait().await {
            Ok(Response::ButtonPress {
                button: pressed,
                timestamp_ms,
                ..
            }) => Ok(ButtonWaitResult::pressed(pressed, timestamp_ms, button)),
            Ok(Response::ButtonTimeout {
                waited_for,
                timeout_secs,
            }) => Ok(ButtonWaitResult::timed_out(waited_for, timeout_secs)),
            Ok(other) => Err(ClientError::UnexpectedResponse(other)),
            Err(WaitError::TimedOut) => {
                debug!(%button, ?deadline, "no button reply before local deadline");
                Ok(ButtonWaitResult::timed_out(button, timeout_secs))
            }
            Err(WaitError::Closed) => Err(ClientError::Disconnected),
        }
    }

    /// Wait for a `STATUS` line, optionally one starting with `prefix`.
    ///
    /// No command is sent; this listens for the device's own announcements.
    pub async fn wait_for_status(
        &self,
        prefix: Option<&str>,
        timeout: Duration,
    ) -> ClientResult<StatusUpdate> {
        self.ensure_connected()?;
        let handle = self.router.register(
            Expectation::Status {
                prefix: prefix.map(str::to_string),
            },
            timeout,
        );

        match handle.wait().await {
            Ok(Response::Status {
                message,
                timestamp_ms,
            }) => Ok(StatusUpdate {
                message,
                timestamp: timestamp_ms,
            }),
            Ok(other) => Err(ClientError::UnexpectedResponse(other)),
            Err(WaitError::TimedOut) => Err(ClientError::DeviceTimeout {
                operation: "status",
                timeout,
            }),
            Err(WaitError::Closed) => Err(ClientError::Disconnected),
        }
    }
}

impl Drop for MicrobitClient {
    fn drop(&mut self) {
        self.close();
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_result_json_shape() {
        let pressed = ButtonWaitResult::pressed(Button::A, 4521, Button::Any);
        let json = serde_json::to_value(&pressed).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "button_pressed": "a",
                "timeout": false,
                "timestamp": 4521,
                "waited_for": "any"
            })
        );

        let timed_out = ButtonWaitResult::timed_out(Button::B, 2.0);
        let json = serde_json::to_value(&timed_out).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "button_pressed": null,
                "timeout": true,
                "timestamp": null,
                "waited_for": "b",
                "timeout_duration": 2.0
            })
        );
    }

    #[test]
    fn test_temperature_json_shape() {
        let reading = TemperatureReading {
            celsius: 21,
            timestamp: 154320,
        };
        assert_eq!(
            serde_json::to_value(reading).unwrap(),
            serde_json::json!({"temperature_celsius": 21, "timestamp": 154320})
        );
    }

    #[tokio::test]
    async fn test_send_display_rejects_other_commands() {
        let (link, _device) = SerialLink::loopback("client");
        let client = MicrobitClient::from_link(link, ClientConfig::default());

        let result = client.send_display(&Command::Temperature).await;
        assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (link, mut device) = SerialLink::loopback("client");
        let client = MicrobitClient::from_link(link, ClientConfig::default());
        assert!(client.is_connected());

        client.close();
        client.close();

        assert!(!client.is_connected());
        assert!(matches!(
            client.send_message("hi").await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            client.get_temperature().await,
            Err(ClientError::NotConnected)
        ));
        // The write handle is gone, so the device end sees the host leave.
        assert_eq!(device.recv_line().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_button_timeout() {
        let (link, mut device) = SerialLink::loopback("client");
        let client = Arc::new(MicrobitClient::from_link(link, ClientConfig::default()));

        let waiter = Arc::clone(&client);
        let wait = tokio::spawn(async move { waiter.wait_for_button(Button::A, 1e19).await });

        assert_eq!(
            device.recv_line().await.as_deref(),
            Some("WAIT_BUTTON:a:10000000000000000000")
        );
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(client.pending_waits(), 1);

        device.send_line("BUTTON|a|pressed|88").await.unwrap();
        let result = wait.await.unwrap().unwrap();
        assert_eq!(result.button_pressed, Some(Button::A));
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_huge_temperature_timeout_from_config() {
        let (link, mut device) = SerialLink::loopback("client");
        let config = ClientConfig {
            temperature_timeout_secs: f64::MAX,
            button_grace_secs: 1e19,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            temperature_timeout_secs: 1e19,
            button_grace_secs: 1e19,
            ..ClientConfig::default()
        };
        let client = Arc::new(MicrobitClient::from_link(link, config));

        let reader = Arc::clone(&client);
        let reading = tokio::spawn(async move { reader.get_temperature().await });
        assert_eq!(device.recv_line().await.as_deref(), Some("TEMP:"));
        device.send_line("TEMP|23|5").await.unwrap();
        assert_eq!(reading.await.unwrap().unwrap().celsius, 23);

        let waiter = Arc::clone(&client);
        let wait = tokio::spawn(async move { waiter.wait_for_button(Button::B, 1e19).await });
        assert!(device.recv_line().await.is_some());
        device.send_line("BUTTON|b|pressed|9").await.unwrap();
        assert!(!wait.await.unwrap().unwrap().timed_out);
    }

    #[tokio::test]
    async fn test_invalid_button_timeout() {
        let (link, _device) = SerialLink::loopback("client");
        let client = MicrobitClient::from_link(link, ClientConfig::default());

        assert!(matches!(
            client.wait_for_button(Button::A, -1.0).await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.wait_for_button(Button::A, f64::INFINITY).await,
            Err(ClientError::InvalidArgument(_))
        ));
    }
}
