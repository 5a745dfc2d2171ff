//! Client configuration.

use std::time::Duration;

use microbit_link::{SerialSettings, DEFAULT_BAUD_RATE};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Deadline for a temperature reply.
pub const DEFAULT_TEMPERATURE_TIMEOUT_SECS: f64 = 5.0;

/// Extra time allowed over the device's own button timeout.
pub const DEFAULT_BUTTON_GRACE_SECS: f64 = 1.0;

/// Poll granularity of the serial reader thread.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Settings for [`MicrobitClient`](crate::MicrobitClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Serial baud rate (default: 115200)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Seconds to wait for a `TEMP` reply (default: 5.0)
    #[serde(default = "default_temperature_timeout")]
    pub temperature_timeout_secs: f64,

    /// Seconds added to a button wait's local deadline (default: 1.0)
    #[serde(default = "default_button_grace")]
    pub button_grace_secs: f64,

    /// If set, `connect` waits this long for `STATUS|ready`.
    #[serde(default)]
    pub ready_timeout_secs: Option<f64>,

    /// Serial read timeout in milliseconds (default: 100)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_temperature_timeout() -> f64 {
    DEFAULT_TEMPERATURE_TIMEOUT_SECS
}

fn default_button_grace() -> f64 {
    DEFAULT_BUTTON_GRACE_SECS
}

fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            baud_rate: default_baud_rate(),
            temperature_timeout_secs: default_temperature_timeout(),
            button_grace_secs: default_button_grace(),
            ready_timeout_secs: None,
            read_timeout_ms: default_read_timeout(),
        }
    }
}

impl ClientConfig {
    /// Check that every duration is finite and non-negative.
    pub fn validate(&self) -> ClientResult<()> {
        if self.baud_rate == 0 {
            return Err(ClientError::InvalidArgument(
                "baud_rate must be positive".to_string(),
            ));
        }
        seconds("temperature_timeout_secs", self.temperature_timeout_secs)?;
        seconds("button_grace_secs", self.button_grace_secs)?;
        if let Some(ready) = self.ready_timeout_secs {
            seconds("ready_timeout_secs", ready)?;
        }
        Ok(())
    }

    /// Serial settings for the link.
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }

    /// Deadline for a temperature reply.
    pub fn temperature_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.temperature_timeout_secs)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_TEMPERATURE_TIMEOUT_SECS))
    }

    /// Grace period over a button wait's own timeout.
    pub fn button_grace(&self) -> Duration {
        Duration::try_from_secs_f64(self.button_grace_secs)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_BUTTON_GRACE_SECS))
    }

    /// Deadline for the ready handshake, if enabled.
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// Convert a seconds value, rejecting negative, NaN and infinite input.
pub(crate) fn seconds(name: &str, value: f64) -> ClientResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        ClientError::InvalidArgument(format!(
            "{} must be a finite, non-negative number of seconds (got {})",
            name, value
        ))
    })
}
