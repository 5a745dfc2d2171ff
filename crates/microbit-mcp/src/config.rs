//! Bridge configuration loading.

use std::path::Path;

use microbit_client::ClientConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ToolError, ToolResult};

/// Serial port used when neither the config file nor the command line name one.
pub const DEFAULT_PORT: &str = "/dev/cu.usbmodem2114202";

/// Top-level configuration of the bridge binary.
///
/// ```yaml
/// port: /dev/ttyACM0
/// client:
///   baud_rate: 115200
///   temperature_timeout_secs: 5.0
///   ready_timeout_secs: 2.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Serial port path (default: /dev/cu.usbmodem2114202)
    #[serde(default = "default_port")]
    pub port: String,

    /// Device client settings.
    #[serde(default)]
    pub client: ClientConfig,
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            port: default_port(),
            client: ClientConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load from a YAML file.
    pub fn load(path: &Path) -> ToolResult<BridgeConfig> {
        let text = std::fs::read_to_string(path).map_err(|source| ToolError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = BridgeConfig::from_yaml(&text).map_err(|source| ToolError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.client.validate()?;
        info!(path = %path.display(), port = %config.port, "loaded configuration");
        Ok(config)
    }

    /// Parse from YAML text. An empty document yields the defaults.
    pub fn from_yaml(text: &str) -> Result<BridgeConfig, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(BridgeConfig::default());
        }
        serde_yaml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(BridgeConfig::from_yaml("").unwrap(), BridgeConfig::default());
        assert_eq!(BridgeConfig::default().port, DEFAULT_PORT);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "port: /dev/ttyACM0\nclient:\n  temperature_timeout_secs: 2.5\n  ready_timeout_secs: 1.0"
        )
        .unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.port, "/dev/ttyACM0");
        assert_eq!(config.client.temperature_timeout(), Duration::from_millis(2500));
        assert_eq!(config.client.ready_timeout(), Some(Duration::from_secs(1)));
        assert_eq!(config.client.baud_rate, 115_200);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            BridgeConfig::load(&missing),
            Err(ToolError::ConfigRead { .. })
        ));

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "port: [unclosed").unwrap();
        assert!(matches!(
            BridgeConfig::load(&bad),
            Err(ToolError::ConfigParse { .. })
        ));

        let unknown = dir.path().join("unknown.yaml");
        std::fs::write(&unknown, "baud: 9600").unwrap();
        assert!(matches!(
            BridgeConfig::load(&unknown),
            Err(ToolError::ConfigParse { .. })
        ));

        let invalid = dir.path().join("invalid.yaml");
        std::fs::write(&invalid, "client:\n  button_grace_secs: -1").unwrap();
        assert!(matches!(
            BridgeConfig::load(&invalid),
            Err(ToolError::Client(_))
        ));
    }
}
