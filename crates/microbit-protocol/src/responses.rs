//! Response parsing for the micro:bit protocol.
//!
//! Responses are `|`-delimited lines whose first field is a tag. Tags are
//! matched against [`RESPONSE_TAGS`], which is ordered longest-first so that
//! `BUTTON_TIMEOUT` is never mistaken for `BUTTON`.

use crate::commands::Button;
use crate::error::{ProtocolError, ProtocolResult};

/// Field delimiter in response lines.
pub const FIELD_DELIMITER: char = '|';

/// Kinds of response the firmware can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    /// `STATUS|message|timestamp`
    Status,
    /// `TEMP|celsius|timestamp`
    Temperature,
    /// `BUTTON_TIMEOUT|waited_for|timeout`
    ButtonTimeout,
    /// `BUTTON|button|action|timestamp`
    ButtonPress,
}

impl ResponseKind {
    /// Get the tag (without delimiter).
    pub fn tag(&self) -> &'static str {
        match self {
            ResponseKind::Status => "STATUS",
            ResponseKind::Temperature => "TEMP",
            ResponseKind::ButtonTimeout => "BUTTON_TIMEOUT",
            ResponseKind::ButtonPress => "BUTTON",
        }
    }

    /// Number of `|`-separated fields, tag included.
    ///
    /// `STATUS` is a minimum: its message may itself contain `|`.
    pub fn field_count(&self) -> usize {
        match self {
            ResponseKind::Status => 3,
            ResponseKind::Temperature => 3,
            ResponseKind::ButtonTimeout => 3,
            ResponseKind::ButtonPress => 4,
        }
    }
}

/// Prefix dispatch table, checked in order.
///
/// Longer tags come before any tag that is a prefix of them.
pub const RESPONSE_TAGS: [(&str, ResponseKind); 4] = [
    ("STATUS|", ResponseKind::Status),
    ("TEMP|", ResponseKind::Temperature),
    ("BUTTON_TIMEOUT|", ResponseKind::ButtonTimeout),
    ("BUTTON|", ResponseKind::ButtonPress),
];

/// Button action reported when a button goes down.
pub const ACTION_PRESSED: &str = "pressed";

/// Parsed response from the firmware.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Status notification, e.g. `ready` or `displayed:hello`.
    Status {
        /// Status message.
        message: String,
        /// Device uptime in milliseconds.
        timestamp_ms: u64,
    },

    /// Temperature reading.
    Temperature {
        /// Temperature in whole degrees Celsius.
        celsius: i32,
        /// Device uptime in milliseconds.
        timestamp_ms: u64,
    },

    /// A button event.
    ButtonPress {
        /// Which button.
        button: Button,
        /// Action, normally `pressed`.
        action: String,
        /// Device uptime in milliseconds.
        timestamp_ms: u64,
    },

    /// The device gave up waiting for a button.
    ButtonTimeout {
        /// The button the device was waiting for.
        waited_for: Button,
        /// The timeout the device applied, in seconds.
        timeout_secs: f64,
    },
}

impl Response {
    /// Parse a response line.
    ///
    /// The input is a single line with the terminator already stripped.
    pub fn parse(line: &str) -> ProtocolResult<Response> {
        let line = line.trim();
        let kind = RESPONSE_TAGS
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix))
            .map(|(_, kind)| *kind)
            .ok_or_else(|| ProtocolError::UnknownTag(line.to_string()))?;

        let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();

        match kind {
            ResponseKind::Status => {
                if fields.len() < kind.field_count() {
                    return Err(field_count_error(kind, fields.len()));
                }
                // The timestamp is always last; everything in between is the message.
                let (message, timestamp) = line[kind.tag().len() + 1..]
                    .rsplit_once(FIELD_DELIMITER)
                    .ok_or_else(|| field_count_error(kind, fields.len()))?;
                Ok(Response::Status {
                    message: message.to_string(),
                    timestamp_ms: parse_number("timestamp", timestamp)?,
                })
            }
            ResponseKind::Temperature => {
                expect_fields(kind, &fields)?;
                Ok(Response::Temperature {
                    celsius: parse_number("celsius", fields[1])?,
                    timestamp_ms: parse_number("timestamp", fields[2])?,
                })
            }
            ResponseKind::ButtonTimeout => {
                expect_fields(kind, &fields)?;
                Ok(Response::ButtonTimeout {
                    waited_for: fields[1].parse()?,
                    timeout_secs: parse_number("timeout", fields[2])?,
                })
            }
            ResponseKind::ButtonPress => {
                expect_fields(kind, &fields)?;
                Ok(Response::ButtonPress {
                    button: fields[1].parse()?,
                    action: fields[2].to_string(),
                    timestamp_ms: parse_number("timestamp", fields[3])?,
                })
            }
        }
    }

    /// Decode a line, returning `None` for anything that is not a
    /// well-formed response.
    pub fn decode(line: &str) -> Option<Response> {
        match Response::parse(line) {
            Ok(response) => Some(response),
            Err(e) => {
                log::trace!("discarding line {:?}: {}", line, e);
                None
            }
        }
    }

    /// Build the line the firmware would send for this response.
    pub fn to_line(&self) -> String {
        match self {
            Response::Status { message, timestamp_ms } => {
                format!("STATUS|{}|{}", message, timestamp_ms)
            }
            Response::Temperature { celsius, timestamp_ms } => {
                format!("TEMP|{}|{}", celsius, timestamp_ms)
            }
            Response::ButtonPress { button, action, timestamp_ms } => {
                format!("BUTTON|{}|{}|{}", button, action, timestamp_ms)
            }
            Response::ButtonTimeout { waited_for, timeout_secs } => format!(
                "BUTTON_TIMEOUT|{}|{}",
                waited_for,
                crate::commands::format_seconds(*timeout_secs)
            ),
        }
    }

    /// Get the kind of this response.
    pub fn kind(&self) -> ResponseKind {
        match self {
            Response::Status { .. } => ResponseKind::Status,
            Response::Temperature { .. } => ResponseKind::Temperature,
            Response::ButtonPress { .. } => ResponseKind::ButtonPress,
            Response::ButtonTimeout { .. } => ResponseKind::ButtonTimeout,
        }
    }

    /// Check if this is a button-down event.
    pub fn is_press(&self) -> bool {
        matches!(self, Response::ButtonPress { action, .. } if action == ACTION_PRESSED)
    }
}

fn expect_fields(kind: ResponseKind, fields: &[&str]) -> ProtocolResult<()> {
    if fields.len() == kind.field_count() {
        Ok(())
    } else {
        Err(field_count_error(kind, fields.len()))
    }
}

fn field_count_error(kind: ResponseKind, actual: usize) -> ProtocolError {
    ProtocolError::FieldCount {
        tag: kind.tag(),
        expected: kind.field_count(),
        actual,
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> ProtocolResult<T> {
    value.trim().parse().map_err(|_| ProtocolError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_temperature() {
        let response = Response::parse("TEMP|21|154320").unwrap();
        assert_eq!(
            response,
            Response::Temperature {
                celsius: 21,
                timestamp_ms: 154320
            }
        );
    }

    #[test]
    fn test_parse_negative_temperature() {
        let response = Response::parse("TEMP|-4|10").unwrap();
        assert!(matches!(response, Response::Temperature { celsius: -4, .. }));
    }

    #[test]
    fn test_parse_status_with_delimiter_in_message() {
        let response = Response::parse("STATUS|displayed:a|b|99").unwrap();
        assert_eq!(
            response,
            Response::Status {
                message: "displayed:a|b".to_string(),
                timestamp_ms: 99
            }
        );
    }

    #[test]
    fn test_parse_button_press() {
        let response = Response::parse("BUTTON|b|pressed|4521").unwrap();
        assert_eq!(
            response,
            Response::ButtonPress {
                button: Button::B,
                action: "pressed".to_string(),
                timestamp_ms: 4521
            }
        );
        assert!(response.is_press());
    }

    #[test]
    fn test_parse_button_timeout_not_confused_with_button() {
        let response = Response::parse("BUTTON_TIMEOUT|any|5.0").unwrap();
        assert_eq!(response.kind(), ResponseKind::ButtonTimeout);
        assert_eq!(
            response,
            Response::ButtonTimeout {
                waited_for: Button::Any,
                timeout_secs: 5.0
            }
        );
    }

    #[test]
    fn test_tag_table_is_longest_first() {
        // An earlier tag must never be a prefix of a later one, or it would
        // claim the later tag's lines.
        for (i, (earlier, _)) in RESPONSE_TAGS.iter().enumerate() {
            let earlier = earlier.trim_end_matches(FIELD_DELIMITER);
            for (later, _) in &RESPONSE_TAGS[i + 1..] {
                let later = later.trim_end_matches(FIELD_DELIMITER);
                assert!(
                    !later.starts_with(earlier),
                    "{} is checked before {} and shadows it",
                    earlier,
                    later
                );
            }
        }
    }

    #[test]
    fn test_malformed_lines_are_rejected() {
        assert!(matches!(
            Response::parse("GARBAGE"),
            Err(ProtocolError::UnknownTag(_))
        ));
        assert!(matches!(
            Response::parse("BUTTON|a|pressed"),
            Err(ProtocolError::FieldCount { tag: "BUTTON", expected: 4, actual: 3 })
        ));
        assert!(matches!(
            Response::parse("TEMP|warm|1"),
            Err(ProtocolError::InvalidNumber { field: "celsius", .. })
        ));
        assert!(matches!(
            Response::parse("STATUS|ready|soon"),
            Err(ProtocolError::InvalidNumber { field: "timestamp", .. })
        ));
        assert!(Response::parse("STATUS|ready").is_err());
        assert!(Response::parse("BUTTON|c|pressed|1").is_err());
        assert!(Response::parse("TEMP|21|1|extra").is_err());
    }

    #[test]
    fn test_decode_returns_none_for_malformed() {
        assert!(Response::decode("GARBAGE").is_none());
        assert!(Response::decode("BUTTON|a|pressed").is_none());
        assert!(Response::decode("TEMP|21|154320").is_some());
    }

    #[test]
    fn test_to_line_round_trips() {
        let responses = [
            Response::Status {
                message: "ready".to_string(),
                timestamp_ms: 1000,
            },
            Response::Temperature {
                celsius: 21,
                timestamp_ms: 154320,
            },
            Response::ButtonPress {
                button: Button::A,
                action: ACTION_PRESSED.to_string(),
                timestamp_ms: 7,
            },
            Response::ButtonTimeout {
                waited_for: Button::Any,
                timeout_secs: 5.0,
            },
        ];

        for response in responses {
            assert_eq!(Response::decode(&response.to_line()), Some(response));
        }
    }
}
