//! Commands that can be sent to the micro:bit bridge firmware.
//!
//! Every command serializes to exactly one line of the form `TAG:payload`.

use std::fmt;
use std::str::FromStr;

use unicode_normalization::UnicodeNormalization;

use crate::codec::LineCodec;
use crate::error::{ProtocolError, ProtocolResult};

/// Maximum number of characters the firmware will scroll.
pub const MAX_MESSAGE_LEN: usize = 200;

/// Command tag for scrolling text.
pub const CMD_MESSAGE: &str = "MESSAGE";
/// Command tag for showing an image.
pub const CMD_IMAGE: &str = "IMAGE";
/// Command tag for a temperature request.
pub const CMD_TEMP: &str = "TEMP";
/// Command tag for a button wait.
pub const CMD_WAIT_BUTTON: &str = "WAIT_BUTTON";
/// Command tag for playing music.
pub const CMD_MUSIC: &str = "MUSIC";

/// Button identity used both in wait requests and in button responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Button {
    /// Button A (left).
    A,
    /// Button B (right).
    B,
    /// Either button.
    Any,
}

impl Button {
    /// Get the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Button::A => "a",
            Button::B => "b",
            Button::Any => "any",
        }
    }

    /// Check whether a press of `pressed` satisfies a wait for `self`.
    pub fn accepts(&self, pressed: Button) -> bool {
        match self {
            Button::Any => pressed != Button::Any,
            _ => *self == pressed,
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Button {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Button> {
        match s {
            "a" => Ok(Button::A),
            "b" => Ok(Button::B),
            "any" => Ok(Button::Any),
            _ => Err(ProtocolError::InvalidButton(s.to_string())),
        }
    }
}

/// Commands that can be sent to the bridge firmware.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Scroll a text message across the LED matrix.
    Message {
        /// Text to display. Non-ASCII characters are transliterated or dropped.
        text: String,
    },

    /// Show a 5x5 image, e.g. `00300:03630:36963:03630:00300`.
    Image {
        /// Image pattern, passed through verbatim.
        pattern: String,
    },

    /// Request a temperature reading.
    Temperature,

    /// Wait for a button press on the device.
    WaitButton {
        /// Button to wait for.
        button: Button,
        /// Device-side timeout in seconds.
        timeout_secs: f64,
    },

    /// Play a sequence of notes such as `C4:4` or `R:2`.
    Music {
        /// Notes in micro:bit music notation.
        notes: Vec<String>,
    },
}

impl Command {
    /// Get the command tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Command::Message { .. } => CMD_MESSAGE,
            Command::Image { .. } => CMD_IMAGE,
            Command::Temperature => CMD_TEMP,
            Command::WaitButton { .. } => CMD_WAIT_BUTTON,
            Command::Music { .. } => CMD_MUSIC,
        }
    }

    /// Build the command line (without the terminator).
    pub fn to_line(&self) -> String {
        match self {
            Command::Message { text } => format!("{}:{}", CMD_MESSAGE, ascii_message(text)),
            Command::Image { pattern } => format!("{}:{}", CMD_IMAGE, pattern),
            Command::Temperature => format!("{}:", CMD_TEMP),
            Command::WaitButton { button, timeout_secs } => format!(
                "{}:{}:{}",
                CMD_WAIT_BUTTON,
                button,
                format_seconds(*timeout_secs)
            ),
            Command::Music { notes } => format!("{}:{}", CMD_MUSIC, notes.join(",")),
        }
    }

    /// Encode the command for transmission (line plus terminator).
    pub fn encode(&self) -> Vec<u8> {
        LineCodec::encode_line(&self.to_line())
    }
}

/// Reduce a message to what the firmware can scroll.
///
/// Characters are NFKD-decomposed so accented letters keep their base letter,
/// anything still outside ASCII is dropped, control characters become spaces
/// (a message must never span two lines) and the result is cut to
/// [`MAX_MESSAGE_LEN`] characters.
pub fn ascii_message(text: &str) -> String {
    text.nfkd()
        .filter(char::is_ascii)
        .map(|c| if c.is_ascii_control() { ' ' } else { c })
        .take(MAX_MESSAGE_LEN)
        .collect()
}

/// Render a number of seconds the way the firmware's float parser expects.
///
/// Whole numbers keep one decimal place (`2` becomes `2.0`).
pub fn format_seconds(secs: f64) -> String {
    if secs.is_finite() && secs.fract() == 0.0 && secs.abs() < 1e15 {
        format!("{:.1}", secs)
    } else {
        format!("{}", secs)
    }
}

/// Check that an image pattern is five `:`-separated rows of five digits.
pub fn validate_image_pattern(pattern: &str) -> ProtocolResult<()> {
    let rows: Vec<&str> = pattern.split(':').collect();
    let valid = rows.len() == 5
        && rows
            .iter()
            .all(|row| row.len() == 5 && row.bytes().all(|b| b.is_ascii_digit()));

    if valid {
        Ok(())
    } else {
        Err(ProtocolError::InvalidImage(pattern.to_string()))
    }
}

/// Check that a note is `NOTE[#|b]OCTAVE:DURATION` or `R:DURATION`.
pub fn validate_note(note: &str) -> ProtocolResult<()> {
    let invalid = || ProtocolError::InvalidNote(note.to_string());

    let (pitch, duration) = note.split_once(':').ok_or_else(invalid)?;
    if duration.is_empty() || !duration.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let mut chars = pitch.chars();
    match chars.next().map(|c| c.to_ascii_uppercase()) {
        Some('R') if chars.as_str().is_empty() => return Ok(()),
        Some('A'..='G') => {}
        _ => return Err(invalid()),
    }

    let rest = chars.as_str();
    let octave = rest
        .strip_prefix('#')
        .or_else(|| rest.strip_prefix('b'))
        .unwrap_or(rest);

    match octave.as_bytes() {
        [d] if (b'0'..=b'8').contains(d) => Ok(()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_command() {
        assert_eq!(Command::Temperature.to_line(), "TEMP:");
        assert_eq!(Command::Temperature.encode(), b"TEMP:\n");
    }

    #[test]
    fn test_wait_button_command() {
        let cmd = Command::WaitButton {
            button: Button::A,
            timeout_secs: 2.0,
        };
        assert_eq!(cmd.to_line(), "WAIT_BUTTON:a:2.0");

        let cmd = Command::WaitButton {
            button: Button::Any,
            timeout_secs: 2.5,
        };
        assert_eq!(cmd.to_line(), "WAIT_BUTTON:any:2.5");
    }

    #[test]
    fn test_message_transliterates_accents() {
        let cmd = Command::Message {
            text: "héllo".to_string(),
        };
        assert_eq!(cmd.to_line(), "MESSAGE:hello");
    }

    #[test]
    fn test_message_drops_non_latin() {
        assert_eq!(ascii_message("hi ☃ 日本"), "hi  ");
    }

    #[test]
    fn test_message_truncated_to_limit() {
        let long = "x".repeat(MAX_MESSAGE_LEN + 50);
        let line = Command::Message { text: long }.to_line();
        assert_eq!(line.len(), "MESSAGE:".len() + MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_message_never_spans_lines() {
        let line = Command::Message {
            text: "one\ntwo".to_string(),
        }
        .to_line();
        assert_eq!(line, "MESSAGE:one two");
    }

    #[test]
    fn test_image_passes_through() {
        let cmd = Command::Image {
            pattern: "00300:03630:36963:03630:00300".to_string(),
        };
        assert_eq!(cmd.to_line(), "IMAGE:00300:03630:36963:03630:00300");
    }

    #[test]
    fn test_music_joins_notes() {
        let cmd = Command::Music {
            notes: vec!["C4:4".to_string(), "D4:4".to_string(), "R:2".to_string()],
        };
        assert_eq!(cmd.to_line(), "MUSIC:C4:4,D4:4,R:2");
        assert_eq!(cmd.tag(), CMD_MUSIC);
    }

    #[test]
    fn test_button_parse() {
        assert_eq!("a".parse::<Button>(), Ok(Button::A));
        assert_eq!("any".parse::<Button>(), Ok(Button::Any));
        assert!("c".parse::<Button>().is_err());
    }

    #[test]
    fn test_button_accepts() {
        assert!(Button::Any.accepts(Button::A));
        assert!(Button::Any.accepts(Button::B));
        assert!(Button::A.accepts(Button::A));
        assert!(!Button::A.accepts(Button::B));
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(10.0), "10.0");
        assert_eq!(format_seconds(0.25), "0.25");
    }

    #[test]
    fn test_validate_image_pattern() {
        assert!(validate_image_pattern("00300:03630:36963:03630:00300").is_ok());
        assert!(validate_image_pattern("00300:03630:36963:03630").is_err());
        assert!(validate_image_pattern("0030a:03630:36963:03630:00300").is_err());
        assert!(validate_image_pattern("003000:3630:36963:03630:00300").is_err());
    }

    #[test]
    fn test_validate_note() {
        for note in ["C4:4", "C#5:8", "eb3:2", "R:4", "r:1"] {
            assert!(validate_note(note).is_ok(), "{} should be valid", note);
        }
        for note in ["C4", "H4:4", "C9:4", "C4:x", "R4:2", ":4", "C#:4"] {
            assert!(validate_note(note).is_err(), "{} should be invalid", note);
        }
    }
}
