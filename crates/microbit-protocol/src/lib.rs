//! micro:bit Serial Text Protocol
//!
//! This crate provides types and utilities for talking to the micro:bit bridge
//! firmware over its USB serial line. The firmware speaks a simple line-based
//! text protocol: one message per `\n`-terminated line, no request IDs.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → device): `TAG:payload`, e.g. `TEMP:` or `WAIT_BUTTON:a:2.0`
//! - **Responses** (device → host): `TAG|field|field...`, e.g. `TEMP|21|154320`
//!
//! # Command Types
//!
//! | Line | Meaning |
//! |---|---|
//! | `MESSAGE:<text>` | Scroll ASCII text (at most 200 characters) |
//! | `IMAGE:<pattern>` | Show a 5x5 brightness pattern, rows separated by `:` |
//! | `TEMP:` | Request a temperature reading |
//! | `WAIT_BUTTON:<button>:<timeout>` | Wait for a button press (`a`, `b` or `any`) |
//! | `MUSIC:<note,note,...>` | Play a tune |
//!
//! # Response Types
//!
//! | Line | Meaning |
//! |---|---|
//! | `STATUS\|<message>\|<timestamp_ms>` | Unsolicited status / ready notification |
//! | `TEMP\|<celsius>\|<timestamp_ms>` | Temperature reading |
//! | `BUTTON\|<a or b>\|<action>\|<timestamp_ms>` | Button event |
//! | `BUTTON_TIMEOUT\|<waited_for>\|<timeout_secs>` | Device-side button wait expired |
//!
//! # Example
//!
//! ```rust,ignore
//! use microbit_protocol::{Button, Command, Response};
//!
//! // Build a command
//! let cmd = Command::WaitButton { button: Button::A, timeout_secs: 2.0 };
//! assert_eq!(cmd.to_line(), "WAIT_BUTTON:a:2.0");
//!
//! // Parse a response
//! let response = Response::decode("TEMP|21|154320");
//! ```

mod codec;
mod commands;
mod error;
mod responses;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use responses::*;
