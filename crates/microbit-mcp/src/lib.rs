//! micro:bit Tool Server
//!
//! Exposes a connected micro:bit as a small set of tools over
//! newline-delimited JSON-RPC 2.0 on stdio:
//!
//! | Tool | Arguments | Reply |
//! |------|-----------|-------|
//! | `display_message` | `message` | `Displayed: <message>` |
//! | `display_image` | `image` (5 rows of 5 digits) | `Displayed image` |
//! | `get_temperature` | none | `{"temperature_celsius", "timestamp"}` |
//! | `wait_for_button_press` | `button` (`a`/`b`/`any`), `timeout` | button wait result as JSON |
//! | `play_music` | `notes` | `Playing <n> notes on micro:bit` |
//!
//! Logging goes to stderr; stdout carries only protocol messages.

mod config;
mod error;
mod handler;
mod rpc;
mod tools;

pub use config::*;
pub use error::*;
pub use handler::*;
pub use rpc::*;
pub use tools::*;
