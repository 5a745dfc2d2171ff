//! micro:bit Device Client
//!
//! Turns the fire-and-forget serial link into request/response operations.
//!
//! # Structure
//!
//! - [`Router`]: the set of outstanding waits. A decoded response fulfills
//!   the first registered wait whose [`Expectation`] accepts it.
//! - [`spawn_reader`]: the single task that reads lines, decodes them and
//!   dispatches them to the router.
//! - [`MicrobitClient`]: the session object. Display and music commands are
//!   fire-and-forget; temperature and button operations register a wait,
//!   send the command and suspend until the reply or the deadline.
//!
//! # Example
//!
//! ```rust,ignore
//! use microbit_client::{ClientConfig, MicrobitClient};
//! use microbit_protocol::Button;
//!
//! let client = MicrobitClient::connect("/dev/ttyACM0", &ClientConfig::default()).await?;
//! client.send_message("hello").await?;
//! let reading = client.get_temperature().await?;
//! let press = client.wait_for_button(Button::Any, 10.0).await?;
//! client.close();
//! ```

mod client;
mod config;
mod error;
mod reader;
mod router;

pub use client::*;
pub use config::{
    ClientConfig, DEFAULT_BUTTON_GRACE_SECS, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_TEMPERATURE_TIMEOUT_SECS,
};
pub use error::*;
pub use reader::*;
pub use router::*;
