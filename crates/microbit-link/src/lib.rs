//! Serial Line Transport
//!
//! This crate owns the byte stream to the micro:bit. It frames inbound bytes
//! into newline-terminated lines and serializes outbound line writes, so that
//! callers only ever deal in whole lines.
//!
//! A [`SerialLink`] can be backed by a real serial port ([`SerialLink::open`])
//! or by an in-memory [`LoopbackDevice`] ([`SerialLink::loopback`]) that tests
//! use to play the part of the firmware.
//!
//! # Lifecycle
//!
//! A link is open from construction until [`SerialLink::close`] (or
//! [`LineWriter::close`]) is called. Closing is idempotent; once closed every
//! send and receive fails with [`LinkError::NotConnected`].
//!
//! # Example
//!
//! ```rust,ignore
//! use microbit_link::{SerialLink, SerialSettings};
//!
//! let mut link = SerialLink::open("/dev/ttyACM0", &SerialSettings::default())?;
//! link.send_line("TEMP:").await?;
//! let line = link.read_line().await?;
//! link.close();
//! ```

mod error;
mod link;
mod loopback;
mod ports;
mod serial;

pub use error::*;
pub use link::*;
pub use loopback::*;
pub use ports::*;
pub use serial::*;
