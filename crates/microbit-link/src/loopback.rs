//! In-memory device for driving a [`SerialLink`] without hardware.
//!
//! The [`LoopbackDevice`] sits where the firmware would: it sees every line
//! the host writes and can inject arbitrary bytes toward the host.

use microbit_protocol::LineCodec;
use tokio::sync::mpsc;

use crate::error::{LinkError, LinkResult};
use crate::link::{SerialLink, WriteBackend};

/// Inbound chunks the device may queue before `send_raw` waits.
const LOOPBACK_CAPACITY: usize = 64;

/// Device end of a loopback link.
#[derive(Debug)]
pub struct LoopbackDevice {
    from_host: mpsc::UnboundedReceiver<Vec<u8>>,
    to_host: mpsc::Sender<Vec<u8>>,
    codec: LineCodec,
}

impl SerialLink {
    /// Create a link whose other end is an in-memory [`LoopbackDevice`].
    pub fn loopback(name: &str) -> (SerialLink, LoopbackDevice) {
        let (host_tx, from_host) = mpsc::unbounded_channel();
        let (to_host, host_rx) = mpsc::channel(LOOPBACK_CAPACITY);

        let link = SerialLink::from_parts(name, host_rx, WriteBackend::Channel(host_tx));
        let device = LoopbackDevice {
            from_host,
            to_host,
            codec: LineCodec::new(),
        };
        (link, device)
    }
}

impl LoopbackDevice {
    /// Wait for the next line written by the host.
    ///
    /// Returns `None` once the host side is gone and nothing is buffered.
    pub async fn recv_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.codec.decode_line() {
                return Some(line);
            }
            let chunk = self.from_host.recv().await?;
            self.codec.push(&chunk);
        }
    }

    /// Take the next line written by the host, if one is already here.
    pub fn try_recv_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.codec.decode_line() {
                return Some(line);
            }
            let chunk = self.from_host.try_recv().ok()?;
            self.codec.push(&chunk);
        }
    }

    /// Send one line (terminator appended) to the host.
    pub async fn send_line(&self, line: &str) -> LinkResult<()> {
        self.send_raw(&LineCodec::encode_line(line)).await
    }

    /// Send raw bytes to the host, unframed.
    pub async fn send_raw(&self, data: &[u8]) -> LinkResult<()> {
        self.to_host
            .send(data.to_vec())
            .await
            .map_err(|_| LinkError::NotConnected)
    }
}
