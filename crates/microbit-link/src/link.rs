//! The line-oriented serial link.
//!
//! Inbound bytes arrive on an `mpsc` channel of chunks (fed by a serial reader
//! thread or by a [`LoopbackDevice`](crate::LoopbackDevice)) and are framed by a
//! [`LineCodec`]. Outbound lines go through a single [`WriteBackend`] guarded by
//! an async mutex, so concurrent writers never interleave partial lines and
//! each `send_line` returns only after its bytes are flushed.
//!
//! Closing drops the write backend. If a write holds it at that moment, the
//! writer drops it as soon as the write completes. A serial reader thread
//! lets go of its handle within one read timeout.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use microbit_protocol::LineCodec;
use serialport::SerialPort;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, trace};

use crate::error::{LinkError, LinkResult};

// ============================================================================
// Shared State
// ============================================================================

/// Open/closed flag shared by both halves of a link.
#[derive(Debug)]
pub(crate) struct LinkState {
    name: String,
    open: watch::Sender<bool>,
}

impl LinkState {
    fn new(name: &str) -> Self {
        let (open, _) = watch::channel(true);
        LinkState {
            name: name.to_string(),
            open,
        }
    }

    fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Mark the link closed. Returns `true` if it was open.
    fn close(&self) -> bool {
        self.open.send_replace(false)
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.open.subscribe()
    }
}

/// Resolve once the link is marked closed (or its state is dropped).
async fn wait_closed(open: &mut watch::Receiver<bool>) {
    while *open.borrow_and_update() {
        if open.changed().await.is_err() {
            return;
        }
    }
}

// ============================================================================
// Write Side
// ============================================================================

/// Where outbound bytes go.
pub(crate) enum WriteBackend {
    /// A real serial port; writes run on the blocking pool.
    Serial(Arc<std::sync::Mutex<Box<dyn SerialPort>>>),
    /// An in-memory loopback device.
    Channel(mpsc::UnboundedSender<Vec<u8>>),
}

impl WriteBackend {
    async fn write_all(&self, data: Vec<u8>) -> io::Result<()> {
        match self {
            WriteBackend::Serial(port) => {
                let port = Arc::clone(port);
                tokio::task::spawn_blocking(move || {
                    let mut port = port
                        .lock()
                        .map_err(|_| io::Error::other("serial port lock poisoned"))?;
                    port.write_all(&data)?;
                    port.flush()
                })
                .await
                .map_err(io::Error::other)?
            }
            WriteBackend::Channel(tx) => tx
                .send(data)
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "loopback device dropped")),
        }
    }
}

/// The write half of a link. Cheap to clone; clones share one backend.
#[derive(Clone)]
pub struct LineWriter {
    state: Arc<LinkState>,
    /// `None` once the link is closed.
    backend: Arc<Mutex<Option<WriteBackend>>>,
}

impl LineWriter {
    /// Write `line` plus the terminator and wait until it is flushed.
    ///
    /// Writes from concurrent callers are serialized in the order they
    /// acquire the link.
    pub async fn send_line(&self, line: &str) -> LinkResult<()> {
        let data = LineCodec::encode_line(line);
        let mut backend = self.backend.lock().await;
        if !self.state.is_open() {
            self.release(&mut backend);
            return Err(LinkError::NotConnected);
        }
        let result = match backend.as_ref() {
            Some(port) => port.write_all(data).await,
            None => return Err(LinkError::NotConnected),
        };
        // A close that raced this write could not take the backend.
        if !self.state.is_open() {
            self.release(&mut backend);
        }
        result?;

        trace!(port = %self.state.name, line, "sent line");
        Ok(())
    }

    fn release(&self, backend: &mut Option<WriteBackend>) {
        if backend.take().is_some() {
            trace!(port = %self.state.name, "released write handle");
        }
    }

    /// Check whether the link is still open.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Close the link and release the write handle. Idempotent.
    pub fn close(&self) {
        if self.state.close() {
            debug!(port = %self.state.name, "serial link closed");
        }
        // Busy means a write is in flight; it releases the handle itself.
        if let Ok(mut backend) = self.backend.try_lock() {
            self.release(&mut backend);
        }
    }

    /// Port name (or loopback label) of this link.
    pub fn name(&self) -> &str {
        &self.state.name
    }
}

impl fmt::Debug for LineWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineWriter")
            .field("port", &self.state.name)
            .field("open", &self.state.is_open())
            .finish()
    }
}

// ============================================================================
// Read Side
// ============================================================================

/// The read half of a link. There is exactly one per link.
#[derive(Debug)]
pub struct LineReader {
    state: Arc<LinkState>,
    rx: mpsc::Receiver<Vec<u8>>,
    codec: LineCodec,
    open: watch::Receiver<bool>,
}

impl LineReader {
    /// Wait for the next non-empty line.
    ///
    /// Fails with [`LinkError::NotConnected`] once the link is closed and
    /// with [`LinkError::Io`] if the device side goes away.
    pub async fn read_line(&mut self) -> LinkResult<String> {
        loop {
            if !self.state.is_open() {
                return Err(LinkError::NotConnected);
            }

            if let Some(line) = self.codec.decode_line() {
                trace!(port = %self.state.name, line = %line, "received line");
                return Ok(line);
            }

            tokio::select! {
                chunk = self.rx.recv() => match chunk {
                    Some(data) => self.codec.push(&data),
                    None => {
                        self.state.close();
                        return Err(LinkError::Io(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "device closed the serial link",
                        )));
                    }
                },
                _ = wait_closed(&mut self.open) => return Err(LinkError::NotConnected),
            }
        }
    }

    /// Check whether the link is still open.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }
}

// ============================================================================
// Serial Link
// ============================================================================

/// An open, newline-framed connection to one device.
#[derive(Debug)]
pub struct SerialLink {
    reader: LineReader,
    writer: LineWriter,
}

impl SerialLink {
    /// Assemble a link from an inbound chunk channel and an outbound backend.
    pub(crate) fn from_parts(
        name: &str,
        rx: mpsc::Receiver<Vec<u8>>,
        backend: WriteBackend,
    ) -> SerialLink {
        let state = Arc::new(LinkState::new(name));
        let open = state.subscribe();
        SerialLink {
            reader: LineReader {
                state: Arc::clone(&state),
                rx,
                codec: LineCodec::new(),
                open,
            },
            writer: LineWriter {
                state,
                backend: Arc::new(Mutex::new(Some(backend))),
            },
        }
    }

    /// Subscribe to the open flag (used by backend threads to notice a close).
    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.writer.state.subscribe()
    }

    /// Port name (or loopback label) of this link.
    pub fn name(&self) -> &str {
        self.writer.name()
    }

    /// Check whether the link is still open.
    pub fn is_open(&self) -> bool {
        self.writer.is_open()
    }

    /// Write one line and wait until it is flushed.
    pub async fn send_line(&self, line: &str) -> LinkResult<()> {
        self.writer.send_line(line).await
    }

    /// Wait for the next non-empty line.
    pub async fn read_line(&mut self) -> LinkResult<String> {
        self.reader.read_line().await
    }

    /// Close the link. Idempotent.
    pub fn close(&self) {
        self.writer.close();
    }

    /// Split into the single reader and a cloneable writer.
    pub fn split(self) -> (LineReader, LineWriter) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holds_backend(writer: &LineWriter) -> bool {
        writer.backend.try_lock().map_or(true, |backend| backend.is_some())
    }

    #[tokio::test]
    async fn test_send_line_appends_terminator() {
        let (link, mut device) = SerialLink::loopback("test");

        link.send_line("TEMP:").await.unwrap();
        link.send_line("WAIT_BUTTON:a:2.0").await.unwrap();

        assert_eq!(device.recv_line().await.as_deref(), Some("TEMP:"));
        assert_eq!(device.recv_line().await.as_deref(), Some("WAIT_BUTTON:a:2.0"));
    }

    #[tokio::test]
    async fn test_read_line_frames_chunks() {
        let (mut link, device) = SerialLink::loopback("test");

        device.send_raw(b"TEMP|2").await.unwrap();
        device.send_raw(b"1|154320\r\nSTATUS|ready|1\n").await.unwrap();

        assert_eq!(link.read_line().await.unwrap(), "TEMP|21|154320");
        assert_eq!(link.read_line().await.unwrap(), "STATUS|ready|1");
    }

    #[tokio::test]
    async fn test_closed_link_rejects_io() {
        let (mut link, _device) = SerialLink::loopback("test");

        link.close();
        link.close();

        assert!(!link.is_open());
        assert!(matches!(link.send_line("TEMP:").await, Err(LinkError::NotConnected)));
        assert!(matches!(link.read_line().await, Err(LinkError::NotConnected)));
    }

    #[tokio::test]
    async fn test_close_releases_write_handle() {
        let (link, mut device) = SerialLink::loopback("test");
        let (_reader, writer) = link.split();
        let other = writer.clone();
        assert!(holds_backend(&writer));

        writer.close();

        assert!(!holds_backend(&other));
        assert!(matches!(other.send_line("TEMP:").await, Err(LinkError::NotConnected)));
        // The device sees the host side go away although a writer clone lives on.
        assert_eq!(device.recv_line().await, None);
    }

    #[tokio::test]
    async fn test_close_during_write_releases_after_it() {
        let (link, mut device) = SerialLink::loopback("test");
        let (_reader, writer) = link.split();

        // Hold the backend the way an in-flight write does.
        let busy = writer.backend.lock().await;
        writer.close();
        assert!(busy.is_some());
        drop(busy);
        assert!(holds_backend(&writer));

        assert!(matches!(writer.send_line("TEMP:").await, Err(LinkError::NotConnected)));
        assert!(!holds_backend(&writer));
        assert_eq!(device.recv_line().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_reader() {
        let (link, _device) = SerialLink::loopback("test");
        let (mut reader, writer) = link.split();

        let pending = tokio::spawn(async move { reader.read_line().await });
        tokio::task::yield_now().await;
        writer.close();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(LinkError::NotConnected)));
    }

    #[tokio::test]
    async fn test_device_disconnect_is_io_error() {
        let (mut link, device) = SerialLink::loopback("test");
        drop(device);

        assert!(matches!(link.read_line().await, Err(LinkError::Io(_))));
        assert!(!link.is_open());
    }
}
