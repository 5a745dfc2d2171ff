//! Serial port backend.
//!
//! The port is opened once and cloned. The clone is drained by a dedicated
//! reader thread that forwards raw chunks to the link. The first handle does
//! the writes on the blocking pool.

use std::io::{self, Read};
use std::sync::Arc;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{LinkError, LinkResult};
use crate::link::{SerialLink, WriteBackend};

/// Default baud rate of the bridge firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default read timeout of the reader thread.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Inbound chunks buffered between the reader thread and the link.
const CHUNK_CHANNEL_CAPACITY: usize = 256;

/// Size of a single read from the port.
const READ_CHUNK_SIZE: usize = 1024;

/// Serial port settings. Framing is always 8N1 without flow control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SerialSettings {
    /// Baud rate.
    pub baud_rate: u32,
    /// How long a single read may block before the reader thread checks
    /// whether the link was closed.
    pub read_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        SerialSettings {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SerialLink {
    /// Open the serial device at `port`.
    ///
    /// Fails with [`LinkError::Connection`] if the device cannot be opened.
    pub fn open(port: &str, settings: &SerialSettings) -> LinkResult<SerialLink> {
        let connection_error = |source| LinkError::Connection {
            port: port.to_string(),
            source,
        };

        let writer = serialport::new(port, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()
            .map_err(connection_error)?;
        let reader = writer.try_clone().map_err(connection_error)?;

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let link = SerialLink::from_parts(
            port,
            rx,
            WriteBackend::Serial(Arc::new(std::sync::Mutex::new(writer))),
        );

        let open = link.subscribe();
        let port_name = port.to_string();
        std::thread::Builder::new()
            .name(format!("serial-rx:{}", port))
            .spawn(move || run_serial_reader(port_name, reader, tx, open))?;

        info!(port, baud_rate = settings.baud_rate, "opened serial link");
        Ok(link)
    }
}

/// Blocking read loop. Exits when the link closes, the link is dropped, or
/// the port fails.
fn run_serial_reader(
    port_name: String,
    mut port: Box<dyn SerialPort>,
    tx: mpsc::Sender<Vec<u8>>,
    open: watch::Receiver<bool>,
) {
    let mut buf = [0u8; READ_CHUNK_SIZE];

    while *open.borrow() && !tx.is_closed() {
        match port.read(&mut buf) {
            Ok(0) => {
                debug!(port = %port_name, "serial port reached end of stream");
                break;
            }
            Ok(n) => {
                if tx.blocking_send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {
                continue;
            }
            Err(e) => {
                warn!(port = %port_name, error = %e, "serial read failed");
                break;
            }
        }
    }

    debug!(port = %port_name, "serial reader thread exiting");
}
