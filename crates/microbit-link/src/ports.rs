//! Serial port discovery.

use serialport::{SerialPortInfo, SerialPortType};
use tracing::debug;

use crate::error::{LinkError, LinkResult};

/// USB vendor id of the Arm DAPLink interface chip on the micro:bit.
pub const MICROBIT_USB_VID: u16 = 0x0D28;

const MICROBIT_DESCRIPTION_HINTS: [&str; 4] = ["microbit", "micro:bit", "daplink", "mbed"];

/// A serial port that could host a micro:bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    /// Device path, e.g. `/dev/ttyACM0`.
    pub name: String,
    /// Human-readable description, if the OS reports one.
    pub description: Option<String>,
    /// `VID:PID` for USB ports.
    pub hardware_id: Option<String>,
    /// Whether this port looks like a micro:bit.
    pub likely_microbit: bool,
}

/// Enumerate the serial ports on this machine.
pub fn list_ports() -> LinkResult<Vec<PortCandidate>> {
    let ports = serialport::available_ports().map_err(LinkError::Enumerate)?;
    let candidates: Vec<PortCandidate> = ports.into_iter().map(PortCandidate::from).collect();
    debug!(count = candidates.len(), "enumerated serial ports");
    Ok(candidates)
}

/// The first port that looks like a micro:bit, if any.
pub fn recommended_port(candidates: &[PortCandidate]) -> Option<&PortCandidate> {
    candidates.iter().find(|c| c.likely_microbit)
}

/// Heuristic match on a port's path, description and USB vendor id.
pub fn is_likely_microbit(device: &str, description: Option<&str>, vid: Option<u16>) -> bool {
    if vid == Some(MICROBIT_USB_VID) {
        return true;
    }

    if let Some(description) = description {
        let description = description.to_lowercase();
        if MICROBIT_DESCRIPTION_HINTS
            .iter()
            .any(|hint| description.contains(hint))
        {
            return true;
        }
    }

    let device = device.to_lowercase();
    device.contains("usb") && device.contains("modem")
}

impl From<SerialPortInfo> for PortCandidate {
    fn from(info: SerialPortInfo) -> Self {
        let (description, hardware_id, vid) = match &info.port_type {
            SerialPortType::UsbPort(usb) => (
                usb.product.clone().or_else(|| usb.manufacturer.clone()),
                Some(format!("{:04X}:{:04X}", usb.vid, usb.pid)),
                Some(usb.vid),
            ),
            SerialPortType::BluetoothPort => (Some("Bluetooth".to_string()), None, None),
            _ => (None, None, None),
        };

        PortCandidate {
            likely_microbit: is_likely_microbit(&info.port_name, description.as_deref(), vid),
            name: info.port_name,
            description,
            hardware_id,
        }
    }
}
