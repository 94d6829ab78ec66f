//! Device discovery for the OSVR HDK.
//!
//! The HDK's main board enumerates as a USB-CDC serial device with a fixed
//! vendor/product identifier pair. Discovery matches both identifiers
//! exactly; there is no fuzzy or partial matching, and the first match wins.

use log::{debug, trace};

/// USB vendor/product identifier pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbEndpoint {
    /// USB vendor ID.
    pub vid: u16,
    /// USB product ID.
    pub pid: u16,
}

/// The HDK main board's USB-CDC interface.
pub const HDK_ENDPOINT: UsbEndpoint = UsbEndpoint {
    vid: 0x1532,
    pid: 0x0B00,
};

impl UsbEndpoint {
    /// Check whether the given identifiers match this endpoint exactly.
    #[must_use]
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// Discovered serial port with its USB descriptor metadata.
#[derive(Debug, Clone)]
pub struct DetectedPort {
    /// Port name/path (e.g., "/dev/ttyACM0" or "COM3").
    pub name: String,
    /// USB vendor ID (if the port is USB-backed).
    pub vid: Option<u16>,
    /// USB product ID (if the port is USB-backed).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

impl DetectedPort {
    /// Check whether this port is the HDK's USB-CDC interface.
    pub fn is_hmd(&self) -> bool {
        matches!((self.vid, self.pid), (Some(vid), Some(pid)) if HDK_ENDPOINT.matches(vid, pid))
    }
}

/// Detect all available serial ports with metadata.
pub fn detect_ports() -> Vec<DetectedPort> {
    let mut result = Vec::new();

    match serialport::available_ports() {
        Ok(ports) => {
            for port_info in ports {
                let mut detected = DetectedPort {
                    name: port_info.port_name.clone(),
                    vid: None,
                    pid: None,
                    manufacturer: None,
                    product: None,
                    serial: None,
                };

                if let serialport::SerialPortType::UsbPort(usb_info) = port_info.port_type {
                    detected.vid = Some(usb_info.vid);
                    detected.pid = Some(usb_info.pid);
                    detected.manufacturer = usb_info.manufacturer;
                    detected.product = usb_info.product;
                    detected.serial = usb_info.serial_number;

                    trace!(
                        "Found USB port: {} (VID: {:04X}, PID: {:04X})",
                        port_info.port_name, usb_info.vid, usb_info.pid
                    );
                }

                result.push(detected);
            }
        },
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
        },
    }

    result
}

/// Find the first port matching the endpoint among an already-detected list.
pub fn find_port_among(ports: &[DetectedPort], endpoint: UsbEndpoint) -> Option<String> {
    ports
        .iter()
        .find(|p| {
            matches!((p.vid, p.pid), (Some(vid), Some(pid)) if endpoint.matches(vid, pid))
        })
        .map(|p| p.name.clone())
}

/// Find the first attached port matching the endpoint, or `None` if absent.
pub fn find_port(endpoint: UsbEndpoint) -> Option<String> {
    let port = find_port_among(&detect_ports(), endpoint);
    match &port {
        Some(name) => debug!(
            "Found device {:04X}:{:04X} on {name}",
            endpoint.vid, endpoint.pid
        ),
        None => debug!(
            "No attached device matches {:04X}:{:04X}",
            endpoint.vid, endpoint.pid
        ),
    }
    port
}
