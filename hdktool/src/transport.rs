//! Command-level serial transport.
//!
//! The HDK bootloader re-enumerates the USB device as a side effect of
//! several commands, which can invalidate the port name at any time. The
//! transport therefore never holds a connection across commands: every
//! exchange performs its own find, open, write, read (or timeout), and
//! unconditional close.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::device::{self, UsbEndpoint};
use crate::error::{Error, Result};
use crate::port::{NativePort, Port};
use crate::tools::ToolRunner;

/// Settle delay after flushing a command to the device.
pub const WRITE_SETTLE: Duration = Duration::from_secs(1);

/// Grace period given to the knock helper before it is force-terminated.
pub const KNOCK_GRACE: Duration = Duration::from_secs(1);

/// One-shot command transport to a device.
pub trait Transport {
    /// Send a command and wait up to `timeout` for the first response chunk.
    ///
    /// Returns whatever was received, which is empty if the device stayed
    /// silent or the command could not be written.
    fn exchange(&mut self, command: &[u8], timeout: Duration) -> Result<Vec<u8>>;

    /// Send a command without waiting for or interpreting a response.
    fn send(&mut self, command: &[u8]) -> Result<()>;
}

/// Knock helper configuration: which tool to run before opening the port.
#[derive(Debug, Clone)]
struct KnockConfig {
    runner: ToolRunner,
    tool: PathBuf,
}

/// Serial transport bound to a USB endpoint.
///
/// Port resolution happens per command; the port is opened with the fixed
/// HDK line discipline and closed before the call returns.
pub struct SerialTransport {
    endpoint: UsbEndpoint,
    knock: Option<KnockConfig>,
}

impl SerialTransport {
    /// Create a transport for the given endpoint.
    pub fn new(endpoint: UsbEndpoint) -> Self {
        Self {
            endpoint,
            knock: None,
        }
    }

    /// Create a transport for the HDK main board.
    pub fn hdk() -> Self {
        Self::new(device::HDK_ENDPOINT)
    }

    /// Run a knock helper before each open to free a port held elsewhere.
    ///
    /// The knock is best effort: if the helper is missing or fails, the open
    /// proceeds anyway.
    #[must_use]
    pub fn with_knock(mut self, runner: ToolRunner, tool: impl Into<PathBuf>) -> Self {
        self.knock = Some(KnockConfig {
            runner,
            tool: tool.into(),
        });
        self
    }

    fn open_port(&self) -> Result<NativePort> {
        let name = device::find_port(self.endpoint).ok_or(Error::DeviceNotFound {
            vid: self.endpoint.vid,
            pid: self.endpoint.pid,
        })?;

        if let Some(knock) = &self.knock {
            let outcome = knock.runner.knock(&knock.tool, KNOCK_GRACE);
            if !outcome.success() {
                debug!("Port knock did not run ({outcome:?}); opening anyway");
            }
        }

        NativePort::open(&name)
    }

    /// Write and flush a command, returning whether it was actually sent.
    ///
    /// A write failure is logged, not raised: the command counts as unsent
    /// and the caller closes the port as usual.
    fn write_command(port: &mut NativePort, command: &[u8]) -> bool {
        let sent = match port.write_all(command).and_then(|()| port.flush()) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write command to {}: {e}", port.name());
                false
            },
        };
        // Give the firmware time to act on the command before anything else
        // touches the port.
        thread::sleep(WRITE_SETTLE);
        sent
    }

    /// Read the first data notification, or nothing on timeout.
    fn read_response(port: &mut NativePort, timeout: Duration) -> Result<Vec<u8>> {
        port.set_timeout(timeout)?;

        let mut buf = [0u8; 1024];
        match port.read(&mut buf) {
            Ok(n) => {
                trace!("Received {n} bytes from {}", port.name());
                Ok(buf[..n].to_vec())
            },
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                debug!("No response from {} within {timeout:?}", port.name());
                Ok(Vec::new())
            },
            Err(e) => Err(Error::Io(e)),
        }
    }
}

impl Transport for SerialTransport {
    fn exchange(&mut self, command: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let mut port = self.open_port()?;

        if !Self::write_command(&mut port, command) {
            port.close();
            return Ok(Vec::new());
        }

        let result = Self::read_response(&mut port, timeout);
        port.close();
        result
    }

    fn send(&mut self, command: &[u8]) -> Result<()> {
        let mut port = self.open_port()?;
        Self::write_command(&mut port, command);
        port.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 0x0000:0x0000 is never assigned, so resolution always fails cleanly on
    // machines without the device attached.
    const ABSENT: UsbEndpoint = UsbEndpoint {
        vid: 0x0000,
        pid: 0x0000,
    };

    #[test]
    fn test_exchange_without_device_reports_not_found() {
        let mut transport = SerialTransport::new(ABSENT);
        let result = transport.exchange(b"#?v\n", Duration::from_millis(10));
        assert!(matches!(
            result,
            Err(Error::DeviceNotFound {
                vid: 0x0000,
                pid: 0x0000
            })
        ));
    }

    #[test]
    fn test_send_without_device_reports_not_found() {
        let mut transport = SerialTransport::new(ABSENT);
        assert!(matches!(
            transport.send(b"#Hi\n"),
            Err(Error::DeviceNotFound { .. })
        ));
    }
}
