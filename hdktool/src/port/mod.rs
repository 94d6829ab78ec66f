//! Port abstraction for serial communication with the HDK.
//!
//! The protocol layer is written against the `Port` trait rather than a
//! concrete serial port so it can be exercised with in-memory fakes. The
//! native implementation (`NativePort`) uses the `serialport` crate.
//!
//! The HDK's line discipline is fixed: 57600 baud, 8 data bits, no parity,
//! one stop bit, no flow control. Opening a port applies all of these
//! settings and fails if any of them cannot be applied exactly.

pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Baud rate used by the HDK main board.
pub const BAUD_RATE: u32 = 57_600;

/// Bound on blocking writes: flush must complete within this window.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Serial port trait for HDK communication.
///
/// A port is opened for a single command exchange and closed afterwards;
/// implementations must tolerate `close` being called more than once.
pub trait Port: Read + Write + Send {
    /// Set the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release it for other processes.
    ///
    /// Close is unconditional: it must succeed (or be a no-op) regardless of
    /// any earlier read or write failure on the port.
    fn close(&mut self);
}

pub use native::NativePort;
