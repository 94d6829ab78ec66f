//! Error types for hdktool.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::FirmwareTarget;
use crate::update::UpdateStage;

/// Result type for hdktool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for hdktool operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No attached serial device matches the HDK vendor/product identifiers.
    #[error(
        "HMD not found (no serial device matches {vid:04X}:{pid:04X}); \
         check that all cables are connected as shown in the manual"
    )]
    DeviceNotFound {
        /// Expected USB vendor ID.
        vid: u16,
        /// Expected USB product ID.
        pid: u16,
    },

    /// The firmware version could not be read from the device.
    #[error(
        "cannot read the firmware version; check that all cables are connected \
         as shown in the manual, then power cycle the HMD and try again"
    )]
    VersionUnavailable,

    /// A required helper executable is not installed next to the application.
    #[error("helper tool not found at {}; please reinstall the application", tool.display())]
    ToolMissing {
        /// Resolved path that was checked.
        tool: PathBuf,
    },

    /// The bootloader-presence detector did not find a device in bootloader mode.
    #[error(
        "no device in bootloader mode was detected; install the bootloader \
         drivers from the bundled dfu-prog-usb package and try again"
    )]
    BootloaderNotDetected,

    /// A destructive update stage failed after the device entered bootloader mode.
    #[error(
        "firmware {stage} step failed ({detail}): the device has been left in \
         bootloader mode; power cycle the HMD to recover, then run the update again"
    )]
    StageFailed {
        /// Stage that failed.
        stage: UpdateStage,
        /// What the flashing tool reported.
        detail: String,
    },

    /// The firmware image targets a different hardware generation than the device.
    #[error(
        "firmware image is built for {intended} but the connected device is \
         running {detected} firmware; refusing to flash"
    )]
    GenerationMismatch {
        /// Generation the running firmware targets.
        detected: FirmwareTarget,
        /// Generation the image file is marked for.
        intended: FirmwareTarget,
    },

    /// The user declined the update confirmation.
    #[error("firmware update cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
