//! # hdktool
//!
//! A library for configuring and updating OSVR HDK head-mounted displays
//! over their USB-CDC serial interface:
//!
//! - Device discovery by fixed vendor/product identifiers
//! - The ASCII command protocol (version query, mode toggles, bootloader entry)
//! - Invocation of the bundled dfu-programmer flashing utility
//! - The full in-field firmware update sequence
//! - User profile persistence (`osvr_user_settings.json`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use hdktool::{FirmwareUpdater, HdkClient, SerialTransport, ToolRunner};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HdkClient::new(SerialTransport::hdk());
//!     let mut updater = FirmwareUpdater::new(client, ToolRunner::from_current_exe());
//!
//!     let report = updater.run(
//!         Path::new("firmware-1.99.hex"),
//!         |ctx| {
//!             println!("About to update {}", ctx.image.display());
//!             true
//!         },
//!         |stage, message| println!("[{stage}] {message}"),
//!     )?;
//!
//!     if let Some(info) = report.current {
//!         println!("Now running {info}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod port;
pub mod profile;
pub mod protocol;
pub mod tools;
pub mod transport;
pub mod update;

// Re-exports for convenience
pub use {
    device::{DetectedPort, HDK_ENDPOINT, UsbEndpoint, detect_ports, find_port},
    error::{Error, Result},
    port::{NativePort, Port},
    profile::{EyeSide, UserProfile},
    protocol::{FirmwareTarget, FirmwareVersionInfo, HdkClient, PersistenceLevel},
    tools::{LaunchOutcome, ToolRunner},
    transport::{SerialTransport, Transport},
    update::{FirmwareUpdater, ToolSet, UpdateReport, UpdateStage, intended_generation},
};
