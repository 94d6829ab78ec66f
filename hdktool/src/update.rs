//! Firmware update orchestration.
//!
//! The update is a linear, synchronous pipeline: version pre-check,
//! compatibility check, bootloader entry, erase, flash, relaunch, version
//! re-check. Every stage fails fast and terminally; nothing is retried at
//! this level beyond the transport's own version-query retries, and a
//! partially completed flash is never resumed. The progress callback fires
//! at every stage transition before the next blocking call begins, so a
//! display driven by it is current while the pipeline blocks.

use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{FirmwareTarget, FirmwareVersionInfo, HdkClient};
use crate::tools::{LaunchOutcome, ToolRunner};
use crate::transport::Transport;

/// Bound on each flashing tool invocation (erase, flash, launch).
pub const FLASH_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound on the bootloader-presence detector, which polls internally.
pub const DETECTOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait after the bootloader-entry command for the device to re-enumerate.
pub const BOOTLOADER_SETTLE: Duration = Duration::from_secs(3);

/// Wait after launching the new firmware before querying it.
pub const RELAUNCH_SETTLE: Duration = Duration::from_secs(5);

/// Stages of the firmware update pipeline, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    /// Reading the current firmware version and target generation.
    PreCheck,
    /// Rebooting the device into the bootloader and detecting it there.
    EnterBootloader,
    /// Erasing the existing firmware.
    Erase,
    /// Writing the new firmware image.
    Flash,
    /// Handing control to the new firmware.
    Launch,
    /// Re-reading the firmware version after the update.
    PostCheck,
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreCheck => write!(f, "pre-check"),
            Self::EnterBootloader => write!(f, "bootloader entry"),
            Self::Erase => write!(f, "erase"),
            Self::Flash => write!(f, "flash"),
            Self::Launch => write!(f, "launch"),
            Self::PostCheck => write!(f, "verify"),
        }
    }
}

/// Helper executables and the DFU device id the update drives.
#[derive(Debug, Clone)]
pub struct ToolSet {
    /// The dfu-programmer flashing utility.
    pub programmer: PathBuf,
    /// The bootloader-presence detector (exit 0 = device found).
    pub detector: PathBuf,
    /// DFU device identifier passed to the programmer.
    pub device_id: String,
}

impl Default for ToolSet {
    fn default() -> Self {
        Self {
            programmer: PathBuf::from("dfu-programmer"),
            detector: PathBuf::from("check-bootloader"),
            device_id: "atxmega256a3bu".to_string(),
        }
    }
}

/// What the confirmation hook gets to look at before anything destructive.
#[derive(Debug)]
pub struct UpdateContext<'a> {
    /// Selected firmware image.
    pub image: &'a Path,
    /// Firmware version read during the pre-check, if any.
    pub previous: Option<&'a FirmwareVersionInfo>,
    /// Hardware generation the running firmware targets.
    pub target: FirmwareTarget,
}

/// Outcome of a completed update session.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    /// Firmware version before the update, if it could be read.
    pub previous: Option<FirmwareVersionInfo>,
    /// Hardware generation detected during the pre-check.
    pub target: FirmwareTarget,
    /// Firmware version after the update, if it could be read.
    pub current: Option<FirmwareVersionInfo>,
    /// Progress lines accumulated during the run, for final display.
    pub transcript: Vec<String>,
}

/// Hardware generation a firmware image is built for, from its file name.
///
/// Images built exclusively for one generation carry an `hdk1`/`hdk2`
/// marker in their name; unmarked images are accepted for either.
pub fn intended_generation(image: &Path) -> FirmwareTarget {
    let name = image
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    if name.contains("hdk2") {
        FirmwareTarget::Hdk2
    } else if name.contains("hdk1") {
        FirmwareTarget::Hdk1
    } else {
        FirmwareTarget::Unknown
    }
}

fn note<P: FnMut(UpdateStage, &str)>(
    transcript: &mut Vec<String>,
    progress: &mut P,
    stage: UpdateStage,
    message: &str,
) {
    debug!("[{stage}] {message}");
    transcript.push(message.to_string());
    progress(stage, message);
}

/// Drives one firmware update session end to end.
pub struct FirmwareUpdater<T: Transport> {
    client: HdkClient<T>,
    runner: ToolRunner,
    tools: ToolSet,
    bootloader_settle: Duration,
    relaunch_settle: Duration,
}

impl<T: Transport> FirmwareUpdater<T> {
    /// Create an updater over the given device client and tool runner.
    pub fn new(client: HdkClient<T>, runner: ToolRunner) -> Self {
        Self {
            client,
            runner,
            tools: ToolSet::default(),
            bootloader_settle: BOOTLOADER_SETTLE,
            relaunch_settle: RELAUNCH_SETTLE,
        }
    }

    /// Override the helper tool set.
    #[must_use]
    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    /// Override the settle delays (shortened in tests).
    #[must_use]
    pub fn with_settle_delays(mut self, bootloader: Duration, relaunch: Duration) -> Self {
        self.bootloader_settle = bootloader;
        self.relaunch_settle = relaunch;
        self
    }

    /// Run the full update pipeline for the given firmware image.
    ///
    /// `confirm` runs once after the pre-check and is the only cancellation
    /// point: declining ends the session before anything destructive.
    /// `progress` receives every stage transition and message; the same
    /// lines are accumulated into the report's transcript.
    pub fn run<C, P>(&mut self, image: &Path, confirm: C, mut progress: P) -> Result<UpdateReport>
    where
        C: FnOnce(&UpdateContext<'_>) -> bool,
        P: FnMut(UpdateStage, &str),
    {
        let mut transcript = Vec::new();

        // Stage: pre-check. A missing version downgrades the final
        // verification; a determined generation mismatch is fatal before
        // anything destructive happens and cannot be overridden.
        note(
            &mut transcript,
            &mut progress,
            UpdateStage::PreCheck,
            "Reading current firmware version...",
        );
        let previous = self.client.query_firmware_version();
        let target = match &previous {
            Some(info) => {
                note(
                    &mut transcript,
                    &mut progress,
                    UpdateStage::PreCheck,
                    &format!("Current firmware: {info}"),
                );
                self.client.probe_firmware_target()
            },
            None => {
                note(
                    &mut transcript,
                    &mut progress,
                    UpdateStage::PreCheck,
                    "Current firmware version could not be read; the update \
                     result cannot be verified against it.",
                );
                FirmwareTarget::Unknown
            },
        };

        let intended = intended_generation(image);
        if intended != FirmwareTarget::Unknown {
            if target != FirmwareTarget::Unknown && target != intended {
                return Err(Error::GenerationMismatch {
                    detected: target,
                    intended,
                });
            }
            if target == FirmwareTarget::Unknown {
                note(
                    &mut transcript,
                    &mut progress,
                    UpdateStage::PreCheck,
                    &format!(
                        "Image is marked for {intended} but the device's \
                         generation could not be determined."
                    ),
                );
            }
        }

        let context = UpdateContext {
            image,
            previous: previous.as_ref(),
            target,
        };
        if !confirm(&context) {
            info!("Update declined by the user");
            return Err(Error::Cancelled);
        }

        // Stage: bootloader entry. The device reboots without acknowledging,
        // then re-enumerates as a DFU device; the detector polls for it.
        note(
            &mut transcript,
            &mut progress,
            UpdateStage::EnterBootloader,
            "Rebooting the device into bootloader mode...",
        );
        self.client.enter_bootloader()?;
        thread::sleep(self.bootloader_settle);

        note(
            &mut transcript,
            &mut progress,
            UpdateStage::EnterBootloader,
            "Waiting for a device in bootloader mode...",
        );
        match self
            .runner
            .run_sync(&self.tools.detector, &[], Some(DETECTOR_TIMEOUT))
        {
            LaunchOutcome::Missing => {
                return Err(Error::ToolMissing {
                    tool: self.runner.resolve(&self.tools.detector),
                });
            },
            LaunchOutcome::Exited(0) => {},
            outcome => {
                warn!("Bootloader detector reported {outcome:?}");
                return Err(Error::BootloaderNotDetected);
            },
        }

        // Stages: erase, flash, launch. From here on a failure leaves the
        // device in bootloader mode, which the error messages spell out.
        note(
            &mut transcript,
            &mut progress,
            UpdateStage::Erase,
            "Erasing existing firmware...",
        );
        let outcome = self.runner.run_sync(
            &self.tools.programmer,
            &[self.tools.device_id.as_str(), "erase"],
            Some(FLASH_TOOL_TIMEOUT),
        );
        self.check_tool_stage(UpdateStage::Erase, outcome)?;

        note(
            &mut transcript,
            &mut progress,
            UpdateStage::Flash,
            "Loading new firmware...",
        );
        let image_arg = image.to_string_lossy();
        let outcome = self.runner.run_sync(
            &self.tools.programmer,
            &[self.tools.device_id.as_str(), "flash", image_arg.as_ref()],
            Some(FLASH_TOOL_TIMEOUT),
        );
        self.check_tool_stage(UpdateStage::Flash, outcome)?;

        note(
            &mut transcript,
            &mut progress,
            UpdateStage::Launch,
            "Launching new firmware...",
        );
        let outcome = self.runner.run_sync(
            &self.tools.programmer,
            &[self.tools.device_id.as_str(), "launch"],
            Some(FLASH_TOOL_TIMEOUT),
        );
        self.check_tool_stage(UpdateStage::Launch, outcome)?;

        // The device needs time to boot the new firmware before it will
        // answer on the serial interface again.
        thread::sleep(self.relaunch_settle);

        // Stage: post-check. The update itself already succeeded, so an
        // unreadable version here is informational, not fatal.
        note(
            &mut transcript,
            &mut progress,
            UpdateStage::PostCheck,
            "Reading new firmware version...",
        );
        let current = self.client.query_firmware_version();
        match &current {
            Some(info) => note(
                &mut transcript,
                &mut progress,
                UpdateStage::PostCheck,
                &format!("New firmware: {info}"),
            ),
            None => note(
                &mut transcript,
                &mut progress,
                UpdateStage::PostCheck,
                "The update completed, but the new firmware version could \
                 not be read; check cables and power cycle the HMD.",
            ),
        }

        Ok(UpdateReport {
            previous,
            target,
            current,
            transcript,
        })
    }

    /// Map a flashing tool outcome onto the stage's error semantics.
    fn check_tool_stage(&self, stage: UpdateStage, outcome: LaunchOutcome) -> Result<()> {
        match outcome {
            LaunchOutcome::Exited(0) | LaunchOutcome::Spawned => Ok(()),
            LaunchOutcome::Missing => Err(Error::ToolMissing {
                tool: self.runner.resolve(&self.tools.programmer),
            }),
            LaunchOutcome::StartFailed => Err(Error::StageFailed {
                stage,
                detail: "the flashing tool failed to start".to_string(),
            }),
            LaunchOutcome::TimedOut => Err(Error::StageFailed {
                stage,
                detail: format!(
                    "the flashing tool did not finish within {}s",
                    FLASH_TOOL_TIMEOUT.as_secs()
                ),
            }),
            LaunchOutcome::Exited(code) => Err(Error::StageFailed {
                stage,
                detail: format!("exit code {code}"),
            }),
        }
    }
}
