//! HDK serial command protocol.
//!
//! Commands are plain ASCII lines terminated with `\n`. Responses are
//! newline-delimited with no checksum and no acknowledgement byte;
//! correctness relies on fixed field counts, so parsing is all-or-nothing.
//! A malformed response never yields a partial result.

use std::fmt;
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::transport::Transport;

/// Firmware/tracker version query.
pub const CMD_VERSION: &[u8] = b"#?v\n";

/// Reboot into the Atmel bootloader. The device does not acknowledge this
/// before re-enumerating, so it is always sent fire-and-forget.
pub const CMD_ENTER_BOOTLOADER: &[u8] = b"#?b1948\n";

/// Lock-pin diagnostic query; recognized only by HDK 2 firmware.
pub const CMD_LOCK_PIN_PROBE: &[u8] = b"#?p\n";

/// Re-initialize the display panel.
pub const CMD_ENABLE_DISPLAY: &[u8] = b"#Hi\n";

/// Toggle side-by-side mode (HDK 1.x panels).
pub const CMD_TOGGLE_SIDE_BY_SIDE: &[u8] = b"#f1s\n";

/// How long to wait for the first response chunk of a query.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum number of version query attempts.
const VERSION_QUERY_ATTEMPTS: usize = 3;

/// Delay between version query attempts.
const VERSION_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Display persistence presets (panel duty cycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceLevel {
    /// Full persistence.
    Full,
    /// Medium persistence.
    Medium,
    /// Low persistence.
    Low,
}

impl PersistenceLevel {
    /// The wire command for this preset.
    pub fn command(self) -> &'static [u8] {
        match self {
            Self::Full => b"#sp03C50\n",
            Self::Medium => b"#sp03C32\n",
            Self::Low => b"#sp03C0A\n",
        }
    }
}

/// Parsed firmware version information.
///
/// Either fully populated or absent: a response that fails any shape check
/// yields no info at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersionInfo {
    /// Main-board firmware version (e.g., "1.98").
    pub version: String,
    /// Optional release tag token, as printed by the firmware (e.g., "(RELEASE)").
    pub release: Option<String>,
    /// Firmware build date (e.g., "Nov 8, 2016").
    pub build_date: String,
    /// Tracker/IMU sensor hub sub-version (e.g., "1.10.1.472").
    pub tracker: String,
}

impl FirmwareVersionInfo {
    /// Parse the raw response to the version query.
    ///
    /// After stripping carriage returns, the response must contain exactly
    /// three non-empty lines: the echoed command, the main-board line, and
    /// the tracker line. The main-board line splits on whitespace into 5
    /// fields (`Version <ver> <Mon> <day> <year>`) or 6 fields with a
    /// release tag after the version; the tracker line splits on `:` into
    /// exactly 2 fields.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = raw.replace('\r', "");
        let lines: Vec<&str> = cleaned
            .split('\n')
            .filter(|line| !line.trim().is_empty())
            .collect();
        if lines.len() != 3 {
            trace!("Version response has {} non-empty lines, need 3", lines.len());
            return None;
        }

        let fields: Vec<&str> = lines[1].split_whitespace().collect();
        let (version, release, month, day, year) = match fields.len() {
            5 => (fields[1], None, fields[2], fields[3], fields[4]),
            6 => (
                fields[1],
                Some(fields[2].to_string()),
                fields[3],
                fields[4],
                fields[5],
            ),
            n => {
                trace!("Main-board line has {n} fields, need 5 or 6");
                return None;
            },
        };

        let tracker_fields: Vec<&str> = lines[2].split(':').collect();
        if tracker_fields.len() != 2 {
            trace!(
                "Tracker line has {} colon-delimited fields, need 2",
                tracker_fields.len()
            );
            return None;
        }

        Some(Self {
            version: version.to_string(),
            release,
            build_date: format!("{month} {day}, {year}"),
            tracker: tracker_fields[1].trim().to_string(),
        })
    }

    /// Main-board version as shown to the user, e.g. "1.98 (Nov 8, 2016)".
    pub fn main_board(&self) -> String {
        match &self.release {
            Some(tag) => format!("{} {} ({})", self.version, tag, self.build_date),
            None => format!("{} ({})", self.version, self.build_date),
        }
    }
}

impl fmt::Display for FirmwareVersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, tracker {}", self.main_board(), self.tracker)
    }
}

/// Hardware generation the currently running firmware targets.
///
/// Derived from how the lock-pin probe fails, not from a version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareTarget {
    /// No live device response; never guessed.
    Unknown,
    /// First-generation (HDK 1.x) firmware.
    Hdk1,
    /// Second-generation (HDK 2) firmware.
    Hdk2,
}

impl FirmwareTarget {
    /// Classify a lock-pin probe response.
    ///
    /// HDK 2 firmware answers the probe with the lock pin status; HDK 1.x
    /// firmware rejects the command with an error line. Silence means the
    /// generation cannot be determined.
    pub fn classify(response: Option<&str>) -> Self {
        match response {
            None => Self::Unknown,
            Some(text) if text.trim().is_empty() => Self::Unknown,
            Some(text) if text.to_ascii_lowercase().contains("lock") => Self::Hdk2,
            Some(_) => Self::Hdk1,
        }
    }
}

impl fmt::Display for FirmwareTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "an unknown generation"),
            Self::Hdk1 => write!(f, "HDK 1.x"),
            Self::Hdk2 => write!(f, "HDK 2"),
        }
    }
}

/// Command client for an HDK main board.
pub struct HdkClient<T: Transport> {
    transport: T,
}

impl<T: Transport> HdkClient<T> {
    /// Create a client over the given transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Get a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the client and return the underlying transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Query the firmware and tracker versions.
    ///
    /// Retries the whole open/write/read cycle up to a bounded attempt
    /// count. Returns `None` when no attempt produced a well-formed
    /// response; there is no partial result.
    pub fn query_firmware_version(&mut self) -> Option<FirmwareVersionInfo> {
        for attempt in 1..=VERSION_QUERY_ATTEMPTS {
            if attempt > 1 {
                thread::sleep(VERSION_RETRY_DELAY);
            }

            match self.transport.exchange(CMD_VERSION, RESPONSE_TIMEOUT) {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    if let Some(info) = FirmwareVersionInfo::parse(&text) {
                        debug!("Firmware version: {info}");
                        return Some(info);
                    }
                    debug!(
                        "Version query attempt {attempt}/{VERSION_QUERY_ATTEMPTS} \
                         returned no usable response"
                    );
                },
                Err(e) => {
                    debug!("Version query attempt {attempt}/{VERSION_QUERY_ATTEMPTS} failed: {e}");
                },
            }
        }

        warn!("Firmware version unavailable after {VERSION_QUERY_ATTEMPTS} attempts");
        None
    }

    /// Probe which hardware generation the running firmware targets.
    pub fn probe_firmware_target(&mut self) -> FirmwareTarget {
        let response = match self.transport.exchange(CMD_LOCK_PIN_PROBE, RESPONSE_TIMEOUT) {
            Ok(bytes) if !bytes.is_empty() => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Ok(_) => None,
            Err(e) => {
                debug!("Lock-pin probe failed: {e}");
                None
            },
        };

        let target = FirmwareTarget::classify(response.as_deref());
        debug!("Firmware targets {target}");
        target
    }

    /// Reboot the device into the bootloader (no acknowledgement).
    pub fn enter_bootloader(&mut self) -> crate::Result<()> {
        self.transport.send(CMD_ENTER_BOOTLOADER)
    }

    /// Re-initialize the display panel.
    pub fn enable_display(&mut self) -> crate::Result<()> {
        self.transport.send(CMD_ENABLE_DISPLAY)
    }

    /// Toggle side-by-side mode on HDK 1.x panels.
    pub fn toggle_side_by_side(&mut self) -> crate::Result<()> {
        self.transport.send(CMD_TOGGLE_SIDE_BY_SIDE)
    }

    /// Set the display persistence preset.
    pub fn set_persistence(&mut self, level: PersistenceLevel) -> crate::Result<()> {
        self.transport.send(level.command())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::collections::VecDeque;

    /// Transport fake that replays canned responses and records writes.
    struct MockTransport {
        responses: VecDeque<Result<Vec<u8>>>,
        sent: Vec<Vec<u8>>,
        exchanged: Vec<Vec<u8>>,
    }

    impl MockTransport {
        fn new(responses: Vec<Result<Vec<u8>>>) -> Self {
            Self {
                responses: responses.into_iter().collect(),
                sent: Vec::new(),
                exchanged: Vec::new(),
            }
        }
    }

    impl Transport for MockTransport {
        fn exchange(&mut self, command: &[u8], _timeout: Duration) -> Result<Vec<u8>> {
            self.exchanged.push(command.to_vec());
            self.responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        fn send(&mut self, command: &[u8]) -> Result<()> {
            self.sent.push(command.to_vec());
            Ok(())
        }
    }

    const RESPONSE_198: &str = "#?v\r\nVersion 1.98  Nov  8 2016\r\nTracker:1.10.1.472\r\n";
    const RESPONSE_199: &str = "#?v\r\nVersion 1.99 (RELEASE) Nov 28 2016\r\nTracker:1.10.1.472\r\n";

    // ---- FirmwareVersionInfo::parse ----

    #[test]
    fn test_parse_five_field_response() {
        let info = FirmwareVersionInfo::parse(RESPONSE_198).unwrap();
        assert_eq!(info.version, "1.98");
        assert_eq!(info.release, None);
        assert_eq!(info.build_date, "Nov 8, 2016");
        assert_eq!(info.tracker, "1.10.1.472");
        assert_eq!(info.main_board(), "1.98 (Nov 8, 2016)");
    }

    #[test]
    fn test_parse_six_field_response_with_release_tag() {
        let info = FirmwareVersionInfo::parse(RESPONSE_199).unwrap();
        assert_eq!(info.version, "1.99");
        assert_eq!(info.release.as_deref(), Some("(RELEASE)"));
        assert_eq!(info.main_board(), "1.99 (RELEASE) (Nov 28, 2016)");
        assert_eq!(info.tracker, "1.10.1.472");
    }

    #[test]
    fn test_parse_rejects_wrong_line_count() {
        assert_eq!(FirmwareVersionInfo::parse(""), None);
        assert_eq!(FirmwareVersionInfo::parse("#?v\n"), None);
        assert_eq!(
            FirmwareVersionInfo::parse("#?v\nVersion 1.98 Nov 8 2016\n"),
            None
        );
        assert_eq!(
            FirmwareVersionInfo::parse(
                "#?v\nVersion 1.98 Nov 8 2016\nTracker:1.10.1.472\nextra line\n"
            ),
            None
        );
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        // 4 fields
        assert_eq!(
            FirmwareVersionInfo::parse("#?v\nVersion 1.98 Nov 2016\nTracker:1.10.1.472\n"),
            None
        );
        // 7 fields
        assert_eq!(
            FirmwareVersionInfo::parse(
                "#?v\nVersion 1.99 (RELEASE) extra Nov 28 2016\nTracker:1.10.1.472\n"
            ),
            None
        );
    }

    #[test]
    fn test_parse_rejects_wrong_tracker_shape() {
        // No colon
        assert_eq!(
            FirmwareVersionInfo::parse("#?v\nVersion 1.98 Nov 8 2016\nTracker 1.10.1.472\n"),
            None
        );
        // Two colons
        assert_eq!(
            FirmwareVersionInfo::parse("#?v\nVersion 1.98 Nov 8 2016\nTracker:1.10:1.472\n"),
            None
        );
    }

    // ---- FirmwareTarget::classify ----

    #[test]
    fn test_classify_silence_is_unknown() {
        assert_eq!(FirmwareTarget::classify(None), FirmwareTarget::Unknown);
        assert_eq!(FirmwareTarget::classify(Some("")), FirmwareTarget::Unknown);
        assert_eq!(
            FirmwareTarget::classify(Some(" \r\n ")),
            FirmwareTarget::Unknown
        );
    }

    #[test]
    fn test_classify_lock_status_is_hdk2() {
        assert_eq!(
            FirmwareTarget::classify(Some("#?p\r\nLock: 0\r\n")),
            FirmwareTarget::Hdk2
        );
    }

    #[test]
    fn test_classify_rejection_is_hdk1() {
        assert_eq!(
            FirmwareTarget::classify(Some("#?p\r\n?\r\n")),
            FirmwareTarget::Hdk1
        );
        assert_eq!(
            FirmwareTarget::classify(Some("#?p\r\nUnknown command\r\n")),
            FirmwareTarget::Hdk1
        );
    }

    // ---- HdkClient ----

    #[test]
    fn test_query_version_first_attempt() {
        let transport = MockTransport::new(vec![Ok(RESPONSE_198.as_bytes().to_vec())]);
        let mut client = HdkClient::new(transport);

        let info = client.query_firmware_version().unwrap();
        assert_eq!(info.main_board(), "1.98 (Nov 8, 2016)");
        assert_eq!(client.transport.exchanged, vec![CMD_VERSION.to_vec()]);
    }

    #[test]
    fn test_query_version_retries_then_succeeds() {
        let transport = MockTransport::new(vec![
            Ok(Vec::new()),
            Ok(b"garbage".to_vec()),
            Ok(RESPONSE_199.as_bytes().to_vec()),
        ]);
        let mut client = HdkClient::new(transport);

        let info = client.query_firmware_version().unwrap();
        assert_eq!(info.version, "1.99");
        assert_eq!(client.transport.exchanged.len(), 3);
    }

    #[test]
    fn test_query_version_gives_up_after_bounded_attempts() {
        let transport = MockTransport::new((0..5).map(|_| Ok(Vec::new())).collect());
        let mut client = HdkClient::new(transport);

        assert_eq!(client.query_firmware_version(), None);
        assert_eq!(client.transport.exchanged.len(), 3);
    }

    #[test]
    fn test_query_version_is_idempotent() {
        let transport = MockTransport::new(vec![
            Ok(RESPONSE_198.as_bytes().to_vec()),
            Ok(RESPONSE_198.as_bytes().to_vec()),
        ]);
        let mut client = HdkClient::new(transport);

        let first = client.query_firmware_version();
        let second = client.query_firmware_version();
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn test_probe_target_silence_is_unknown() {
        let transport = MockTransport::new(vec![Ok(Vec::new())]);
        let mut client = HdkClient::new(transport);
        assert_eq!(client.probe_firmware_target(), FirmwareTarget::Unknown);
    }

    #[test]
    fn test_probe_target_transport_error_is_unknown() {
        let transport = MockTransport::new(vec![Err(crate::Error::DeviceNotFound {
            vid: 0x1532,
            pid: 0x0B00,
        })]);
        let mut client = HdkClient::new(transport);
        assert_eq!(client.probe_firmware_target(), FirmwareTarget::Unknown);
    }

    #[test]
    fn test_fire_and_forget_commands() {
        let transport = MockTransport::new(Vec::new());
        let mut client = HdkClient::new(transport);

        client.enter_bootloader().unwrap();
        client.enable_display().unwrap();
        client.toggle_side_by_side().unwrap();
        client.set_persistence(PersistenceLevel::Low).unwrap();

        assert_eq!(
            client.transport.sent,
            vec![
                CMD_ENTER_BOOTLOADER.to_vec(),
                CMD_ENABLE_DISPLAY.to_vec(),
                CMD_TOGGLE_SIDE_BY_SIDE.to_vec(),
                b"#sp03C0A\n".to_vec(),
            ]
        );
        assert!(client.transport.exchanged.is_empty());
    }

    #[test]
    fn test_persistence_commands() {
        assert_eq!(PersistenceLevel::Full.command(), b"#sp03C50\n");
        assert_eq!(PersistenceLevel::Medium.command(), b"#sp03C32\n");
        assert_eq!(PersistenceLevel::Low.command(), b"#sp03C0A\n");
    }
}
