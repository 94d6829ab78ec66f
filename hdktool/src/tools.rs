//! Invocation of the helper executables shipped alongside the application.
//!
//! The flashing utility and the bootloader detector are installed next to
//! the application binary, so tool names resolve relative to the running
//! executable's directory unless an absolute path is given. The resolved
//! file's existence is checked before any spawn attempt, which is what
//! distinguishes "tool not installed" from "tool crashed".

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

/// Poll interval while waiting for a child process to exit.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of invoking a helper executable.
///
/// Every invocation resolves to exactly one outcome; none is silently
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The resolved executable does not exist; nothing was spawned.
    Missing,
    /// The process could not be started.
    StartFailed,
    /// The process started but did not finish within the allowed time.
    TimedOut,
    /// The process was started without waiting for it (detached or knock).
    Spawned,
    /// The process ran to completion with the given exit code.
    Exited(i32),
}

impl LaunchOutcome {
    /// Whether the invocation counts as successful.
    pub fn success(&self) -> bool {
        matches!(self, Self::Spawned | Self::Exited(0))
    }
}

/// Runs helper executables resolved against a base directory.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    base_dir: PathBuf,
}

impl ToolRunner {
    /// Create a runner resolving tools against the given directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create a runner resolving tools next to the running executable.
    pub fn from_current_exe() -> Self {
        let base_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base_dir)
    }

    /// Resolve a tool name to a concrete path.
    ///
    /// Absolute paths pass through untouched. Relative names are joined to
    /// the base directory and get the platform executable suffix when they
    /// carry no extension of their own.
    pub fn resolve(&self, tool: &Path) -> PathBuf {
        if tool.is_absolute() {
            return tool.to_path_buf();
        }

        let mut resolved = self.base_dir.join(tool);
        if resolved.extension().is_none() && !std::env::consts::EXE_SUFFIX.is_empty() {
            let mut name = resolved.file_name().unwrap_or_default().to_os_string();
            name.push(std::env::consts::EXE_SUFFIX);
            resolved.set_file_name(name);
        }
        resolved
    }

    /// Run a tool and wait for it to exit, bounded by an optional timeout.
    pub fn run_sync(&self, tool: &Path, args: &[&str], timeout: Option<Duration>) -> LaunchOutcome {
        let path = self.resolve(tool);
        if !path.exists() {
            debug!("Tool not found: {}", path.display());
            return LaunchOutcome::Missing;
        }

        debug!("Running {} {}", path.display(), args.join(" "));
        let mut child = match Command::new(&path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start {}: {e}", path.display());
                return LaunchOutcome::StartFailed;
            },
        };

        let Some(limit) = timeout else {
            return match child.wait() {
                Ok(status) => LaunchOutcome::Exited(status.code().unwrap_or(-1)),
                Err(e) => {
                    warn!("Failed waiting for {}: {e}", path.display());
                    LaunchOutcome::TimedOut
                },
            };
        };

        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let code = status.code().unwrap_or(-1);
                    trace!("{} exited with {code}", path.display());
                    return LaunchOutcome::Exited(code);
                },
                Ok(None) => {
                    if start.elapsed() >= limit {
                        warn!(
                            "{} did not finish within {}s; terminating",
                            path.display(),
                            limit.as_secs()
                        );
                        let _ = child.kill();
                        let _ = child.wait();
                        return LaunchOutcome::TimedOut;
                    }
                    thread::sleep(WAIT_POLL_INTERVAL);
                },
                Err(e) => {
                    warn!("Failed waiting for {}: {e}", path.display());
                    let _ = child.kill();
                    let _ = child.wait();
                    return LaunchOutcome::TimedOut;
                },
            }
        }
    }

    /// Start a tool detached, without waiting for it.
    pub fn spawn_detached(&self, tool: &Path, args: &[&str]) -> LaunchOutcome {
        let path = self.resolve(tool);
        if !path.exists() {
            debug!("Tool not found: {}", path.display());
            return LaunchOutcome::Missing;
        }

        debug!("Spawning {} {}", path.display(), args.join(" "));
        match Command::new(&path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(_) => LaunchOutcome::Spawned,
            Err(e) => {
                warn!("Failed to start {}: {e}", path.display());
                LaunchOutcome::StartFailed
            },
        }
    }

    /// Run a tool just long enough to claim and release a resource.
    ///
    /// The child is given `grace` to acquire whatever it opens (a serial
    /// port), then force-terminated without a chance to clean up; releasing
    /// the resource on exit is the operating system's job.
    pub fn knock(&self, tool: &Path, grace: Duration) -> LaunchOutcome {
        let path = self.resolve(tool);
        if !path.exists() {
            debug!("Knock tool not found: {}", path.display());
            return LaunchOutcome::Missing;
        }

        debug!("Knocking with {}", path.display());
        let mut child = match Command::new(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to start knock tool {}: {e}", path.display());
                return LaunchOutcome::StartFailed;
            },
        };

        thread::sleep(grace);
        let _ = child.kill();
        let _ = child.wait();
        LaunchOutcome::Spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_absolute_passes_through() {
        let runner = ToolRunner::new("/opt/hdktool");
        let abs = if cfg!(windows) {
            PathBuf::from("C:\\tools\\dfu-programmer.exe")
        } else {
            PathBuf::from("/usr/bin/dfu-programmer")
        };
        assert_eq!(runner.resolve(&abs), abs);
    }

    #[test]
    fn test_resolve_relative_joins_base_dir() {
        let runner = ToolRunner::new("/opt/hdktool");
        let resolved = runner.resolve(Path::new("dfu-programmer"));
        assert!(resolved.starts_with("/opt/hdktool"));
        let name = resolved.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("dfu-programmer"));
    }

    #[test]
    fn test_missing_tool_never_spawns() {
        let dir = tempdir().unwrap();
        let runner = ToolRunner::new(dir.path());
        let tool = Path::new("no-such-tool");

        assert_eq!(
            runner.run_sync(tool, &[], None),
            LaunchOutcome::Missing
        );
        assert_eq!(
            runner.run_sync(tool, &["erase"], Some(Duration::from_secs(1))),
            LaunchOutcome::Missing
        );
        assert_eq!(runner.spawn_detached(tool, &[]), LaunchOutcome::Missing);
        assert_eq!(
            runner.knock(tool, Duration::from_millis(10)),
            LaunchOutcome::Missing
        );
    }

    #[test]
    fn test_outcome_success() {
        assert!(LaunchOutcome::Exited(0).success());
        assert!(LaunchOutcome::Spawned.success());
        assert!(!LaunchOutcome::Exited(1).success());
        assert!(!LaunchOutcome::Missing.success());
        assert!(!LaunchOutcome::StartFailed.success());
        assert!(!LaunchOutcome::TimedOut.success());
    }

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_run_sync_captures_exit_code() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "exit3", "exit 3");
        let runner = ToolRunner::new(dir.path());

        assert_eq!(
            runner.run_sync(Path::new("exit3"), &[], Some(Duration::from_secs(5))),
            LaunchOutcome::Exited(3)
        );
        assert_eq!(
            runner.run_sync(Path::new("exit3"), &[], None),
            LaunchOutcome::Exited(3)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run_sync_times_out_and_kills() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "hang", "sleep 30");
        let runner = ToolRunner::new(dir.path());

        let start = Instant::now();
        let outcome = runner.run_sync(Path::new("hang"), &[], Some(Duration::from_millis(200)));
        assert_eq!(outcome, LaunchOutcome::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_knock_kills_after_grace() {
        let dir = tempdir().unwrap();
        write_script(dir.path(), "holder", "sleep 30");
        let runner = ToolRunner::new(dir.path());

        let start = Instant::now();
        let outcome = runner.knock(Path::new("holder"), Duration::from_millis(100));
        assert_eq!(outcome, LaunchOutcome::Spawned);
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
