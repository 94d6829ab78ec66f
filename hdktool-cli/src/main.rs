//! hdktool CLI - Control panel and firmware updater for the OSVR HDK.
//!
//! ## Features
//!
//! - Read the firmware and tracker versions over the serial link
//! - In-field firmware updates through the bundled dfu-programmer utility
//! - Display mode toggles (display enable, side-by-side, persistence)
//! - User profile editing (`osvr_user_settings.json`)
//! - Shell completion generation

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use hdktool::{HdkClient, PersistenceLevel, SerialTransport, ToolRunner, ToolSet};
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod config;

use config::Config;

/// hdktool - Control panel and firmware updater for the OSVR HDK.
///
/// Environment variables:
///   HDKTOOL_TOOLS_DIR        - Directory holding the helper executables
///   HDKTOOL_NON_INTERACTIVE  - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "hdktool")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "For more information, visit: http://www.osvr.org")]
struct Cli {
    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "HDKTOOL_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Directory holding the helper executables (defaults to the
    /// application's own directory).
    #[arg(long, global = true, env = "HDKTOOL_TOOLS_DIR", value_name = "DIR")]
    tools_dir: Option<PathBuf>,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Read the current firmware and tracker versions.
    Check {
        /// Output version information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Update the HMD firmware from a hex image.
    Update {
        /// Path to the firmware hex file.
        image: PathBuf,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Re-initialize the display panel.
    EnableDisplay,

    /// Toggle side-by-side mode (HDK 1.x).
    ToggleSbs,

    /// Set the display persistence preset.
    Persistence {
        /// Persistence preset.
        level: PersistenceArg,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Show or edit the user profile.
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Display persistence presets.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum PersistenceArg {
    /// Full persistence.
    Full,
    /// Medium persistence.
    Medium,
    /// Low persistence.
    Low,
}

impl From<PersistenceArg> for PersistenceLevel {
    fn from(level: PersistenceArg) -> Self {
        match level {
            PersistenceArg::Full => Self::Full,
            PersistenceArg::Medium => Self::Medium,
            PersistenceArg::Low => Self::Low,
        }
    }
}

/// Profile subcommands.
#[derive(Subcommand)]
enum ProfileAction {
    /// Show the current user profile.
    Show {
        /// Output the profile as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Update fields of the user profile.
    Set(commands::profile::SetArgs),
}

/// User-facing CLI failures with dedicated exit codes.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or unusable setup (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Cancelled by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Cancelled(_) => 130,
        };
    }
    if matches!(
        err.downcast_ref::<hdktool::Error>(),
        Some(hdktool::Error::Cancelled)
    ) {
        return 130;
    }
    1
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // NO_COLOR and TTY detection
    if env::var("NO_COLOR").is_ok() || !console::Term::stderr().is_term() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "hdktool v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Check { json } => commands::device::cmd_check(&cli, &config, *json),
        Commands::Update { image, yes } => {
            commands::update::cmd_update(&cli, &config, image, *yes)
        },
        Commands::EnableDisplay => commands::device::cmd_enable_display(&cli, &config),
        Commands::ToggleSbs => commands::device::cmd_toggle_sbs(&cli, &config),
        Commands::Persistence { level } => {
            commands::device::cmd_persistence(&cli, &config, (*level).into())
        },
        Commands::ListPorts { json } => {
            commands::device::cmd_list_ports(*json);
            Ok(())
        },
        Commands::Profile { action } => match action {
            ProfileAction::Show { json } => commands::profile::cmd_show(&cli, &config, *json),
            ProfileAction::Set(args) => commands::profile::cmd_set(&cli, &config, args),
        },
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Whether progress animations should be drawn.
pub(crate) fn use_fancy_output() -> bool {
    console::Term::stderr().is_term() && console::colors_enabled_stderr()
}

/// Tool runner honoring the CLI and config directory overrides.
pub(crate) fn make_runner(cli: &Cli, config: &Config) -> ToolRunner {
    if let Some(dir) = &cli.tools_dir {
        ToolRunner::new(dir)
    } else if let Some(dir) = &config.tools.dir {
        ToolRunner::new(dir)
    } else {
        ToolRunner::from_current_exe()
    }
}

/// Command client for the HDK, with the knock helper wired in if configured.
pub(crate) fn make_client(cli: &Cli, config: &Config) -> HdkClient<SerialTransport> {
    let mut transport = SerialTransport::hdk();
    if config.tools.knock_before_open {
        let tool = config
            .tools
            .knock
            .clone()
            .unwrap_or_else(|| PathBuf::from("release-port"));
        transport = transport.with_knock(make_runner(cli, config), tool);
    }
    HdkClient::new(transport)
}

/// Helper tool set honoring the config overrides.
pub(crate) fn tool_set(config: &Config) -> ToolSet {
    let mut tools = ToolSet::default();
    if let Some(programmer) = &config.tools.programmer {
        tools.programmer.clone_from(programmer);
    }
    if let Some(detector) = &config.tools.detector {
        tools.detector.clone_from(detector);
    }
    tools
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_is_valid() {
        // Verifies that all derive macros produce a valid clap Command
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_check() {
        let cli = Cli::try_parse_from(["hdktool", "check"]).unwrap();
        assert!(matches!(cli.command, Commands::Check { json: false }));
    }

    #[test]
    fn test_cli_parse_check_json() {
        let cli = Cli::try_parse_from(["hdktool", "check", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Check { json: true }));
    }

    #[test]
    fn test_cli_parse_update() {
        let cli = Cli::try_parse_from(["hdktool", "update", "firmware-1.99.hex"]).unwrap();
        if let Commands::Update { image, yes } = cli.command {
            assert_eq!(image.to_str().unwrap(), "firmware-1.99.hex");
            assert!(!yes);
        } else {
            panic!("Expected Update command");
        }
    }

    #[test]
    fn test_cli_parse_update_yes() {
        let cli = Cli::try_parse_from(["hdktool", "update", "--yes", "fw.hex"]).unwrap();
        if let Commands::Update { yes, .. } = cli.command {
            assert!(yes);
        } else {
            panic!("Expected Update command");
        }
    }

    #[test]
    fn test_cli_parse_update_requires_image() {
        assert!(Cli::try_parse_from(["hdktool", "update"]).is_err());
    }

    #[test]
    fn test_cli_parse_persistence_levels() {
        for (arg, expected) in [
            ("full", PersistenceLevel::Full),
            ("medium", PersistenceLevel::Medium),
            ("low", PersistenceLevel::Low),
        ] {
            let cli = Cli::try_parse_from(["hdktool", "persistence", arg]).unwrap();
            if let Commands::Persistence { level } = cli.command {
                assert_eq!(PersistenceLevel::from(level), expected);
            } else {
                panic!("Expected Persistence command");
            }
        }
    }

    #[test]
    fn test_cli_parse_persistence_invalid_level() {
        assert!(Cli::try_parse_from(["hdktool", "persistence", "ultra"]).is_err());
    }

    #[test]
    fn test_cli_parse_list_ports_json() {
        let cli = Cli::try_parse_from(["hdktool", "list-ports", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::ListPorts { json: true }));
    }

    #[test]
    fn test_cli_parse_profile_show() {
        let cli = Cli::try_parse_from(["hdktool", "profile", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Profile {
                action: ProfileAction::Show { json: false }
            }
        ));
    }

    #[test]
    fn test_cli_parse_profile_set_ipd() {
        let cli = Cli::try_parse_from(["hdktool", "profile", "set", "--ipd", "63.5"]).unwrap();
        if let Commands::Profile {
            action: ProfileAction::Set(args),
        } = cli.command
        {
            assert_eq!(args.ipd, Some(63.5));
        } else {
            panic!("Expected Profile Set command");
        }
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["hdktool", "completions", "bash"]).unwrap();
        assert!(matches!(cli.command, Commands::Completions { .. }));
    }

    #[test]
    fn test_cli_global_options() {
        let cli = Cli::try_parse_from([
            "hdktool",
            "-vv",
            "--quiet",
            "--non-interactive",
            "--tools-dir",
            "/opt/hdk/bin",
            "--config",
            "/tmp/hdktool.toml",
            "check",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        assert!(cli.non_interactive);
        assert_eq!(cli.tools_dir.as_deref(), Some(std::path::Path::new("/opt/hdk/bin")));
        assert_eq!(
            cli.config_path.as_deref(),
            Some(std::path::Path::new("/tmp/hdktool.toml"))
        );
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["hdktool"]).is_err());
    }

    #[test]
    fn test_tool_set_defaults() {
        let tools = tool_set(&Config::default());
        assert_eq!(tools.programmer.to_str().unwrap(), "dfu-programmer");
        assert_eq!(tools.detector.to_str().unwrap(), "check-bootloader");
        assert_eq!(tools.device_id, "atxmega256a3bu");
    }

    #[test]
    fn test_tool_set_overrides() {
        let mut config = Config::default();
        config.tools.programmer = Some(PathBuf::from("/usr/bin/dfu-programmer"));
        let tools = tool_set(&config);
        assert_eq!(
            tools.programmer.to_str().unwrap(),
            "/usr/bin/dfu-programmer"
        );
        assert_eq!(tools.detector.to_str().unwrap(), "check-bootloader");
    }
}
