//! Firmware update command implementation.

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use hdktool::update::UpdateContext;
use hdktool::FirmwareUpdater;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::{Cli, CliError, make_client, make_runner, tool_set, use_fancy_output};

/// Update command implementation.
pub(crate) fn cmd_update(cli: &Cli, config: &Config, image: &Path, yes: bool) -> Result<()> {
    if !image.is_file() {
        return Err(CliError::Usage(format!(
            "firmware image not found: {}",
            image.display()
        ))
        .into());
    }
    if cli.non_interactive && !yes {
        return Err(CliError::Usage(
            "non-interactive mode requires --yes to update firmware".to_string(),
        )
        .into());
    }

    // Aborting mid-flash can brick the device, so the whole session ignores
    // Ctrl-C; the only cancellation point is the confirmation prompt below.
    if let Err(e) = ctrlc::set_handler(|| {
        eprintln!(
            "\n{} firmware update in progress; it cannot be cancelled once flashing has begun",
            style("!").yellow().bold()
        );
    }) {
        debug!("Could not install interrupt handler: {e}");
    }

    let client = make_client(cli, config);
    let runner = make_runner(cli, config);
    let mut updater = FirmwareUpdater::new(client, runner).with_tools(tool_set(config));

    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    };

    let result = updater.run(
        image,
        |ctx| {
            if yes {
                pb.suspend(|| print_summary(image, ctx));
                true
            } else {
                pb.suspend(|| {
                    print_summary(image, ctx);
                    Confirm::with_theme(&ColorfulTheme::default())
                        .with_prompt("Proceed with the firmware update?")
                        .default(false)
                        .interact()
                        .unwrap_or(false)
                })
            }
        },
        |stage, message| {
            if pb.is_hidden() {
                if !cli.quiet {
                    eprintln!("{} {message}", style(format!("[{stage}]")).cyan());
                }
            } else {
                pb.set_message(format!("[{stage}] {message}"));
            }
        },
    );

    pb.finish_and_clear();
    let report = result?;

    if !cli.quiet {
        eprintln!();
        for line in &report.transcript {
            eprintln!("  {} {line}", style("•").dim());
        }
        eprintln!(
            "\n{} {}",
            style("🎉").green().bold(),
            "Firmware update complete."
        );
        match &report.current {
            Some(info) => {
                eprintln!("{} New firmware: {}", style("✓").green(), style(info).bold());
            },
            None => {
                eprintln!(
                    "{} The new firmware version could not be read back; check \
                     cables and power cycle the HMD.",
                    style("⚠").yellow()
                );
            },
        }
    }

    Ok(())
}

/// Show what is about to happen before anything destructive does.
fn print_summary(image: &Path, ctx: &UpdateContext<'_>) {
    eprintln!();
    match ctx.previous {
        Some(info) => {
            eprintln!(
                "{} Current firmware: {}",
                style("ℹ").blue(),
                style(info).bold()
            );
        },
        None => {
            eprintln!(
                "{} The current firmware version could not be read; compatibility \
                 cannot be verified.",
                style("⚠").yellow()
            );
        },
    }
    eprintln!(
        "{} Selected image: {}",
        style("ℹ").blue(),
        style(image.display()).bold()
    );
}
