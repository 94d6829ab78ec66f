//! Device commands: version check, port listing, and mode toggles.

use anyhow::{Context, Result};
use console::style;
use hdktool::{FirmwareTarget, PersistenceLevel};

use crate::config::Config;
use crate::{Cli, make_client};

/// Check command implementation.
pub(crate) fn cmd_check(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let mut client = make_client(cli, config);

    let info = client
        .query_firmware_version()
        .ok_or(hdktool::Error::VersionUnavailable)?;
    let target = client.probe_firmware_target();

    if json {
        let value = serde_json::json!({
            "main_board": info.main_board(),
            "version": info.version,
            "release": info.release,
            "build_date": info.build_date,
            "tracker": info.tracker,
            "target": match target {
                FirmwareTarget::Unknown => serde_json::Value::Null,
                FirmwareTarget::Hdk1 => "hdk1".into(),
                FirmwareTarget::Hdk2 => "hdk2".into(),
            },
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
        return Ok(());
    }

    eprintln!(
        "{} HMD Main Board: {}",
        style("ℹ").blue(),
        style(info.main_board()).bold()
    );
    eprintln!(
        "{} IMU Sensor Hub: {}",
        style("ℹ").blue(),
        style(&info.tracker).bold()
    );
    if target != FirmwareTarget::Unknown {
        eprintln!("{} Firmware targets {}", style("ℹ").blue(), target);
    }

    Ok(())
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) {
    let detected = hdktool::detect_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "hmd": p.is_hmd(),
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                    "serial": p.serial,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("no serial ports found").dim());
        return;
    }

    for port in &detected {
        let hmd_tag = if port.is_hmd() {
            format!(" [{}]", style("OSVR HDK").yellow())
        } else {
            String::new()
        };

        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };

        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{}{}{}",
            style("•").green(),
            style(&port.name).cyan(),
            hmd_tag,
            vid_pid,
            product
        );
    }
}

/// Enable display command implementation.
pub(crate) fn cmd_enable_display(cli: &Cli, config: &Config) -> Result<()> {
    let mut client = make_client(cli, config);
    client
        .enable_display()
        .context("sending the display enable command")?;
    if !cli.quiet {
        eprintln!("{} Display enable command sent", style("✓").green());
    }
    Ok(())
}

/// Side-by-side toggle command implementation.
pub(crate) fn cmd_toggle_sbs(cli: &Cli, config: &Config) -> Result<()> {
    let mut client = make_client(cli, config);
    client
        .toggle_side_by_side()
        .context("sending the side-by-side toggle command")?;
    if !cli.quiet {
        eprintln!("{} Side-by-side toggle sent", style("✓").green());
    }
    Ok(())
}

/// Persistence preset command implementation.
pub(crate) fn cmd_persistence(cli: &Cli, config: &Config, level: PersistenceLevel) -> Result<()> {
    let mut client = make_client(cli, config);
    client
        .set_persistence(level)
        .context("sending the persistence command")?;
    if !cli.quiet {
        eprintln!("{} Persistence set to {level:?}", style("✓").green());
    }
    Ok(())
}
