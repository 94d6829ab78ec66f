//! User profile commands.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use directories::ProjectDirs;
use hdktool::{EyeSide, UserProfile};
use std::env;
use std::path::PathBuf;

use crate::Cli;
use crate::config::Config;

/// Fields that `profile set` can change.
#[derive(Debug, Args)]
pub(crate) struct SetArgs {
    /// Gender as recorded in the profile.
    #[arg(long)]
    pub gender: Option<String>,

    /// Total interpupillary distance in millimeters.
    #[arg(long)]
    pub ipd: Option<f64>,

    /// Standing eye height in centimeters.
    #[arg(long)]
    pub standing_height: Option<f64>,

    /// Seated eye height in centimeters.
    #[arg(long)]
    pub seated_height: Option<f64>,

    /// Dominant eye.
    #[arg(long, value_parser = ["left", "right"])]
    pub dominant: Option<String>,

    /// Left eye spherical correction in diopters.
    #[arg(long)]
    pub left_spherical: Option<f64>,

    /// Left eye cylindrical correction in diopters.
    #[arg(long)]
    pub left_cylindrical: Option<f64>,

    /// Left eye cylinder axis in degrees.
    #[arg(long)]
    pub left_axis: Option<f64>,

    /// Left eye near addition in diopters.
    #[arg(long)]
    pub left_add: Option<f64>,

    /// Right eye spherical correction in diopters.
    #[arg(long)]
    pub right_spherical: Option<f64>,

    /// Right eye cylindrical correction in diopters.
    #[arg(long)]
    pub right_cylindrical: Option<f64>,

    /// Right eye cylinder axis in degrees.
    #[arg(long)]
    pub right_axis: Option<f64>,

    /// Right eye near addition in diopters.
    #[arg(long)]
    pub right_add: Option<f64>,
}

impl SetArgs {
    fn is_empty(&self) -> bool {
        self.gender.is_none()
            && self.ipd.is_none()
            && self.standing_height.is_none()
            && self.seated_height.is_none()
            && self.dominant.is_none()
            && self.left_spherical.is_none()
            && self.left_cylindrical.is_none()
            && self.left_axis.is_none()
            && self.left_add.is_none()
            && self.right_spherical.is_none()
            && self.right_cylindrical.is_none()
            && self.right_axis.is_none()
            && self.right_add.is_none()
    }
}

/// Where the settings document lives.
///
/// The OSVR runtime reads `%PROGRAMDATA%/OSVR/osvr_user_settings.json` on
/// Windows; elsewhere the platform config directory stands in for it.
pub(crate) fn profile_path(config: &Config) -> PathBuf {
    if let Some(path) = &config.profile.path {
        return path.clone();
    }

    let base = match env::var_os("PROGRAMDATA") {
        Some(program_data) => PathBuf::from(program_data).join("OSVR"),
        None => ProjectDirs::from("", "", "OSVR")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    base.join("osvr_user_settings.json")
}

/// Profile show command implementation.
pub(crate) fn cmd_show(_cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let path = profile_path(config);
    let profile = UserProfile::load(&path);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&profile).context("serializing profile")?
        );
        return Ok(());
    }

    let ps = &profile.personal_settings;
    eprintln!("{}", style(format!("User profile ({})", path.display())).bold().underlined());
    eprintln!("  Gender:          {}", ps.gender);
    eprintln!("  IPD:             {:.1} mm", profile.ipd());
    eprintln!("  Standing height: {:.1} cm", ps.anthropometric.standing_eye_height);
    eprintln!("  Seated height:   {:.1} cm", ps.anthropometric.seated_eye_height);

    for (label, side) in [("Left eye", EyeSide::Left), ("Right eye", EyeSide::Right)] {
        let eye = profile.eye(side);
        let dominant = if eye.dominant { " (dominant)" } else { "" };
        eprintln!("\n  {}{}", style(label).cyan(), style(dominant).yellow());
        eprintln!("    Spherical:   {:+.2}", eye.correction.distance.spherical);
        eprintln!("    Cylindrical: {:+.2}", eye.correction.distance.cylindrical);
        eprintln!("    Axis:        {:.0}", eye.correction.distance.axis);
        eprintln!("    Near add:    {:+.2}", eye.correction.add_near.spherical);
    }

    Ok(())
}

/// Profile set command implementation.
pub(crate) fn cmd_set(cli: &Cli, config: &Config, args: &SetArgs) -> Result<()> {
    if args.is_empty() {
        return Err(crate::CliError::Usage(
            "profile set needs at least one field to change; see --help".to_string(),
        )
        .into());
    }

    let path = profile_path(config);
    let mut profile = UserProfile::load(&path);

    if let Some(gender) = &args.gender {
        profile.personal_settings.gender.clone_from(gender);
    }
    if let Some(ipd) = args.ipd {
        profile.set_ipd(ipd);
    }
    if let Some(height) = args.standing_height {
        profile.personal_settings.anthropometric.standing_eye_height = height;
    }
    if let Some(height) = args.seated_height {
        profile.personal_settings.anthropometric.seated_eye_height = height;
    }
    if let Some(dominant) = &args.dominant {
        profile.set_dominant(if dominant == "left" {
            EyeSide::Left
        } else {
            EyeSide::Right
        });
    }

    let left = profile.eye_mut(EyeSide::Left);
    if let Some(v) = args.left_spherical {
        left.correction.distance.spherical = v;
    }
    if let Some(v) = args.left_cylindrical {
        left.correction.distance.cylindrical = v;
    }
    if let Some(v) = args.left_axis {
        left.correction.distance.axis = v;
    }
    if let Some(v) = args.left_add {
        left.correction.add_near.spherical = v;
    }

    let right = profile.eye_mut(EyeSide::Right);
    if let Some(v) = args.right_spherical {
        right.correction.distance.spherical = v;
    }
    if let Some(v) = args.right_cylindrical {
        right.correction.distance.cylindrical = v;
    }
    if let Some(v) = args.right_axis {
        right.correction.distance.axis = v;
    }
    if let Some(v) = args.right_add {
        right.correction.add_near.spherical = v;
    }

    profile
        .save(&path)
        .with_context(|| format!("saving profile to {}", path.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} Saved profile to {}",
            style("✓").green(),
            style(path.display()).bold()
        );
    }

    Ok(())
}
