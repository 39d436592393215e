// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment readiness check.

use super::{output, EXIT_FATAL, EXIT_OK};
use crate::config::HarvestConfig;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Report on what a harvest run would use.
#[derive(Debug, serde::Serialize)]
pub struct DoctorReport {
    pub os: &'static str,
    pub arch: &'static str,
    pub chromium: Option<PathBuf>,
    pub config_valid: bool,
    pub config_error: Option<String>,
    pub download_dir_writable: bool,
}

impl DoctorReport {
    pub fn ready(&self) -> bool {
        self.chromium.is_some() && self.config_valid && self.download_dir_writable
    }
}

/// Inspect the environment for a run with this config file and output directory.
pub fn inspect(config_file: Option<&Path>, output_dir: &Path) -> DoctorReport {
    let (config_valid, config_error, configured_chromium) = match HarvestConfig::resolve(config_file) {
        Ok(config) => (true, None, config.chromium_path),
        Err(e) => (false, Some(e.to_string()), None),
    };

    DoctorReport {
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        chromium: configured_chromium
            .filter(|p| p.exists())
            .or_else(find_chromium),
        config_valid,
        config_error,
        download_dir_writable: writable(output_dir),
    }
}

fn writable(dir: &Path) -> bool {
    // The directory may not exist yet; then its nearest existing ancestor decides.
    let probe = dir
        .ancestors()
        .find(|p| p.as_os_str().is_empty() || p.exists())
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p });
    match probe.and_then(|p| std::fs::metadata(p).ok()) {
        Some(meta) => meta.is_dir() && !meta.permissions().readonly(),
        None => false,
    }
}

/// Print the readiness report.
pub async fn run(config_file: Option<&Path>, output_dir: &Path, json: bool) -> Result<i32> {
    let report = inspect(config_file, output_dir);

    if json {
        output::print_json(&serde_json::to_value(&report)?);
    } else {
        println!("Unsplash Harvest Doctor");
        println!("=======================");
        println!();
        println!("OS:   {}", report.os);
        println!("Arch: {}", report.arch);
        println!();
        match &report.chromium {
            Some(path) => println!("[OK] Chromium found: {}", path.display()),
            None => println!(
                "[!!] Chromium NOT found. Install Chrome or set HARVEST_CHROMIUM_PATH."
            ),
        }
        match &report.config_error {
            None => println!("[OK] Configuration is valid"),
            Some(e) => println!("[!!] Configuration error: {e}"),
        }
        if report.download_dir_writable {
            println!("[OK] Output directory is writable: {}", output_dir.display());
        } else {
            println!("[!!] Output directory is not writable: {}", output_dir.display());
        }
        println!();
        println!(
            "Status: {}",
            if report.ready() { "READY" } else { "NOT READY" }
        );
    }

    Ok(if report.ready() { EXIT_OK } else { EXIT_FATAL })
}
