// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Terminal output: live progress bar and the final summary.

use crate::harvest::HarvestReport;
use crate::progress::{HarvestEventKind, HarvestStage, ProgressReceiver};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

/// Render progress events until the channel closes.
pub async fn drive_progress(mut rx: ProgressReceiver) {
    let bar = ProgressBar::new_spinner();
    bar.enable_steady_tick(Duration::from_millis(120));
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }

    loop {
        match rx.recv().await {
            Ok(event) => apply(&bar, &event.event),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
    bar.finish_and_clear();
}

fn apply(bar: &ProgressBar, event: &HarvestEventKind) {
    match event {
        HarvestEventKind::StageStarted { stage } => match stage {
            HarvestStage::Navigate => bar.set_message("opening search page"),
            HarvestStage::Reveal => bar.set_message("loading results"),
            HarvestStage::Extract => bar.set_message("extracting image URLs"),
            HarvestStage::Fetch => {
                if let Ok(style) =
                    ProgressStyle::with_template("{bar:30} {pos}/{len} downloaded {msg}")
                {
                    bar.set_style(style);
                }
                bar.set_position(0);
                bar.set_message("");
            }
        },
        HarvestEventKind::ItemsCounted { count, target, .. } => {
            bar.set_message(format!("loaded {count} of {target} images"));
        }
        HarvestEventKind::Stalled { count } => {
            bar.println(format!("  no more results after {count} images"));
        }
        HarvestEventKind::Extracted { references, .. } => {
            bar.set_length(*references as u64);
        }
        HarvestEventKind::DownloadFinished { ok, .. } => {
            bar.inc(1);
            if !ok {
                bar.set_message("(with failures)");
            }
        }
        HarvestEventKind::Warning { message } => bar.println(format!("  warning: {message}")),
        _ => {}
    }
}

/// Print the human-readable summary of a finished run.
pub fn print_report(report: &HarvestReport) {
    println!();
    if report.cancelled {
        println!("Download cancelled by user.");
    }
    if report.references.len() < report.requested {
        println!(
            "Only {} of {} requested images were available.",
            report.references.len(),
            report.requested
        );
    }
    println!(
        "Successfully downloaded {}/{} images in {:.1}s.",
        report.saved(),
        report.references.len(),
        report.elapsed_ms() as f64 / 1000.0
    );
    if report.failed() > 0 {
        println!("{} downloads failed:", report.failed());
        for d in report.downloads.iter().filter(|d| d.is_failed()) {
            println!("  #{} {}", d.index, d.url);
        }
    }
    let dir = std::path::absolute(&report.output_dir).unwrap_or_else(|_| report.output_dir.clone());
    println!("Images saved to: {}", dir.display());
}

/// Print a run as JSON.
pub fn print_report_json(report: &HarvestReport) {
    match serde_json::to_value(report) {
        Ok(value) => print_json(&value),
        Err(e) => eprintln!("failed to serialize report: {e}"),
    }
}
