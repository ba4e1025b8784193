//! Progress indicators for the capstan CLI.

#![allow(dead_code)]

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A counting bar for a batch of known size
pub fn bar(len: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("  {prefix:.cyan} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_prefix(prefix.to_string());
    pb
}

/// A spinner for a single long-running step
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Finish a spinner with a success mark
pub fn finish_success(pb: &ProgressBar, msg: &str) {
    pb.finish_with_message(format!("✓ {msg}"));
}

/// Finish a spinner with an error mark
pub fn finish_error(pb: &ProgressBar, msg: &str) {
    pb.finish_with_message(format!("✗ {msg}"));
}
