//! Centralized path resolution for capstan
//!
//! # Environment Variables
//!
//! - `CAPSTAN_STATE_DIR` - Override the state directory (index-refresh stamp)
//!
//! # Path Resolution Priority
//!
//! For state_dir():
//! 1. `CAPSTAN_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/capstan` (if set)
//! 3. Default: `~/.local/state/capstan`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "CAPSTAN_STATE_DIR";

/// Get the capstan state directory path
pub fn state_dir() -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    // 2. Check XDG_STATE_HOME
    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("capstan");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    // 3. Default: ~/.local/state/capstan
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("capstan");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// This is the canonical path expansion function for capstan. All modules
/// should use this instead of calling shellexpand directly.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
