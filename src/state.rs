//! Host-side run state.
//!
//! The only durable thing capstan remembers between runs is when it last
//! refreshed the package index, which powers the cache-validity window for
//! `apply`. Everything else about the host is re-detected from the host
//! itself on every run.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persistent state for this host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostState {
    /// Last time the package index was refreshed by capstan
    pub last_index_refresh: Option<DateTime<Utc>>,
}

impl HostState {
    /// Path of the state file inside the state directory
    pub fn default_path() -> Result<PathBuf> {
        Ok(crate::paths::state_dir()?.join("state.json"))
    }

    /// Load state from `path`, or return default if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))
    }

    /// Save state to `path`, creating the parent directory if needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Whether the package index is still fresh for the given window
    pub fn index_fresh(&self, valid_for: Duration, now: DateTime<Utc>) -> bool {
        match self.last_index_refresh {
            Some(at) => now.signed_duration_since(at) < valid_for,
            None => false,
        }
    }

    /// Record a package-index refresh
    pub fn mark_index_refreshed(&mut self, now: DateTime<Utc>) {
        self.last_index_refresh = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_default() {
        let tmp = tempfile::tempdir().unwrap();
        let state = HostState::load(&tmp.path().join("state.json")).unwrap();
        assert!(state.last_index_refresh.is_none());
    }

    #[test]
    fn roundtrip_preserves_refresh_time() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("state.json");

        let mut state = HostState::default();
        let now = Utc::now();
        state.mark_index_refreshed(now);
        state.save(&path).unwrap();

        let loaded = HostState::load(&path).unwrap();
        assert_eq!(loaded.last_index_refresh, Some(now));
    }

    #[test]
    fn freshness_respects_the_window() {
        let mut state = HostState::default();
        let now = Utc::now();

        // Never refreshed: stale
        assert!(!state.index_fresh(Duration::seconds(3600), now));

        state.mark_index_refreshed(now - Duration::seconds(600));
        assert!(state.index_fresh(Duration::seconds(3600), now));
        assert!(!state.index_fresh(Duration::seconds(300), now));
    }
}
