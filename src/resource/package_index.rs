//! Package index refresh with a bounded validity window.
//!
//! The index is refreshed unconditionally the first time and again once the
//! window expires; runs inside the window skip the network round trip. The
//! refresh timestamp lives in capstan's own state file so the window is
//! independent of how apt itself manages its lists.

use anyhow::{Context, Result, bail};
use chrono::{Duration, Utc};
use std::path::PathBuf;

use super::{ApplyContext, ApplyResult, Resource, ResourceState};
use crate::state::HostState;

/// The apt package index, kept fresh within a validity window
#[derive(Debug, Clone)]
pub struct PackageIndex {
    /// How long a refresh stays valid
    pub cache_valid: Duration,
    /// Path of the state file recording the last refresh
    pub state_path: PathBuf,
}

impl PackageIndex {
    pub fn new(cache_valid_secs: u64, state_path: PathBuf) -> Self {
        Self {
            cache_valid: Duration::seconds(cache_valid_secs as i64),
            state_path,
        }
    }

    fn is_fresh(&self) -> Result<bool> {
        let state = HostState::load(&self.state_path)?;
        Ok(state.index_fresh(self.cache_valid, Utc::now()))
    }

    fn refresh(&self, ctx: &ApplyContext) -> Result<()> {
        let output = ctx.privilege.run("apt-get", &["update"])?;

        if !output.success {
            bail!("apt-get update failed: {}", output.stderr_str().trim());
        }

        let mut state = HostState::load(&self.state_path)?;
        state.mark_index_refreshed(Utc::now());
        state
            .save(&self.state_path)
            .context("Failed to record index refresh")?;

        Ok(())
    }
}

impl Resource for PackageIndex {
    fn id(&self) -> String {
        "apt:index".to_string()
    }

    fn description(&self) -> String {
        format!(
            "Refresh package index (valid {}s)",
            self.cache_valid.num_seconds()
        )
    }

    fn resource_type(&self) -> &'static str {
        "package_index"
    }

    fn current_state(&self) -> Result<ResourceState> {
        if self.is_fresh()? {
            Ok(ResourceState::Present { details: None })
        } else {
            Ok(ResourceState::Absent)
        }
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::Present { details: None }
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: "Dry run".to_string(),
            });
        }

        if self.is_fresh()? {
            return Ok(ApplyResult::NoChange);
        }

        self.refresh(ctx)?;
        Ok(ApplyResult::Modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with_state(
        valid_secs: u64,
        refreshed_secs_ago: Option<i64>,
    ) -> (PackageIndex, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let state_path = tmp.path().join("state.json");

        if let Some(ago) = refreshed_secs_ago {
            let mut state = HostState::default();
            state.mark_index_refreshed(Utc::now() - Duration::seconds(ago));
            state.save(&state_path).unwrap();
        }

        (PackageIndex::new(valid_secs, state_path), tmp)
    }

    #[test]
    fn never_refreshed_index_is_stale() {
        let (index, _tmp) = index_with_state(3600, None);
        assert!(index.needs_apply().unwrap());
    }

    #[test]
    fn refresh_inside_window_is_skipped() {
        let (index, _tmp) = index_with_state(3600, Some(600));
        assert!(!index.needs_apply().unwrap());
    }

    #[test]
    fn refresh_outside_window_is_due() {
        let (index, _tmp) = index_with_state(3600, Some(7200));
        assert!(index.needs_apply().unwrap());
    }
}
