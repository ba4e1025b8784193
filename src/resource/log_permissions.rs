//! Log directory permissions.
//!
//! Package installs and upgrades can reset the proxy's log directory modes,
//! locking the operating tooling out of the access logs. This resource is
//! re-evaluated on every run, not only at first install.

use anyhow::Result;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use walkdir::WalkDir;

use super::{ApplyContext, ApplyResult, Resource, ResourceState};

/// Keep a log directory tree readable at a fixed mode
#[derive(Debug, Clone)]
pub struct LogPermissions {
    pub path: PathBuf,
    pub mode: u32,
    pub recurse: bool,
}

impl LogPermissions {
    pub fn new(path: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            path: path.into(),
            mode,
            recurse: true,
        }
    }

    /// Count entries whose mode differs from the target.
    ///
    /// `None` when the tree cannot be scanned (e.g. insufficient privileges).
    fn off_mode_entries(&self) -> Option<usize> {
        let depth = if self.recurse { usize::MAX } else { 1 };
        let mut off = 0;

        for entry in WalkDir::new(&self.path).max_depth(depth) {
            let entry = entry.ok()?;
            let metadata = entry.metadata().ok()?;
            if metadata.permissions().mode() & 0o777 != self.mode {
                off += 1;
            }
        }

        Some(off)
    }
}

impl Resource for LogPermissions {
    fn id(&self) -> String {
        format!("logs:{}", self.path.display())
    }

    fn description(&self) -> String {
        format!(
            "Keep {} at mode {}{}",
            self.path.display(),
            crate::ui::format_mode(self.mode),
            if self.recurse { " (recursive)" } else { "" }
        )
    }

    fn resource_type(&self) -> &'static str {
        "log_permissions"
    }

    fn current_state(&self) -> Result<ResourceState> {
        if !self.path.exists() {
            return Ok(ResourceState::Absent);
        }

        match self.off_mode_entries() {
            Some(0) => Ok(ResourceState::Present { details: None }),
            Some(n) => Ok(ResourceState::Modified {
                from: format!("{n} entries off-mode"),
                to: format!("mode {}", crate::ui::format_mode(self.mode)),
            }),
            None => Ok(ResourceState::Unknown),
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

        let mode = crate::ui::format_mode(self.mode);
        let path = self.path.to_string_lossy().to_string();

        if !self.path.exists() {
            ctx.privilege
                .run_checked("install", &["-d", "-m", &mode, &path])?;
            return Ok(ApplyResult::Created);
        }

        if matches!(self.off_mode_entries(), Some(0)) {
            return Ok(ApplyResult::NoChange);
        }

        if self.recurse {
            ctx.privilege.run_checked("chmod", &["-R", &mode, &path])?;
        } else {
            ctx.privilege.run_checked("chmod", &[&mode, &path])?;
        }

        Ok(ApplyResult::Modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sudo::Privilege;
    use std::fs;

    fn apply(resource: &LogPermissions) -> ApplyResult {
        let privilege = Privilege::direct();
        let mut ctx = ApplyContext {
            dry_run: false,
            verbose: false,
            privilege: &privilege,
        };
        resource.apply(&mut ctx).unwrap()
    }

    #[test]
    fn resets_modes_across_the_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let logs = tmp.path().join("nginx");
        fs::create_dir_all(logs.join("archive")).unwrap();
        fs::write(logs.join("access.log"), "").unwrap();
        fs::write(logs.join("archive/old.log"), "").unwrap();
        fs::set_permissions(
            logs.join("access.log"),
            fs::Permissions::from_mode(0o600),
        )
        .unwrap();

        let resource = LogPermissions::new(&logs, 0o755);
        assert!(resource.needs_apply().unwrap());

        assert_eq!(apply(&resource), ApplyResult::Modified);

        let mode = fs::metadata(logs.join("access.log"))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o755);

        // Converged tree: second run is a no-op
        assert!(!resource.needs_apply().unwrap());
        assert_eq!(apply(&resource), ApplyResult::NoChange);
    }

    #[test]
    fn missing_directory_is_created_with_the_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let logs = tmp.path().join("nginx");

        let resource = LogPermissions::new(&logs, 0o755);
        assert_eq!(apply(&resource), ApplyResult::Created);

        let mode = fs::metadata(&logs).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }
}
