//! Resource trait and types for declarative host convergence
//!
//! Every convergence step is modeled as a Resource with:
//! - State detection (current vs desired)
//! - Apply function (converge current → desired)
//!
//! Check-then-act is explicit: `apply` re-detects the current state and
//! mutates only on a mismatch, so a converged host yields a no-op run.

use anyhow::Result;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::sudo::Privilege;

/// Current or desired state of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Resource exists/is configured
    Present { details: Option<String> },
    /// Resource does not exist/is not configured
    Absent,
    /// Resource exists but differs from desired
    Modified { from: String, to: String },
    /// State cannot be determined
    Unknown,
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Apply was skipped
    Skipped { reason: String },
}

/// Context passed to apply operations
pub struct ApplyContext<'a> {
    pub dry_run: bool,
    pub verbose: bool,
    pub privilege: &'a Privilege,
}

/// Core trait for all convergence resources
pub trait Resource: fmt::Debug {
    /// Unique identifier for this resource (e.g. "apt:nginx", "unit:oration.service")
    fn id(&self) -> String;

    /// Human-readable description
    fn description(&self) -> String;

    /// Resource type category (e.g. "apt_package", "managed_file", "edge_binding")
    fn resource_type(&self) -> &'static str;

    /// Detect current state of this resource
    fn current_state(&self) -> Result<ResourceState>;

    /// Get the desired state (from the manifest)
    fn desired_state(&self) -> ResourceState;

    /// Check if resource needs changes
    fn needs_apply(&self) -> Result<bool> {
        let current = self.current_state()?;
        let desired = self.desired_state();
        Ok(current != desired)
    }

    /// Apply changes to reach desired state
    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult>;

    /// Optional multi-line body shown under this resource's diff entry
    /// (e.g. a unified content diff for a drifted file)
    fn diff_detail(&self) -> Option<String> {
        None
    }
}

/// A diff between current and desired state
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    pub resource_id: String,
    pub resource_type: String,
    pub description: String,
    pub current: ResourceState,
    pub desired: ResourceState,
    pub detail: Option<String>,
}

impl ResourceDiff {
    pub fn from_resource(resource: &dyn Resource) -> Result<Option<Self>> {
        let current = resource.current_state()?;
        let desired = resource.desired_state();

        if current == desired {
            return Ok(None);
        }

        Ok(Some(Self {
            resource_id: resource.id(),
            resource_type: resource.resource_type().to_string(),
            description: resource.description(),
            current,
            desired,
            detail: resource.diff_detail(),
        }))
    }
}

// ============================================================================
// Privileged file placement helpers
// ============================================================================

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Place a file at `dest` with an explicit mode, creating parent directories.
///
/// Goes through `install(1)` under the privilege context so the same code
/// path serves root, sudo, and test fixtures.
pub fn place_file(ctx: &ApplyContext, src: &Path, dest: &Path, mode: u32) -> Result<()> {
    ctx.privilege.run_checked(
        "install",
        &[
            "-m",
            &format!("{:o}", mode & 0o777),
            "-D",
            &src.to_string_lossy(),
            &dest.to_string_lossy(),
        ],
    )
}

/// Place rendered content at `dest` with an explicit mode.
pub fn place_content(ctx: &ApplyContext, dest: &Path, content: &str, mode: u32) -> Result<()> {
    let tmp = std::env::temp_dir().join(format!(
        "capstan-{}-{}.tmp",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    fs::write(&tmp, content)?;
    let result = place_file(ctx, &tmp, dest, mode);
    let _ = fs::remove_file(&tmp);
    result
}

// Re-export submodules
pub mod apt_package;
pub mod edge;
pub mod log_permissions;
pub mod managed_file;
pub mod package_index;

pub use apt_package::AptPackage;
pub use edge::EdgeBinding;
pub use log_permissions::LogPermissions;
pub use managed_file::ManagedFile;
pub use package_index::PackageIndex;

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn place_content_writes_with_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("etc").join("unit.service");
        let privilege = Privilege::direct();
        let ctx = ApplyContext {
            dry_run: false,
            verbose: false,
            privilege: &privilege,
        };

        place_content(&ctx, &dest, "[Unit]\n", 0o644).unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "[Unit]\n");
        let mode = fs::metadata(&dest).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
