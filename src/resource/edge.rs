//! Edge binding - the proxy's available/enabled vhost pair.
//!
//! One resource covers the whole activation because the step order matters:
//! the distribution default must be retired before the new binding is
//! enabled, otherwise two configs could both match the public listener for
//! a moment. The enabled entry is a symlink into the available set, never a
//! copy, so later edits to the definition propagate on reload.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::{ApplyContext, ApplyResult, Resource, ResourceState, place_content};

/// The single active vhost binding for a service
#[derive(Debug, Clone)]
pub struct EdgeBinding {
    /// Site name; file name in both vhost directories
    pub site: String,
    /// Rendered vhost definition
    pub content: String,
    /// The proxy's available-vhost directory
    pub available_dir: PathBuf,
    /// The proxy's enabled-vhost directory
    pub enabled_dir: PathBuf,
    /// Name of the distribution default binding to retire
    pub default_site: String,
}

#[derive(Debug)]
struct EdgeState {
    default_enabled: bool,
    available_current: bool,
    enabled_current: bool,
}

impl EdgeState {
    fn converged(&self) -> bool {
        !self.default_enabled && self.available_current && self.enabled_current
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.default_enabled {
            parts.push("default binding still enabled");
        }
        if !self.available_current {
            parts.push("definition missing or stale");
        }
        if !self.enabled_current {
            parts.push("not enabled");
        }
        parts.join(", ")
    }
}

impl EdgeBinding {
    pub fn available_path(&self) -> PathBuf {
        self.available_dir.join(&self.site)
    }

    pub fn enabled_path(&self) -> PathBuf {
        self.enabled_dir.join(&self.site)
    }

    fn default_path(&self) -> PathBuf {
        self.enabled_dir.join(&self.default_site)
    }

    fn check_current(&self) -> Result<EdgeState> {
        let default_path = self.default_path();
        let default_enabled = default_path.exists() || default_path.is_symlink();

        let available_current = match fs::read_to_string(self.available_path()) {
            Ok(existing) => existing == self.content,
            Err(_) => false,
        };

        let enabled_current = symlink_points_to(&self.enabled_path(), &self.available_path());

        Ok(EdgeState {
            default_enabled,
            available_current,
            enabled_current,
        })
    }
}

/// Whether `link` is a symlink resolving to `target`
fn symlink_points_to(link: &Path, target: &Path) -> bool {
    if !link.is_symlink() {
        return false;
    }

    let Ok(dest) = fs::read_link(link) else {
        return false;
    };

    let resolved = if dest.is_absolute() {
        dest
    } else {
        link.parent().map(|p| p.join(&dest)).unwrap_or(dest)
    };

    // Canonicalize both sides so relative links still compare equal
    let resolved = resolved.canonicalize().unwrap_or(resolved);
    let target = target.canonicalize().unwrap_or_else(|_| target.to_path_buf());
    resolved == target
}

impl Resource for EdgeBinding {
    fn id(&self) -> String {
        format!("edge:{}", self.site)
    }

    fn description(&self) -> String {
        format!("Activate vhost {} (retire '{}')", self.site, self.default_site)
    }

    fn resource_type(&self) -> &'static str {
        "edge_binding"
    }

    fn current_state(&self) -> Result<ResourceState> {
        let state = self.check_current()?;

        if state.converged() {
            Ok(ResourceState::Present {
                details: Some("enabled".to_string()),
            })
        } else if !state.available_current && !state.enabled_current && !state.default_enabled {
            Ok(ResourceState::Absent)
        } else {
            Ok(ResourceState::Modified {
                from: state.describe(),
                to: "single enabled binding".to_string(),
            })
        }
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::Present {
            details: Some("enabled".to_string()),
        }
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: "Dry run".to_string(),
            });
        }

        let state = self.check_current()?;
        if state.converged() {
            return Ok(ApplyResult::NoChange);
        }

        let was_empty = !state.default_enabled && !state.available_current;

        // Order matters: retire the competing default first so the listener
        // never has two live bindings.
        if state.default_enabled {
            ctx.privilege
                .run_checked("rm", &["-f", &self.default_path().to_string_lossy()])
                .context("Failed to retire default binding")?;
        }

        if !state.available_current {
            place_content(
                ctx,
                &self.available_path(),
                &self.content,
                0o644,
            )
            .context("Failed to install vhost definition")?;
        }

        if !state.enabled_current {
            // -n: never descend into an existing link target directory
            ctx.privilege
                .run_checked(
                    "ln",
                    &[
                        "-sfn",
                        &self.available_path().to_string_lossy(),
                        &self.enabled_path().to_string_lossy(),
                    ],
                )
                .context("Failed to enable vhost")?;
        }

        if was_empty {
            Ok(ApplyResult::Created)
        } else {
            Ok(ApplyResult::Modified)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sudo::Privilege;

    fn binding(root: &Path) -> EdgeBinding {
        let available = root.join("sites-available");
        let enabled = root.join("sites-enabled");
        fs::create_dir_all(&available).unwrap();
        fs::create_dir_all(&enabled).unwrap();

        EdgeBinding {
            site: "oration".to_string(),
            content: "server { listen 80; }\n".to_string(),
            available_dir: available,
            enabled_dir: enabled,
            default_site: "default".to_string(),
        }
    }

    fn apply(binding: &EdgeBinding) -> ApplyResult {
        let privilege = Privilege::direct();
        let mut ctx = ApplyContext {
            dry_run: false,
            verbose: false,
            privilege: &privilege,
        };
        binding.apply(&mut ctx).unwrap()
    }

    fn enabled_entries(binding: &EdgeBinding) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&binding.enabled_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn activation_retires_default_and_enables_exactly_one_binding() {
        let tmp = tempfile::tempdir().unwrap();
        let binding = binding(tmp.path());

        // The distribution ships an enabled default.
        fs::write(binding.enabled_dir.join("default"), "default vhost").unwrap();

        assert_eq!(apply(&binding), ApplyResult::Modified);

        assert_eq!(enabled_entries(&binding), vec!["oration"]);
        assert!(binding.enabled_path().is_symlink());
        assert_eq!(
            fs::read_to_string(binding.available_path()).unwrap(),
            binding.content
        );
    }

    #[test]
    fn activation_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let binding = binding(tmp.path());

        assert_eq!(apply(&binding), ApplyResult::Created);
        assert!(!binding.needs_apply().unwrap());
        assert_eq!(apply(&binding), ApplyResult::NoChange);
    }

    #[test]
    fn stale_definition_is_reinstalled_without_recopying_the_link() {
        let tmp = tempfile::tempdir().unwrap();
        let binding = binding(tmp.path());
        apply(&binding);

        // Definition drifts; the enabled symlink is still correct.
        fs::write(binding.available_path(), "server { listen 8080; }\n").unwrap();

        assert_eq!(apply(&binding), ApplyResult::Modified);
        assert_eq!(
            fs::read_to_string(binding.available_path()).unwrap(),
            binding.content
        );
        // Enabled entry stays a reference, not a copy.
        assert!(binding.enabled_path().is_symlink());
    }

    #[test]
    fn enabled_copy_is_replaced_by_a_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let binding = binding(tmp.path());

        // Someone copied the definition instead of linking it.
        fs::write(binding.available_path(), &binding.content).unwrap();
        fs::write(binding.enabled_path(), &binding.content).unwrap();

        apply(&binding);
        assert!(binding.enabled_path().is_symlink());
        assert_eq!(enabled_entries(&binding), vec!["oration"]);
    }
}
