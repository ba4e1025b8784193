//! System package resource (apt, policy: latest)

use anyhow::{Context, Result, bail};

use super::{ApplyContext, ApplyResult, Resource, ResourceState};
use crate::runner;

/// A system package kept at its latest candidate version
#[derive(Debug, Clone)]
pub struct AptPackage {
    pub name: String,
}

impl AptPackage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Installed version, if the package is installed
    fn installed_version(&self) -> Result<Option<String>> {
        let output = runner::output(
            "dpkg-query",
            &["-W", "-f=${Status}|${Version}", &self.name],
        )
        .context("Failed to run dpkg-query")?;

        if !output.success {
            // Unknown package: dpkg-query exits nonzero
            return Ok(None);
        }

        Ok(parse_dpkg_status(&output.stdout_str()))
    }

    /// Candidate version according to the package index
    fn candidate_version(&self) -> Result<Option<String>> {
        let output = runner::output("apt-cache", &["policy", &self.name])
            .context("Failed to run apt-cache")?;

        if !output.success {
            return Ok(None);
        }

        let (_, candidate) = parse_policy(&output.stdout_str());
        Ok(candidate)
    }

    /// Install or upgrade to the candidate version
    fn install(&self, ctx: &ApplyContext) -> Result<()> {
        let output = ctx
            .privilege
            .run("apt-get", &["install", "-y", &self.name])?;

        if !output.success {
            bail!("apt-get install failed: {}", output.stderr_str().trim());
        }

        Ok(())
    }
}

/// Parse `dpkg-query -W -f=${Status}|${Version}` output.
///
/// Returns the version only when the package is fully installed.
fn parse_dpkg_status(output: &str) -> Option<String> {
    let (status, version) = output.trim().rsplit_once('|')?;
    if status.ends_with("installed") && !version.is_empty() {
        Some(version.to_string())
    } else {
        None
    }
}

/// Parse `apt-cache policy` output into (installed, candidate) versions.
///
/// `(none)` entries map to `None`.
fn parse_policy(output: &str) -> (Option<String>, Option<String>) {
    let mut installed = None;
    let mut candidate = None;

    for line in output.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Installed:") {
            installed = parse_version(value);
        } else if let Some(value) = line.strip_prefix("Candidate:") {
            candidate = parse_version(value);
        }
    }

    (installed, candidate)
}

fn parse_version(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == "(none)" {
        None
    } else {
        Some(value.to_string())
    }
}

impl Resource for AptPackage {
    fn id(&self) -> String {
        format!("apt:{}", self.name)
    }

    fn description(&self) -> String {
        format!("Install {} via apt (latest)", self.name)
    }

    fn resource_type(&self) -> &'static str {
        "apt_package"
    }

    fn current_state(&self) -> Result<ResourceState> {
        let installed = match self.installed_version()? {
            Some(v) => v,
            None => return Ok(ResourceState::Absent),
        };

        // Policy latest: an older installed version counts as drift.
        match self.candidate_version()? {
            Some(candidate) if candidate != installed => Ok(ResourceState::Modified {
                from: installed,
                to: candidate,
            }),
            _ => Ok(ResourceState::Present { details: None }),
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

        match self.current_state()? {
            ResourceState::Present { .. } => Ok(ApplyResult::NoChange),
            ResourceState::Absent => {
                self.install(ctx)?;
                Ok(ApplyResult::Created)
            }
            _ => {
                self.install(ctx)?;
                Ok(ApplyResult::Modified)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpkg_status_requires_installed() {
        assert_eq!(
            parse_dpkg_status("install ok installed|1.18.0-6ubuntu14"),
            Some("1.18.0-6ubuntu14".to_string())
        );
        assert_eq!(parse_dpkg_status("deinstall ok config-files|1.18.0"), None);
        assert_eq!(parse_dpkg_status(""), None);
    }

    #[test]
    fn policy_parses_installed_and_candidate() {
        let output = "\
nginx:
  Installed: 1.18.0-6ubuntu14.3
  Candidate: 1.18.0-6ubuntu14.4
  Version table:
     1.18.0-6ubuntu14.4 500
";
        let (installed, candidate) = parse_policy(output);
        assert_eq!(installed.as_deref(), Some("1.18.0-6ubuntu14.3"));
        assert_eq!(candidate.as_deref(), Some("1.18.0-6ubuntu14.4"));
    }

    #[test]
    fn policy_treats_none_as_absent() {
        let output = "\
nginx:
  Installed: (none)
  Candidate: 1.18.0-6ubuntu14.4
";
        let (installed, candidate) = parse_policy(output);
        assert_eq!(installed, None);
        assert_eq!(candidate.as_deref(), Some("1.18.0-6ubuntu14.4"));
    }
}
