//! Execution planner - builds the ordered convergence sequence.
//!
//! Order is part of the contract, not an optimization: the package index
//! precedes installs, artifacts precede the unit that runs them, and the
//! edge binding comes last so the proxy never points at a half-placed
//! service. Within one host the sequence is strictly sequential.

use anyhow::Result;
use std::path::Path;

use stagekit::ArtifactKind;

use crate::config::Manifest;
use crate::render;
use crate::resource::{
    AptPackage, EdgeBinding, LogPermissions, ManagedFile, PackageIndex, Resource,
};
use crate::sudo::Privilege;

/// Mode the proxy log tree is kept at
const LOG_DIR_MODE: u32 = 0o755;

/// Actions run once after a successful apply that changed something
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostAction {
    /// `systemctl daemon-reload`
    DaemonReload,
    /// `systemctl enable --now <unit>`
    EnableService(String),
    /// `systemctl restart <unit>`
    RestartService(String),
    /// `systemctl reload <unit>`
    ReloadService(String),
}

impl PostAction {
    pub fn describe(&self) -> String {
        match self {
            PostAction::DaemonReload => "Reload service manager definitions".to_string(),
            PostAction::EnableService(unit) => format!("Enable and start {unit}"),
            PostAction::RestartService(unit) => format!("Restart {unit}"),
            PostAction::ReloadService(unit) => format!("Reload {unit}"),
        }
    }

    pub fn run(&self, privilege: &Privilege) -> Result<()> {
        match self {
            PostAction::DaemonReload => privilege.run_checked("systemctl", &["daemon-reload"]),
            PostAction::EnableService(unit) => {
                privilege.run_checked("systemctl", &["enable", "--now", unit])
            }
            PostAction::RestartService(unit) => {
                privilege.run_checked("systemctl", &["restart", unit])
            }
            PostAction::ReloadService(unit) => {
                privilege.run_checked("systemctl", &["reload", unit])
            }
        }
    }
}

/// An ordered convergence plan for one host
pub struct ExecutionPlan {
    pub resources: Vec<Box<dyn Resource>>,
    pub post_actions: Vec<PostAction>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self {
            resources: Vec::new(),
            post_actions: Vec::new(),
        }
    }

    pub fn add_resource(&mut self, resource: Box<dyn Resource>) {
        self.resources.push(resource);
    }

    pub fn add_post_action(&mut self, action: PostAction) {
        if !self.post_actions.contains(&action) {
            self.post_actions.push(action);
        }
    }

    pub fn total_resources(&self) -> usize {
        self.resources.len()
    }
}

impl Default for ExecutionPlan {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the ordered plan for this host from the manifest.
///
/// The caller has already verified the deployment directory is a complete
/// artifact set.
pub fn build_plan(manifest: &Manifest, state_path: &Path) -> Result<ExecutionPlan> {
    let mut plan = ExecutionPlan::new();
    let layout = manifest.layout();
    let deploy = manifest.deploy_dir();
    let install_root = manifest.install_root();

    // 1. Package index, bounded by the cache-validity window
    plan.add_resource(Box::new(PackageIndex::new(
        manifest.host.cache_valid_secs,
        state_path.to_path_buf(),
    )));

    // 2. System packages, policy latest
    for package in &manifest.host.packages {
        plan.add_resource(Box::new(AptPackage::new(package)));
    }

    // 3. The staged artifact set, placed under the mode contract
    for (name, kind) in layout.files() {
        plan.add_resource(Box::new(ManagedFile::from_path(
            &name,
            deploy.join(&name),
            install_root.join(&name),
            kind.default_mode(),
            kind,
        )));
    }

    // 4. Service unit, rendered content always authoritative
    plan.add_resource(Box::new(ManagedFile::inline(
        &manifest.unit_name(),
        render::unit(manifest),
        manifest.unit_path(),
        0o644,
        ArtifactKind::Config,
    )));
    plan.add_post_action(PostAction::DaemonReload);
    plan.add_post_action(PostAction::EnableService(manifest.unit_name()));
    plan.add_post_action(PostAction::RestartService(manifest.unit_name()));

    // 5. Proxy log tree, re-checked every run
    plan.add_resource(Box::new(LogPermissions::new(
        crate::paths::expand(&manifest.host.log_dir),
        LOG_DIR_MODE,
    )));

    // 6. Edge binding last, once everything it fronts is in place
    plan.add_resource(Box::new(EdgeBinding {
        site: manifest.service.name.clone(),
        content: render::vhost(manifest),
        available_dir: crate::paths::expand(&manifest.host.sites_available),
        enabled_dir: crate::paths::expand(&manifest.host.sites_enabled),
        default_site: manifest.host.default_site.clone(),
    }));
    plan.add_post_action(PostAction::ReloadService("nginx".to_string()));

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> Manifest {
        toml::from_str(
            r#"
[service]
name = "oration"
server_name = "blog.example.net"

[host]
packages = ["nginx", "sqlite3"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn plan_order_is_index_packages_artifacts_unit_logs_edge() {
        let manifest = manifest();
        let plan = build_plan(&manifest, Path::new("/tmp/state.json")).unwrap();

        let types: Vec<&str> = plan.resources.iter().map(|r| r.resource_type()).collect();
        assert_eq!(
            types,
            vec![
                "package_index",
                "apt_package",
                "apt_package",
                "managed_file", // executable
                "managed_file", // config
                "managed_file", // env
                "managed_file", // database
                "managed_file", // unit
                "log_permissions",
                "edge_binding",
            ]
        );
    }

    #[test]
    fn plan_post_actions_are_deduplicated_and_ordered() {
        let manifest = manifest();
        let plan = build_plan(&manifest, Path::new("/tmp/state.json")).unwrap();

        assert_eq!(
            plan.post_actions,
            vec![
                PostAction::DaemonReload,
                PostAction::EnableService("oration.service".to_string()),
                PostAction::RestartService("oration.service".to_string()),
                PostAction::ReloadService("nginx".to_string()),
            ]
        );
    }

    #[test]
    fn artifact_placements_follow_the_mode_contract() {
        let manifest = manifest();
        let plan = build_plan(&manifest, Path::new("/tmp/state.json")).unwrap();

        let exec = plan
            .resources
            .iter()
            .find(|r| r.id() == "file:oration")
            .unwrap();
        assert!(exec.description().contains("750"));

        let env = plan
            .resources
            .iter()
            .find(|r| r.id() == "file:.env")
            .unwrap();
        assert!(env.description().contains("600"));
    }
}
