//! The deployment manifest (`capstan.toml`).
//!
//! One file describes both workflows: what the release builder turns into
//! artifacts, and the desired state the host activator converges to. Fields
//! that follow from the service name (artifact names, install paths, the
//! unit path) are derived rather than configured, so the fixed layout cannot
//! drift between the two workflows.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default manifest file name, looked up in the working directory
pub const MANIFEST_NAME: &str = "capstan.toml";

/// The deployment manifest
#[derive(Debug, Serialize, Deserialize)]
pub struct Manifest {
    /// The service being deployed
    pub service: ServiceConfig,

    /// Release builder settings
    #[serde(default)]
    pub release: ReleaseConfig,

    /// Host activator settings
    #[serde(default)]
    pub host: HostConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name; artifact and unit names derive from it
    pub name: String,

    /// Externally-visible server name the edge answers for
    pub server_name: String,

    /// Local port the backend listens on (the proxy's single upstream)
    #[serde(default = "default_upstream_port")]
    pub upstream_port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Path to the backend crate's Cargo.toml
    #[serde(default = "default_backend_manifest")]
    pub backend_manifest: String,

    /// Target triple for the backend build
    #[serde(default = "default_target")]
    pub target: String,

    /// Directory the frontend bundler runs in
    #[serde(default = "default_frontend_dir")]
    pub frontend_dir: String,

    /// Bundler invocation, program first
    #[serde(default = "default_frontend_command")]
    pub frontend_command: Vec<String>,

    /// Public output tree the bundler produces
    #[serde(default = "default_public_dir")]
    pub public_dir: String,

    /// Source config file to template; defaults to `<name>.yaml`
    #[serde(default)]
    pub config_src: Option<String>,

    /// Source env file; defaults to `.env`
    #[serde(default = "default_env_src")]
    pub env_src: String,

    /// Source database file; defaults to `<name>.db`
    #[serde(default)]
    pub data_src: Option<String>,

    /// Deployment directory the artifact set is staged into
    #[serde(default = "default_deploy_dir")]
    pub deploy_dir: String,

    /// Value written into the config's `host:` field;
    /// defaults to `https://<server_name>/`
    #[serde(default)]
    pub host_override: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HostConfig {
    /// System packages the host needs
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,

    /// How long a package-index refresh stays valid, in seconds
    #[serde(default = "default_cache_valid_secs")]
    pub cache_valid_secs: u64,

    /// Where artifacts are installed; defaults to `/srv/<name>`
    #[serde(default)]
    pub install_root: Option<String>,

    /// Document root the edge serves the frontend from;
    /// defaults to `/var/www/<name>`
    #[serde(default)]
    pub web_root: Option<String>,

    /// Port the public listener binds
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// The proxy's available-vhost directory
    #[serde(default = "default_sites_available")]
    pub sites_available: String,

    /// The proxy's enabled-vhost directory
    #[serde(default = "default_sites_enabled")]
    pub sites_enabled: String,

    /// Name of the distribution's default vhost to retire
    #[serde(default = "default_default_site")]
    pub default_site: String,

    /// The proxy's log directory
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            backend_manifest: default_backend_manifest(),
            target: default_target(),
            frontend_dir: default_frontend_dir(),
            frontend_command: default_frontend_command(),
            public_dir: default_public_dir(),
            config_src: None,
            env_src: default_env_src(),
            data_src: None,
            deploy_dir: default_deploy_dir(),
            host_override: None,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            packages: default_packages(),
            cache_valid_secs: default_cache_valid_secs(),
            install_root: None,
            web_root: None,
            listen_port: default_listen_port(),
            sites_available: default_sites_available(),
            sites_enabled: default_sites_enabled(),
            default_site: default_default_site(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_upstream_port() -> u16 {
    8000
}

fn default_backend_manifest() -> String {
    "backend/Cargo.toml".to_string()
}

fn default_target() -> String {
    stagekit::backend::DEFAULT_TARGET.to_string()
}

fn default_frontend_dir() -> String {
    "frontend".to_string()
}

fn default_frontend_command() -> Vec<String> {
    vec!["npm".to_string(), "run".to_string(), "build".to_string()]
}

fn default_public_dir() -> String {
    "public".to_string()
}

fn default_env_src() -> String {
    ".env".to_string()
}

fn default_deploy_dir() -> String {
    "deploy".to_string()
}

fn default_packages() -> Vec<String> {
    vec!["nginx".to_string()]
}

fn default_cache_valid_secs() -> u64 {
    3600
}

fn default_listen_port() -> u16 {
    80
}

fn default_sites_available() -> String {
    "/etc/nginx/sites-available".to_string()
}

fn default_sites_enabled() -> String {
    "/etc/nginx/sites-enabled".to_string()
}

fn default_default_site() -> String {
    "default".to_string()
}

fn default_log_dir() -> String {
    "/var/log/nginx".to_string()
}

impl Manifest {
    /// Load the manifest from an explicit path, or `capstan.toml` in the
    /// working directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(MANIFEST_NAME),
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Could not read manifest: {}", path.display()))?;

        let manifest: Manifest = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in {}", path.display()))?;

        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest
    pub fn validate(&self) -> Result<()> {
        if self.service.name.is_empty() {
            anyhow::bail!("service.name must not be empty");
        }
        if self
            .service
            .name
            .contains(|c: char| c == '/' || c.is_whitespace())
        {
            anyhow::bail!(
                "service.name '{}' must be a bare file name",
                self.service.name
            );
        }
        if self.service.server_name.is_empty() {
            anyhow::bail!("service.server_name must not be empty");
        }
        if self.release.frontend_command.is_empty() {
            anyhow::bail!("release.frontend_command must name a bundler");
        }
        Ok(())
    }

    /// The artifact layout for this service
    pub fn layout(&self) -> stagekit::Layout {
        stagekit::Layout::new(&self.service.name)
    }

    /// Source config file to template
    pub fn config_src(&self) -> PathBuf {
        match &self.release.config_src {
            Some(p) => crate::paths::expand(p),
            None => PathBuf::from(format!("{}.yaml", self.service.name)),
        }
    }

    /// Source database file
    pub fn data_src(&self) -> PathBuf {
        match &self.release.data_src {
            Some(p) => crate::paths::expand(p),
            None => PathBuf::from(format!("{}.db", self.service.name)),
        }
    }

    /// Deployment directory for the artifact set
    pub fn deploy_dir(&self) -> PathBuf {
        crate::paths::expand(&self.release.deploy_dir)
    }

    /// Value the config's `host:` field is rewritten to
    pub fn host_value(&self) -> String {
        self.release
            .host_override
            .clone()
            .unwrap_or_else(|| format!("https://{}/", self.service.server_name))
    }

    /// Where artifacts are installed on the host
    pub fn install_root(&self) -> PathBuf {
        match &self.host.install_root {
            Some(p) => crate::paths::expand(p),
            None => PathBuf::from("/srv").join(&self.service.name),
        }
    }

    /// Document root for the static frontend
    pub fn web_root(&self) -> PathBuf {
        match &self.host.web_root {
            Some(p) => crate::paths::expand(p),
            None => PathBuf::from("/var/www").join(&self.service.name),
        }
    }

    /// The systemd unit path for this service
    pub fn unit_path(&self) -> PathBuf {
        PathBuf::from(format!(
            "/etc/systemd/system/{}.service",
            self.service.name
        ))
    }

    /// The unit name systemctl knows the service by
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service.name)
    }
}
