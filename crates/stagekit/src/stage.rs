//! Artifact staging with an atomic finalize.
//!
//! All staging happens in a `<deploy>.staging` work directory. Only once the
//! layout is complete is the previous deployment directory removed and the
//! work directory renamed into place, so a deployment directory that exists
//! always holds a full artifact set.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::template;

/// Mode bits a sensitive artifact may never carry: group-write or any
/// access for "other".
const UNSAFE_MODE_BITS: u32 = 0o027;

/// What kind of artifact a staged file is.
///
/// The kind decides the permission contract applied at placement time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The backend executable
    Executable,
    /// The service configuration file
    Config,
    /// Secret material (env file)
    Secret,
    /// Runtime data (database file)
    Data,
}

impl ArtifactKind {
    /// Default mode for this artifact kind.
    pub fn default_mode(self) -> u32 {
        match self {
            ArtifactKind::Executable => 0o750,
            ArtifactKind::Config => 0o644,
            ArtifactKind::Secret => 0o600,
            ArtifactKind::Data => 0o640,
        }
    }

    /// Whether the permission gate applies to this kind.
    pub fn is_sensitive(self) -> bool {
        matches!(self, ArtifactKind::Executable | ArtifactKind::Secret)
    }
}

/// Reject unsafe modes for sensitive artifacts before anything is written.
pub fn check_mode(kind: ArtifactKind, mode: u32, dest: &Path) -> Result<()> {
    if kind.is_sensitive() && mode & UNSAFE_MODE_BITS != 0 {
        return Err(Error::Permission {
            path: dest.to_path_buf(),
            mode,
        });
    }
    Ok(())
}

/// The fixed file layout of a deployment directory for one service.
#[derive(Debug, Clone)]
pub struct Layout {
    service: String,
}

impl Layout {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// File name of the backend executable.
    pub fn executable(&self) -> String {
        self.service.clone()
    }

    /// File name of the service config.
    pub fn config(&self) -> String {
        format!("{}.yaml", self.service)
    }

    /// File name of the secret env file.
    pub fn env_file(&self) -> String {
        ".env".to_string()
    }

    /// File name of the runtime database.
    pub fn database(&self) -> String {
        format!("{}.db", self.service)
    }

    /// Every artifact of the set, with its kind.
    pub fn files(&self) -> Vec<(String, ArtifactKind)> {
        vec![
            (self.executable(), ArtifactKind::Executable),
            (self.config(), ArtifactKind::Config),
            (self.env_file(), ArtifactKind::Secret),
            (self.database(), ArtifactKind::Data),
        ]
    }

    /// Check that `dir` holds the complete artifact set.
    ///
    /// Activation must never proceed against a partial directory; this is
    /// the guard that enforces it.
    pub fn verify(&self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            return Err(Error::MissingArtifact {
                name: self.executable(),
                dir: dir.to_path_buf(),
            });
        }
        for (name, _) in self.files() {
            if !dir.join(&name).is_file() {
                return Err(Error::MissingArtifact {
                    name,
                    dir: dir.to_path_buf(),
                });
            }
        }
        Ok(())
    }
}

/// An in-progress staging run.
///
/// Dropping a stager without calling [`Stager::finalize`] removes the work
/// directory, leaving any previous deployment untouched.
#[derive(Debug)]
pub struct Stager {
    layout: Layout,
    deploy: PathBuf,
    staging: PathBuf,
    finalized: bool,
}

impl Stager {
    /// Start a staging run next to the deployment directory.
    ///
    /// A stale work directory from an earlier aborted run is removed first.
    pub fn begin(deploy: impl AsRef<Path>, layout: Layout) -> Result<Self> {
        let deploy = deploy.as_ref().to_path_buf();
        let staging = staging_path(&deploy);

        if staging.exists() {
            log::warn!("Removing stale staging directory {}", staging.display());
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        Ok(Self {
            layout,
            deploy,
            staging,
            finalized: false,
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Stage the backend executable under the permission contract.
    pub fn stage_executable(&self, src: &Path, mode: u32) -> Result<PathBuf> {
        self.place(src, &self.layout.executable(), ArtifactKind::Executable, mode)
    }

    /// Stage the config file, rewriting its `host:` field to `host`.
    pub fn stage_config(&self, src: &Path, host: &str) -> Result<PathBuf> {
        let dest = self.staging.join(self.layout.config());
        template::stage_config(src, &dest, "host", host)?;
        set_mode(&dest, ArtifactKind::Config.default_mode())?;
        Ok(dest)
    }

    /// Stage the secret env file under the permission contract.
    pub fn stage_secrets(&self, src: &Path, mode: u32) -> Result<PathBuf> {
        self.place(src, &self.layout.env_file(), ArtifactKind::Secret, mode)
    }

    /// Stage the runtime database verbatim.
    pub fn stage_data(&self, src: &Path) -> Result<PathBuf> {
        let mode = ArtifactKind::Data.default_mode();
        self.place(src, &self.layout.database(), ArtifactKind::Data, mode)
    }

    /// Verify completeness, then atomically replace the deployment
    /// directory with the staged set.
    pub fn finalize(mut self) -> Result<PathBuf> {
        self.layout.verify(&self.staging)?;

        if self.deploy.exists() {
            fs::remove_dir_all(&self.deploy)?;
        }
        fs::rename(&self.staging, &self.deploy)?;
        self.finalized = true;

        log::info!(
            "Release staged: {} ({} artifacts)",
            self.deploy.display(),
            self.layout.files().len()
        );
        Ok(self.deploy.clone())
    }

    fn place(&self, src: &Path, name: &str, kind: ArtifactKind, mode: u32) -> Result<PathBuf> {
        let dest = self.staging.join(name);
        check_mode(kind, mode, &dest)?;

        fs::copy(src, &dest)?;
        set_mode(&dest, mode)?;

        log::debug!(
            "Staged {} -> {} (mode {:03o})",
            src.display(),
            dest.display(),
            mode
        );
        Ok(dest)
    }
}

impl Drop for Stager {
    fn drop(&mut self) {
        if !self.finalized && self.staging.exists() {
            if let Err(e) = fs::remove_dir_all(&self.staging) {
                log::warn!(
                    "Could not clean up staging directory {}: {}",
                    self.staging.display(),
                    e
                );
            }
        }
    }
}

fn staging_path(deploy: &Path) -> PathBuf {
    let mut name = deploy
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "deploy".to_string());
    name.push_str(".staging");
    deploy.with_file_name(name)
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::write(path, content).unwrap();
    }

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    fn stage_all(stager: &Stager, src_dir: &Path) {
        write(&src_dir.join("bin"), "elf");
        write(&src_dir.join("app.yaml"), "host: old\nport: 1\n");
        write(&src_dir.join("env"), "SECRET=1");
        write(&src_dir.join("db"), "sqlite");

        stager
            .stage_executable(&src_dir.join("bin"), 0o750)
            .unwrap();
        stager
            .stage_config(&src_dir.join("app.yaml"), "http://127.0.0.1/")
            .unwrap();
        stager.stage_secrets(&src_dir.join("env"), 0o640).unwrap();
        stager.stage_data(&src_dir.join("db")).unwrap();
    }

    #[test]
    fn layout_names_are_fixed_and_flat() {
        let layout = Layout::new("oration");
        let names: Vec<String> = layout.files().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["oration", "oration.yaml", ".env", "oration.db"]);
    }

    #[test]
    fn unsafe_modes_are_rejected_before_write() {
        let dest = Path::new("/srv/app/bin");
        // world-readable executable
        assert!(check_mode(ArtifactKind::Executable, 0o755, dest).is_err());
        // group-writable secret
        assert!(check_mode(ArtifactKind::Secret, 0o660, dest).is_err());
        // contract modes pass
        assert!(check_mode(ArtifactKind::Executable, 0o750, dest).is_ok());
        assert!(check_mode(ArtifactKind::Secret, 0o640, dest).is_ok());
        // config may be world-readable
        assert!(check_mode(ArtifactKind::Config, 0o644, dest).is_ok());
    }

    #[test]
    fn rejected_mode_stages_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("bin");
        write(&src, "elf");

        let layout = Layout::new("app");
        let stager = Stager::begin(tmp.path().join("deploy"), layout).unwrap();

        match stager.stage_executable(&src, 0o755) {
            Err(Error::Permission { mode, .. }) => assert_eq!(mode, 0o755),
            other => panic!("expected Permission error, got {other:?}"),
        }
        assert!(!stager.staging_dir().join("app").exists());
    }

    #[test]
    fn finalize_replaces_previous_release_wholesale() {
        let tmp = tempfile::tempdir().unwrap();
        let deploy = tmp.path().join("deploy");

        // A previous release with a stray extra file.
        fs::create_dir_all(&deploy).unwrap();
        write(&deploy.join("leftover"), "stale");

        let src_dir = tmp.path().join("src");
        fs::create_dir_all(&src_dir).unwrap();

        let stager = Stager::begin(&deploy, Layout::new("app")).unwrap();
        stage_all(&stager, &src_dir);
        let out = stager.finalize().unwrap();

        assert_eq!(out, deploy);
        assert!(!deploy.join("leftover").exists());

        let mut entries: Vec<String> = fs::read_dir(&deploy)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        entries.sort();
        assert_eq!(entries, vec![".env", "app", "app.db", "app.yaml"]);

        assert_eq!(mode_of(&deploy.join("app")), 0o750);
        assert_eq!(mode_of(&deploy.join(".env")), 0o640);

        let config = fs::read_to_string(deploy.join("app.yaml")).unwrap();
        assert!(config.contains("host: http://127.0.0.1/"));
        assert!(config.contains("port: 1"));
    }

    #[test]
    fn incomplete_staging_cannot_finalize() {
        let tmp = tempfile::tempdir().unwrap();
        let deploy = tmp.path().join("deploy");
        let src = tmp.path().join("bin");
        write(&src, "elf");

        let stager = Stager::begin(&deploy, Layout::new("app")).unwrap();
        stager.stage_executable(&src, 0o750).unwrap();

        match stager.finalize() {
            Err(Error::MissingArtifact { name, .. }) => assert_eq!(name, "app.yaml"),
            other => panic!("expected MissingArtifact, got {other:?}"),
        }
        // Nothing was promoted.
        assert!(!deploy.exists());
    }

    #[test]
    fn dropped_stager_leaves_no_work_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let deploy = tmp.path().join("deploy");
        let staging = tmp.path().join("deploy.staging");

        {
            let _stager = Stager::begin(&deploy, Layout::new("app")).unwrap();
            assert!(staging.exists());
        }
        assert!(!staging.exists());
        assert!(!deploy.exists());
    }

    #[test]
    fn verify_rejects_partial_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new("app");

        assert!(layout.verify(tmp.path().join("missing").as_path()).is_err());

        write(&tmp.path().join("app"), "elf");
        assert!(layout.verify(tmp.path()).is_err());

        write(&tmp.path().join("app.yaml"), "host: x\n");
        write(&tmp.path().join(".env"), "");
        write(&tmp.path().join("app.db"), "");
        assert!(layout.verify(tmp.path()).is_ok());
    }
}
