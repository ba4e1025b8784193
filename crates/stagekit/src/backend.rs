//! Backend compilation.
//!
//! The executable must run on the deployment host without the build host's
//! runtime libraries, so the build targets a static libc triple by default.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Default target triple: statically linked, portable across distros.
pub const DEFAULT_TARGET: &str = "x86_64-unknown-linux-musl";

/// A backend release build.
#[derive(Debug, Clone)]
pub struct BackendBuild {
    /// Path to the backend crate's Cargo.toml
    pub manifest_path: PathBuf,
    /// Target triple to compile for
    pub target: String,
    /// Name of the produced binary
    pub bin_name: String,
}

impl BackendBuild {
    pub fn new(manifest_path: impl AsRef<Path>, bin_name: &str) -> Self {
        Self {
            manifest_path: manifest_path.as_ref().to_path_buf(),
            target: DEFAULT_TARGET.to_string(),
            bin_name: bin_name.to_string(),
        }
    }

    pub fn with_target(mut self, target: &str) -> Self {
        self.target = target.to_string();
        self
    }

    /// Where cargo will place the release binary for this build.
    pub fn artifact_path(&self) -> PathBuf {
        let crate_dir = self
            .manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        crate_dir
            .join("target")
            .join(&self.target)
            .join("release")
            .join(&self.bin_name)
    }

    /// Compile the backend in release mode.
    ///
    /// Fails with [`Error::Build`] on a nonzero compiler status; nothing is
    /// staged and the caller must not proceed to packaging.
    pub fn run(&self) -> Result<PathBuf> {
        log::info!(
            "Building backend '{}' for {}",
            self.bin_name,
            self.target
        );

        let output = Command::new("cargo")
            .args([
                "build",
                "--release",
                "--manifest-path",
                &self.manifest_path.to_string_lossy(),
                "--target",
                &self.target,
            ])
            .output()
            .map_err(|source| Error::Spawn {
                tool: "cargo".to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::Build {
                tool: "cargo".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let artifact = self.artifact_path();
        if !artifact.exists() {
            return Err(Error::MissingArtifact {
                name: self.bin_name.clone(),
                dir: artifact.parent().map(Path::to_path_buf).unwrap_or_default(),
            });
        }

        Ok(artifact)
    }
}
