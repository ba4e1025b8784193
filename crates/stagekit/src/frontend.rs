//! Frontend bundling and post-build sanitation.
//!
//! After the bundler runs, every source map under the public output tree is
//! deleted. Source maps expose the original source structure and must never
//! reach a production host; the sweep runs on every build, not only when the
//! bundler is known to emit maps.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// A frontend bundle build.
#[derive(Debug, Clone)]
pub struct FrontendBuild {
    /// Directory to run the bundler in
    pub dir: PathBuf,
    /// Bundler invocation, program first (e.g. `["npm", "run", "build"]`)
    pub command: Vec<String>,
    /// The public output tree the bundler writes to
    pub public_dir: PathBuf,
}

impl FrontendBuild {
    pub fn new(
        dir: impl AsRef<Path>,
        command: Vec<String>,
        public_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            command,
            public_dir: public_dir.as_ref().to_path_buf(),
        }
    }

    /// Run the bundler, then sweep source maps from the output tree.
    ///
    /// Returns the number of source-map files removed.
    pub fn run(&self) -> Result<usize> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| Error::Build {
                tool: "frontend".to_string(),
                stderr: "empty bundler command".to_string(),
            })?;

        log::info!("Bundling frontend in {}", self.dir.display());

        let output = Command::new(program)
            .args(args)
            .current_dir(&self.dir)
            .output()
            .map_err(|source| Error::Spawn {
                tool: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::Build {
                tool: program.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !self.public_dir.exists() {
            return Err(Error::MissingArtifact {
                name: "public output tree".to_string(),
                dir: self.public_dir.clone(),
            });
        }

        purge_source_maps(&self.public_dir)
    }
}

/// Recursively delete all `*.map` files under `root`.
///
/// Returns how many files were removed.
pub fn purge_source_maps(root: &Path) -> Result<usize> {
    let mut removed = 0;

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            Error::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::other("walk failed on symlink loop")
            }))
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        if entry.path().extension().is_some_and(|ext| ext == "map") {
            fs::remove_file(entry.path())?;
            log::debug!("Removed source map {}", entry.path().display());
            removed += 1;
        }
    }

    if removed > 0 {
        log::info!("Removed {} source map(s) from {}", removed, root.display());
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn purge_removes_nested_maps_and_keeps_assets() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        touch(&root.join("index.html"));
        touch(&root.join("main.js"));
        touch(&root.join("main.js.map"));
        touch(&root.join("static/css/app.css.map"));
        touch(&root.join("static/js/vendor.js"));

        let removed = purge_source_maps(root).unwrap();
        assert_eq!(removed, 2);

        assert!(root.join("index.html").exists());
        assert!(root.join("main.js").exists());
        assert!(root.join("static/js/vendor.js").exists());
        assert!(!root.join("main.js.map").exists());
        assert!(!root.join("static/css/app.css.map").exists());
    }

    #[test]
    fn purge_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("a.js.map"));

        assert_eq!(purge_source_maps(tmp.path()).unwrap(), 1);
        assert_eq!(purge_source_maps(tmp.path()).unwrap(), 0);
    }

    #[test]
    fn purge_empty_tree_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(purge_source_maps(tmp.path()).unwrap(), 0);
    }

    #[test]
    fn failed_bundler_reports_build_error() {
        let tmp = tempfile::tempdir().unwrap();
        let build = FrontendBuild::new(
            tmp.path(),
            vec!["false".to_string()],
            tmp.path().join("public"),
        );

        match build.run() {
            Err(Error::Build { tool, .. }) => assert_eq!(tool, "false"),
            other => panic!("expected Build error, got {other:?}"),
        }
    }
}
