//! Content-authoritative file placement.
//!
//! The desired content and mode always win: a manual edit on the host shows
//! up as drift and is overwritten on the next apply. Content comparison is
//! by hash so multi-megabyte artifacts are not read twice per run.

use anyhow::Result;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use stagekit::ArtifactKind;

use super::{ApplyContext, ApplyResult, Resource, ResourceState, place_content, place_file};

/// Where the desired content comes from
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Rendered in-memory content (unit file, vhost definition)
    Inline(String),
    /// A staged artifact on disk
    Path(PathBuf),
}

/// A file whose content and mode are managed by the manifest
#[derive(Debug, Clone)]
pub struct ManagedFile {
    pub name: String,
    pub source: FileSource,
    pub dest: PathBuf,
    pub mode: u32,
    pub kind: ArtifactKind,
}

#[derive(Debug)]
enum FileState {
    Missing,
    ContentDrift { from: String, to: String },
    ModeDrift { from: u32 },
    Correct,
    Unreadable,
}

impl ManagedFile {
    pub fn inline(
        name: &str,
        content: String,
        dest: impl AsRef<Path>,
        mode: u32,
        kind: ArtifactKind,
    ) -> Self {
        Self {
            name: name.to_string(),
            source: FileSource::Inline(content),
            dest: dest.as_ref().to_path_buf(),
            mode,
            kind,
        }
    }

    pub fn from_path(
        name: &str,
        src: impl AsRef<Path>,
        dest: impl AsRef<Path>,
        mode: u32,
        kind: ArtifactKind,
    ) -> Self {
        Self {
            name: name.to_string(),
            source: FileSource::Path(src.as_ref().to_path_buf()),
            dest: dest.as_ref().to_path_buf(),
            mode,
            kind,
        }
    }

    fn source_hash(&self) -> Result<blake3::Hash> {
        match &self.source {
            FileSource::Inline(content) => Ok(blake3::hash(content.as_bytes())),
            FileSource::Path(path) => Ok(blake3::hash(&fs::read(path)?)),
        }
    }

    fn check_current(&self) -> Result<FileState> {
        let metadata = match fs::metadata(&self.dest) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FileState::Missing);
            }
            Err(_) => return Ok(FileState::Unreadable),
        };

        let dest_bytes = match fs::read(&self.dest) {
            Ok(b) => b,
            // Present but unreadable (e.g. root-owned secret, diff as user)
            Err(_) => return Ok(FileState::Unreadable),
        };

        let desired = self.source_hash()?;
        let actual = blake3::hash(&dest_bytes);

        if actual != desired {
            return Ok(FileState::ContentDrift {
                from: short_hash(&actual),
                to: short_hash(&desired),
            });
        }

        let mode = metadata.permissions().mode() & 0o777;
        if mode != self.mode {
            return Ok(FileState::ModeDrift { from: mode });
        }

        Ok(FileState::Correct)
    }

    fn place(&self, ctx: &ApplyContext) -> Result<()> {
        // Reject unsafe modes before anything touches the destination.
        stagekit::stage::check_mode(self.kind, self.mode, &self.dest)?;

        match &self.source {
            FileSource::Inline(content) => place_content(ctx, &self.dest, content, self.mode),
            FileSource::Path(src) => place_file(ctx, src, &self.dest, self.mode),
        }
    }
}

fn short_hash(hash: &blake3::Hash) -> String {
    format!("blake3:{}", &hash.to_hex().as_str()[..8])
}

impl Resource for ManagedFile {
    fn id(&self) -> String {
        format!("file:{}", self.name)
    }

    fn description(&self) -> String {
        format!(
            "Place {} (mode {})",
            self.dest.display(),
            crate::ui::format_mode(self.mode)
        )
    }

    fn resource_type(&self) -> &'static str {
        "managed_file"
    }

    fn current_state(&self) -> Result<ResourceState> {
        match self.check_current()? {
            FileState::Missing => Ok(ResourceState::Absent),
            FileState::Correct => Ok(ResourceState::Present { details: None }),
            FileState::ContentDrift { from, to } => Ok(ResourceState::Modified { from, to }),
            FileState::ModeDrift { from } => Ok(ResourceState::Modified {
                from: format!("mode {}", crate::ui::format_mode(from)),
                to: format!("mode {}", crate::ui::format_mode(self.mode)),
            }),
            FileState::Unreadable => Ok(ResourceState::Unknown),
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

        match self.check_current()? {
            FileState::Correct => Ok(ApplyResult::NoChange),
            FileState::Missing => {
                self.place(ctx)?;
                Ok(ApplyResult::Created)
            }
            _ => {
                self.place(ctx)?;
                Ok(ApplyResult::Modified)
            }
        }
    }

    fn diff_detail(&self) -> Option<String> {
        // A readable unified diff only makes sense for rendered text content.
        let FileSource::Inline(desired) = &self.source else {
            return None;
        };
        let actual = fs::read_to_string(&self.dest).ok()?;
        if actual == *desired {
            return None;
        }

        let diff = similar::TextDiff::from_lines(actual.as_str(), desired.as_str());
        let mut out = String::new();
        for change in diff.iter_all_changes() {
            let sign = match change.tag() {
                similar::ChangeTag::Delete => "-",
                similar::ChangeTag::Insert => "+",
                similar::ChangeTag::Equal => " ",
            };
            out.push_str(sign);
            out.push_str(change.value());
        }
        Some(out)
    }
}
