//! Release command - build and stage a complete artifact set.
//!
//! Steps run in a fixed order and fail fast: a failed step leaves the
//! previous deployment directory exactly as it was. The staged set is only
//! promoted once every artifact is present.

use anyhow::{Context as AnyhowContext, Result};
use std::path::PathBuf;

use stagekit::{BackendBuild, FrontendBuild, Stager};

use crate::Context;
use crate::config::Manifest;
use crate::progress;
use crate::ui;

const STEPS: usize = 4;

pub fn run(ctx: &Context, manifest: &Manifest, deploy_override: Option<PathBuf>) -> Result<()> {
    ui::header(&format!("Release: {}", manifest.service.name));

    let deploy = deploy_override.unwrap_or_else(|| manifest.deploy_dir());
    let layout = manifest.layout();

    // 1. Backend
    ui::step(1, STEPS, "Building backend");
    let backend = BackendBuild::new(
        crate::paths::expand(&manifest.release.backend_manifest),
        &manifest.service.name,
    )
    .with_target(&manifest.release.target);

    let pb = progress::spinner(&format!("cargo build --release ({})", backend.target));
    let binary = match backend.run() {
        Ok(path) => {
            progress::finish_success(&pb, "Backend built");
            path
        }
        Err(e) => {
            progress::finish_error(&pb, "Backend build failed");
            return Err(e).context("release halted at backend build");
        }
    };
    if !ctx.quiet {
        ui::dim(&format!("  {}", binary.display()));
    }

    // 2. Frontend
    ui::step(2, STEPS, "Bundling frontend");
    let bundler = &manifest.release.frontend_command[0];
    if !crate::runner::command_exists(bundler) {
        anyhow::bail!("bundler '{bundler}' not found on PATH");
    }

    let frontend = FrontendBuild::new(
        crate::paths::expand(&manifest.release.frontend_dir),
        manifest.release.frontend_command.clone(),
        crate::paths::expand(&manifest.release.public_dir),
    );

    let pb = progress::spinner(&manifest.release.frontend_command.join(" "));
    let maps_removed = match frontend.run() {
        Ok(count) => {
            progress::finish_success(&pb, "Frontend bundled");
            count
        }
        Err(e) => {
            progress::finish_error(&pb, "Frontend bundle failed");
            return Err(e).context("release halted at frontend bundle");
        }
    };
    if !ctx.quiet {
        ui::dim(&format!("  {} source map(s) removed", maps_removed));
    }

    // 3. Stage the artifact set
    ui::step(3, STEPS, "Staging artifacts");
    let stager = Stager::begin(&deploy, layout)?;

    stager
        .stage_executable(&binary, 0o750)
        .context("staging executable")?;
    stager
        .stage_config(&manifest.config_src(), &manifest.host_value())
        .context("staging config")?;
    stager
        .stage_secrets(&crate::paths::expand(&manifest.release.env_src), 0o600)
        .context("staging secrets")?;
    stager
        .stage_data(&manifest.data_src())
        .context("staging data")?;

    let deploy = stager.finalize().context("finalizing release")?;

    // 4. Summary
    ui::step(4, STEPS, "Release complete");
    println!();
    ui::success(&format!("Release staged at {}", deploy.display()));
    for (name, kind) in manifest.layout().files() {
        ui::kv(&name, &ui::format_mode(kind.default_mode()));
    }

    Ok(())
}
