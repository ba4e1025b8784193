//! Host activation commands: apply, diff, status.
//!
//! All three refuse to look at a partially-populated deployment directory;
//! the artifact set is verified before a plan is even built.

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;

use crate::Context;
use crate::config::Manifest;
use crate::engine::{self, ExecuteOptions};
use crate::resource::ResourceDiff;
use crate::state::HostState;
use crate::sudo::Privilege;
use crate::ui;

/// Converge this host to the manifest's desired state
pub fn apply(ctx: &Context, manifest: &Manifest, dry_run: bool, yes: bool) -> Result<()> {
    ui::header(&format!("Activate: {}", manifest.service.name));

    if dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let plan = build_verified_plan(manifest)?;

    let opts = ExecuteOptions {
        dry_run,
        yes,
        verbose: ctx.verbose > 0,
    };

    let summary = engine::execute(plan, opts, || {
        Privilege::acquire("Converge host configuration")
    })?;

    log::info!(
        "Apply finished: {} change(s), {} already converged",
        summary.total_changes(),
        summary.no_change
    );

    Ok(())
}

/// Preview what apply would change
pub fn diff(_ctx: &Context, manifest: &Manifest) -> Result<()> {
    ui::header(&format!("Diff: {}", manifest.service.name));

    let plan = build_verified_plan(manifest)?;
    let diffs = engine::differ::compute_diffs(&plan.resources);
    engine::differ::display_diff(&diffs);

    Ok(())
}

/// Show converged vs drifted resources
pub fn status(ctx: &Context, manifest: &Manifest) -> Result<()> {
    ui::header(&format!("Status: {}", manifest.service.name));

    let plan = build_verified_plan(manifest)?;

    let mut converged = 0;
    let mut drifted = 0;

    println!();
    for resource in &plan.resources {
        match ResourceDiff::from_resource(resource.as_ref())? {
            None => {
                converged += 1;
                if !ctx.quiet {
                    println!("  {} {}", "✓".green(), resource.id());
                }
            }
            Some(diff) => {
                drifted += 1;
                let state = match &diff.current {
                    crate::resource::ResourceState::Absent => "missing".to_string(),
                    crate::resource::ResourceState::Modified { from, .. } => from.clone(),
                    _ => "unknown".to_string(),
                };
                println!(
                    "  {} {} {}",
                    "~".yellow(),
                    resource.id(),
                    format!("({state})").dimmed()
                );
            }
        }
    }

    println!();
    if drifted == 0 {
        ui::success(&format!("{converged} resource(s) converged"));
    } else {
        ui::warn(&format!(
            "{drifted} resource(s) drifted, {converged} converged - run 'capstan apply'"
        ));
    }

    Ok(())
}

/// Verify the deployment directory, then build the plan.
fn build_verified_plan(manifest: &Manifest) -> Result<engine::ExecutionPlan> {
    let deploy = manifest.deploy_dir();
    manifest.layout().verify(&deploy).with_context(|| {
        format!(
            "{} is not a complete release (run 'capstan release' first)",
            deploy.display()
        )
    })?;

    let state_path = HostState::default_path()?;
    engine::build_plan(manifest, &state_path)
}
