//! Sequential executor with halt-on-failure semantics.
//!
//! Convergence steps share the package database, the filesystem and the
//! service-unit table, so within one host they run strictly in plan order.
//! The first failing step aborts the rest of the run; already-applied steps
//! are not rolled back. Operators fix the cause and re-run - idempotent
//! resources make the re-run cheap.

use anyhow::Result;
use colored::Colorize;
use thiserror::Error;

use super::differ::{compute_diffs, display_diff};
use super::planner::ExecutionPlan;
use crate::progress;
use crate::resource::{ApplyContext, ApplyResult};
use crate::sudo::Privilege;

/// A convergence step failed, halting the run for this host
#[derive(Debug, Error)]
#[error("step '{step}' failed: {message}")]
pub struct ProvisionError {
    /// Identity of the failing step
    pub step: String,
    /// Diagnostic from the underlying tool
    pub message: String,
}

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Verbose output
    pub verbose: bool,
}

/// Summary of execution results
#[derive(Debug, Default)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub skipped: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    pub fn total_changes(&self) -> usize {
        self.created + self.modified
    }

    fn add(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Execute the plan in order, acquiring privileges through `privilege_provider`
/// only once mutation is actually going to happen.
///
/// Returns the summary of a completed run; a failing step surfaces as a
/// [`ProvisionError`] and leaves the remaining sequence untouched.
pub fn execute(
    plan: ExecutionPlan,
    opts: ExecuteOptions,
    privilege_provider: impl FnOnce() -> Result<Privilege>,
) -> Result<ExecuteSummary> {
    // 1. Compute and show what would change
    let diffs = compute_diffs(&plan.resources);
    display_diff(&diffs);

    if diffs.is_empty() {
        return Ok(ExecuteSummary {
            no_change: plan.total_resources(),
            ..Default::default()
        });
    }

    // 2. Confirm (unless --yes)
    if !opts.yes && !opts.dry_run && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ExecuteSummary {
            skipped: diffs.len(),
            ..Default::default()
        });
    }

    if opts.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(ExecuteSummary {
            skipped: diffs.len(),
            ..Default::default()
        });
    }

    // 3. Privileges, acquired once for the whole mutating batch
    let privilege = privilege_provider()?;

    println!();
    println!(
        "  {} Applying {} step(s)...",
        "→".cyan(),
        plan.total_resources()
    );

    let mut summary = ExecuteSummary::default();
    let pb = progress::bar(plan.total_resources() as u64, "Applying");

    // 4. Strictly sequential, halt on first failure
    for resource in &plan.resources {
        let mut ctx = ApplyContext {
            dry_run: false,
            verbose: opts.verbose,
            privilege: &privilege,
        };

        let result = match resource.apply(&mut ctx) {
            Ok(result) => result,
            Err(e) => {
                pb.finish_and_clear();
                return Err(ProvisionError {
                    step: resource.id(),
                    message: format!("{e:#}"),
                }
                .into());
            }
        };

        let symbol = match &result {
            ApplyResult::NoChange => "○",
            ApplyResult::Created | ApplyResult::Modified => "✓",
            ApplyResult::Skipped { .. } => "⊘",
        };
        pb.set_message(format!("{} {}", symbol, resource.id()));
        pb.inc(1);

        log::debug!("{} -> {:?}", resource.id(), result);
        summary.add(&result);
    }

    pb.finish_and_clear();

    // 5. Post actions, only when something actually changed
    if summary.total_changes() > 0 && !plan.post_actions.is_empty() {
        println!();
        println!("  {} Running post actions...", "→".cyan());

        for action in &plan.post_actions {
            action.run(&privilege).map_err(|e| ProvisionError {
                step: action.describe(),
                message: format!("{e:#}"),
            })?;
            println!("    {} {}", "✓".green(), action.describe());
        }
    }

    print_summary(&summary);
    Ok(summary)
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary) {
    println!();
    println!("  {} Host converged", "✓".green().bold());

    if summary.created > 0 {
        println!("    • {} step(s) created resources", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} step(s) modified resources", summary.modified);
    }
    if summary.no_change > 0 {
        println!("    • {} step(s) already converged", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} step(s) skipped", summary.skipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, ResourceState};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct StepResource {
        id: &'static str,
        fail: bool,
        applied: Arc<AtomicUsize>,
    }

    impl Resource for StepResource {
        fn id(&self) -> String {
            self.id.to_string()
        }

        fn description(&self) -> String {
            self.id.to_string()
        }

        fn resource_type(&self) -> &'static str {
            "step"
        }

        fn current_state(&self) -> Result<ResourceState> {
            Ok(ResourceState::Absent)
        }

        fn desired_state(&self) -> ResourceState {
            ResourceState::Present { details: None }
        }

        fn apply(&self, _ctx: &mut ApplyContext) -> Result<ApplyResult> {
            if self.fail {
                anyhow::bail!("tool exploded");
            }
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(ApplyResult::Created)
        }
    }

    fn plan(applied: &Arc<AtomicUsize>, steps: &[(&'static str, bool)]) -> ExecutionPlan {
        let mut plan = ExecutionPlan::new();
        for &(id, fail) in steps {
            plan.add_resource(Box::new(StepResource {
                id,
                fail,
                applied: Arc::clone(applied),
            }));
        }
        plan
    }

    #[test]
    fn failure_halts_the_remaining_sequence() {
        let applied = Arc::new(AtomicUsize::new(0));
        let plan = plan(
            &applied,
            &[("first", false), ("second", true), ("third", false)],
        );

        let opts = ExecuteOptions {
            yes: true,
            ..Default::default()
        };
        let err = execute(plan, opts, || Ok(Privilege::direct())).unwrap_err();

        let provision = err.downcast_ref::<ProvisionError>().unwrap();
        assert_eq!(provision.step, "second");
        assert!(provision.message.contains("tool exploded"));

        // The third step never ran
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dry_run_applies_nothing() {
        let applied = Arc::new(AtomicUsize::new(0));
        let plan = plan(&applied, &[("only", false)]);

        let opts = ExecuteOptions {
            dry_run: true,
            yes: true,
            ..Default::default()
        };
        let summary = execute(plan, opts, || Ok(Privilege::direct())).unwrap();

        assert_eq!(summary.total_changes(), 0);
        assert_eq!(applied.load(Ordering::SeqCst), 0);
    }
}
