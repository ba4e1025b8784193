//! Diff computation and display

use colored::Colorize;

use crate::resource::{Resource, ResourceDiff, ResourceState};

/// Compute diffs for all resources, in plan order
pub fn compute_diffs(resources: &[Box<dyn Resource>]) -> Vec<ResourceDiff> {
    resources
        .iter()
        .filter_map(|r| ResourceDiff::from_resource(r.as_ref()).ok().flatten())
        .collect()
}

/// Human-readable name for a resource type
fn type_name(resource_type: &str) -> &str {
    match resource_type {
        "package_index" => "Package index",
        "apt_package" => "System packages",
        "managed_file" => "Managed files",
        "log_permissions" => "Log permissions",
        "edge_binding" => "Edge binding",
        other => other,
    }
}

/// Display a list of diffs in plan order
pub fn display_diff(diffs: &[ResourceDiff]) {
    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!("{}", "Host Diff".bold());
    println!("{}", "─".repeat(9).dimmed());

    let mut last_type = "";
    for diff in diffs {
        if diff.resource_type != last_type {
            println!();
            println!("  {}", type_name(&diff.resource_type).bold());
            last_type = &diff.resource_type;
        }

        let symbol = match (&diff.current, &diff.desired) {
            (ResourceState::Absent, _) => "+".green(),
            (ResourceState::Modified { .. }, _) => "~".yellow(),
            (ResourceState::Unknown, _) => "?".dimmed(),
            _ => "~".yellow(),
        };

        let state_desc = match &diff.current {
            ResourceState::Absent => "(missing)".to_string(),
            ResourceState::Modified { from, to } => format!("{from} → {to}"),
            ResourceState::Unknown => "(state unknown)".to_string(),
            ResourceState::Present { details } => {
                details.clone().unwrap_or_else(|| "(present)".to_string())
            }
        };

        println!(
            "    {} {:<28} {}",
            symbol,
            diff.resource_id,
            state_desc.dimmed()
        );

        if let Some(detail) = &diff.detail {
            for line in detail.lines() {
                let colored_line = match line.chars().next() {
                    Some('+') => line.green().to_string(),
                    Some('-') => line.red().to_string(),
                    _ => line.dimmed().to_string(),
                };
                println!("        {colored_line}");
            }
        }
    }

    println!();
    println!(
        "  {} change(s) pending",
        diffs.len().to_string().bold()
    );
}
