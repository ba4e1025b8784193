use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "capstan")]
#[command(version)]
#[command(about = "Release builder and host activator for self-hosted web services", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the deployment manifest (defaults to ./capstan.toml)
    #[arg(short, long, global = true, env = "CAPSTAN_MANIFEST")]
    pub manifest: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build and stage a complete release artifact set
    Release(ReleaseArgs),

    /// Converge this host to the manifest's desired state
    Apply(ApplyArgs),

    /// Preview what apply would change
    Diff,

    /// Show converged vs drifted resources
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ReleaseArgs {
    /// Stage into this directory instead of the manifest's deploy_dir
    #[arg(long)]
    pub deploy_dir: Option<PathBuf>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Don't make changes, just show what would happen
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,
}
