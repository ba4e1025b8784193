//! Scoped privilege context for host mutation
//!
//! Sudo is never requested for the entire process. Instead:
//! 1. All diffs are computed first (no privileges needed)
//! 2. Privileges are acquired once, right before the mutating batch
//! 3. The sudo timestamp is invalidated as soon as the context drops
//!
//! When the process already runs as root (the usual case on a deploy user's
//! `sudo capstan apply`), commands run directly with no prefix.

use anyhow::{Context, Result, bail};
use std::process::Command;

use crate::runner::CommandOutput;

/// Check whether the process is running as root
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

/// How privileged commands are executed
#[derive(Debug)]
enum PrivilegeKind {
    /// Run commands directly (already root, or test fixtures on own paths)
    Direct,
    /// Prefix commands with sudo, holding a validated session
    Sudo(SudoSession),
}

/// A scoped privilege context for running host-mutating commands
#[derive(Debug)]
pub struct Privilege {
    kind: PrivilegeKind,
}

impl Privilege {
    /// Acquire privileges, prompting through sudo when not already root
    pub fn acquire(reason: &str) -> Result<Self> {
        if is_root() {
            return Ok(Self {
                kind: PrivilegeKind::Direct,
            });
        }

        Ok(Self {
            kind: PrivilegeKind::Sudo(SudoSession::acquire(reason)?),
        })
    }

    /// A context that runs commands without any prefix.
    ///
    /// Used by tests that converge resources onto paths they own.
    pub fn direct() -> Self {
        Self {
            kind: PrivilegeKind::Direct,
        }
    }

    /// Run a command under this context, capturing output
    pub fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        match &self.kind {
            PrivilegeKind::Direct => {
                let output = Command::new(cmd)
                    .args(args)
                    .output()
                    .with_context(|| format!("Failed to execute: {} {:?}", cmd, args))?;
                Ok(output.into())
            }
            PrivilegeKind::Sudo(session) => session.run(cmd, args),
        }
    }

    /// Run a command, failing with its stderr on a nonzero status
    pub fn run_checked(&self, cmd: &str, args: &[&str]) -> Result<()> {
        let output = self.run(cmd, args)?;
        if !output.success {
            bail!("{} failed: {}", cmd, output.stderr_str().trim());
        }
        Ok(())
    }
}

/// A validated sudo session - automatically invalidates on drop
#[derive(Debug)]
struct SudoSession {
    validated: bool,
}

impl SudoSession {
    /// Acquire sudo privileges with a reason shown to the user
    fn acquire(reason: &str) -> Result<Self> {
        eprintln!();
        eprintln!("  Sudo required: {}", reason);
        eprintln!();

        // Validate sudo (will prompt for password)
        let status = Command::new("sudo")
            .args(["-v"])
            .status()
            .context("Failed to execute sudo")?;

        if !status.success() {
            bail!("Failed to acquire sudo privileges");
        }

        Ok(Self { validated: true })
    }

    fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        if !self.validated {
            bail!("Sudo session not validated");
        }

        let output = Command::new("sudo")
            .arg(cmd)
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute: sudo {} {:?}", cmd, args))?;

        Ok(output.into())
    }
}

impl Drop for SudoSession {
    fn drop(&mut self) {
        // Invalidate sudo timestamp to release privileges
        let _ = Command::new("sudo").args(["-k"]).status();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_context_runs_commands() {
        let privilege = Privilege::direct();
        let out = privilege.run("echo", &["ok"]).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout_str().trim(), "ok");
    }

    #[test]
    fn run_checked_surfaces_stderr() {
        let privilege = Privilege::direct();
        let err = privilege
            .run_checked("ls", &["/definitely/not/a/path"])
            .unwrap_err();
        assert!(err.to_string().contains("ls failed"));
    }
}
