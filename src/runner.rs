use anyhow::{Context, Result};
use std::process::{Command, Stdio};

/// Captured output of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

/// Run a command and capture its output without failing on nonzero status
pub fn output(cmd: &str, args: &[&str]) -> Result<CommandOutput> {
    let out = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;
    Ok(out.into())
}

/// Check if a command exists
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_captures_failure_without_error() {
        let out = output("false", &[]).unwrap();
        assert!(!out.success);
    }

    #[test]
    fn output_captures_stdout() {
        let out = output("echo", &["hello"]).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout_str().trim(), "hello");
    }

    #[test]
    fn command_exists_finds_the_shell() {
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely-not-a-command-xyz"));
    }
}
