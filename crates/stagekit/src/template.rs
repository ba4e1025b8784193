//! Field-level config templating.
//!
//! Substitution is textual, not structural: the value of a single `key:`
//! line is replaced in place and every other line stays byte-identical.
//! Parsing the whole document would reformat fields the service owner never
//! asked us to touch.

use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};

/// Rewrite the value of the first `key: ...` line in `content`.
///
/// Indentation and the key itself are preserved; only the value portion is
/// replaced. Returns `None` when no line carries the key.
pub fn rewrite_field(content: &str, key: &str, value: &str) -> Option<String> {
    // Anchored per-line: indent, key, separator, then the value to replace.
    let pattern = Regex::new(&format!(
        r"^(\s*{}\s*:\s*)(.*)$",
        regex::escape(key)
    ))
    .ok()?;

    let mut replaced = false;
    let lines: Vec<String> = content
        .split('\n')
        .map(|line| {
            if replaced {
                return line.to_string();
            }
            match pattern.captures(line) {
                Some(caps) => {
                    replaced = true;
                    format!("{}{}", &caps[1], value)
                }
                None => line.to_string(),
            }
        })
        .collect();

    if replaced { Some(lines.join("\n")) } else { None }
}

/// Copy a config file to `dest`, rewriting `key` to `value` on the way.
///
/// Fails with [`Error::Config`] when the key is absent from the source.
pub fn stage_config(src: &Path, dest: &Path, key: &str, value: &str) -> Result<()> {
    let content = std::fs::read_to_string(src)?;

    let rewritten = rewrite_field(&content, key, value).ok_or_else(|| Error::Config {
        field: key.to_string(),
        path: src.to_path_buf(),
    })?;

    std::fs::write(dest, rewritten)?;
    log::debug!(
        "Staged config {} -> {} ({key} rewritten)",
        src.display(),
        dest.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
blog_name: Axiomatic
host: https://blog.example.net/
nesting_limit: 5
notifications:
  new_comment: true
";

    #[test]
    fn rewrites_only_the_host_line() {
        let out = rewrite_field(SAMPLE, "host", "http://localhost:8080/").unwrap();

        assert!(out.contains("host: http://localhost:8080/"));
        assert!(!out.contains("blog.example.net"));

        // Every other line is byte-identical.
        let before: Vec<&str> = SAMPLE.split('\n').collect();
        let after: Vec<&str> = out.split('\n').collect();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(after.iter()) {
            if b.starts_with("host:") {
                continue;
            }
            assert_eq!(b, a);
        }
    }

    #[test]
    fn preserves_indentation_of_nested_keys() {
        let content = "outer:\n  host: old\n";
        let out = rewrite_field(content, "host", "new").unwrap();
        assert_eq!(out, "outer:\n  host: new\n");
    }

    #[test]
    fn missing_key_returns_none() {
        assert!(rewrite_field("port: 8080\n", "host", "x").is_none());
    }

    #[test]
    fn key_must_match_whole_token() {
        // "hostname:" must not satisfy a rewrite of "host".
        assert!(rewrite_field("hostname: a\n", "host", "x").is_none());
    }

    #[test]
    fn only_first_occurrence_is_rewritten() {
        let content = "host: a\nhost: b\n";
        let out = rewrite_field(content, "host", "c").unwrap();
        assert_eq!(out, "host: c\nhost: b\n");
    }

    #[test]
    fn stage_config_fails_on_absent_field() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("app.yaml");
        let dest = tmp.path().join("out.yaml");
        std::fs::write(&src, "port: 8080\n").unwrap();

        match stage_config(&src, &dest, "host", "x") {
            Err(Error::Config { field, .. }) => assert_eq!(field, "host"),
            other => panic!("expected Config error, got {other:?}"),
        }
        assert!(!dest.exists());
    }
}
