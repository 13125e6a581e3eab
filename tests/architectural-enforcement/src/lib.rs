//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//! - The core stays headless (no printing, no UI or logging-subscriber crates)
//!
//! These tests are designed to catch violations early in the development cycle.
//! The helpers here walk a crate's `src/` and yield only production lines:
//! everything from the first `#[cfg(test)]` onward is test code.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace root, resolved from this package's manifest
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|_| PathBuf::from("../.."))
}

/// One line of production code
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// The line with any trailing `//` comment removed
    pub code: String,
    /// Name of the nearest enclosing `fn`, if any
    pub function: Option<String>,
    /// Whether that function is `async`
    pub in_async: bool,
}

impl SourceLine {
    /// `path:line - code` for failure output
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{}:{} - {}",
            self.path.display(),
            self.number,
            self.code.trim()
        )
    }
}

/// Production lines of every `.rs` file under `dir` (relative to the workspace root)
#[must_use]
pub fn production_lines(dir: &str) -> Vec<SourceLine> {
    let root = workspace_root().join(dir);
    let mut lines = Vec::new();

    for entry in walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
    {
        if let Ok(content) = fs::read_to_string(entry.path()) {
            lines.extend(scan(entry.path(), &content));
        }
    }

    lines
}

/// Split one file into production lines
#[must_use]
pub fn scan(path: &Path, content: &str) -> Vec<SourceLine> {
    let mut out = Vec::new();
    let mut function = None;
    let mut in_async = false;

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }

        if let Some(name) = fn_name(trimmed) {
            in_async = trimmed.contains("async fn ");
            function = Some(name);
        }

        let code = line.split("//").next().unwrap_or(line).to_string();
        out.push(SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            code,
            function: function.clone(),
            in_async,
        });
    }

    out
}

fn fn_name(line: &str) -> Option<String> {
    let start = line.find("fn ")?;
    // `fn` must be a keyword, not the tail of an identifier
    if start > 0 && !line[..start].ends_with(' ') {
        return None;
    }
    let rest = &line[start + 3..];
    let name: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_stops_at_test_module() {
        let code = "fn a() {}\n#[cfg(test)]\nmod tests { fn b() {} }\n";
        let lines = scan(Path::new("x.rs"), code);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].function.as_deref(), Some("a"));
    }

    #[test]
    fn test_scan_tracks_async_functions() {
        let code = "pub async fn load() {\n    work();\n}\nfn sync() {\n    work();\n}\n";
        let lines = scan(Path::new("x.rs"), code);
        assert!(lines[1].in_async);
        assert!(!lines[4].in_async);
    }

    #[test]
    fn test_comments_are_stripped() {
        let lines = scan(Path::new("x.rs"), "let a = 1; // std::fs::read\n");
        assert!(!lines[0].code.contains("std::fs"));
    }
}
