//! Integration Test: Headless Core
//!
//! **Policy**: the Conductor core never renders. It talks to surfaces only
//! through `ConductorMessage`, logs only through `tracing`, and leaves
//! subscriber setup and argument parsing to the binaries.

use std::fs;

use architectural_enforcement::{production_lines, workspace_root};

/// Crates that belong to surfaces, not the core
const SURFACE_CRATES: &[&str] = &["clap", "tracing-subscriber", "ratatui", "crossterm"];

#[test]
fn test_core_does_not_print() {
    let violations: Vec<String> = production_lines("conductor/core/src")
        .into_iter()
        .filter(|line| {
            ["println!", "eprintln!", "print!(", "dbg!("]
                .iter()
                .any(|m| line.code.contains(m))
        })
        .map(|line| line.describe())
        .collect();

    assert!(
        violations.is_empty(),
        "Core must use tracing or ConductorMessage, found:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_core_has_no_surface_dependencies() {
    let manifest = fs::read_to_string(workspace_root().join("conductor/core/Cargo.toml"))
        .expect("core manifest readable");

    let found: Vec<&str> = SURFACE_CRATES
        .iter()
        .copied()
        .filter(|name| {
            manifest
                .lines()
                .any(|line| line.trim_start().starts_with(&format!("{name} ")))
        })
        .collect();

    assert!(
        found.is_empty(),
        "Surface crates in conductor/core/Cargo.toml: {found:?}"
    );
}

#[test]
fn test_core_does_not_unwrap() {
    let violations: Vec<String> = production_lines("conductor/core/src")
        .into_iter()
        .filter(|line| line.code.contains(".unwrap()") || line.code.contains(".expect("))
        .map(|line| line.describe())
        .collect();

    assert!(
        violations.is_empty(),
        "Production code must propagate errors, found:\n{}",
        violations.join("\n")
    );
}
