//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async functions in the Conductor MUST NOT use blocking I/O.
//! **Required**: `tokio::fs`, `tokio::net`, `tokio::process`, async `reqwest`.
//! **Acceptable**: non-async functions (config loading before the runtime
//! matters), test code.

use architectural_enforcement::production_lines;

const FORBIDDEN: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
    ("std::io::stdin()", "Blocking stdin"),
];

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();

    for line in production_lines("conductor/core/src") {
        if !line.in_async {
            continue;
        }
        for (pattern, kind) in FORBIDDEN {
            if line.code.contains(pattern) {
                violations.push(format!("{kind}: {}", line.describe()));
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::read().await, tokio::fs::write().await");
        eprintln!("  - reqwest::Client::send().await");

        panic!(
            "\nFound {} blocking I/O violation(s) in async code.\nFix these before merging!",
            violations.len()
        );
    }
}
