//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the Conductor MUST NOT call sleep methods.
//! Waiting happens on I/O, channels and cancellation tokens, never on a clock.
//! **Exceptions**: test code

use architectural_enforcement::production_lines;

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations: Vec<String> = ["conductor/core/src", "conductor/cli/src"]
        .iter()
        .flat_map(|dir| production_lines(dir))
        .filter(|line| {
            line.code.contains("thread::sleep") || line.code.contains("time::sleep(")
        })
        .map(|line| line.describe())
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Wait on the thing itself:");
        eprintln!("  - tokio::select! over the operation and a CancellationToken");
        eprintln!("  - mpsc / oneshot channels");
        eprintln!("  - tokio::time::timeout() around a future");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

#[test]
fn test_core_sources_are_scanned() {
    // Guards against the walk silently finding nothing
    assert!(!production_lines("conductor/core/src").is_empty());
}
