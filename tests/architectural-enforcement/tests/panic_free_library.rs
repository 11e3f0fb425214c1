//! Integration Test: Panic-Free Library Code
//!
//! **Policy**: Production code in `classroom-core` propagates errors with
//! `Result` and `?`. `unwrap()`, `expect()`, `panic!` and blocking sleeps are
//! allowed only in tests.

use architectural_enforcement::{find_lines, workspace_root};

#[test]
fn test_no_unwrap_or_expect_in_core() {
    let core_src = workspace_root().join("classroom/core/src");
    let violations: Vec<String> = find_lines(&core_src, |code| {
        code.contains(".unwrap()") || code.contains(".expect(") || code.contains("panic!(")
    })
    .into_iter()
    .map(|line| line.to_string())
    .collect();

    if !violations.is_empty() {
        eprintln!("\nPanicking calls found in classroom-core production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        panic!(
            "\nFound {} panicking call(s). Return an error instead.",
            violations.len()
        );
    }
}

#[test]
fn test_no_blocking_sleep_in_core() {
    let core_src = workspace_root().join("classroom/core/src");
    let violations = find_lines(&core_src, |code| code.contains("std::thread::sleep"));

    assert!(
        violations.is_empty(),
        "blocking sleep in async library code: {violations:?}"
    );
}

#[test]
fn test_scanner_sees_core_sources() {
    let core_src = workspace_root().join("classroom/core/src");
    let files = architectural_enforcement::rust_files(&core_src);
    assert!(files.iter().any(|p| p.ends_with("session.rs")));
    assert!(files.iter().any(|p| p.ends_with("transport/websocket.rs")));
}
