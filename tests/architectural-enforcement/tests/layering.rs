//! Integration Test: Session Layering
//!
//! **Policy**:
//! - Only `classroom/core/src/transport/` may use `tokio_tungstenite`
//! - The console talks to the backend through `SessionClient`; it never
//!   opens a transport itself
//! - The core library stays free of UI and rendering crates

use std::fs;

use architectural_enforcement::{find_lines, workspace_root};

#[test]
fn test_websocket_library_confined_to_transport() {
    let root = workspace_root();
    let core_src = root.join("classroom/core/src");
    let transport_dir = core_src.join("transport");

    let violations: Vec<String> = find_lines(&core_src, |code| code.contains("tokio_tungstenite"))
        .into_iter()
        .filter(|line| !line.path.starts_with(&transport_dir))
        .map(|line| line.to_string())
        .collect();

    assert!(
        violations.is_empty(),
        "tokio_tungstenite used outside the transport layer:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_console_never_opens_a_transport() {
    let console_src = workspace_root().join("classroom/console/src");
    let violations: Vec<String> = find_lines(&console_src, |code| {
        code.contains("classroom_core::transport")
            || code.contains("WebSocketTransport")
            || code.contains("InProcessTransport")
            || code.contains(".open(")
    })
    .into_iter()
    .map(|line| line.to_string())
    .collect();

    assert!(
        violations.is_empty(),
        "console bypasses SessionClient:\n{}",
        violations.join("\n")
    );
}

#[test]
fn test_core_has_no_ui_dependencies() {
    let manifest = fs::read_to_string(workspace_root().join("classroom/core/Cargo.toml"))
        .expect("core manifest readable");

    for forbidden in ["ratatui", "crossterm", "egui", "bevy", "gtk", "tauri"] {
        assert!(
            !manifest
                .lines()
                .any(|line| line.trim_start().starts_with(forbidden)),
            "classroom-core must not depend on {forbidden}"
        );
    }
}
