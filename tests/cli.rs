//! Tests for the ptywrap binary itself

use std::process::{Command, Stdio};

fn ptywrap() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ptywrap"))
}

#[test]
fn child_exit_status_becomes_our_own() {
    let output = ptywrap()
        .args(["sh", "-c", "exit 7"])
        .stdin(Stdio::null())
        .output()
        .expect("failed to run ptywrap");

    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn child_output_is_relayed_to_stdout() {
    let output = ptywrap()
        .args(["echo", "through the pty"])
        .stdin(Stdio::null())
        .output()
        .expect("failed to run ptywrap");

    assert!(output.status.success());
    assert_eq!(output.stdout, b"through the pty\n");
}

#[test]
fn missing_command_is_a_usage_error() {
    let output = ptywrap()
        .stdin(Stdio::null())
        .output()
        .expect("failed to run ptywrap");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing command"));
}

#[test]
fn help_exits_successfully() {
    let output = ptywrap()
        .arg("--help")
        .stdin(Stdio::null())
        .output()
        .expect("failed to run ptywrap");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Usage:"));
}

#[test]
fn unknown_command_fails_with_diagnostic() {
    let output = ptywrap()
        .args(["definitely-not-a-real-command-3b1f"])
        .stdin(Stdio::null())
        .output()
        .expect("failed to run ptywrap");

    assert!(!output.status.success());
}
