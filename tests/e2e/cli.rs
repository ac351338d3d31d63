//! Tests driving the nettool binary

use std::io::Write;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn nettool(dir: &TempDir, args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_nettool"))
        .current_dir(dir.path())
        .args(args)
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start nettool");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn test_exec_show_interface() {
    let dir = TempDir::new().unwrap();
    let output = nettool(&dir, &["--simulate", "exec", "show", "interface", "em0"], "");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("em0: flags="));
    assert!(stdout.contains("ether 00:0c:29:3e:5a:01"));
}

#[test]
fn test_exec_failure_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let output = nettool(&dir, &["--simulate", "exec", "launch", "rockets"], "");
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("[ERROR] unknown command 'launch'"));
}

#[test]
fn test_shell_reads_stdin_until_exit() {
    let dir = TempDir::new().unwrap();
    let output = nettool(
        &dir,
        &["--simulate", "shell"],
        "create interface bridge\nnonsense\nexit\ncreate interface bridge\n",
    );
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.matches("bridge0").count(), 1);
    assert!(!stdout.contains("bridge1"));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("error: unknown command 'nonsense'"));
}

#[test]
fn test_config_aliases_and_validate() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("nettool.toml"),
        r#"
[kernel]
backend = "simulated"

[commands.aliases]
ls = "show"
"#,
    )
    .unwrap();

    let output = nettool(&dir, &["exec", "ls", "interface", "lo0"], "");
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout).unwrap().starts_with("lo0:"));

    let output = nettool(&dir, &["config", "validate"], "");
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)
        .unwrap()
        .contains("Configuration is valid"));
}

#[test]
fn test_config_validate_rejects_shadowing_alias() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("nettool.toml"),
        "[commands.aliases]\nshow = \"delete\"\n",
    )
    .unwrap();
    let output = nettool(&dir, &["config", "validate"], "");
    assert!(!output.status.success());
}
