//! End-to-end tests for the sessionkeep binary
//!
//! Each test points the CLI at a sled store inside a temporary directory and
//! drives it through several invocations, so state crosses process
//! boundaries the way it does in production.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

mod common;

fn sessionkeep(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sessionkeep").unwrap();
    cmd.env_remove("SESSIONKEEP_STORAGE_BACKEND")
        .env_remove("SESSIONKEEP_STORAGE_PATH")
        .env_remove("SESSIONKEEP_SYSTEM_PROMPT")
        .env_remove("SESSIONKEEP_CONFIG")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(dir.path().join("missing.yaml"))
        .arg("--storage-path")
        .arg(dir.path().join("sessions.sled"));
    cmd
}

#[test]
fn test_append_then_show() {
    let dir = TempDir::new().unwrap();

    sessionkeep(&dir)
        .args(["append", "abc", "hi there", "--user-id", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Appended"));

    sessionkeep(&dir)
        .args(["show", "abc", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"user_id\": 42"))
        .stdout(predicate::str::contains("hi there"));
}

#[test]
fn test_show_missing_session_exits_with_client_fault() {
    let dir = TempDir::new().unwrap();

    sessionkeep(&dir)
        .args(["show", "nope"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains(
            "The specified resource was not found.",
        ));
}

#[test]
fn test_update_rejects_reserved_field() {
    let dir = TempDir::new().unwrap();
    sessionkeep(&dir)
        .args(["append", "abc", "hi", "--user-id", "1"])
        .assert()
        .success();

    sessionkeep(&dir)
        .args(["update", "abc", "--set", "is_deleted=true"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be updated"));

    sessionkeep(&dir)
        .args(["update", "abc", "--set", "title=Episode 1", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Episode 1"));
}

#[test]
fn test_save_restore_delete_roundtrip() {
    let dir = TempDir::new().unwrap();
    let turns = common::write_file(
        &dir,
        "turns.json",
        r#"[{"role": "user", "content": "What's new?"}, {"role": "assistant", "content": "Rust."}]"#,
    );

    sessionkeep(&dir)
        .arg("save")
        .arg("--file")
        .arg(&turns)
        .args(["--user-id", "7", "--session-id", "ep1", "--title", "Episode 1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ep1"));

    sessionkeep(&dir)
        .arg("save")
        .arg("--file")
        .arg(&turns)
        .args(["--user-id", "7", "--session-id", "ep1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Session already exists"));

    sessionkeep(&dir)
        .args(["restore", "ep1", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("You're a general assistant."))
        .stdout(predicate::str::contains("What's new?"));

    sessionkeep(&dir)
        .args(["list", "--user-id", "7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ep1"));

    sessionkeep(&dir).args(["delete", "ep1"]).assert().success();

    sessionkeep(&dir)
        .args(["list", "--user-id", "7"])
        .assert()
        .code(2);
}

#[test]
fn test_clear_keeps_metadata() {
    let dir = TempDir::new().unwrap();
    for content in ["one", "two"] {
        sessionkeep(&dir)
            .args(["append", "abc", content, "--user-id", "3"])
            .assert()
            .success();
    }

    sessionkeep(&dir)
        .args(["clear", "abc"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 2 message(s)"));

    sessionkeep(&dir)
        .args(["list", "--all", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"session_id\": \"abc\""));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (_config_dir, config_path) = common::temp_config_file(
        "session:\n  mutable_metadata_fields: [title, user_id]\n",
    );

    let mut cmd = Command::cargo_bin("sessionkeep").unwrap();
    cmd.env_remove("SESSIONKEEP_STORAGE_BACKEND")
        .env_remove("SESSIONKEEP_STORAGE_PATH")
        .arg("--config")
        .arg(config_path)
        .arg("--storage-path")
        .arg(dir.path().join("sessions.sled"))
        .args(["list", "--all"]);

    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("reserved"));
}
