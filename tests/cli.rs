//! End-to-end tests of the `vibe` binary.

mod util;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::process::Command;

/// Binary under test, run from `dir` so no outer config leaks in
fn vibe(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("vibe").expect("vibe binary");
    cmd.current_dir(dir).env_remove("VIBE_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    vibe(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("blocks").and(predicate::str::contains("find")));
}

#[test]
fn init_writes_default_config_once() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    vibe(tmp.path()).args(["--quiet", "init"]).assert().success();
    tmp.child("vibe.toml")
        .assert(predicate::str::contains("max_iterations = 5"));

    vibe(tmp.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    vibe(tmp.path()).args(["--quiet", "init", "--force"]).assert().success();
}

#[test]
fn blocks_lists_imports_and_functions() {
    let tmp = util::make_python_project();
    vibe(tmp.path())
        .args(["blocks", "app/auth.py"])
        .assert()
        .success()
        .stdout(predicate::str::contains("imports").and(predicate::str::contains("login")));
}

#[test]
fn blocks_json_carries_line_ranges() {
    let tmp = util::make_python_project();
    let output = vibe(tmp.path())
        .args(["blocks", "app/auth.py", "--json"])
        .output()
        .expect("run vibe");
    assert!(output.status.success());

    let v: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    let blocks = v.as_array().expect("array");
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0]["name"], "imports");
    assert_eq!(blocks[0]["start_line"], 1);
    assert_eq!(blocks[0]["end_line"], 2);
    assert_eq!(blocks[1]["name"], "login");
    assert_eq!(blocks[1]["start_line"], 5);
    assert_eq!(blocks[1]["end_line"], 7);
}

#[test]
fn index_then_reindex_is_up_to_date() {
    let tmp = util::make_python_project();

    vibe(tmp.path())
        .arg("index")
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 4 files, 2 dependencies"));
    tmp.child(".vibe/project.db")
        .assert(predicate::path::exists());

    vibe(tmp.path())
        .arg("index")
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));
}

#[test]
fn find_ranks_the_exporting_file_first() {
    let tmp = util::make_python_project();
    let output = vibe(tmp.path())
        .args(["find", "login", "--json"])
        .output()
        .expect("run vibe");
    assert!(output.status.success());

    let v: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    let matches = v.as_array().expect("array");
    assert_eq!(matches[0]["relative_path"], "app/auth.py");
    assert!(matches[0]["reason"].as_str().unwrap_or_default().contains("exports login"));
}

#[test]
fn editing_a_missing_file_exits_with_one() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    vibe(tmp.path())
        .args(["add logging", "missing.py"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn completions_to_stdout() {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    vibe(tmp.path())
        .args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vibe"));
}
