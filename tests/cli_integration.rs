//! Integration tests for the ralph-loop CLI

use assert_cmd::cargo;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a Command for the ralph-loop binary
fn ralph() -> Command {
    Command::new(cargo::cargo_bin!("ralph-loop"))
}

/// Command scoped to a project directory
fn ralph_in(project: &Path) -> Command {
    let mut cmd = ralph();
    cmd.arg("--project").arg(project);
    cmd
}

fn start(project: &Path, name: &str, extra: &[&str]) {
    ralph_in(project)
        .args(["start", name, "--task-file", "TASKS.md"])
        .args(extra)
        .assert()
        .success();
}

#[test]
fn test_help() {
    ralph()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("loop controller"));
}

#[test]
fn test_version() {
    ralph()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_start_scaffolds_default_task_file() {
    let temp = TempDir::new().unwrap();

    ralph_in(temp.path())
        .args(["start", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created loop 'auth'"));

    assert!(temp.path().join(".ralph/tasks/auth.md").exists());
    assert!(temp.path().join(".ralph/loops/auth.json").exists());
}

#[test]
fn test_start_twice_fails() {
    let temp = TempDir::new().unwrap();
    start(temp.path(), "auth", &[]);

    ralph_in(temp.path())
        .args(["start", "auth"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_start_rejects_bad_name() {
    let temp = TempDir::new().unwrap();
    ralph_in(temp.path())
        .args(["start", "../etc"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_status_unknown_loop() {
    let temp = TempDir::new().unwrap();
    ralph_in(temp.path())
        .args(["status", "nope"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_status_shows_checklist() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("TASKS.md"), "- [x] one\n- [ ] two\n").unwrap();
    start(temp.path(), "auth", &["--max-iterations", "10"]);

    ralph_in(temp.path())
        .args(["status", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Iteration: 1 of 10"))
        .stdout(predicate::str::contains("1/2"))
        .stdout(predicate::str::contains("Next item: two"));
}

#[test]
fn test_status_json() {
    let temp = TempDir::new().unwrap();
    start(temp.path(), "auth", &[]);

    ralph_in(temp.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"auth\""))
        .stdout(predicate::str::contains("\"status\": \"running\""));
}

#[test]
fn test_list() {
    let temp = TempDir::new().unwrap();
    start(temp.path(), "alpha", &[]);
    fs::write(temp.path().join("OTHER.md"), "- [ ] x\n").unwrap();
    ralph_in(temp.path())
        .args(["start", "beta", "--task-file", "OTHER.md"])
        .assert()
        .success();

    ralph_in(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha"))
        .stdout(predicate::str::contains("beta"));
}

#[test]
fn test_prompt_preview() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("TASKS.md"), "- [ ] write login\n").unwrap();
    start(temp.path(), "auth", &["--mode", "plan"]);

    ralph_in(temp.path())
        .args(["prompt", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("planning iteration 1"))
        .stdout(predicate::str::contains("- [ ] write login"));
}

#[test]
fn test_pause_resume_stop() {
    let temp = TempDir::new().unwrap();
    start(temp.path(), "auth", &[]);

    ralph_in(temp.path())
        .args(["pause", "auth"])
        .assert()
        .success();
    ralph_in(temp.path())
        .args(["pause", "auth"])
        .assert()
        .failure()
        .code(4);
    ralph_in(temp.path())
        .args(["resume", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("running"));
    ralph_in(temp.path())
        .args(["stop", "auth"])
        .assert()
        .success();
    ralph_in(temp.path())
        .args(["resume", "auth"])
        .assert()
        .failure()
        .code(4);
}

#[test]
fn test_hints() {
    let temp = TempDir::new().unwrap();
    start(temp.path(), "auth", &[]);

    ralph_in(temp.path())
        .args(["hint", "add", "auth", "use argon2", "--sticky"])
        .assert()
        .success();
    ralph_in(temp.path())
        .args(["hint", "add", "auth", "look at the failing test"])
        .assert()
        .success();

    ralph_in(temp.path())
        .args(["hint", "list", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[0] use argon2"))
        .stdout(predicate::str::contains("[next] look at the failing test"));

    ralph_in(temp.path())
        .args(["prompt", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("- use argon2"));

    ralph_in(temp.path())
        .args(["hint", "remove", "auth", "3"])
        .assert()
        .failure()
        .code(4);
    ralph_in(temp.path())
        .args(["hint", "remove", "auth", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("use argon2"));
}

#[test]
fn test_rotate_queues_bootstrap_prompt() {
    let temp = TempDir::new().unwrap();
    start(temp.path(), "auth", &[]);

    ralph_in(temp.path())
        .args(["rotate", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rotation 1"));
    ralph_in(temp.path())
        .args(["compacted", "auth"])
        .assert()
        .success();

    ralph_in(temp.path())
        .args(["prompt", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fresh session"));
}

#[test]
fn test_check_classifies_output() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("out.txt");

    fs::write(&file, "done\n<promise>COMPLETE</promise>\n").unwrap();
    ralph()
        .arg("check")
        .arg(&file)
        .assert()
        .success()
        .stdout("complete\n");

    fs::write(&file, "```\n<promise>COMPLETE</promise>\n```\n").unwrap();
    ralph()
        .arg("check")
        .arg(&file)
        .assert()
        .success()
        .stdout("none\n");

    fs::write(&file, "<promise>COMPLETE</promise>\n<promise>ABORT</promise>\n").unwrap();
    ralph()
        .arg("check")
        .arg(&file)
        .assert()
        .success()
        .stdout("conflict\n");
}

#[test]
fn test_event_turn_cycle() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("TASKS.md"), "- [ ] a\n").unwrap();
    start(temp.path(), "auth", &[]);

    ralph_in(temp.path())
        .args(["event", "auth", r#"{"event":"turn_start"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("build iteration 1"));

    ralph_in(temp.path())
        .args(["event", "auth", r#"{"event":"turn_start"}"#])
        .assert()
        .failure()
        .code(4);

    ralph_in(temp.path())
        .args([
            "event",
            "auth",
            r#"{"event":"turn_end","output":"<promise>ABORT</promise>"}"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("aborted"));
}

#[test]
fn test_event_rejects_bad_json() {
    let temp = TempDir::new().unwrap();
    start(temp.path(), "auth", &[]);
    ralph_in(temp.path())
        .args(["event", "auth", r#"{"event":"dance"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid host event JSON"));
}

#[test]
fn test_archive() {
    let temp = TempDir::new().unwrap();
    start(temp.path(), "auth", &[]);

    ralph_in(temp.path())
        .args(["archive", "auth"])
        .assert()
        .success();
    assert!(!temp.path().join(".ralph/loops/auth.json").exists());

    // The name is free again.
    start(temp.path(), "auth", &[]);
}

#[cfg(unix)]
#[test]
fn test_run_with_scripted_agent_command() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join(".ralph")).unwrap();
    fs::write(
        temp.path().join(".ralph/settings.json"),
        r#"{
  "inactivityTimeoutSecs": 0,
  "agent": {
    "command": "sh",
    "args": ["-c", "cat >/dev/null; printf -- '- [x] a\\n' > TASKS.md; echo '<promise>COMPLETE</promise>'"],
    "timeoutSecs": 30
  }
}"#,
    )
    .unwrap();
    fs::write(temp.path().join("TASKS.md"), "- [ ] a\n").unwrap();
    start(temp.path(), "auth", &["--max-iterations", "5"]);

    ralph_in(temp.path())
        .args(["run", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("completed"));

    ralph_in(temp.path())
        .args(["status", "auth"])
        .assert()
        .success()
        .stdout(predicate::str::contains("agent signalled completion"));
}

#[cfg(unix)]
#[test]
fn test_run_exhausts_budget() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join(".ralph")).unwrap();
    fs::write(
        temp.path().join(".ralph/settings.json"),
        r#"{"agent": {"command": "sh", "args": ["-c", "cat >/dev/null; echo working"]}}"#,
    )
    .unwrap();
    fs::write(temp.path().join("TASKS.md"), "- [ ] a\n").unwrap();
    start(temp.path(), "auth", &["--max-iterations", "2"]);

    ralph_in(temp.path())
        .args(["run", "auth", "--inactivity-timeout", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("iteration budget exhausted"));
}

#[test]
fn test_invalid_settings_exit_code() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join(".ralph")).unwrap();
    fs::write(
        temp.path().join(".ralph/settings.json"),
        r#"{"struggleThreshold": 0}"#,
    )
    .unwrap();

    ralph_in(temp.path())
        .args(["start", "auth"])
        .assert()
        .failure()
        .code(7);
}
