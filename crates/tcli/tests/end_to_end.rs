//! End-to-end tests that run the `tcli` binary against canned device output.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn testdata() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

/// `tcli` over the test inventory, without color or rc file.
fn tcli() -> Command {
    let data = testdata();
    let mut cmd = Command::cargo_bin("tcli").unwrap();
    cmd.arg("--inventory")
        .arg(data.join("devices.csv"))
        .arg("--responses")
        .arg(data.join("device_output"))
        .args(["--color", "false", "-R", "none", "--timeout", "5", "--grace", "1"])
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn batch_command_prints_replies_in_order() {
    tcli()
        .args(["-T", "device_a,device_b", "-C", "show version"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#!# device_a:show version #!#\nHostname: device_a"))
        .stdout(predicate::str::contains("#!# device_b:show version #!#\nCisco IOS XR"))
        .stdout(predicate::str::is_match("(?s)device_a:show version.*device_b:show version").unwrap());
}

#[test]
fn missing_output_is_reported_as_error() {
    tcli()
        .args(["-T", "device_b", "-C", "show interfaces terse"])
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "Failure to retrieve response from device \"device_b\", for command \"show interfaces terse\".",
        ));
}

#[test]
fn pipe_runs_locally() {
    tcli()
        .args(["-T", "device_a", "-C", "show interfaces terse || grep -c up"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#!# device_a:show interfaces terse #!#\n3"));
}

#[test]
fn local_commands_in_batch() {
    tcli()
        .args(["-T", "^device_.*", "-C", "/vendor juniper\n/expandtargets"])
        .assert()
        .success()
        .stdout(predicate::str::contains("device_a,device_c"));
}

#[test]
fn dry_run_sends_nothing() {
    tcli()
        .args(["--dry-run", "-T", "device_a", "-C", "show version"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Send Commands: \n  show version"))
        .stdout(predicate::str::contains("To Targets: \n  device_a"))
        .stdout(predicate::str::contains("Hostname").not());
}

#[test]
fn interactive_session_starts_in_safe_mode() {
    tcli()
        .args(["-T", "device_a"])
        .write_stdin("show version\n/safemode off\nshow version\n/exit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("TCLI - Tokenized Command Line Interface"))
        .stdout(predicate::str::contains("#! <device_a[1]*> !#"))
        .stdout(predicate::str::contains("#! <device_a[1]> !#"))
        .stderr(predicate::str::contains("Safe mode on, command ignored."))
        .stdout(predicate::str::contains("Hostname: device_a").count(1));
}

#[test]
fn interactive_session_ends_at_eof() {
    tcli()
        .write_stdin("/env\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Display: raw, Filter: default_index"));
}

#[test]
fn rc_file_is_played_at_start_up() {
    let dir = tempfile::TempDir::new().unwrap();
    let rc = dir.path().join("tclirc");
    std::fs::write(&rc, "/targets device_c\n/record rc\nshow version\n").unwrap();

    let data = testdata();
    Command::cargo_bin("tcli")
        .unwrap()
        .arg("--inventory")
        .arg(data.join("devices.csv"))
        .arg("--responses")
        .arg(data.join("device_output"))
        .args(["--color", "false", "-R"])
        .arg(&rc)
        .write_stdin("/bufferlist\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("#! <device_c[1]*> !#"))
        .stdout(predicate::str::contains("rc startup"));
}

#[test]
fn bad_inventory_warns() {
    Command::cargo_bin("tcli")
        .unwrap()
        .args(["--inventory", "/nonexistent/devices.csv", "-R", "none", "--color", "false"])
        .args(["-C", "/env"])
        .assert()
        .success()
        .stderr(predicate::str::contains("device inventory failed to load"));
}

#[test]
fn unknown_display_is_rejected() {
    tcli().args(["--display", "fancy"]).assert().failure();
}
