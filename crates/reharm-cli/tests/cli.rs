//! Tests for the reharm command line
//!
//! Each test runs the binary in an empty temp directory with HOME and
//! XDG_CONFIG_HOME pointed there, so no user or local config leaks in.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn reharm(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("reharm").unwrap();
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env("RUST_LOG", "error");
    for var in [
        "REHARM_STYLE",
        "REHARM_COMPLEXITY",
        "REHARM_BEAM_WIDTH",
        "REHARM_MAX_SUGGESTIONS",
        "REHARM_MAX_TIME_MS",
        "REHARM_SEED",
        "REHARM_INSTRUMENT",
        "REHARM_LOG_LEVEL",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn suggests_tritone_substitution_for_jazz() {
    let dir = TempDir::new().unwrap();
    reharm(&dir)
        .args(["--style", "jazz", "suggest", "--chords", "Dm7 G7 Cmaj7"])
        .args(["--strategy", "tritone_substitution"])
        .assert()
        .success()
        .stdout(predicate::str::contains("G7 -> Db7"))
        .stdout(predicate::str::contains("tritone_substitution"));
}

#[test]
fn suggest_json_is_an_array() {
    let dir = TempDir::new().unwrap();
    let output = reharm(&dir)
        .args(["suggest", "-c", "C F G C", "-n", "3", "--json"])
        .args(["--melody", "72@0:2,74@2:2"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let items = parsed.as_array().expect("array");
    assert!(!items.is_empty() && items.len() <= 3);
    assert!(items[0].get("score").is_some());
    assert!(items[0]["suggestion"].get("substitution_type").is_some());
}

#[test]
fn unknown_strategy_is_an_error() {
    let dir = TempDir::new().unwrap();
    reharm(&dir)
        .args(["suggest", "-c", "C G C", "--strategy", "reverse_polarity"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reverse_polarity"));
}

#[test]
fn bad_input_is_reported() {
    let dir = TempDir::new().unwrap();
    reharm(&dir)
        .args(["suggest", "-c", "C Qmaj7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse chords"));

    reharm(&dir)
        .args(["suggest", "-c", "C G", "--melody", "72@0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing ':'"));

    reharm(&dir)
        .args(["--complexity", "1.5", "suggest", "-c", "C G"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("complexity"));

    reharm(&dir)
        .args(["--style", "baroque", "suggest", "-c", "C G"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("baroque"));
}

#[test]
fn seeded_optimize_is_reproducible() {
    let dir = TempDir::new().unwrap();
    let run = || {
        reharm(&dir)
            .args(["--style", "jazz", "--complexity", "1.0", "optimize"])
            .args(["-c", "Cmaj7 Am7 Dm7 G7 Cmaj7", "--seed", "9", "--json"])
            .output()
            .unwrap()
    };
    let first = run();
    assert!(first.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&first.stdout).unwrap();
    assert!(parsed["outcome"]["accepted"].is_array());
    assert!(parsed["voicing"].is_null());

    assert_eq!(first.stdout, run().stdout);
}

#[test]
fn optimize_can_voice_the_result() {
    let dir = TempDir::new().unwrap();
    reharm(&dir)
        .args(["optimize", "-c", "C Am F G", "--voice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("before: C Am F G"))
        .stdout(predicate::str::contains("voicing (quality"));
}

#[test]
fn lists_builtin_styles() {
    let dir = TempDir::new().unwrap();
    reharm(&dir)
        .arg("styles")
        .assert()
        .success()
        .stdout(predicate::str::contains("classical"))
        .stdout(predicate::str::contains("gospel"))
        .stdout(predicate::str::contains("neapolitan"));
}

#[test]
fn config_file_defines_a_style() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(
        &path,
        r#"
[search]
beam_width = 3

[styles.bebop]
base = "jazz"
strategy_weights = { neapolitan = 0.0 }
"#,
    )
    .unwrap();

    reharm(&dir)
        .args(["--config", path.to_str().unwrap(), "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"))
        .stdout(predicate::str::contains("beam_width = 3"));

    reharm(&dir)
        .args(["--config", path.to_str().unwrap(), "styles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bebop"));
}

#[test]
fn config_without_files_uses_defaults() {
    let dir = TempDir::new().unwrap();
    reharm(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("# sources: compiled defaults"))
        .stdout(predicate::str::contains("[session]"));
}
