use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// `deckplay` with HOME and the config dir pointed into a scratch directory.
fn deckplay(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("deckplay").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn help_lists_commands() {
    let home = TempDir::new().unwrap();
    deckplay(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("play-pause"))
        .stdout(predicate::str::contains("daemon"));
}

#[test]
fn config_prints_defaults() {
    let home = TempDir::new().unwrap();
    deckplay(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("executable = \"playerctl\""))
        .stdout(predicate::str::contains("interval_ms = 1000"));
}

#[test]
fn config_file_is_honoured() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".config").join("deckplay");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.toml"),
        "[render]\ninterval_ms = 250\n",
    )
    .unwrap();

    deckplay(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("interval_ms = 250"));
}

#[test]
fn status_without_daemon() {
    let home = TempDir::new().unwrap();
    deckplay(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Daemon is not running."));
}

#[test]
fn daemon_status_without_daemon() {
    let home = TempDir::new().unwrap();
    deckplay(&home)
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Daemon is not running."));
}

#[test]
fn login_requires_spotify() {
    let home = TempDir::new().unwrap();
    deckplay(&home)
        .arg("login")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Spotify is not enabled"));
}

#[test]
fn media_command_reports_player_failure() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".config").join("deckplay");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.toml"),
        "[player]\nexecutable = \"/nonexistent/deckplay-playerctl\"\n",
    )
    .unwrap();

    deckplay(&home)
        .arg("next")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Command failed"));
}
