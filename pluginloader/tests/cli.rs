//! Tests for the `pluginloader` binary.
#![cfg(feature = "cli")]

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_plugin(dir: &TempDir, source: &str) -> std::path::PathBuf {
    let path = dir.path().join("plugin.lua");
    fs::write(&path, source).unwrap();
    path
}

#[test]
fn test_inspect_lists_classes() {
    let dir = TempDir::new().unwrap();
    let path = write_plugin(&dir, "Foo = class()\nBar = class()\nlimit = 1\n");

    Command::cargo_bin("pluginloader")
        .unwrap()
        .arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .stdout("Bar\tclass\nFoo\tclass\n");
}

#[test]
fn test_inspect_all_includes_builtins() {
    let dir = TempDir::new().unwrap();
    let path = write_plugin(&dir, "Foo = class()\n");

    Command::cargo_bin("pluginloader")
        .unwrap()
        .args(["inspect", "--all", "--json"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"class\""))
        .stdout(predicate::str::contains("\"kind\": \"function\""));
}

#[test]
fn test_inspect_requires_file() {
    Command::cargo_bin("pluginloader")
        .unwrap()
        .arg("inspect")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_inspect_reports_script_errors() {
    let dir = TempDir::new().unwrap();
    let path = write_plugin(&dir, "error('nope')\n");

    Command::cargo_bin("pluginloader")
        .unwrap()
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load"));
}

#[test]
fn test_construct_prints_type_name() {
    let dir = TempDir::new().unwrap();
    let path = write_plugin(&dir, "Foo = class { init = function(self, a) assert(a == 5) end }\n");

    Command::cargo_bin("pluginloader")
        .unwrap()
        .arg("construct")
        .arg(&path)
        .args(["Foo", "--named", "a=5"])
        .assert()
        .success()
        .stdout("Foo\n");
}
