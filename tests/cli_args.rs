//! Tests for the command line front end, run against the real binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn settings_path(&self) -> PathBuf {
        self.dir.path().join("settings.json")
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_api-rotator"))
            .arg("--config")
            .arg(self.dir.path().join("config.toml"))
            .arg("--settings")
            .arg(self.settings_path())
            .args(args)
            .env_remove("API_ROTATOR_LOG")
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute command")
    }

    fn ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "{:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    fn stored(&self) -> serde_json::Value {
        read_json(&self.settings_path())["api-rotator"].clone()
    }
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_api-rotator"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["serve", "add", "list", "import", "export", "models"] {
        assert!(stdout.contains(command), "help is missing '{}'", command);
    }
    assert!(stdout.contains("API_ROTATOR_LOG"));
}

#[test]
fn test_missing_subcommand_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_api-rotator"))
        .output()
        .expect("Failed to execute command");
    assert!(!output.status.success());
}

#[test]
fn test_add_then_list() {
    let ws = Workspace::new();
    let out = ws.ok(&["add", "primary", "https://api.example.com/v1", "--key", "sk-abcdefghijkl"]);
    assert!(out.contains("Added 'primary'"));
    ws.ok(&["add", "backup", "https://backup.example.com", "--model", "gpt-4o-mini"]);

    let list = ws.ok(&["list"]);
    assert!(list.contains("primary"));
    assert!(list.contains("backup"));
    assert!(list.contains("gpt-4o-mini"));
    // keys are never printed in full
    assert!(!list.contains("sk-abcdefghijkl"));
    assert!(list.contains("••••ijkl"));

    let stored = ws.stored();
    assert_eq!(stored["apiList"].as_array().unwrap().len(), 2);
    assert_eq!(stored["apiList"][0]["apiKey"], "sk-abcdefghijkl");
}

#[test]
fn test_use_moves_cursor_and_marks_current() {
    let ws = Workspace::new();
    ws.ok(&["add", "a", "https://a.example.com"]);
    ws.ok(&["add", "b", "https://b.example.com"]);

    let out = ws.ok(&["use", "b"]);
    assert!(out.contains("Now using 'b'"));
    assert_eq!(ws.stored()["cursor"], 1);

    let list = ws.ok(&["list"]);
    let current = list.lines().find(|l| l.starts_with('*')).unwrap();
    assert!(current.contains(" b "));
}

#[test]
fn test_disable_remove_and_settings_commands() {
    let ws = Workspace::new();
    ws.ok(&["add", "a", "https://a.example.com"]);
    ws.ok(&["add", "b", "https://b.example.com"]);

    ws.ok(&["disable", "1"]);
    assert_eq!(ws.stored()["apiList"][0]["enabled"], false);

    ws.ok(&["mode", "random"]);
    ws.ok(&["policy", "sticky"]);
    ws.ok(&["rotation", "off"]);
    let stored = ws.stored();
    assert_eq!(stored["mode"], "random");
    assert_eq!(stored["switchPolicy"], "stickyUntilError");
    assert_eq!(stored["enabled"], false);

    ws.ok(&["remove", "a"]);
    let stored = ws.stored();
    assert_eq!(stored["apiList"].as_array().unwrap().len(), 1);
    assert_eq!(stored["apiList"][0]["name"], "b");
}

#[test]
fn test_unknown_target_exits_with_error() {
    let ws = Workspace::new();
    ws.ok(&["add", "a", "https://a.example.com"]);

    let output = ws.run(&["use", "nonexistent"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: No endpoint matches 'nonexistent'"));
}

#[test]
fn test_invalid_url_is_rejected() {
    let ws = Workspace::new();
    let output = ws.run(&["add", "bad", "ftp://files.example.com"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
    assert!(!ws.settings_path().exists());
}

#[test]
fn test_export_then_import_into_fresh_settings() {
    let source = Workspace::new();
    source.ok(&["add", "a", "https://a.example.com", "--key", "sk-a"]);
    source.ok(&["add", "b", "https://b.example.com"]);

    let export_path = source.path("export.json");
    let out = source.ok(&["export", export_path.to_str().unwrap()]);
    assert!(out.contains("Exported 2 endpoint(s)"));
    let exported = read_json(&export_path);
    assert!(exported["exportTime"].is_string());
    assert_eq!(exported["apiList"][0]["apiKey"], "sk-a");

    let target = Workspace::new();
    target.ok(&["add", "a", "https://a.example.com"]);
    let out = target.ok(&["import", export_path.to_str().unwrap()]);
    assert!(out.contains("Imported 1 endpoint(s), skipped 1 duplicate(s)"));
    assert_eq!(target.stored()["apiList"].as_array().unwrap().len(), 2);
}

#[test]
fn test_export_to_stdout() {
    let ws = Workspace::new();
    ws.ok(&["add", "a", "https://a.example.com"]);
    let out = ws.ok(&["export"]);
    let document: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
    assert_eq!(document["apiList"][0]["endpoint"], "https://a.example.com");
}

#[test]
fn test_invalid_config_file_exits_with_error() {
    let ws = Workspace::new();
    std::fs::write(ws.path("config.toml"), "[failover]\nmax_endpoints = 0\n").unwrap();
    let output = ws.run(&["list"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_endpoints"));
}
