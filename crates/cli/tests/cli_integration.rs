// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::{Path, PathBuf};
use std::process::Command;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn scenario(name: &str) -> PathBuf {
    repo_root().join("configs/scenarios").join(name)
}

fn write_script(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("script.yaml");
    std::fs::write(&path, contents).expect("Failed to write script");
    path
}

fn run(script: &Path, output_dir: &Path) -> (Option<i32>, serde_json::Value) {
    let output = Command::new(env!("CARGO_BIN_EXE_intc-sim"))
        .args([
            "run",
            "--script",
            script.to_str().unwrap(),
            "--output-dir",
            output_dir.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to execute command");

    let result = std::fs::read_to_string(output_dir.join("result.json"))
        .expect("result.json not written");
    (output.status.code(), serde_json::from_str(&result).unwrap())
}

#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_intc-sim"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("LabWired Interrupt Controller Simulator"));
}

#[test]
fn test_shipped_scenarios_pass() {
    for name in ["pending-promotion.yaml", "fanout.yaml", "cascade.yaml"] {
        let out = tempfile::tempdir().unwrap();
        let (code, result) = run(&scenario(name), out.path());
        assert_eq!(code, Some(0), "{}: {}", name, result);
        assert_eq!(result["status"], "pass");
        assert_eq!(result["result_schema_version"], "1.0");
        assert_eq!(result["script_hash"].as_str().unwrap().len(), 64);
    }
}

#[test]
fn test_fanout_result_reports_guest_errors_and_snapshot() {
    let out = tempfile::tempdir().unwrap();
    let (_, result) = run(&scenario("fanout.yaml"), out.path());
    assert_eq!(result["guest_errors"], 2);
    let pins = &result["snapshot"]["controllers"]["ast2700-intc0"]["pins"];
    assert_eq!(pins.as_array().unwrap().len(), 10);
    assert_eq!(pins[0]["enable"], 0x24);
}

#[test]
fn test_failed_expectation_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        r#"
schema_version: "1.0"
profile: "ast2700-intc1"
steps:
  - source_line: { inpin: 0, line: 0, level: true }
  - expect_output: { line: 0, level: true }
"#,
    );
    let out = dir.path().join("out");
    let (code, result) = run(&script, &out);
    assert_eq!(code, Some(1));
    assert_eq!(result["status"], "fail");
    assert_eq!(result["failures"][0]["step"], 1);
}

#[test]
fn test_bad_script_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        r#"
schema_version: "2.0"
profile: "ast2700-intc1"
steps:
  - reset
"#,
    );
    let out = dir.path().join("out");
    let (code, result) = run(&script, &out);
    assert_eq!(code, Some(2));
    assert_eq!(result["status"], "error");
    assert!(result["message"]
        .as_str()
        .unwrap()
        .contains("Unsupported schema_version"));
}

#[test]
fn test_unknown_profile_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        r#"
schema_version: "1.0"
profile: "ast2600-intc"
steps:
  - reset
"#,
    );
    let out = dir.path().join("out");
    let (code, _) = run(&script, &out);
    assert_eq!(code, Some(2));
}

#[test]
fn test_unknown_controller_exits_3() {
    let dir = tempfile::tempdir().unwrap();
    let system = repo_root().join("configs/systems/ast2700.yaml");
    let script = write_script(
        dir.path(),
        &format!(
            r#"
schema_version: "1.0"
system: "{}"
steps:
  - source_line: {{ controller: "intc7", inpin: 0, line: 0, level: true }}
"#,
            system.display()
        ),
    );
    let out = dir.path().join("out");
    let (code, result) = run(&script, &out);
    assert_eq!(code, Some(3));
    assert_eq!(result["status"], "error");
    assert_eq!(result["steps_executed"], 0);
}

#[test]
fn test_profiles_lists_builtins() {
    let output = Command::new(env!("CARGO_BIN_EXE_intc-sim"))
        .arg("profiles")
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("ast2700-intc0"));
    assert!(stdout.contains("ast2700-intc1"));
}

#[test]
fn test_show_prints_register_map() {
    let output = Command::new(env!("CARGO_BIN_EXE_intc-sim"))
        .args(["show", "--profile", "ast2700-intc0"])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("name: ast2700-intc0"));
    assert!(stdout.contains("GICINT192_201"));
    assert!(stdout.contains("enable 0x1b00"));
}
