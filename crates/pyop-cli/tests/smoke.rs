//! Smoke tests for the `pyop` binary.
//!
//! These run against the built-in native runtime, so they need no
//! interpreter.
#![cfg(not(feature = "python"))]

use std::io::Write;
use std::process::Command;

fn pyop() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_pyop"));
    command.env_remove("PYOP_CONFIG").env("HOME", "/tmp");
    command
}

fn tensor_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

// ── Help / basic CLI ──────────────────────────────────────────────────────────

#[test]
fn binary_responds_to_help() {
    let output = pyop().arg("--help").output().expect("failed to execute pyop");
    assert!(output.status.success(), "pyop --help should exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("catalog"), "help output should list catalog subcommand");
    assert!(stdout.contains("call"), "help output should list call subcommand");
}

#[test]
fn unknown_subcommand_exits_nonzero() {
    let output = pyop().arg("nonexistent-subcommand").output().unwrap();
    assert!(!output.status.success());
}

// ── Catalog ───────────────────────────────────────────────────────────────────

#[test]
fn catalog_prints_descriptors() {
    let output = pyop().arg("catalog").output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let document: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(document["kernels"][0]["name"], "PyOp");
    assert_eq!(document["kernels"][0]["since_version"], 7);
    assert_eq!(document["kernels"][0]["provider"], "CPUExecutionProvider");
    assert_eq!(document["schemas"]["baseline_opset_version"], 5);
    assert_eq!(document["schemas"]["schemas"][0]["outputs"][0]["dtype"], "int32");
}

// ── Call ──────────────────────────────────────────────────────────────────────

#[test]
fn call_add_one() {
    let input = tensor_file(r#"{"dtype":"int32","shape":[2,2],"data":[1,2,3,4]}"#);
    let output = pyop()
        .args(["call", "math_ops", "add_one"])
        .arg(input.path())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        result,
        serde_json::json!({"dtype": "int32", "shape": [2, 2], "data": [2, 3, 4, 5]})
    );
}

#[test]
fn call_with_output_type() {
    let input = tensor_file(r#"{"dtype":"float64","shape":[2],"data":[1.5,-2.0]}"#);
    // By name or by ONNX tag.
    for output_type in ["float64", "11"] {
        let output = pyop()
            .args(["call", "math_ops", "negate", "--output-type", output_type])
            .arg(input.path())
            .output()
            .unwrap();
        assert!(output.status.success(), "--output-type {output_type}");
        let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(result["dtype"], "float64");
        assert_eq!(result["data"], serde_json::json!([-1.5, 2.0]));
    }
}

#[test]
fn call_reports_type_mismatch() {
    let input = tensor_file(r#"{"dtype":"float64","shape":[1],"data":[1.0]}"#);
    let output = pyop()
        .args(["call", "math_ops", "add_one"])
        .arg(input.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported element type"), "{stderr}");
}

#[test]
fn call_reports_missing_module() {
    let output = pyop().args(["call", "nonexistent_mod", "f"]).output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nonexistent_mod"), "{stderr}");
}

// ── Config ────────────────────────────────────────────────────────────────────

#[test]
fn malformed_config_fails_cleanly() {
    let config = tensor_file("[runtime]\nteardown = \"sometimes\"\n");
    let output = pyop()
        .arg("--config")
        .arg(config.path())
        .arg("catalog")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("settings"), "{stderr}");
}
