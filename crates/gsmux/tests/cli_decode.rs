#![cfg(all(unix, feature = "cli"))]

use std::process::{Command, Output};

fn gsmux(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gsmux"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("gsmux should run")
}

#[test]
fn encode_prints_wire_bytes() {
    let output = gsmux(&["--format", "pretty", "encode", "--type", "sabm", "--pf", "--dlci", "0"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "f9033f011cf9");
}

#[test]
fn encode_json_reports_frame() {
    let output = gsmux(&["--format", "json", "encode", "-c", "1", "--data", "AT\r"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"frame_type\":\"UIH\""));
    assert!(stdout.contains("\"payload_size\":3"));
}

#[test]
fn decode_lists_frames() {
    let output = gsmux(&["--format", "json", "decode", "--hex", "f9 03 3f 01 1c f9"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"frame_type\":\"SABM\""));
    assert!(stdout.contains("\"poll_final\":true"));
}

#[test]
fn decode_round_trips_encode_output() {
    let encoded = gsmux(&["--format", "pretty", "encode", "-c", "2", "--mode", "advanced", "--data", "~}"]);
    assert!(encoded.status.success());
    let hex = String::from_utf8_lossy(&encoded.stdout).trim().to_string();

    let output = gsmux(&["--format", "json", "decode", "--mode", "advanced", "--hex", &hex]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"dlci\":2"));
    assert!(stdout.contains("\"payload_hex\":\"7e7d\""));
}

#[test]
fn decode_bad_fcs_returns_60() {
    let output = gsmux(&["--format", "json", "decode", "--hex", "f9 03 3f 01 00 f9"]);
    assert_eq!(output.status.code(), Some(60));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"status\":\"corrupt\""));
}

#[test]
fn decode_without_input_is_usage_error() {
    let output = gsmux(&["decode"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_name() {
    let output = gsmux(&["version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("gsmux "));
}

#[test]
fn extended_version_reports_modes() {
    let output = gsmux(&["--format", "json", "version", "--extended"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"modes\":[[\"basic\",0],[\"advanced\",1]]"));
    assert!(stdout.contains("\"default_frame_size\":1509"));
}
