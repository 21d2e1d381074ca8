use std::path::PathBuf;
use std::process::{Command, Output};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_excl"))
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

#[test]
fn run_json_reports_cls_and_limit() {
    let out = run(&[
        "run",
        "--signal",
        "10",
        "--background",
        "100",
        "--bkg-uncertainty",
        "10",
        "--observed",
        "100",
        "--format",
        "json",
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("stdout should be valid JSON");

    let cls = v["hypotest"]["cls"].as_f64().unwrap();
    assert!(cls > 0.05 && cls <= 1.0, "cls = {cls}");

    let expected = v["hypotest"]["expected"].as_array().unwrap();
    assert_eq!(expected.len(), 5);
    let band: Vec<f64> = expected.iter().map(|x| x.as_f64().unwrap()).collect();
    for w in band.windows(2) {
        assert!(w[0] <= w[1] + 1e-12, "band not ordered: {band:?}");
    }

    assert_eq!(v["limit_status"], "ok");
    let observed_limit = v["upper_limit"]["observed"].as_f64().unwrap();
    assert!(observed_limit > 0.0 && observed_limit < 10.0, "limit = {observed_limit}");

    assert_eq!(v["parameters"].as_array().unwrap().len(), 2);
    assert!(v["best_fit"]["converged"].as_bool().unwrap());
}

#[test]
fn run_text_report_has_console_sections() {
    let out = run(&[
        "run",
        "--signal",
        "10",
        "--background",
        "100",
        "--bkg-uncertainty",
        "10",
        "--observed",
        "100",
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("Model configuration:"));
    assert!(text.contains("CLs observed:"));
    assert!(text.contains("CLs expected band:"));
    assert!(text.contains("Upper limit (95% CL)"));
}

#[test]
fn run_degrades_gracefully_when_limit_is_out_of_range() {
    // Negligible signal with a huge excess: no limit inside [0, 10].
    let out = run(&[
        "run",
        "--signal",
        "0.001",
        "--background",
        "100",
        "--bkg-uncertainty",
        "10",
        "--observed",
        "1000",
        "--format",
        "json",
    ]);
    assert!(
        out.status.success(),
        "out-of-range limit must not be fatal, stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["limit_status"], "outside_scan_range");
    assert!(v.get("upper_limit").is_none());
    // The hypothesis-test block is still reported.
    assert!(v["hypotest"]["cls"].as_f64().unwrap().is_finite());
}

#[test]
fn run_rejects_invalid_model_inputs() {
    let out = run(&[
        "run",
        "--signal=-5",
        "--background",
        "100",
        "--bkg-uncertainty",
        "10",
        "--observed",
        "100",
    ]);
    assert!(!out.status.success(), "negative signal must be fatal");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("invalid model"), "stderr: {stderr}");
}

#[test]
fn spec_emits_schema_document() {
    let out = run(&[
        "spec",
        "--signal",
        "10",
        "--background",
        "100",
        "--bkg-uncertainty",
        "10",
        "--observed",
        "105",
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["channels"][0]["name"], "singlechannel");
    assert_eq!(v["channels"][0]["samples"][0]["modifiers"][0]["type"], "normfactor");
    assert_eq!(v["channels"][0]["samples"][1]["modifiers"][0]["type"], "staterror");
    assert_eq!(v["observations"][0]["data"][0], 105.0);
    assert_eq!(v["measurements"][0]["config"]["poi"], "mu");
}
