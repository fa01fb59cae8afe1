//! Command-line tests for the calmatch binary.
//!
//! Tests cover:
//! 1. Extraction to stdout and to a file
//! 2. Command-line overrides of the configuration
//! 3. Several products in one run
//! 4. Error handling for invalid configuration and input

use std::io::Write;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

// =============================================================================
// Helper functions
// =============================================================================

fn create_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file.flush().unwrap();
    file
}

/// 6x6 product on a 0.5 degree grid; (lat 10, lon 20) is pixel (4, 4).
fn raster_json(name: &str, value: f64) -> String {
    let band: Vec<String> = (0..36).map(|_| value.to_string()).collect();
    format!(
        r#"{{
  "name": "{}",
  "width": 6,
  "height": 6,
  "start_time": "2021-03-14T09:00:00Z",
  "end_time": "2021-03-14T10:00:00Z",
  "geocoding": {{ "lat0": 12.0, "lon0": 18.0, "lat_step": -0.5, "lon_step": 0.5 }},
  "bands": [ {{ "name": "chl", "data": [{}] }} ]
}}"#,
        name,
        band.join(", ")
    )
}

const POINTS: &str = "site\tlat\tlon\ttime\n\
                      buoy-a\t10.0\t20.0\t2021-03-14 09:30:00\n\
                      buoy-b\t11.0\t19.0\t2021-03-20 09:30:00\n\
                      far\t-40.0\t100.0\t2021-03-14 09:30:00\n";

fn run_calmatch(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_calmatch"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run calmatch")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn data_lines(text: &str) -> Vec<&str> {
    text.lines().skip(1).filter(|l| !l.is_empty()).collect()
}

// =============================================================================
// Extraction
// =============================================================================

#[test]
fn test_extract_to_stdout() {
    let points = create_file(POINTS);
    let raster = create_file(&raster_json("scene-1", 0.5));
    let config = create_file(r#"{ "macro_pixel_size": 3 }"#);

    let output = run_calmatch(&[
        "extract",
        "-c",
        config.path().to_str().unwrap(),
        "-r",
        points.path().to_str().unwrap(),
        "--raster",
        raster.path().to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = stdout(&output);
    let header = text.lines().next().unwrap();
    assert!(header.starts_with("record_id\tsite\tlat\tlon\t"));
    assert!(header.contains("chl_mean\tchl_sigma\tchl_n"));
    assert!(header.ends_with("exclusion_reason"));

    // the point outside the product is dropped, no time window is configured
    let rows = data_lines(&text);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r.contains("buoy-a")));
    assert!(rows.iter().all(|r| r.contains("scene-1")));
}

#[test]
fn test_time_window_override() {
    let points = create_file(POINTS);
    let raster = create_file(&raster_json("scene-1", 0.5));

    let output = run_calmatch(&[
        "extract",
        "-r",
        points.path().to_str().unwrap(),
        "--raster",
        raster.path().to_str().unwrap(),
        "-n",
        "1",
        "--max-time-difference",
        "3",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = stdout(&output);
    let rows = data_lines(&text);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].starts_with("2\tbuoy-a\t"));
}

#[test]
fn test_explode_to_output_file() {
    let points = create_file("site\tlat\tlon\nbuoy-a\t10.0\t20.0\n");
    let raster = create_file(&raster_json("scene-1", 0.25));
    let out = NamedTempFile::new().unwrap();

    let output = run_calmatch(&[
        "extract",
        "-r",
        points.path().to_str().unwrap(),
        "--raster",
        raster.path().to_str().unwrap(),
        "-n",
        "3",
        "--mode",
        "explode",
        "-o",
        out.path().to_str().unwrap(),
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).is_empty());

    let text = std::fs::read_to_string(out.path()).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.contains("\tchl\t"));
    assert!(!header.contains("chl_mean"));
    assert_eq!(data_lines(&text).len(), 9);
}

#[test]
fn test_accepted_only_drops_annotations() {
    let points = create_file("site\tlat\tlon\nbuoy-a\t10.0\t20.0\n");
    let raster = create_file(&raster_json("scene-1", 0.25));

    let output = run_calmatch(&[
        "extract",
        "-r",
        points.path().to_str().unwrap(),
        "--raster",
        raster.path().to_str().unwrap(),
        "-n",
        "3",
        "--accepted-only",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(!text.contains("exclusion_reason"));
    assert_eq!(data_lines(&text).len(), 1);
}

#[test]
fn test_multiple_products_in_order() {
    let points = create_file("site\tlat\tlon\nbuoy-a\t10.0\t20.0\n");
    let first = create_file(&raster_json("scene-1", 0.25));
    let second = create_file(&raster_json("scene-2", 0.75));

    let output = run_calmatch(&[
        "--threads",
        "2",
        "extract",
        "-r",
        points.path().to_str().unwrap(),
        "--raster",
        first.path().to_str().unwrap(),
        "--raster",
        second.path().to_str().unwrap(),
        "-n",
        "1",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let text = stdout(&output);
    assert_eq!(text.lines().filter(|l| l.starts_with("record_id")).count(), 1);
    let rows = data_lines(&text);
    assert_eq!(rows.len(), 2);
    assert!(rows[0].contains("scene-1"));
    assert!(rows[1].contains("scene-2"));
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_prints_defaults() {
    let config = create_file(r#"{ "mode": "explode" }"#);
    let output = run_calmatch(&["config", "-c", config.path().to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["mode"], "explode");
    assert_eq!(json["macro_pixel_size"], 5);
    assert_eq!(json["filtered_mean_coefficient"], 1.5);
}

// =============================================================================
// Error handling
// =============================================================================

#[test]
fn test_invalid_macro_pixel_size_fails() {
    let config = create_file(r#"{ "macro_pixel_size": 0 }"#);
    let output = run_calmatch(&["config", "-c", config.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("macro_pixel_size"));
}

#[test]
fn test_unknown_config_field_fails() {
    let points = create_file(POINTS);
    let raster = create_file(&raster_json("scene-1", 0.5));
    let config = create_file(r#"{ "macro_pixel_sise": 3 }"#);

    let output = run_calmatch(&[
        "extract",
        "-c",
        config.path().to_str().unwrap(),
        "-r",
        points.path().to_str().unwrap(),
        "--raster",
        raster.path().to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_expression_without_compiler_fails() {
    let points = create_file(POINTS);
    let raster = create_file(&raster_json("scene-1", 0.5));
    let config = create_file(r#"{ "good_record_expression": "chl_mean > 0.1" }"#);

    let output = run_calmatch(&[
        "extract",
        "-c",
        config.path().to_str().unwrap(),
        "-r",
        points.path().to_str().unwrap(),
        "--raster",
        raster.path().to_str().unwrap(),
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_nan_time_difference_fails() {
    let points = create_file(POINTS);
    let raster = create_file(&raster_json("scene-1", 0.5));

    let output = run_calmatch(&[
        "extract",
        "-r",
        points.path().to_str().unwrap(),
        "--raster",
        raster.path().to_str().unwrap(),
        "--max-time-difference",
        "NaN",
    ]);
    assert!(!output.status.success());
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_malformed_reference_fails() {
    let points = create_file("site\tlat\tlon\nbuoy-a\tninety\t20.0\n");
    let raster = create_file(&raster_json("scene-1", 0.5));

    let output = run_calmatch(&[
        "extract",
        "-r",
        points.path().to_str().unwrap(),
        "--raster",
        raster.path().to_str().unwrap(),
    ]);
    assert!(!output.status.success());
}
