#![cfg(feature = "cli")]

use assert_cmd::Command;
use fiducial_node::aruco::{paste_gray, render_marker, Dictionary};
use fiducial_node::core::GrayImage;
use fiducial_node::{encode_frame, FiducialArray, FrameFormat};
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use std::path::Path;

const DICT_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/demo_6x6_32.json");

fn node() -> Command {
    Command::cargo_bin("fiducial-node").expect("binary built")
}

fn write_marker_frame(dir: &Path) {
    let dict = Dictionary::load_json(DICT_PATH).expect("dictionary");
    let tile = render_marker(&dict, 5, 10, 1).expect("tile");
    let mut gray = GrayImage::filled(320, 240, 255);
    paste_gray(&mut gray, &tile, 120, 80);
    let rgb = RgbImage::from_fn(320, 240, |x, y| {
        let v = gray.data[y as usize * 320 + x as usize];
        Rgb([v, v, v])
    });
    let data = encode_frame(&rgb, FrameFormat::Png, 90).expect("encode");
    std::fs::create_dir_all(dir).expect("mkdir");
    std::fs::write(dir.join("0001.png"), data).expect("write frame");
}

#[test]
fn help_lists_overrides() {
    node()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--dictionary").and(predicate::str::contains("--rate")));
}

#[test]
fn log_level_flag_parses_level_names() {
    let dir = tempfile::tempdir().expect("tempdir");
    node()
        .args(["--log-level", "debug"])
        .arg("--transport-root")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("MissingDictionary"));

    node()
        .args(["--log-level", "chatty"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--log-level"));
}

#[test]
fn refuses_to_start_without_dictionary() {
    let dir = tempfile::tempdir().expect("tempdir");
    node()
        .arg("--transport-root")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("MissingDictionary"));
}

#[test]
fn refuses_to_start_without_input_topic() {
    let dir = tempfile::tempdir().expect("tempdir");
    node()
        .args(["--dictionary", DICT_PATH])
        .arg("--transport-root")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unavailable"));
}

#[test]
fn rejects_non_positive_rate() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_marker_frame(&dir.path().join("camera/image/compressed"));
    node()
        .args(["--dictionary", DICT_PATH, "--rate", "0"])
        .arg("--transport-root")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("rate_hz"));
}

#[test]
fn publishes_detections_for_a_timed_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_marker_frame(&dir.path().join("cam/compressed"));
    node()
        .args(["--dictionary", DICT_PATH])
        .args(["--input-topic", "/cam/compressed"])
        .args(["--fiducials-topic", "/out/fiducials"])
        .args(["--debug-topic", "/out/debug"])
        .args(["--rate", "20", "--duration-secs", "0.6"])
        .arg("--transport-root")
        .arg(dir.path())
        .assert()
        .success();

    let jsonl = std::fs::read_to_string(dir.path().join("out/fiducials.jsonl")).expect("jsonl");
    let first: FiducialArray =
        serde_json::from_str(jsonl.lines().next().expect("a line")).expect("json");
    assert_eq!(first.fiducials.len(), 1);
    assert_eq!(first.fiducials[0].marker_id, 5);
    assert!(first.fiducials[0].pose.is_none());
    assert!(dir.path().join("out/debug/000000.png").is_file());
}
