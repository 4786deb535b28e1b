use std::collections::HashSet;
use std::process::Command;

use tempfile::tempdir;

#[derive(Debug, serde::Deserialize)]
struct RankedImage {
    rank: usize,
    image: String,
    score: f64,
}

#[derive(Debug, serde::Deserialize)]
struct KeywordMatrix {
    priorities: Vec<f64>,
}

#[derive(Debug, serde::Deserialize)]
struct Report {
    keyword_matrix: KeywordMatrix,
    scores: Vec<f64>,
    ranking: Vec<RankedImage>,
}

fn survey() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_survey"));
    cmd.env_remove("SURVEY_STORE_PATH")
        .env_remove("SURVEY_RNG_SEED")
        .env_remove("SURVEY_MAX_WEIGHT");
    cmd
}

#[test]
fn cli_pairs_is_deterministic_with_seed() {
    let run = || {
        let output = survey()
            .args(["pairs", "--items", "a,b,c,d", "--seed", "17"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let pairs: Vec<(String, String)> = serde_json::from_slice(&output.stdout).unwrap();
        pairs
    };
    let a = run();
    let b = run();
    assert_eq!(a, b);
    assert_eq!(a.len(), 6);
    let unique: HashSet<_> = a.iter().cloned().collect();
    assert_eq!(unique.len(), 6);
}

#[test]
fn cli_replay_then_score() {
    let dir = tempdir().unwrap();
    let script_path = dir.path().join("script.json");
    let snapshot_path = dir.path().join("snapshot.json");
    let report_path = dir.path().join("report.json");
    let store_path = dir.path().join("sessions.sqlite");

    std::fs::write(
        &script_path,
        r#"{
            "keywords_text": "A, B",
            "images": ["I1", "I2"],
            "keyword_weights": [3],
            "image_choices": [
                {"side": "left", "elapsed_secs": 1.0},
                {"side": "right", "elapsed_secs": 2.0}
            ]
        }"#,
    )
    .unwrap();

    let output = survey()
        .args(["replay", "--seed", "1"])
        .arg("--script")
        .arg(&script_path)
        .arg("--out")
        .arg(&snapshot_path)
        .arg("--store")
        .arg(&store_path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let session_id = String::from_utf8(output.stdout).unwrap().trim().to_string();
    assert_eq!(session_id.len(), 36);

    let status = survey()
        .arg("score")
        .arg("--snapshot")
        .arg(&snapshot_path)
        .arg("--out")
        .arg(&report_path)
        .status()
        .unwrap();
    assert!(status.success());

    let report: Report =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert!((report.keyword_matrix.priorities[0] - 0.25).abs() < 1e-12);
    assert!((report.keyword_matrix.priorities[1] - 0.75).abs() < 1e-12);
    assert_eq!(report.scores.len(), 2);
    // Each keyword had a single response, so every image matrix is indifferent.
    for score in &report.scores {
        assert!((score - 0.5).abs() < 1e-12);
    }
    assert_eq!(report.ranking[0].rank, 1);
    assert!(report.ranking.iter().any(|r| r.image == "I1" && r.score > 0.0));

    // The stored checkpoint scores identically.
    let stored_report_path = dir.path().join("stored_report.json");
    let status = survey()
        .arg("score")
        .arg("--session")
        .arg(&session_id)
        .arg("--store")
        .arg(&store_path)
        .arg("--out")
        .arg(&stored_report_path)
        .status()
        .unwrap();
    assert!(status.success());
    let stored: Report =
        serde_json::from_str(&std::fs::read_to_string(&stored_report_path).unwrap()).unwrap();
    assert_eq!(stored.scores, report.scores);
}

#[test]
fn cli_score_without_input_fails() {
    let dir = tempdir().unwrap();
    let status = survey()
        .arg("score")
        .arg("--out")
        .arg(dir.path().join("r.json"))
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn cli_replay_without_prompts_is_still_exportable() {
    let dir = tempdir().unwrap();
    let script_path = dir.path().join("script.json");
    let snapshot_path = dir.path().join("snapshot.json");
    let export_path = dir.path().join("export.json");
    let store_path = dir.path().join("sessions.sqlite");

    std::fs::write(&script_path, r#"{"keywords": ["solo"], "images": ["I1"]}"#).unwrap();

    let output = survey()
        .args(["replay", "--seed", "3"])
        .arg("--script")
        .arg(&script_path)
        .arg("--out")
        .arg(&snapshot_path)
        .arg("--store")
        .arg(&store_path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let session_id = String::from_utf8(output.stdout).unwrap().trim().to_string();

    let output = survey()
        .arg("export")
        .arg("--session")
        .arg(&session_id)
        .arg("--store")
        .arg(&store_path)
        .arg("--out")
        .arg(&export_path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&export_path).unwrap()).unwrap();
    assert_eq!(exported["session_id"], session_id.as_str());
    assert_eq!(exported["phase"], "complete");
}
