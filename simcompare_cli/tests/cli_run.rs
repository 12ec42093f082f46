use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn run_cli_json(args: &[&str]) -> Value {
    let exe = env!("CARGO_BIN_EXE_simcompare_cli");
    let config_dir = TempDir::new().expect("config dir");
    let cache_dir = TempDir::new().expect("cache dir");
    let output = Command::new(exe)
        .args(args)
        .env("XDG_CONFIG_HOME", config_dir.path())
        .env("XDG_CACHE_HOME", cache_dir.path())
        .env("APPDATA", config_dir.path())
        .env("LOCALAPPDATA", cache_dir.path())
        .env("HOME", config_dir.path())
        .output()
        .expect("failed to run simcompare_cli");

    let code = output.status.code().unwrap_or(-1);
    assert!(
        code == 0 || code == 2,
        "command failed: {} (expected 0 or 2)\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout not utf-8");
    serde_json::from_str(&stdout).expect("invalid json output")
}

fn write_scores(dir: &Path, name: &str, scores: Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string(&scores).expect("serialize scores"))
        .expect("write score file");
    path
}

fn group_files(report: &Value, group: usize) -> Vec<String> {
    report["groups"][group]["files"]
        .as_array()
        .expect("files array missing")
        .iter()
        .map(|file| {
            let path = file["path"].as_str().unwrap_or("");
            Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect()
}

fn scores_arg(mode: &str, path: &Path) -> String {
    format!("{}={}", mode, path.display())
}

#[test]
fn test_single_mode_search_sorted_by_similarity() {
    let temp = TempDir::new().expect("temp dir");
    let clip = write_scores(
        temp.path(),
        "clip.json",
        json!({"b.png": 0.8, "a.png": 0.95, "c.png": 0.6}),
    );
    let clip_arg = scores_arg("clip_embedding", &clip);
    let base = temp.path().to_string_lossy().to_string();

    let report = run_cli_json(&["run", "--base-dir", &base, "--scores", &clip_arg, "--json"]);

    assert_eq!(report["primary_mode"], "clip_embedding");
    assert_eq!(report["composite"], false);
    assert_eq!(report["app_mode"], "search");
    assert_eq!(report["total_matches"], 3);
    assert_eq!(group_files(&report, 0), vec!["a.png", "b.png", "c.png"]);
}

#[test]
fn test_color_scores_sorted_ascending() {
    let temp = TempDir::new().expect("temp dir");
    let color = write_scores(
        temp.path(),
        "color.json",
        json!({"x.png": 12.0, "y.png": 3.5, "z.png": 7.0}),
    );
    let color_arg = scores_arg("color_matching", &color);
    let base = temp.path().to_string_lossy().to_string();

    let report = run_cli_json(&["run", "--base-dir", &base, "--scores", &color_arg, "--json"]);

    assert_eq!(group_files(&report, 0), vec!["y.png", "z.png", "x.png"]);
    let first_score = report["groups"][0]["files"][0]["score"].as_f64();
    assert_eq!(first_score, Some(3.5));
}

#[test]
fn test_composite_and_keeps_intersection() {
    let temp = TempDir::new().expect("temp dir");
    let clip = write_scores(
        temp.path(),
        "clip.json",
        json!({"a.png": 0.9, "b.png": 0.7, "c.png": 0.8}),
    );
    let siglip = write_scores(temp.path(), "siglip.json", json!({"a.png": 0.6, "b.png": 0.95}));
    let clip_arg = scores_arg("clip_embedding", &clip);
    let siglip_arg = scores_arg("siglip_embedding", &siglip);
    let base = temp.path().to_string_lossy().to_string();

    let report = run_cli_json(&[
        "run", "--base-dir", &base, "--scores", &clip_arg, "--scores", &siglip_arg, "--logic",
        "and", "--json",
    ]);

    assert_eq!(report["composite"], true);
    assert_eq!(report["combination_logic"], "and");
    assert_eq!(report["total_matches"], 2);
    // AND keeps the minimum score per file
    assert_eq!(group_files(&report, 0), vec!["b.png", "a.png"]);
    assert_eq!(report["mode_matches"]["clip_embedding"], 3);
    assert_eq!(report["mode_matches"]["siglip_embedding"], 2);
}

#[test]
fn test_composite_or_keeps_union() {
    let temp = TempDir::new().expect("temp dir");
    let clip = write_scores(temp.path(), "clip.json", json!({"a.png": 0.9}));
    let siglip = write_scores(temp.path(), "siglip.json", json!({"b.png": 0.95}));
    let clip_arg = scores_arg("clip_embedding", &clip);
    let siglip_arg = scores_arg("siglip_embedding", &siglip);
    let base = temp.path().to_string_lossy().to_string();

    let report = run_cli_json(&[
        "run", "--base-dir", &base, "--scores", &clip_arg, "--scores", &siglip_arg, "--logic",
        "or", "--json",
    ]);

    assert_eq!(report["combination_logic"], "or");
    assert_eq!(report["total_matches"], 2);
    assert_eq!(group_files(&report, 0), vec!["b.png", "a.png"]);
}

#[test]
fn test_primary_flag_selects_navigated_mode() {
    let temp = TempDir::new().expect("temp dir");
    let clip = write_scores(temp.path(), "clip.json", json!({"a.png": 0.9}));
    let color = write_scores(temp.path(), "color.json", json!({"a.png": 4.0}));
    let clip_arg = scores_arg("clip_embedding", &clip);
    let color_arg = scores_arg("color_matching", &color);
    let base = temp.path().to_string_lossy().to_string();

    let report = run_cli_json(&[
        "run", "--base-dir", &base, "--scores", &clip_arg, "--scores", &color_arg, "--primary",
        "color_matching", "--json",
    ]);

    assert_eq!(report["primary_mode"], "color_matching");
    assert_eq!(report["total_matches"], 1);
}

#[test]
fn test_empty_composite_reports_no_matches() {
    let temp = TempDir::new().expect("temp dir");
    let clip = write_scores(temp.path(), "clip.json", json!({"a.png": 0.9}));
    let siglip = write_scores(temp.path(), "siglip.json", json!({"b.png": 0.95}));
    let clip_arg = scores_arg("clip_embedding", &clip);
    let siglip_arg = scores_arg("siglip_embedding", &siglip);
    let base = temp.path().to_string_lossy().to_string();

    let report = run_cli_json(&[
        "run", "--base-dir", &base, "--scores", &clip_arg, "--scores", &siglip_arg, "--json",
    ]);

    assert_eq!(report["combination_logic"], "and");
    assert_eq!(report["total_matches"], 0);
    assert!(report["groups"].as_array().map_or(false, |groups| groups.is_empty()));
}

#[test]
fn test_group_run_lists_groups_in_ascending_order() {
    let temp = TempDir::new().expect("temp dir");
    let grouped = write_scores(
        temp.path(),
        "groups.json",
        json!({
            "groups": {
                "0": {"a.png": 0.4, "b.png": 0.1},
                "1": {"c.png": 0.9, "d.png": 0.3, "e.png": 0.5}
            }
        }),
    );
    let grouped_arg = scores_arg("clip_embedding", &grouped);
    let base = temp.path().to_string_lossy().to_string();

    let report = run_cli_json(&[
        "run", "--base-dir", &base, "--scores", &grouped_arg, "--group", "--json",
    ]);

    assert_eq!(report["app_mode"], "group");
    assert_eq!(report["total_matches"], 5);
    assert_eq!(group_files(&report, 0), vec!["b.png", "a.png"]);
    assert_eq!(group_files(&report, 1), vec!["d.png", "e.png", "c.png"]);
}

#[test]
fn test_remove_drops_file_from_results() {
    let temp = TempDir::new().expect("temp dir");
    let clip = write_scores(
        temp.path(),
        "clip.json",
        json!({"a.png": 0.9, "b.png": 0.8, "c.png": 0.7}),
    );
    let clip_arg = scores_arg("clip_embedding", &clip);
    let base = temp.path().to_string_lossy().to_string();

    let report = run_cli_json(&[
        "run", "--base-dir", &base, "--scores", &clip_arg, "--remove", "b.png", "--json",
    ]);

    assert_eq!(report["total_matches"], 2);
    assert_eq!(group_files(&report, 0), vec!["a.png", "c.png"]);
}

#[test]
fn test_threshold_filter_drops_weak_scores() {
    let temp = TempDir::new().expect("temp dir");
    let clip = write_scores(
        temp.path(),
        "clip.json",
        json!({"a.png": 0.9, "b.png": 0.8, "c.png": 0.7}),
    );
    let clip_arg = scores_arg("clip_embedding", &clip);
    let base = temp.path().to_string_lossy().to_string();

    let report = run_cli_json(&[
        "run",
        "--base-dir",
        &base,
        "--scores",
        &clip_arg,
        "--threshold",
        "0.8",
        "--filter-by-threshold",
        "--json",
    ]);

    assert_eq!(group_files(&report, 0), vec!["a.png", "b.png"]);
}
