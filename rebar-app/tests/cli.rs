use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

fn command(workdir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("rebar-schedule").expect("binary");
    cmd.env_remove("REBAR_CONFIG")
        .env_remove("RUST_LOG")
        .current_dir(workdir.path());
    cmd
}

#[test]
fn prints_zone_tables_and_fingerprint() {
    let dir = tempfile::tempdir().expect("create temp dir");
    command(&dir)
        .arg(fixture("single_zone.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("== 區域 2F (3 筆) =="))
        .stdout(predicate::str::contains("1 筆未落在任何區域"))
        .stdout(predicate::str::contains("略過 1 筆格式錯誤的標註"))
        .stdout(predicate::str::contains("合計: 3 筆, 20 支"))
        .stdout(predicate::str::is_match("指紋: [0-9a-f]{64}").expect("regex"));
}

#[test]
fn quiet_mode_prints_only_the_summary() {
    let dir = tempfile::tempdir().expect("create temp dir");
    command(&dir)
        .arg(fixture("single_zone.json"))
        .arg("--quiet")
        .assert()
        .success()
        .stdout(predicate::str::contains("== 區域").not())
        .stdout(predicate::str::contains("== 號數彙總 =="))
        .stdout(predicate::str::contains("指紋: "));
}

#[test]
fn output_file_contains_schedule_and_layouts() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let output = dir.path().join("schedule.json");
    command(&dir)
        .arg(fixture("single_zone.json"))
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let written = std::fs::read_to_string(&output).expect("read output");
    let value: serde_json::Value = serde_json::from_str(&written).expect("decode output");
    assert_eq!(value["layouts"].as_array().map(Vec::len), Some(3));
    assert_eq!(value["totals"]["records"], 3);
    assert_eq!(value["fingerprint"].as_str().map(str::len), Some(64));
    assert!(
        value["source"]
            .as_str()
            .is_some_and(|source| source.ends_with("single_zone.json"))
    );
}

#[test]
fn missing_input_fails_with_message() {
    let dir = tempfile::tempdir().expect("create temp dir");
    command(&dir)
        .arg("no_such_drawing.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("讀取圖元快照"));
}

#[test]
fn config_file_overrides_default_zone() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = dir.path().join("custom.toml");
    std::fs::write(&config, "[schedule]\ndefault_zone = \"場外\"\n").expect("write config");

    command(&dir)
        .arg(fixture("unzoned.json"))
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("== 區域 場外 (3 筆) =="))
        .stdout(predicate::str::contains("== 區域 ALL").not());
}

#[test]
fn discovered_config_in_working_directory_is_used() {
    let dir = tempfile::tempdir().expect("create temp dir");
    std::fs::create_dir(dir.path().join("config")).expect("create config dir");
    std::fs::write(
        dir.path().join("config").join("default.toml"),
        "[schedule]\ndefault_zone = \"未分區\"\n",
    )
    .expect("write config");

    command(&dir)
        .arg(fixture("unzoned.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("== 區域 未分區 (3 筆) =="));
}
