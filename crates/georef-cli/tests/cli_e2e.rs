use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const DUMP: &str = "\
-- MySQL dump 10.13
DROP TABLE IF EXISTS `states`;
INSERT INTO `states` VALUES (1,'Lagos State','LA'),(2,'Ogun State','OG');
INSERT INTO `lgas` VALUES (10,1,'Ikeja','IKJ'),(11,2,'Abeokuta North','ABN');
INSERT INTO `wards` VALUES (100,10,'Alausa','ALA'),(101,11,'Ikija','IKI');
INSERT INTO `polling_units` VALUES (1000,100,'Secretariat Gate','001'),(1001,101,'Town Hall','002');
";

fn georef_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_georef"))
}

fn run(args: &[&str]) -> Output {
    Command::new(georef_bin())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run georef")
}

fn write_dump(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("dump.sql");
    fs::write(&path, contents).expect("write dump");
    path
}

fn read_summary(path: &Path) -> serde_json::Value {
    let text = fs::read_to_string(path).expect("read summary");
    serde_json::from_str(&text).expect("parse summary")
}

fn level_field(summary: &serde_json::Value, level: &str, field: &str) -> u64 {
    summary["levels"]
        .as_array()
        .expect("levels array")
        .iter()
        .find(|l| l["level"] == level)
        .unwrap_or_else(|| panic!("level {level} missing"))[field]
        .as_u64()
        .expect("numeric field")
}

#[test]
fn import_then_reimport_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let dump = write_dump(dir.path(), DUMP);
    let store = dir.path().join("store.json");
    let summary = dir.path().join("summary.json");

    for _ in 0..2 {
        let out = run(&[
            "import",
            dump.to_str().unwrap(),
            "--store",
            store.to_str().unwrap(),
            "--summary-json",
            summary.to_str().unwrap(),
            "--batch-size",
            "1",
        ]);
        assert!(
            out.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&out.stderr)
        );
    }

    let summary = read_summary(&summary);
    assert_eq!(summary["cancelled"], false);
    for level in ["region", "sub_region", "area", "unit"] {
        assert_eq!(level_field(&summary, level, "created"), 0);
        assert_eq!(level_field(&summary, level, "updated"), 0);
        assert_eq!(level_field(&summary, level, "unchanged"), 2);
    }

    let snapshot: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&store).unwrap()).unwrap();
    assert_eq!(snapshot["entities"].as_array().unwrap().len(), 8);
}

#[test]
fn strict_mode_exits_2_when_rows_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let dump = write_dump(
        dir.path(),
        &format!("{DUMP}INSERT INTO `lgas` VALUES (12,99,'Nowhere','NWH');\n"),
    );

    let lenient = run(&["import", dump.to_str().unwrap(), "--dry-run"]);
    assert!(lenient.status.success());

    let strict = run(&["import", dump.to_str().unwrap(), "--dry-run", "--strict"]);
    assert_eq!(strict.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&strict.stdout).contains("row(s) skipped"));
}

#[test]
fn dry_run_leaves_no_store_behind() {
    let dir = tempfile::tempdir().unwrap();
    let dump = write_dump(dir.path(), DUMP);
    let store = dir.path().join("store.json");

    let out = run(&[
        "import",
        dump.to_str().unwrap(),
        "--store",
        store.to_str().unwrap(),
        "--dry-run",
    ]);
    assert!(out.status.success());
    assert!(!store.exists());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("dry run"));
    assert!(stdout.contains("polling_units"));
}

#[test]
fn missing_dump_fails_with_exit_1() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&[
        "import",
        dir.path().join("absent.sql").to_str().unwrap(),
        "--dry-run",
    ]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("error:"));
}

#[test]
fn store_is_required_without_dry_run() {
    let dir = tempfile::tempdir().unwrap();
    let dump = write_dump(dir.path(), DUMP);
    let out = run(&["import", dump.to_str().unwrap()]);
    assert!(!out.status.success());
}

#[test]
fn printed_default_config_round_trips_through_import() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&["config"]);
    assert!(out.status.success());
    let config: serde_json::Value = serde_json::from_slice(&out.stdout).expect("config JSON");
    assert_eq!(config["batch_size"], 500);
    assert_eq!(config["levels"].as_array().unwrap().len(), 4);

    let config_path = dir.path().join("config.json");
    fs::write(&config_path, &out.stdout).unwrap();
    let dump = write_dump(dir.path(), DUMP);
    let out = run(&[
        "import",
        dump.to_str().unwrap(),
        "--dry-run",
        "--config",
        config_path.to_str().unwrap(),
    ]);
    assert!(out.status.success());
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, r#"{"concurrency": 0}"#).unwrap();
    let dump = write_dump(dir.path(), DUMP);
    let out = run(&[
        "import",
        dump.to_str().unwrap(),
        "--dry-run",
        "--config",
        config_path.to_str().unwrap(),
    ]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("concurrency"));
}

#[test]
fn inspect_lists_tables_in_dump_order() {
    let dir = tempfile::tempdir().unwrap();
    let dump = write_dump(dir.path(), DUMP);
    let out = run(&["inspect", dump.to_str().unwrap()]);
    assert!(out.status.success());

    let stdout = String::from_utf8_lossy(&out.stdout);
    let pos = |t: &str| stdout.find(t).unwrap_or_else(|| panic!("{t} not listed"));
    assert!(pos("states") < pos("lgas"));
    assert!(pos("lgas") < pos("wards"));
    assert!(pos("wards") < pos("polling_units"));
}
