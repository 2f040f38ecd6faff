//! Binary-level tests for the `moon` command.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

const SCHEMA: &str = r#"[
    {"name": "alert", "label": "Name", "kind": "text",
     "constraints": {"required": true, "message": "enter a name"}},
    {"name": "scope", "label": "Scope", "kind": "radio-group",
     "options": [{"value": "mine", "label": "Mine"}, {"value": "team", "label": "Team"}],
     "hints": {"default": "mine"}}
]"#;

fn file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn moon() -> Command {
    Command::cargo_bin("moon").unwrap()
}

#[test]
fn check_prints_field_table() {
    let schema = file(SCHEMA);

    moon()
        .arg("check")
        .arg(schema.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("radio-group"))
        .stdout(predicate::str::contains("Schema OK: 2 field(s) in 2 row(s)"));
}

#[test]
fn validate_invalid_record_exits_with_failure() {
    let schema = file(SCHEMA);
    let record = file(r#"{"scope": "team"}"#);

    moon()
        .args(["--format", "json", "validate"])
        .arg(schema.path())
        .arg(record.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"valid\": false"))
        .stderr(predicate::str::contains("record has 1 violation(s)"));
}

#[test]
fn list_reads_config_file() {
    let records = file(r#"[{"alert": "a"}, {"alert": "b"}, {"alert": "c"}]"#);
    let config = file(r#"{"debounce_ms": 0, "default_page_size": 2}"#);

    moon()
        .arg("--config")
        .arg(config.path())
        .args(["--format", "json", "list"])
        .arg(records.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 3"))
        .stdout(predicate::str::contains("\"pageSize\": 2"));
}

#[test]
fn missing_schema_reports_path() {
    moon()
        .args(["check", "/nonexistent/moon/schema.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read /nonexistent/moon/schema.json"));
}

#[test]
fn config_must_be_an_object() {
    let records = file(r#"[{"alert": "a"}]"#);
    let config = file("[0, 300000, 2]");

    moon()
        .arg("--config")
        .arg(config.path())
        .arg("list")
        .arg(records.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration must be a JSON object"));
}
