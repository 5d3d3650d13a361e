// `kpiform edit`: JSONL edit ops on stdin, one JSON state per line on stdout.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn edit(args: &[&str], ops: &str) -> Output {
    let dir = TempDir::new().unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_kpiform"))
        .arg("--config")
        .arg(dir.path().join("settings.json"))
        .arg("edit")
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn kpiform edit");
    child.stdin.take().unwrap().write_all(ops.as_bytes()).unwrap();
    child.wait_with_output().expect("wait for kpiform edit")
}

fn states(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("bad state line {l:?}: {e}")))
        .collect()
}

#[test]
fn builds_formula_from_ops() {
    let ops = r#"{"op":"insert_metric","metric_id":"revenue","aggregate":"sum"}
{"op":"insert_char","char":"/"}

{"op":"insert_metric","metric_id":"calls","aggregate":"count"}
"#;
    let output = edit(&[], ops);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let states = states(&output);
    assert_eq!(states.len(), 3, "blank lines produce no state");
    assert_eq!(states[0]["formula"], "{ Sum(revenue) } ");
    assert_eq!(states[0]["tree"], serde_json::json!({"sum": "revenue"}));
    assert!(states[1]["tree"].is_null());
    assert!(states[1]["error"].is_string());
    assert_eq!(states[2]["formula"], "{ Sum(revenue) } / { Count(calls) } ");
    assert_eq!(
        states[2]["tree"],
        serde_json::json!({"divide": [{"sum": "revenue"}, {"count": "calls"}]})
    );
}

#[test]
fn rejected_op_is_reported_not_fatal() {
    let ops = r#"{"op":"insert_char","position":2,"char":"1"}
{"op":"delete_backward"}
"#;
    let output = edit(&["--formula", "{ orders }"], ops);
    assert!(output.status.success());

    let states = states(&output);
    assert_eq!(states[0]["applied"], false);
    assert_eq!(states[0]["rejected"], "position is inside a metric token");
    assert_eq!(states[0]["formula"], "{ orders }");

    // Cursor starts at the end, right after the token: backspace removes it whole.
    assert_eq!(states[1]["applied"], true);
    assert_eq!(states[1]["formula"], "");
    assert_eq!(states[1]["cursor"], 0);
}

#[test]
fn malformed_op_is_usage_error() {
    let output = edit(&[], "{\"op\":\"teleport\"}\n");
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 1"));
}
