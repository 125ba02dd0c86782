use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn grade_compute_applies_negative_marking() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // The grade tool works without a workspace; it is pure arithmetic.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grade.compute",
        json!({ "correct": 10, "wrong": 6, "blank": 4, "total": 20 }),
    );
    assert_eq!(res.get("negativePoints").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(res.get("netCorrect").and_then(|v| v.as_i64()), Some(8));
    assert_eq!(
        res.get("finalPercentage").and_then(|v| v.as_f64()),
        Some(40.0)
    );
    assert_eq!(res.get("mismatch").and_then(|v| v.as_bool()), Some(false));

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grade.compute",
        json!({ "correct": 20, "wrong": 0, "blank": 0, "total": 20 }),
    );
    assert_eq!(
        res.get("finalPercentage").and_then(|v| v.as_f64()),
        Some(100.0)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn grade_compute_allows_negative_scores() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grade.compute",
        json!({ "correct": 0, "wrong": 30, "blank": 0, "total": 20 }),
    );
    assert_eq!(res.get("negativePoints").and_then(|v| v.as_i64()), Some(10));
    assert_eq!(res.get("netCorrect").and_then(|v| v.as_i64()), Some(-10));
    assert_eq!(
        res.get("finalPercentage").and_then(|v| v.as_f64()),
        Some(-50.0)
    );
    // 0 + 30 + 0 != 20, so the tool warns.
    assert_eq!(res.get("mismatch").and_then(|v| v.as_bool()), Some(true));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn grade_compute_coerces_malformed_input() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // Unparsable counts become 0; total is floored at 1 by the form layer.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "grade.compute",
        json!({ "correct": "7", "wrong": "oops", "blank": null, "total": -3 }),
    );
    let input = res.get("input").expect("echoed input");
    assert_eq!(input.get("correct").and_then(|v| v.as_i64()), Some(7));
    assert_eq!(input.get("wrong").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(input.get("blank").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(input.get("total").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(
        res.get("finalPercentage").and_then(|v| v.as_f64()),
        Some(700.0)
    );

    // Missing params entirely still answers.
    let res = request_ok(&mut stdin, &mut reader, "2", "grade.compute", json!({}));
    assert_eq!(res.get("netCorrect").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(
        res.get("finalPercentage").and_then(|v| v.as_f64()),
        Some(0.0)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn grade_compute_is_repeatable() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let params = json!({ "correct": 11, "wrong": 7, "blank": 2, "total": 20 });
    let first = request_ok(&mut stdin, &mut reader, "1", "grade.compute", params.clone());
    let second = request_ok(&mut stdin, &mut reader, "2", "grade.compute", params);
    assert_eq!(first, second);

    drop(stdin);
    let _ = child.wait();
}
