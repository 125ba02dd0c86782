use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

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
fn publish_filter_and_view_counter() {
    let workspace = temp_dir("campus-blog-posts");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let author = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "users.create",
        json!({ "name": "Wren Writer", "email": "wren@example.com", "role": "teacher" }),
    );
    let author_id = author
        .get("userId")
        .and_then(|v| v.as_str())
        .expect("userId")
        .to_string();

    let draft = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "posts.create",
        json!({
            "title": "Study Tips",
            "body": "Take breaks.",
            "authorId": author_id,
            "tags": ["study", "habits"]
        }),
    );
    let post_id = draft
        .get("postId")
        .and_then(|v| v.as_str())
        .expect("postId")
        .to_string();

    // Drafts stay out of the published listing.
    let published = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "posts.list",
        json!({ "publishedOnly": true }),
    );
    assert_eq!(
        published
            .get("posts")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );
    let all = request_ok(&mut stdin, &mut reader, "5", "posts.list", json!({}));
    assert_eq!(
        all.get("posts").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(1)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "posts.publish",
        json!({ "postId": post_id, "published": true }),
    );
    let published = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "posts.list",
        json!({ "publishedOnly": true }),
    );
    let posts = published
        .get("posts")
        .and_then(|v| v.as_array())
        .expect("posts");
    assert_eq!(posts.len(), 1);
    assert_eq!(
        posts[0].get("tags").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(2)
    );

    // Each read bumps the view counter.
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "posts.get",
        json!({ "postId": post_id }),
    );
    assert_eq!(first.get("viewCount").and_then(|v| v.as_i64()), Some(1));
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "posts.get",
        json!({ "postId": post_id }),
    );
    assert_eq!(second.get("viewCount").and_then(|v| v.as_i64()), Some(2));

    // Update, then delete.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "posts.update",
        json!({ "postId": post_id, "patch": { "title": "Better Study Tips" } }),
    );
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "posts.get",
        json!({ "postId": post_id }),
    );
    assert_eq!(
        got.get("title").and_then(|v| v.as_str()),
        Some("Better Study Tips")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "posts.delete",
        json!({ "postId": post_id }),
    );
    let all = request_ok(&mut stdin, &mut reader, "13", "posts.list", json!({}));
    assert_eq!(
        all.get("posts").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
