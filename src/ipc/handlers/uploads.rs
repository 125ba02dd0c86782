use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use anyhow::Context;
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use uuid::Uuid;

struct StoredUpload {
    stored_name: String,
    byte_size: u64,
    sha256: String,
}

/// Copies the source file into the workspace uploads directory under a
/// fresh UUID name (original extension preserved) and hashes it on the way.
fn store_upload(workspace: &Path, src: &Path) -> anyhow::Result<StoredUpload> {
    let uploads_dir = workspace.join("uploads");
    std::fs::create_dir_all(&uploads_dir).context("failed to create uploads dir")?;

    let ext = src
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    let stored_name = format!("{}{}", Uuid::new_v4(), ext);
    let dst = uploads_dir.join(&stored_name);

    let mut src_file = File::open(src)
        .with_context(|| format!("failed to open source file {}", src.to_string_lossy()))?;
    let mut dst_file = File::create(&dst)
        .with_context(|| format!("failed to create upload {}", dst.to_string_lossy()))?;

    let mut hasher = Sha256::new();
    let mut byte_size = 0_u64;
    let mut buf = [0_u8; 64 * 1024];
    loop {
        let n = src_file.read(&mut buf).context("failed to read source file")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        std::io::Write::write_all(&mut dst_file, &buf[..n])
            .context("failed to write upload data")?;
        byte_size += n as u64;
    }

    Ok(StoredUpload {
        stored_name,
        byte_size,
        sha256: format!("{:x}", hasher.finalize()),
    })
}

fn handle_uploads_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(workspace), Some(conn)) = (state.workspace.as_ref(), state.db.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let src = match req.params.get("path").and_then(|v| v.as_str()) {
        Some(v) => std::path::PathBuf::from(v),
        None => return err(&req.id, "bad_params", "missing path", None),
    };
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            format!("no such file: {}", src.to_string_lossy()),
            None,
        );
    }
    let kind = match req.params.get("kind").and_then(|v| v.as_str()) {
        Some("file") => "file",
        Some("video") => "video",
        Some(other) => {
            return err(
                &req.id,
                "bad_params",
                format!("kind must be file or video, got {}", other),
                None,
            )
        }
        None => return err(&req.id, "bad_params", "missing kind", None),
    };
    let owner_id = req
        .params
        .get("ownerId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let original_name = src
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    let stored = match store_upload(workspace, &src) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "io_failed", format!("{e:?}"), None),
    };

    let upload_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO uploads(id, kind, original_name, stored_name, byte_size, sha256, owner_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &upload_id,
            kind,
            &original_name,
            &stored.stored_name,
            stored.byte_size as i64,
            &stored.sha256,
            &owner_id,
            &created_at,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "uploads" })),
        );
    }

    ok(
        &req.id,
        json!({
            "uploadId": upload_id,
            "kind": kind,
            "originalName": original_name,
            "storedName": stored.stored_name,
            "byteSize": stored.byte_size,
            "sha256": stored.sha256
        }),
    )
}

fn handle_uploads_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "uploads": [] }));
    };
    let kind = req.params.get("kind").and_then(|v| v.as_str());

    let sql = match kind {
        Some(_) => {
            "SELECT id, kind, original_name, stored_name, byte_size, sha256, owner_id, created_at
             FROM uploads WHERE kind = ?
             ORDER BY created_at DESC"
        }
        None => {
            "SELECT id, kind, original_name, stored_name, byte_size, sha256, owner_id, created_at
             FROM uploads
             ORDER BY created_at DESC"
        }
    };

    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        let id: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let original_name: String = row.get(2)?;
        let stored_name: String = row.get(3)?;
        let byte_size: i64 = row.get(4)?;
        let sha256: String = row.get(5)?;
        let owner_id: Option<String> = row.get(6)?;
        let created_at: Option<String> = row.get(7)?;
        Ok(json!({
            "id": id,
            "kind": kind,
            "originalName": original_name,
            "storedName": stored_name,
            "byteSize": byte_size,
            "sha256": sha256,
            "ownerId": owner_id,
            "createdAt": created_at
        }))
    };

    let rows = match kind {
        Some(k) => stmt
            .query_map([k], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    };

    match rows {
        Ok(uploads) => ok(&req.id, json!({ "uploads": uploads })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_uploads_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (Some(workspace), Some(conn)) = (state.workspace.as_ref(), state.db.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let upload_id = match req.params.get("uploadId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing uploadId", None),
    };

    let stored_name: Option<String> = match conn
        .query_row(
            "SELECT stored_name FROM uploads WHERE id = ?",
            [&upload_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(stored_name) = stored_name else {
        return err(&req.id, "not_found", "upload not found", None);
    };

    let referenced: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM lessons WHERE video_upload_id = ?",
        [&upload_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if referenced > 0 {
        return err(
            &req.id,
            "bad_state",
            "upload is attached to a lesson and cannot be deleted",
            None,
        );
    }

    if let Err(e) = conn.execute("DELETE FROM uploads WHERE id = ?", [&upload_id]) {
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "uploads" })),
        );
    }

    // Row first, then file: a missing file is tolerable, an orphaned row is
    // not.
    let stored_path = workspace.join("uploads").join(&stored_name);
    if stored_path.is_file() {
        let _ = std::fs::remove_file(&stored_path);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "uploads.register" => Some(handle_uploads_register(state, req)),
        "uploads.list" => Some(handle_uploads_list(state, req)),
        "uploads.delete" => Some(handle_uploads_delete(state, req)),
        _ => None,
    }
}
