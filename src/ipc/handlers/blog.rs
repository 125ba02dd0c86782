use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn tags_to_text(tags: Option<&serde_json::Value>) -> Option<String> {
    let tags = tags?.as_array()?;
    let parts: Vec<&str> = tags.iter().filter_map(|t| t.as_str()).collect();
    Some(parts.join(","))
}

fn tags_to_json(text: &str) -> serde_json::Value {
    let parts: Vec<&str> = text.split(',').filter(|t| !t.is_empty()).collect();
    json!(parts)
}

fn handle_posts_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "posts": [] }));
    };
    let published_only = req
        .params
        .get("publishedOnly")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let sql = if published_only {
        "SELECT p.id, p.title, p.author_id, u.name, p.tags, p.published, p.view_count, p.created_at, p.updated_at
         FROM blog_posts p
         LEFT JOIN users u ON u.id = p.author_id
         WHERE p.published = 1
         ORDER BY p.created_at DESC"
    } else {
        "SELECT p.id, p.title, p.author_id, u.name, p.tags, p.published, p.view_count, p.created_at, p.updated_at
         FROM blog_posts p
         LEFT JOIN users u ON u.id = p.author_id
         ORDER BY p.created_at DESC"
    };

    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let author_id: Option<String> = row.get(2)?;
            let author_name: Option<String> = row.get(3)?;
            let tags: String = row.get(4)?;
            let published: i64 = row.get(5)?;
            let view_count: i64 = row.get(6)?;
            let created_at: Option<String> = row.get(7)?;
            let updated_at: Option<String> = row.get(8)?;
            Ok(json!({
                "id": id,
                "title": title,
                "authorId": author_id,
                "authorName": author_name,
                "tags": tags_to_json(&tags),
                "published": published != 0,
                "viewCount": view_count,
                "createdAt": created_at,
                "updatedAt": updated_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(posts) => ok(&req.id, json!({ "posts": posts })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_posts_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let post_id = match req.params.get("postId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing postId", None),
    };

    let row: Option<(String, String, Option<String>, String, i64, i64)> = match conn
        .query_row(
            "SELECT title, body, author_id, tags, published, view_count
             FROM blog_posts WHERE id = ?",
            [&post_id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                ))
            },
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let Some((title, body, author_id, tags, published, view_count)) = row else {
        return err(&req.id, "not_found", "post not found", None);
    };

    // Reading a post counts a view.
    if let Err(e) = conn.execute(
        "UPDATE blog_posts SET view_count = view_count + 1 WHERE id = ?",
        [&post_id],
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "id": post_id,
            "title": title,
            "body": body,
            "authorId": author_id,
            "tags": tags_to_json(&tags),
            "published": published != 0,
            "viewCount": view_count + 1
        }),
    )
}

fn handle_posts_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let title = match req.params.get("title").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing title", None),
    };
    if title.is_empty() {
        return err(&req.id, "bad_params", "title must not be empty", None);
    }
    let body = match req.params.get("body").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing body", None),
    };
    let author_id = req
        .params
        .get("authorId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let tags = tags_to_text(req.params.get("tags")).unwrap_or_default();

    let post_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO blog_posts(id, title, body, author_id, tags, published, view_count, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, 0, 0, ?, ?)",
        (&post_id, &title, &body, &author_id, &tags, &now, &now),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "blog_posts" })),
        );
    }

    ok(&req.id, json!({ "postId": post_id, "title": title }))
}

fn handle_posts_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let post_id = match req.params.get("postId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing postId", None),
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch object", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM blog_posts WHERE id = ?", [&post_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "post not found", None);
    }

    if let Some(title) = patch.get("title").and_then(|v| v.as_str()) {
        let title = title.trim();
        if title.is_empty() {
            return err(&req.id, "bad_params", "title must not be empty", None);
        }
        if let Err(e) = conn.execute(
            "UPDATE blog_posts SET title = ? WHERE id = ?",
            (title, &post_id),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if let Some(body) = patch.get("body").and_then(|v| v.as_str()) {
        if let Err(e) = conn.execute(
            "UPDATE blog_posts SET body = ? WHERE id = ?",
            (body, &post_id),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if let Some(tags) = tags_to_text(patch.get("tags")) {
        if let Err(e) = conn.execute(
            "UPDATE blog_posts SET tags = ? WHERE id = ?",
            (&tags, &post_id),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    let now = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "UPDATE blog_posts SET updated_at = ? WHERE id = ?",
        (&now, &post_id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_posts_publish(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let post_id = match req.params.get("postId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing postId", None),
    };
    let published = match req.params.get("published").and_then(|v| v.as_bool()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing published flag", None),
    };

    let changed = match conn.execute(
        "UPDATE blog_posts SET published = ?, updated_at = ? WHERE id = ?",
        (
            published as i64,
            Utc::now().to_rfc3339(),
            &post_id,
        ),
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if changed == 0 {
        return err(&req.id, "not_found", "post not found", None);
    }

    ok(&req.id, json!({ "ok": true, "published": published }))
}

fn handle_posts_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let post_id = match req.params.get("postId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing postId", None),
    };

    let deleted = match conn.execute("DELETE FROM blog_posts WHERE id = ?", [&post_id]) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "blog_posts" })),
            )
        }
    };
    if deleted == 0 {
        return err(&req.id, "not_found", "post not found", None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "posts.list" => Some(handle_posts_list(state, req)),
        "posts.get" => Some(handle_posts_get(state, req)),
        "posts.create" => Some(handle_posts_create(state, req)),
        "posts.update" => Some(handle_posts_update(state, req)),
        "posts.publish" => Some(handle_posts_publish(state, req)),
        "posts.delete" => Some(handle_posts_delete(state, req)),
        _ => None,
    }
}
