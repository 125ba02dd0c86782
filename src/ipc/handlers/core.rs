use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::routes;
use crate::theme::{PrefsPatch, UiPrefs};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::path::PathBuf;

const PREFS_SETTINGS_KEY: &str = "ui.prefs";

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            // A fresh workspace means a fresh UI session.
            state.session.logout();
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn load_prefs(conn: &Connection) -> UiPrefs {
    match db::settings_get_json(conn, PREFS_SETTINGS_KEY) {
        Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
        _ => UiPrefs::default(),
    }
}

fn handle_prefs_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let prefs = match state.db.as_ref() {
        Some(conn) => load_prefs(conn),
        None => UiPrefs::default(),
    };
    match serde_json::to_value(&prefs) {
        Ok(value) => ok(&req.id, json!({ "prefs": value })),
        Err(e) => err(&req.id, "bad_state", e.to_string(), None),
    }
}

fn handle_prefs_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let patch: PrefsPatch = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => {
            return err(
                &req.id,
                "bad_params",
                format!("invalid prefs patch: {}", e),
                None,
            )
        }
    };

    let next = load_prefs(conn).apply(patch);
    let value = match serde_json::to_value(&next) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_state", e.to_string(), None),
    };
    if let Err(e) = db::settings_set_json(conn, PREFS_SETTINGS_KEY, &value) {
        return err(&req.id, "db_update_failed", format!("{e:?}"), None);
    }
    ok(&req.id, json!({ "prefs": value }))
}

fn resolve_param_label(conn: &Connection, param: &str, raw: &str) -> Option<String> {
    let sql = match param {
        "courseId" => "SELECT title FROM courses WHERE id = ?",
        "lessonId" => "SELECT title FROM lessons WHERE id = ?",
        "quizId" => "SELECT title FROM quizzes WHERE id = ?",
        "postId" => "SELECT title FROM blog_posts WHERE id = ?",
        "productId" => "SELECT name FROM products WHERE id = ?",
        _ => return None,
    };
    conn.query_row(sql, [raw], |r| r.get::<_, String>(0))
        .optional()
        .ok()
        .flatten()
}

fn handle_nav_breadcrumbs(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match req.params.get("path").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing path", None),
    };

    let mut trail = routes::breadcrumb_trail(path);
    if let Some(conn) = state.db.as_ref() {
        for crumb in trail.iter_mut() {
            let Some(param) = crumb.param else {
                continue;
            };
            if let Some(label) = resolve_param_label(conn, param, &crumb.label) {
                crumb.label = label;
            }
        }
    }

    match serde_json::to_value(&trail) {
        Ok(crumbs) => ok(&req.id, json!({ "crumbs": crumbs })),
        Err(e) => err(&req.id, "bad_state", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "prefs.get" => Some(handle_prefs_get(state, req)),
        "prefs.set" => Some(handle_prefs_set(state, req)),
        "nav.breadcrumbs" => Some(handle_nav_breadcrumbs(state, req)),
        _ => None,
    }
}
