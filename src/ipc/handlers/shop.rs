use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    fn db(e: impl std::fmt::Display) -> Self {
        HandlerErr::new("db_query_failed", e.to_string())
    }

    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

fn require_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn products_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let _ = params;
    let conn = require_conn(state)?;
    let mut stmt = conn
        .prepare(
            "SELECT p.id, p.name, p.price_cents, p.course_id, c.title
             FROM products p
             LEFT JOIN courses c ON c.id = p.course_id
             ORDER BY p.name",
        )
        .map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let price_cents: i64 = r.get(2)?;
            let course_id: Option<String> = r.get(3)?;
            let course_title: Option<String> = r.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "priceCents": price_cents,
                "courseId": course_id,
                "courseTitle": course_title
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    Ok(json!({ "products": rows }))
}

fn products_create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let name = get_required_str(params, "name")?;
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::new("bad_params", "name must not be empty"));
    }
    let Some(price_cents) = params.get("priceCents").and_then(|v| v.as_i64()) else {
        return Err(HandlerErr::new("bad_params", "missing priceCents"));
    };
    if price_cents < 0 {
        return Err(HandlerErr::new("bad_params", "priceCents must be >= 0"));
    }
    let course_id = params
        .get("courseId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    if let Some(ref cid) = course_id {
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM courses WHERE id = ?", [cid], |r| r.get(0))
            .optional()
            .map_err(HandlerErr::db)?;
        if exists.is_none() {
            return Err(HandlerErr::new("not_found", "course not found"));
        }
    }

    let product_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO products(id, name, price_cents, course_id, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (&product_id, &name, price_cents, &course_id, &created_at),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "products" })),
    })?;

    Ok(json!({ "productId": product_id, "name": name }))
}

fn products_delete(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let product_id = get_required_str(params, "productId")?;
    let conn = require_conn(state)?;

    let ordered: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM order_items WHERE product_id = ?",
            [&product_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;
    if ordered > 0 {
        return Err(HandlerErr::new(
            "bad_state",
            "product has order history and cannot be deleted",
        ));
    }

    let deleted = conn
        .execute("DELETE FROM products WHERE id = ?", [&product_id])
        .map_err(|e| HandlerErr {
            code: "db_delete_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "products" })),
        })?;
    if deleted == 0 {
        return Err(HandlerErr::new("not_found", "product not found"));
    }

    // Drop any cart line still pointing at it.
    state.session.cart_remove(&product_id);

    Ok(json!({ "ok": true }))
}

fn priced_cart(state: &AppState) -> Result<(Vec<serde_json::Value>, i64), HandlerErr> {
    let conn = require_conn(state)?;
    let mut lines = Vec::new();
    let mut total_cents = 0_i64;

    for line in state.session.cart_lines() {
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT name, price_cents FROM products WHERE id = ?",
                [&line.product_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
            .map_err(HandlerErr::db)?;
        let Some((name, price_cents)) = row else {
            // Product removed since it was added; show the line as dead
            // rather than silently repricing the cart.
            lines.push(json!({
                "productId": line.product_id,
                "quantity": line.quantity,
                "missing": true
            }));
            continue;
        };
        let line_total = price_cents * line.quantity;
        total_cents += line_total;
        lines.push(json!({
            "productId": line.product_id,
            "name": name,
            "quantity": line.quantity,
            "unitPriceCents": price_cents,
            "lineTotalCents": line_total
        }));
    }

    Ok((lines, total_cents))
}

fn cart_get(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let _ = params;
    let (lines, total_cents) = priced_cart(state)?;
    Ok(json!({ "lines": lines, "totalCents": total_cents }))
}

fn cart_add(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let product_id = get_required_str(params, "productId")?;
    let quantity = params
        .get("quantity")
        .and_then(|v| v.as_i64())
        .unwrap_or(1);

    {
        let conn = require_conn(state)?;
        let exists: Option<i64> = conn
            .query_row("SELECT 1 FROM products WHERE id = ?", [&product_id], |r| {
                r.get(0)
            })
            .optional()
            .map_err(HandlerErr::db)?;
        if exists.is_none() {
            return Err(HandlerErr::new("not_found", "product not found"));
        }
    }

    state.session.cart_add(&product_id, quantity);
    let (lines, total_cents) = priced_cart(state)?;
    Ok(json!({ "lines": lines, "totalCents": total_cents }))
}

fn cart_remove(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let product_id = get_required_str(params, "productId")?;
    if !state.session.cart_remove(&product_id) {
        return Err(HandlerErr::new("not_found", "product not in cart"));
    }
    let (lines, total_cents) = priced_cart(state)?;
    Ok(json!({ "lines": lines, "totalCents": total_cents }))
}

fn cart_clear(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let _ = params;
    state.session.cart_clear();
    Ok(json!({ "lines": [], "totalCents": 0 }))
}

fn cart_checkout(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let _ = params;
    let user_id = state
        .session
        .current_user()
        .map(|u| u.user_id.clone())
        .ok_or_else(|| HandlerErr::new("bad_state", "log in before checking out"))?;
    if state.session.cart_is_empty() {
        return Err(HandlerErr::new("bad_state", "cart is empty"));
    }
    let cart: Vec<(String, i64)> = state
        .session
        .cart_lines()
        .iter()
        .map(|l| (l.product_id.clone(), l.quantity))
        .collect();

    let conn = require_conn(state)?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    let order_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    let mut total_cents = 0_i64;
    let mut enrolled_course_ids: Vec<String> = Vec::new();

    for (product_id, quantity) in &cart {
        let row: Option<(String, i64, Option<String>)> = tx
            .query_row(
                "SELECT name, price_cents, course_id FROM products WHERE id = ?",
                [product_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .map_err(HandlerErr::db)?;
        let Some((name, price_cents, course_id)) = row else {
            let _ = tx.rollback();
            return Err(HandlerErr::new(
                "not_found",
                format!("product {} no longer exists", product_id),
            ));
        };

        let item_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO order_items(id, order_id, product_id, product_name, unit_price_cents, quantity)
             VALUES(?, ?, ?, ?, ?, ?)",
            (&item_id, &order_id, product_id, &name, price_cents, quantity),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "order_items" })),
        })?;
        total_cents += price_cents * quantity;

        // Buying a course product enrolls the buyer.
        if let Some(course_id) = course_id {
            tx.execute(
                "INSERT INTO enrollments(course_id, student_id, enrolled_at) VALUES(?, ?, ?)
                 ON CONFLICT(course_id, student_id) DO NOTHING",
                (&course_id, &user_id, &created_at),
            )
            .map_err(|e| HandlerErr {
                code: "db_insert_failed",
                message: e.to_string(),
                details: Some(json!({ "table": "enrollments" })),
            })?;
            enrolled_course_ids.push(course_id);
        }
    }

    tx.execute(
        "INSERT INTO orders(id, user_id, total_cents, created_at) VALUES(?, ?, ?, ?)",
        (&order_id, &user_id, total_cents, &created_at),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "orders" })),
    })?;

    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    state.session.cart_clear();

    Ok(json!({
        "orderId": order_id,
        "totalCents": total_cents,
        "itemCount": cart.len(),
        "enrolledCourseIds": enrolled_course_ids,
        "createdAt": created_at
    }))
}

fn orders_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = params
        .get("userId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let orders: Vec<(String, String, i64, Option<String>)> = if let Some(ref uid) = user_id {
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, total_cents, created_at
                 FROM orders WHERE user_id = ?
                 ORDER BY created_at DESC",
            )
            .map_err(HandlerErr::db)?;
        let rows = stmt
            .query_map([uid], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(HandlerErr::db)?;
        rows
    } else {
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, total_cents, created_at
                 FROM orders
                 ORDER BY created_at DESC",
            )
            .map_err(HandlerErr::db)?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(HandlerErr::db)?;
        rows
    };

    let mut items_stmt = conn
        .prepare(
            "SELECT product_id, product_name, unit_price_cents, quantity
             FROM order_items WHERE order_id = ?",
        )
        .map_err(HandlerErr::db)?;

    let mut out = Vec::new();
    for (id, uid, total_cents, created_at) in orders {
        let items = items_stmt
            .query_map([&id], |r| {
                let product_id: String = r.get(0)?;
                let product_name: String = r.get(1)?;
                let unit_price_cents: i64 = r.get(2)?;
                let quantity: i64 = r.get(3)?;
                Ok(json!({
                    "productId": product_id,
                    "productName": product_name,
                    "unitPriceCents": unit_price_cents,
                    "quantity": quantity
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(HandlerErr::db)?;
        out.push(json!({
            "id": id,
            "userId": uid,
            "totalCents": total_cents,
            "createdAt": created_at,
            "items": items
        }));
    }

    Ok(json!({ "orders": out }))
}

type Handler = fn(&mut AppState, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: Handler = match req.method.as_str() {
        "products.list" => products_list,
        "products.create" => products_create,
        "products.delete" => products_delete,
        "cart.get" => cart_get,
        "cart.add" => cart_add,
        "cart.remove" => cart_remove,
        "cart.clear" => cart_clear,
        "cart.checkout" => cart_checkout,
        "orders.list" => orders_list,
        _ => return None,
    };

    let params = req.params.clone();
    Some(match handler(state, &params) {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    })
}
