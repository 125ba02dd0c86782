use crate::grading;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

struct HandlerErr {
    code: &'static str,
    message: String,
}

impl HandlerErr {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
        }
    }

    fn db(e: impl std::fmt::Display) -> Self {
        HandlerErr::new("db_query_failed", e.to_string())
    }

    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, None)
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

fn user_role(conn: &Connection, user_id: &str) -> Result<Option<String>, HandlerErr> {
    conn.query_row("SELECT role FROM users WHERE id = ?", [user_id], |r| {
        r.get(0)
    })
    .optional()
    .map_err(HandlerErr::db)
}

fn dashboard_teacher(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    if user_role(conn, &teacher_id)?.is_none() {
        return Err(HandlerErr::new("not_found", "teacher not found"));
    }

    let mut courses_stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.title,
               (SELECT COUNT(*) FROM lessons l WHERE l.course_id = c.id) AS lesson_count,
               (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS enrollment_count
             FROM courses c
             WHERE c.teacher_id = ?
             ORDER BY c.title",
        )
        .map_err(HandlerErr::db)?;
    let courses = courses_stmt
        .query_map([&teacher_id], |r| {
            let id: String = r.get(0)?;
            let title: String = r.get(1)?;
            let lesson_count: i64 = r.get(2)?;
            let enrollment_count: i64 = r.get(3)?;
            Ok(json!({
                "id": id,
                "title": title,
                "lessonCount": lesson_count,
                "enrollmentCount": enrollment_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let total_enrollments: i64 = conn
        .query_row(
            "SELECT COUNT(*)
             FROM enrollments e
             JOIN courses c ON c.id = e.course_id
             WHERE c.teacher_id = ?",
            [&teacher_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;

    let mut quizzes_stmt = conn
        .prepare(
            "SELECT
               q.id,
               q.title,
               q.course_id,
               (SELECT COUNT(*) FROM quiz_submissions qs WHERE qs.quiz_id = q.id) AS submission_count,
               (SELECT AVG(qs.final_percentage) FROM quiz_submissions qs WHERE qs.quiz_id = q.id) AS mean_percentage
             FROM quizzes q
             JOIN courses c ON c.id = q.course_id
             WHERE c.teacher_id = ?
             ORDER BY q.title",
        )
        .map_err(HandlerErr::db)?;
    let quizzes = quizzes_stmt
        .query_map([&teacher_id], |r| {
            let id: String = r.get(0)?;
            let title: String = r.get(1)?;
            let course_id: String = r.get(2)?;
            let submission_count: i64 = r.get(3)?;
            let mean_percentage: Option<f64> = r.get(4)?;
            Ok(json!({
                "id": id,
                "title": title,
                "courseId": course_id,
                "submissionCount": submission_count,
                "meanPercentage": grading::round_off_2_decimals(mean_percentage.unwrap_or(0.0))
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let mut orders_stmt = conn
        .prepare(
            "SELECT DISTINCT o.id, o.user_id, o.total_cents, o.created_at
             FROM orders o
             JOIN order_items oi ON oi.order_id = o.id
             JOIN products p ON p.id = oi.product_id
             JOIN courses c ON c.id = p.course_id
             WHERE c.teacher_id = ?
             ORDER BY o.created_at DESC
             LIMIT 10",
        )
        .map_err(HandlerErr::db)?;
    let recent_orders = orders_stmt
        .query_map([&teacher_id], |r| {
            let id: String = r.get(0)?;
            let user_id: String = r.get(1)?;
            let total_cents: i64 = r.get(2)?;
            let created_at: Option<String> = r.get(3)?;
            Ok(json!({
                "id": id,
                "userId": user_id,
                "totalCents": total_cents,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    Ok(json!({
        "teacherId": teacher_id,
        "courseCount": courses.len(),
        "totalEnrollments": total_enrollments,
        "courses": courses,
        "quizzes": quizzes,
        "recentOrders": recent_orders
    }))
}

fn dashboard_student(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if user_role(conn, &student_id)?.is_none() {
        return Err(HandlerErr::new("not_found", "student not found"));
    }

    let mut courses_stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.title,
               (SELECT COUNT(*) FROM lessons l WHERE l.course_id = c.id) AS lesson_count,
               e.enrolled_at
             FROM enrollments e
             JOIN courses c ON c.id = e.course_id
             WHERE e.student_id = ?
             ORDER BY c.title",
        )
        .map_err(HandlerErr::db)?;
    let courses = courses_stmt
        .query_map([&student_id], |r| {
            let id: String = r.get(0)?;
            let title: String = r.get(1)?;
            let lesson_count: i64 = r.get(2)?;
            let enrolled_at: Option<String> = r.get(3)?;
            Ok(json!({
                "id": id,
                "title": title,
                "lessonCount": lesson_count,
                "enrolledAt": enrolled_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let mut history_stmt = conn
        .prepare(
            "SELECT q.id, q.title, c.title, qs.submitted_at,
                    qs.correct_count, qs.wrong_count, qs.blank_count, qs.total_count,
                    qs.negative_points, qs.net_correct, qs.final_percentage
             FROM quiz_submissions qs
             JOIN quizzes q ON q.id = qs.quiz_id
             JOIN courses c ON c.id = q.course_id
             WHERE qs.student_id = ?
             ORDER BY qs.submitted_at DESC",
        )
        .map_err(HandlerErr::db)?;
    let history: Vec<(serde_json::Value, f64)> = history_stmt
        .query_map([&student_id], |r| {
            let quiz_id: String = r.get(0)?;
            let quiz_title: String = r.get(1)?;
            let course_title: String = r.get(2)?;
            let submitted_at: Option<String> = r.get(3)?;
            let correct: i64 = r.get(4)?;
            let wrong: i64 = r.get(5)?;
            let blank: i64 = r.get(6)?;
            let total: i64 = r.get(7)?;
            let negative_points: i64 = r.get(8)?;
            let net_correct: i64 = r.get(9)?;
            let final_percentage: f64 = r.get(10)?;
            Ok((
                json!({
                    "quizId": quiz_id,
                    "quizTitle": quiz_title,
                    "courseTitle": course_title,
                    "submittedAt": submitted_at,
                    "correct": correct,
                    "wrong": wrong,
                    "blank": blank,
                    "total": total,
                    "negativePoints": negative_points,
                    "netCorrect": net_correct,
                    "finalPercentage": final_percentage
                }),
                final_percentage,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let percentages: Vec<f64> = history.iter().map(|(_, p)| *p).collect();
    let quiz_history: Vec<serde_json::Value> = history.into_iter().map(|(row, _)| row).collect();

    let mut orders_stmt = conn
        .prepare(
            "SELECT id, total_cents, created_at
             FROM orders
             WHERE user_id = ?
             ORDER BY created_at DESC",
        )
        .map_err(HandlerErr::db)?;
    let orders = orders_stmt
        .query_map([&student_id], |r| {
            let id: String = r.get(0)?;
            let total_cents: i64 = r.get(1)?;
            let created_at: Option<String> = r.get(2)?;
            Ok(json!({
                "id": id,
                "totalCents": total_cents,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    Ok(json!({
        "studentId": student_id,
        "enrolledCourses": courses,
        "quizHistory": quiz_history,
        "overallMeanPercentage": grading::mean_percentage(&percentages),
        "orders": orders
    }))
}

type Handler = fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: Handler = match req.method.as_str() {
        "dashboard.teacher" => dashboard_teacher,
        "dashboard.student" => dashboard_student,
        _ => return None,
    };

    let Some(conn) = state.db.as_ref() else {
        return Some(err(
            &req.id,
            "no_workspace",
            "select a workspace first",
            None,
        ));
    };

    Some(match handler(conn, &req.params) {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    })
}
