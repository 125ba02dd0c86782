use crate::grading;
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

fn quiz_exists(conn: &Connection, quiz_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM quizzes WHERE id = ?", [quiz_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(HandlerErr::db)
}

fn quizzes_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let title = get_required_str(params, "title")?;
    let title = title.trim().to_string();
    if title.is_empty() {
        return Err(HandlerErr::new("bad_params", "title must not be empty"));
    }

    let course_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [&course_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::db)?;
    if course_exists.is_none() {
        return Err(HandlerErr::new("not_found", "course not found"));
    }

    let quiz_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO quizzes(id, course_id, title, created_at) VALUES(?, ?, ?, ?)",
        (&quiz_id, &course_id, &title, &created_at),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "quizzes" })),
    })?;

    Ok(json!({ "quizId": quiz_id, "title": title }))
}

fn quizzes_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;

    let mut stmt = conn
        .prepare(
            "SELECT
               q.id,
               q.title,
               q.created_at,
               (SELECT COUNT(*) FROM quiz_questions qq WHERE qq.quiz_id = q.id) AS question_count,
               (SELECT COUNT(*) FROM quiz_submissions qs WHERE qs.quiz_id = q.id) AS submission_count
             FROM quizzes q
             WHERE q.course_id = ?
             ORDER BY q.created_at, q.title",
        )
        .map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map([&course_id], |r| {
            let id: String = r.get(0)?;
            let title: String = r.get(1)?;
            let created_at: Option<String> = r.get(2)?;
            let question_count: i64 = r.get(3)?;
            let submission_count: i64 = r.get(4)?;
            Ok(json!({
                "id": id,
                "title": title,
                "createdAt": created_at,
                "questionCount": question_count,
                "submissionCount": submission_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    Ok(json!({ "quizzes": rows }))
}

fn quizzes_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let quiz_id = get_required_str(params, "quizId")?;

    let quiz: Option<(String, String, Option<String>)> = conn
        .query_row(
            "SELECT course_id, title, created_at FROM quizzes WHERE id = ?",
            [&quiz_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(HandlerErr::db)?;
    let Some((course_id, title, created_at)) = quiz else {
        return Err(HandlerErr::new("not_found", "quiz not found"));
    };

    let mut stmt = conn
        .prepare(
            "SELECT id, idx, prompt, options, answer_index
             FROM quiz_questions
             WHERE quiz_id = ?
             ORDER BY idx",
        )
        .map_err(HandlerErr::db)?;
    let questions = stmt
        .query_map([&quiz_id], |r| {
            let id: String = r.get(0)?;
            let idx: i64 = r.get(1)?;
            let prompt: String = r.get(2)?;
            let options_raw: String = r.get(3)?;
            let answer_index: i64 = r.get(4)?;
            Ok((id, idx, prompt, options_raw, answer_index))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let questions: Vec<serde_json::Value> = questions
        .into_iter()
        .map(|(id, idx, prompt, options_raw, answer_index)| {
            let options: serde_json::Value =
                serde_json::from_str(&options_raw).unwrap_or_else(|_| json!([]));
            json!({
                "id": id,
                "idx": idx,
                "prompt": prompt,
                "options": options,
                "answerIndex": answer_index
            })
        })
        .collect();

    Ok(json!({
        "id": quiz_id,
        "courseId": course_id,
        "title": title,
        "createdAt": created_at,
        "questions": questions
    }))
}

fn questions_add(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let quiz_id = get_required_str(params, "quizId")?;
    let prompt = get_required_str(params, "prompt")?;
    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(HandlerErr::new("bad_params", "prompt must not be empty"));
    }

    if !quiz_exists(conn, &quiz_id)? {
        return Err(HandlerErr::new("not_found", "quiz not found"));
    }

    let Some(options) = params.get("options").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::new("bad_params", "missing options array"));
    };
    if options.len() < 2 {
        return Err(HandlerErr::new(
            "bad_params",
            "a question needs at least 2 options",
        ));
    }
    if !options.iter().all(|o| o.is_string()) {
        return Err(HandlerErr::new("bad_params", "options must be strings"));
    }
    let Some(answer_index) = params.get("answerIndex").and_then(|v| v.as_i64()) else {
        return Err(HandlerErr::new("bad_params", "missing answerIndex"));
    };
    if answer_index < 0 || answer_index >= options.len() as i64 {
        return Err(HandlerErr::new(
            "bad_params",
            "answerIndex out of options range",
        ));
    }

    let next_idx: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(idx), -1) + 1 FROM quiz_questions WHERE quiz_id = ?",
            [&quiz_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;

    let options_text =
        serde_json::to_string(options).map_err(|e| HandlerErr::new("bad_params", e.to_string()))?;
    let question_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO quiz_questions(id, quiz_id, idx, prompt, options, answer_index)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &question_id,
            &quiz_id,
            next_idx,
            &prompt,
            &options_text,
            answer_index,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "quiz_questions" })),
    })?;

    Ok(json!({ "questionId": question_id, "idx": next_idx }))
}

fn load_question_keys(
    conn: &Connection,
    quiz_id: &str,
) -> Result<Vec<grading::QuestionKey>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT answer_index, options
             FROM quiz_questions
             WHERE quiz_id = ?
             ORDER BY idx",
        )
        .map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map([quiz_id], |r| {
            let answer_index: i64 = r.get(0)?;
            let options_raw: String = r.get(1)?;
            Ok((answer_index, options_raw))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    Ok(rows
        .into_iter()
        .map(|(answer_index, options_raw)| {
            let option_count = serde_json::from_str::<Vec<serde_json::Value>>(&options_raw)
                .map(|v| v.len() as i64)
                .unwrap_or(0);
            grading::QuestionKey {
                answer_index,
                option_count,
            }
        })
        .collect())
}

fn quiz_submit(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let quiz_id = get_required_str(params, "quizId")?;
    let student_id = get_required_str(params, "studentId")?;

    if !quiz_exists(conn, &quiz_id)? {
        return Err(HandlerErr::new("not_found", "quiz not found"));
    }
    let student_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM users WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(HandlerErr::db)?;
    if student_exists.is_none() {
        return Err(HandlerErr::new("not_found", "student not found"));
    }

    let Some(raw_answers) = params.get("answers").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::new("bad_params", "missing answers array"));
    };
    let answers: Vec<Option<i64>> = raw_answers.iter().map(|v| v.as_i64()).collect();

    let keys = load_question_keys(conn, &quiz_id)?;
    if keys.is_empty() {
        return Err(HandlerErr::new("bad_state", "quiz has no questions"));
    }

    let counts = grading::mark_submission(&keys, &answers);
    let grade = grading::compute_grade(counts.as_grade_input());

    let submission_id = Uuid::new_v4().to_string();
    let submitted_at = Utc::now().to_rfc3339();
    // Re-submitting replaces the previous attempt for this student.
    conn.execute(
        "INSERT INTO quiz_submissions(
            id, quiz_id, student_id, submitted_at,
            correct_count, wrong_count, blank_count, total_count,
            negative_points, net_correct, final_percentage)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(quiz_id, student_id) DO UPDATE SET
            submitted_at = excluded.submitted_at,
            correct_count = excluded.correct_count,
            wrong_count = excluded.wrong_count,
            blank_count = excluded.blank_count,
            total_count = excluded.total_count,
            negative_points = excluded.negative_points,
            net_correct = excluded.net_correct,
            final_percentage = excluded.final_percentage",
        (
            &submission_id,
            &quiz_id,
            &student_id,
            &submitted_at,
            counts.correct,
            counts.wrong,
            counts.blank,
            counts.total,
            grade.negative_points,
            grade.net_correct,
            grade.final_percentage,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "quiz_submissions" })),
    })?;

    Ok(json!({
        "quizId": quiz_id,
        "studentId": student_id,
        "submittedAt": submitted_at,
        "correct": counts.correct,
        "wrong": counts.wrong,
        "blank": counts.blank,
        "total": counts.total,
        "negativePoints": grade.negative_points,
        "netCorrect": grade.net_correct,
        "finalPercentage": grade.final_percentage
    }))
}

fn quiz_results(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let quiz_id = get_required_str(params, "quizId")?;

    let quiz: Option<(String, String)> = conn
        .query_row(
            "SELECT course_id, title FROM quizzes WHERE id = ?",
            [&quiz_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(HandlerErr::db)?;
    let Some((course_id, title)) = quiz else {
        return Err(HandlerErr::new("not_found", "quiz not found"));
    };

    let mut stmt = conn
        .prepare(
            "SELECT qs.student_id, u.name, qs.submitted_at,
                    qs.correct_count, qs.wrong_count, qs.blank_count, qs.total_count,
                    qs.negative_points, qs.net_correct, qs.final_percentage
             FROM quiz_submissions qs
             JOIN users u ON u.id = qs.student_id
             WHERE qs.quiz_id = ?
             ORDER BY u.name",
        )
        .map_err(HandlerErr::db)?;
    let rows: Vec<(serde_json::Value, f64)> = stmt
        .query_map([&quiz_id], |r| {
            let student_id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let submitted_at: Option<String> = r.get(2)?;
            let correct: i64 = r.get(3)?;
            let wrong: i64 = r.get(4)?;
            let blank: i64 = r.get(5)?;
            let total: i64 = r.get(6)?;
            let negative_points: i64 = r.get(7)?;
            let net_correct: i64 = r.get(8)?;
            let final_percentage: f64 = r.get(9)?;
            Ok((
                json!({
                    "studentId": student_id,
                    "name": name,
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

    let percentages: Vec<f64> = rows.iter().map(|(_, p)| *p).collect();
    let submissions: Vec<serde_json::Value> = rows.into_iter().map(|(row, _)| row).collect();

    let enrolled_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM enrollments WHERE course_id = ?",
            [&course_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;
    let submitted_count = submissions.len() as i64;

    Ok(json!({
        "quizId": quiz_id,
        "title": title,
        "courseId": course_id,
        "submissions": submissions,
        "aggregate": {
            "meanPercentage": grading::mean_percentage(&percentages),
            "submittedCount": submitted_count,
            "enrolledCount": enrolled_count,
            "absentCount": (enrolled_count - submitted_count).max(0)
        }
    }))
}

type Handler = fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>;

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let handler: Handler = match req.method.as_str() {
        "quizzes.create" => quizzes_create,
        "quizzes.list" => quizzes_list,
        "quizzes.get" => quizzes_get,
        "questions.add" => questions_add,
        "quiz.submit" => quiz_submit,
        "quiz.results" => quiz_results,
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
