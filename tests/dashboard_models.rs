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

struct Harness {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Harness {
    fn start(workspace: &PathBuf) -> Harness {
        let (child, stdin, reader) = spawn_sidecar();
        let mut h = Harness {
            child,
            stdin,
            reader,
            next_id: 0,
        };
        h.call(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        h
    }

    fn call(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let payload = json!({
            "id": self.next_id.to_string(),
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    fn finish(mut self) {
        let _ = self.stdin.flush();
        drop(self.stdin);
        let _ = self.child.wait();
    }
}

fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing field {}", key))
        .to_string()
}

#[test]
fn teacher_and_student_dashboards_aggregate() {
    let workspace = temp_dir("campus-dashboards");
    let mut h = Harness::start(&workspace);

    let teacher = h.call(
        "users.create",
        json!({ "name": "Dana Teacher", "email": "dana@example.com", "role": "teacher" }),
    );
    let teacher_id = str_field(&teacher, "userId");
    let student = h.call(
        "users.create",
        json!({ "name": "Riley Student", "email": "riley@example.com", "role": "student" }),
    );
    let student_id = str_field(&student, "userId");

    let course = h.call(
        "courses.create",
        json!({ "title": "Biology", "teacherId": teacher_id }),
    );
    let course_id = str_field(&course, "courseId");
    h.call(
        "lessons.add",
        json!({ "courseId": course_id, "title": "Cells" }),
    );
    h.call(
        "enroll",
        json!({ "courseId": course_id, "studentId": student_id }),
    );

    let quiz = h.call(
        "quizzes.create",
        json!({ "courseId": course_id, "title": "Cells Quiz" }),
    );
    let quiz_id = str_field(&quiz, "quizId");
    for _ in 0..4 {
        h.call(
            "questions.add",
            json!({
                "quizId": quiz_id,
                "prompt": "pick",
                "options": ["a", "b"],
                "answerIndex": 0
            }),
        );
    }
    // 3 right, 1 wrong -> 75%.
    h.call(
        "quiz.submit",
        json!({ "quizId": quiz_id, "studentId": student_id, "answers": [0, 0, 0, 1] }),
    );

    let product = h.call(
        "products.create",
        json!({ "name": "Biology Access", "priceCents": 1500, "courseId": course_id }),
    );
    h.call("session.login", json!({ "userId": student_id }));
    h.call(
        "cart.add",
        json!({ "productId": str_field(&product, "productId") }),
    );
    h.call("cart.checkout", json!({}));

    let teacher_dash = h.call("dashboard.teacher", json!({ "teacherId": teacher_id }));
    assert_eq!(
        teacher_dash.get("courseCount").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        teacher_dash
            .get("totalEnrollments")
            .and_then(|v| v.as_i64()),
        Some(1)
    );
    let quizzes = teacher_dash
        .get("quizzes")
        .and_then(|v| v.as_array())
        .expect("quizzes");
    assert_eq!(quizzes.len(), 1);
    assert_eq!(
        quizzes[0].get("submissionCount").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        quizzes[0].get("meanPercentage").and_then(|v| v.as_f64()),
        Some(75.0)
    );
    let recent_orders = teacher_dash
        .get("recentOrders")
        .and_then(|v| v.as_array())
        .expect("recentOrders");
    assert_eq!(recent_orders.len(), 1);
    assert_eq!(
        recent_orders[0].get("totalCents").and_then(|v| v.as_i64()),
        Some(1500)
    );

    let student_dash = h.call("dashboard.student", json!({ "studentId": student_id }));
    let enrolled = student_dash
        .get("enrolledCourses")
        .and_then(|v| v.as_array())
        .expect("enrolledCourses");
    assert_eq!(enrolled.len(), 1);
    assert_eq!(
        enrolled[0].get("lessonCount").and_then(|v| v.as_i64()),
        Some(1)
    );
    let history = student_dash
        .get("quizHistory")
        .and_then(|v| v.as_array())
        .expect("quizHistory");
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].get("finalPercentage").and_then(|v| v.as_f64()),
        Some(75.0)
    );
    assert_eq!(
        student_dash
            .get("overallMeanPercentage")
            .and_then(|v| v.as_f64()),
        Some(75.0)
    );
    let orders = student_dash
        .get("orders")
        .and_then(|v| v.as_array())
        .expect("orders");
    assert_eq!(orders.len(), 1);

    h.finish();
    let _ = std::fs::remove_dir_all(workspace);
}
