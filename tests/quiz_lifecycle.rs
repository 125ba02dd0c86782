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

fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing field {}", key))
        .to_string()
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
        let id = self.next_id.to_string();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn finish(mut self) {
        let _ = self.stdin.flush();
        drop(self.stdin);
        let _ = self.child.wait();
    }
}

fn seed_quiz(h: &mut Harness) -> (String, String, String) {
    let teacher = h.call(
        "users.create",
        json!({ "name": "Quinn Teacher", "email": "quinn@example.com", "role": "teacher" }),
    );
    let teacher_id = str_field(&teacher, "userId");
    let student = h.call(
        "users.create",
        json!({ "name": "Sam Student", "email": "sam@example.com", "role": "student" }),
    );
    let student_id = str_field(&student, "userId");

    let course = h.call(
        "courses.create",
        json!({ "title": "Algebra I", "teacherId": teacher_id }),
    );
    let course_id = str_field(&course, "courseId");
    h.call(
        "enroll",
        json!({ "courseId": course_id, "studentId": student_id }),
    );

    let quiz = h.call(
        "quizzes.create",
        json!({ "courseId": course_id, "title": "Unit 1 Quiz" }),
    );
    let quiz_id = str_field(&quiz, "quizId");

    (quiz_id, student_id, course_id)
}

fn add_question(h: &mut Harness, quiz_id: &str, answer_index: i64) {
    h.call(
        "questions.add",
        json!({
            "quizId": quiz_id,
            "prompt": "pick one",
            "options": ["a", "b", "c", "d"],
            "answerIndex": answer_index
        }),
    );
}

#[test]
fn submit_marks_and_grades_with_negative_marking() {
    let workspace = temp_dir("campus-quiz-lifecycle");
    let mut h = Harness::start(&workspace);
    let (quiz_id, student_id, _course_id) = seed_quiz(&mut h);

    // 20 questions, all keyed to option 0.
    for _ in 0..20 {
        add_question(&mut h, &quiz_id, 0);
    }

    // 10 correct, 6 wrong, 4 blank (2 nulls + 2 out-of-range).
    let mut answers = Vec::new();
    for _ in 0..10 {
        answers.push(json!(0));
    }
    for _ in 0..6 {
        answers.push(json!(1));
    }
    answers.push(json!(null));
    answers.push(json!(null));
    answers.push(json!(9));
    answers.push(json!(-2));

    let res = h.call(
        "quiz.submit",
        json!({ "quizId": quiz_id, "studentId": student_id, "answers": answers }),
    );
    assert_eq!(res.get("correct").and_then(|v| v.as_i64()), Some(10));
    assert_eq!(res.get("wrong").and_then(|v| v.as_i64()), Some(6));
    assert_eq!(res.get("blank").and_then(|v| v.as_i64()), Some(4));
    assert_eq!(res.get("total").and_then(|v| v.as_i64()), Some(20));
    assert_eq!(res.get("negativePoints").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(res.get("netCorrect").and_then(|v| v.as_i64()), Some(8));
    assert_eq!(
        res.get("finalPercentage").and_then(|v| v.as_f64()),
        Some(40.0)
    );

    h.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn resubmission_replaces_previous_attempt() {
    let workspace = temp_dir("campus-quiz-resubmit");
    let mut h = Harness::start(&workspace);
    let (quiz_id, student_id, _course_id) = seed_quiz(&mut h);

    for _ in 0..4 {
        add_question(&mut h, &quiz_id, 1);
    }

    // First attempt: everything wrong.
    let _ = h.call(
        "quiz.submit",
        json!({ "quizId": quiz_id, "studentId": student_id, "answers": [0, 0, 0, 0] }),
    );
    // Second attempt: everything right.
    let _ = h.call(
        "quiz.submit",
        json!({ "quizId": quiz_id, "studentId": student_id, "answers": [1, 1, 1, 1] }),
    );

    let results = h.call("quiz.results", json!({ "quizId": quiz_id }));
    let submissions = results
        .get("submissions")
        .and_then(|v| v.as_array())
        .expect("submissions");
    assert_eq!(submissions.len(), 1);
    assert_eq!(
        submissions[0].get("finalPercentage").and_then(|v| v.as_f64()),
        Some(100.0)
    );

    h.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn results_aggregate_counts_enrolled_and_absent() {
    let workspace = temp_dir("campus-quiz-results");
    let mut h = Harness::start(&workspace);
    let (quiz_id, student_id, course_id) = seed_quiz(&mut h);

    // A second enrolled student who never submits.
    let other = h.call(
        "users.create",
        json!({ "name": "Alex Absent", "email": "alex@example.com", "role": "student" }),
    );
    let other_id = str_field(&other, "userId");
    h.call(
        "enroll",
        json!({ "courseId": course_id, "studentId": other_id }),
    );

    for _ in 0..2 {
        add_question(&mut h, &quiz_id, 0);
    }
    let _ = h.call(
        "quiz.submit",
        json!({ "quizId": quiz_id, "studentId": student_id, "answers": [0, 1] }),
    );

    let results = h.call("quiz.results", json!({ "quizId": quiz_id }));
    let aggregate = results.get("aggregate").expect("aggregate");
    assert_eq!(
        aggregate.get("submittedCount").and_then(|v| v.as_i64()),
        Some(1)
    );
    assert_eq!(
        aggregate.get("enrolledCount").and_then(|v| v.as_i64()),
        Some(2)
    );
    assert_eq!(
        aggregate.get("absentCount").and_then(|v| v.as_i64()),
        Some(1)
    );
    // One submission: 1 right, 1 wrong out of 2 -> 50%.
    assert_eq!(
        aggregate.get("meanPercentage").and_then(|v| v.as_f64()),
        Some(50.0)
    );

    h.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn heavy_wrong_answers_push_score_below_zero() {
    let workspace = temp_dir("campus-quiz-negative");
    let mut h = Harness::start(&workspace);
    let (quiz_id, student_id, _course_id) = seed_quiz(&mut h);

    // 6 questions keyed to 3; answer all wrong -> 2 negative points.
    for _ in 0..6 {
        add_question(&mut h, &quiz_id, 3);
    }
    let res = h.call(
        "quiz.submit",
        json!({ "quizId": quiz_id, "studentId": student_id, "answers": [0, 0, 0, 0, 0, 0] }),
    );
    assert_eq!(res.get("negativePoints").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(res.get("netCorrect").and_then(|v| v.as_i64()), Some(-2));
    assert_eq!(
        res.get("finalPercentage").and_then(|v| v.as_f64()),
        Some(-33.33)
    );

    h.finish();
    let _ = std::fs::remove_dir_all(workspace);
}
