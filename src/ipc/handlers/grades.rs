use crate::grading::{compute_grade, GradeInput};
use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// The standalone grade tool: the UI posts whatever is in its four form
/// fields and gets a computed result back. Malformed numbers coerce to 0 at
/// this boundary and total is floored at 1, so this op never fails.
fn handle_grade_compute(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let input = GradeInput::from_params(&req.params);
    let result = compute_grade(input);

    ok(
        &req.id,
        json!({
            "input": {
                "correct": input.correct,
                "wrong": input.wrong,
                "blank": input.blank,
                "total": input.total
            },
            "finalPercentage": result.final_percentage,
            "netCorrect": result.net_correct,
            "negativePoints": result.negative_points,
            "mismatch": input.counts_mismatch()
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grade.compute" => Some(handle_grade_compute(state, req)),
        _ => None,
    }
}
