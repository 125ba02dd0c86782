use serde::Serialize;

/// Every 3 wrong answers cancel exactly 1 correct answer.
pub const WRONG_PER_CANCEL: i64 = 3;

/// Half-away-from-zero rounding to 2 decimal places, applied wherever a
/// percentage leaves the calculator.
pub fn round_off_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeInput {
    pub correct: i64,
    pub wrong: i64,
    pub blank: i64,
    pub total: i64,
}

impl GradeInput {
    /// Lenient read of the UI's form fields. Counts that are missing,
    /// unparsable, or negative coerce to 0; `total` is raised to at least 1
    /// so the form layer never hands a zero denominator downstream.
    pub fn from_params(params: &serde_json::Value) -> GradeInput {
        GradeInput {
            correct: coerce_count(params.get("correct")),
            wrong: coerce_count(params.get("wrong")),
            blank: coerce_count(params.get("blank")),
            total: coerce_count(params.get("total")).max(1),
        }
    }

    /// The form only warns on a count/total mismatch; it never rejects one.
    pub fn counts_mismatch(&self) -> bool {
        self.correct + self.wrong + self.blank != self.total
    }
}

fn coerce_count(v: Option<&serde_json::Value>) -> i64 {
    let Some(v) = v else {
        return 0;
    };
    let n = if let Some(n) = v.as_i64() {
        n
    } else if let Some(f) = v.as_f64() {
        f.trunc() as i64
    } else if let Some(s) = v.as_str() {
        s.trim().parse::<i64>().unwrap_or(0)
    } else {
        0
    };
    n.max(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub final_percentage: f64,
    pub net_correct: i64,
    pub negative_points: i64,
}

/// Negative-marking score. `net_correct` is deliberately not clamped at
/// zero: a student with enough wrong answers scores below 0%. A non-positive
/// `total` answers 0 instead of dividing.
pub fn compute_grade(input: GradeInput) -> GradeResult {
    let negative_points = input.wrong / WRONG_PER_CANCEL;
    let net_correct = input.correct - negative_points;
    let final_percentage = if input.total > 0 {
        round_off_2_decimals(net_correct as f64 / input.total as f64 * 100.0)
    } else {
        0.0
    };
    GradeResult {
        final_percentage,
        net_correct,
        negative_points,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestionKey {
    pub answer_index: i64,
    pub option_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkedCounts {
    pub correct: i64,
    pub wrong: i64,
    pub blank: i64,
    pub total: i64,
}

impl MarkedCounts {
    pub fn as_grade_input(&self) -> GradeInput {
        GradeInput {
            correct: self.correct,
            wrong: self.wrong,
            blank: self.blank,
            total: self.total,
        }
    }
}

/// Marks a submission against the question keys. A missing answer, an
/// explicit null, or an index outside the question's options counts as
/// blank; any other non-key index counts as wrong.
pub fn mark_submission(keys: &[QuestionKey], answers: &[Option<i64>]) -> MarkedCounts {
    let mut correct = 0_i64;
    let mut wrong = 0_i64;
    let mut blank = 0_i64;

    for (i, key) in keys.iter().enumerate() {
        match answers.get(i).copied().flatten() {
            None => blank += 1,
            Some(a) if a < 0 || a >= key.option_count => blank += 1,
            Some(a) if a == key.answer_index => correct += 1,
            Some(_) => wrong += 1,
        }
    }

    MarkedCounts {
        correct,
        wrong,
        blank,
        total: keys.len() as i64,
    }
}

/// Class-level mean of final percentages, 0.0 when nobody has submitted.
pub fn mean_percentage(percentages: &[f64]) -> f64 {
    if percentages.is_empty() {
        return 0.0;
    }
    let sum: f64 = percentages.iter().sum();
    round_off_2_decimals(sum / percentages.len() as f64)
}
