//! Score Engine: deterministic, pure scoring from quiz results.
//!
//! The combination of quiz score and vulnerability count into a single
//! number is delegated to an external domain model the collaborator owns;
//! this core only computes the quiz-derived score and exposes its inputs
//! (including `vulnerability_count`) on `scan:completed` so that
//! collaborator can recompute its own combined number.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreResult {
    pub final_score: u32,
    pub grade: &'static str,
}

/// `quiz_points_possible` defaults to 100 when zero (a scan with no
/// questions asked still gets a score rather than a division by zero).
pub fn compute_score(quiz_points_earned: u32, quiz_points_possible: u32) -> ScoreResult {
    let possible = if quiz_points_possible == 0 { 100 } else { quiz_points_possible };
    let quiz_pct = quiz_points_earned as f64 / possible as f64;
    let final_score = (100.0 * quiz_pct).round() as u32;
    ScoreResult {
        final_score,
        grade: grade_for(final_score),
    }
}

fn grade_for(final_score: u32) -> &'static str {
    match final_score {
        90.. => "Excelente",
        75..=89 => "Bueno",
        60..=74 => "Regular",
        40..=59 => "Deficiente",
        _ => "Crítico",
    }
}
