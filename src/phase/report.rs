//! `report` phase: waits for any still-running tool processes to drain,
//! then invokes the Score Engine and publishes `scan:completed`.

use super::PhaseContext;
use crate::errors::ScanError;
use crate::events::{LogLevel, ScanEvent};
use crate::score::compute_score;
use std::time::Duration;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub async fn run(ctx: &PhaseContext) -> Result<(), ScanError> {
    let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
    loop {
        if ctx.supervisor.registry().is_empty().await {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            ctx.log(LogLevel::Warn, "active-process registry did not drain within 60s").await;
            break;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }

    let (quiz_points_earned, quiz_points_possible, vulnerability_count) = {
        let agg = ctx.aggregate.lock().await;
        let earned: u32 = agg.question_results.iter().map(|r| r.points_earned).sum();
        let possible: u32 = agg.question_results.iter().map(|r| r.points).sum();
        (earned, possible, agg.stats.vulnerabilities_found)
    };

    let score = compute_score(quiz_points_earned, quiz_points_possible);

    ctx.events.publish(ScanEvent::ScanCompleted {
        quiz_points_earned,
        quiz_points_possible,
        vulnerability_count,
        final_score: score.final_score,
        grade: score.grade.to_string(),
    });

    Ok(())
}
