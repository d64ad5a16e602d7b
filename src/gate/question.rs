//! `QuestionGate`: holds at most one outstanding didactic question per
//! scan, suspending the calling phase until it is answered or the scan is
//! stopped.
//!
//! Grounded in the teacher's `gates/mod.rs` `ApprovalGate` human-in-the-loop
//! suspension pattern, reworked from phase-approval into quiz grading:
//! `ask()` blocks on a `oneshot` reply instead of a boolean decision, and
//! grades the reply against `QuestionSpec::correct_index` with a
//! difficulty multiplier instead of returning an `approve`/`reject` enum.

use crate::events::{EventBus, ScanEvent};
use crate::model::{QuestionResult, QuestionSpec};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct QuestionGate {
    pending: Mutex<Option<(QuestionSpec, oneshot::Sender<usize>)>>,
}

impl QuestionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `question:asked`, suspends until `answer()` is called or
    /// `cancel` fires, grades the reply, appends nothing itself (the
    /// caller owns the orchestrator's `question_results` list and should
    /// push the returned `QuestionResult`), and publishes
    /// `question:result`. Returns `None` if the scan was stopped first.
    pub async fn ask(
        &self,
        spec: QuestionSpec,
        events: &EventBus,
        cancel: &CancellationToken,
    ) -> Option<QuestionResult> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            *pending = Some((spec.clone(), tx));
        }
        events.publish(ScanEvent::QuestionAsked { spec: spec.clone() });

        let user_index = tokio::select! {
            answer = rx => match answer {
                Ok(idx) => idx,
                Err(_) => return None,
            },
            _ = cancel.cancelled() => {
                self.pending.lock().await.take();
                return None;
            }
        };

        let correct = user_index == spec.correct_index;
        let points_earned = if correct {
            (spec.points as f64 * spec.difficulty.multiplier()).round() as u32
        } else {
            0
        };

        let result = QuestionResult {
            question_id: spec.id.clone(),
            phase: spec.phase,
            question: spec.text.clone(),
            options: spec.options.clone(),
            correct_index: spec.correct_index,
            user_index,
            correct,
            points: spec.points,
            points_earned,
            answered_at: chrono::Utc::now(),
        };

        events.publish(ScanEvent::QuestionResultEvent {
            result: result.clone(),
        });
        Some(result)
    }

    /// Delivers an answer to the currently outstanding question, if any.
    /// Returns `false` if there was no pending question to answer.
    pub async fn answer(&self, selected_index: usize) -> bool {
        let pending = self.pending.lock().await.take();
        match pending {
            Some((_, tx)) => tx.send(selected_index).is_ok(),
            None => false,
        }
    }

    pub async fn has_pending(&self) -> bool {
        self.pending.lock().await.is_some()
    }
}
