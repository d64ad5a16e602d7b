//! `Orchestrator`: owns one scan's full lifecycle. Constructs every other
//! component, wires them into a `PhaseContext`, runs the phases in the
//! background, and exposes the inbound control API spec.md §6 describes.
//!
//! Grounded in the teacher's top-level `orchestrator/mod.rs`: one struct
//! owning the runner, state, and gates for a single unit of work, with
//! construction kept separate from the async run loop it spawns.

pub mod state;

use crate::config::ScanConfig;
use crate::errors::ScanError;
use crate::events::{EventBus, LogLevel, ScanEvent};
use crate::gate::{PauseGate, QuestionGate};
use crate::model::{Endpoint, PhaseRecord, QuestionResult, ScanId, ScanState, Stats, Vulnerability};
use crate::phase::{self, PhaseContext};
use crate::process::{ActiveProcessRegistry, ProcessSupervisor};
use state::{Aggregate, LogEntry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

/// Graceful/forceful grace periods used by `stop()`'s registry drain, per
/// spec.md's testable property: the registry is empty within
/// `gracePeriod + forceGrace + 1s` of a stop.
const STOP_GRACE_PERIOD: Duration = Duration::from_millis(300);
const STOP_FORCE_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// A consistent point-in-time snapshot returned by `get_status()`.
#[derive(Debug, Clone)]
pub struct ScanStatus {
    pub id: ScanId,
    pub state: ScanState,
    pub phases: Vec<PhaseRecord>,
    pub stats: Stats,
    pub endpoints: Vec<Endpoint>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub question_results: Vec<QuestionResult>,
    pub recent_logs: Vec<LogEntry>,
}

pub struct Orchestrator {
    id: ScanId,
    config: Arc<ScanConfig>,
    events: Arc<EventBus>,
    questions: Arc<QuestionGate>,
    pause: Arc<PauseGate>,
    supervisor: Arc<ProcessSupervisor>,
    cancel: CancellationToken,
    aggregate: Arc<Mutex<Aggregate>>,
    started: AtomicBool,
}

impl Orchestrator {
    pub fn new(config: ScanConfig) -> Self {
        let registry = Arc::new(ActiveProcessRegistry::new());
        Self {
            id: uuid::Uuid::new_v4(),
            config: Arc::new(config),
            events: Arc::new(EventBus::new()),
            questions: Arc::new(QuestionGate::new()),
            pause: Arc::new(PauseGate::new()),
            supervisor: Arc::new(ProcessSupervisor::new(registry)),
            cancel: CancellationToken::new(),
            aggregate: Arc::new(Mutex::new(Aggregate::new())),
            started: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ScanId {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Starts the scan's phase pipeline in the background. Not re-entrant:
    /// a second call on an already-started instance returns
    /// `ScanError::AlreadyStarted`.
    pub async fn start(&self) -> Result<(), ScanError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ScanError::AlreadyStarted);
        }

        self.aggregate.lock().await.state = ScanState::InProgress;
        self.events.publish(ScanEvent::ScanStarted);

        let ctx = PhaseContext {
            config: self.config.clone(),
            events: self.events.clone(),
            questions: self.questions.clone(),
            pause: self.pause.clone(),
            supervisor: self.supervisor.clone(),
            cancel: self.cancel.clone(),
            aggregate: self.aggregate.clone(),
        };

        tokio::spawn(async move {
            run_and_finalize(ctx).await;
        });

        Ok(())
    }

    /// No-ops once the scan has reached a terminal state: spec.md §7
    /// requires every control call to be refused after a terminal event.
    pub async fn pause(&self) {
        if self.aggregate.lock().await.state.is_terminal() {
            return;
        }
        self.pause.pause();
        self.events.publish(ScanEvent::ScanPaused);
    }

    pub async fn resume(&self) {
        if self.aggregate.lock().await.state.is_terminal() {
            return;
        }
        self.pause.resume();
        self.events.publish(ScanEvent::ScanResumed);
    }

    /// Stops the scan: unblocks every suspended phase, cancels any
    /// in-flight tool invocation, and drains the active-process registry
    /// with a graceful-then-forceful kill. Idempotent.
    pub async fn stop(&self) -> Result<(), ScanError> {
        {
            let mut agg = self.aggregate.lock().await;
            if agg.state.is_terminal() {
                return Err(ScanError::AlreadyTerminal { state: agg.state.label() });
            }
            agg.state = ScanState::Stopped;
        }

        self.pause.stop();
        self.cancel.cancel();
        self.supervisor
            .registry()
            .terminate_all(STOP_GRACE_PERIOD, STOP_FORCE_GRACE_PERIOD)
            .await;

        self.events.publish(ScanEvent::ScanStopped);
        Ok(())
    }

    /// Delivers an answer to the currently outstanding question, if any.
    /// No-ops once the scan has reached a terminal state.
    pub async fn answer_question(&self, selected_index: usize) -> bool {
        if self.aggregate.lock().await.state.is_terminal() {
            return false;
        }
        self.questions.answer(selected_index).await
    }

    pub async fn get_status(&self) -> ScanStatus {
        let agg = self.aggregate.lock().await;
        ScanStatus {
            id: self.id,
            state: agg.state,
            phases: agg.phases.clone(),
            stats: agg.stats,
            endpoints: agg.endpoints.values().cloned().collect(),
            vulnerabilities: agg.vulnerabilities.values().cloned().collect(),
            question_results: agg.question_results.clone(),
            recent_logs: agg.recent_logs(),
        }
    }
}

async fn run_and_finalize(ctx: PhaseContext) {
    let result = phase::run_all(&ctx).await;
    let mut agg = ctx.aggregate.lock().await;
    if agg.state.is_terminal() {
        // stop() already finalized state and emitted scan:stopped.
        return;
    }
    match result {
        Ok(()) => {
            agg.state = ScanState::Finalized;
        }
        Err(err) => {
            agg.state = ScanState::Error;
            drop(agg);
            ctx.events.publish(ScanEvent::ScanError { message: err.to_string() });
            ctx.log(LogLevel::Error, format!("scan aborted: {err}")).await;
        }
    }
}
