//! Phase Runner: executes the five phases strictly in order, honoring
//! pause/stop between them and aborting on the first unrecoverable error.

pub mod discovery;
pub mod init;
pub mod report;
pub mod sqli;
pub mod xss;

use crate::config::ScanConfig;
use crate::errors::ScanError;
use crate::events::EventBus;
use crate::gate::{PauseGate, QuestionGate};
use crate::model::{PhaseId, PhaseStatus};
use crate::orchestrator::state::Aggregate;
use crate::process::ProcessSupervisor;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Shared handles every phase implementation needs. Cheap to clone:
/// everything inside is already `Arc`-wrapped or `Copy`.
#[derive(Clone)]
pub struct PhaseContext {
    pub config: Arc<ScanConfig>,
    pub events: Arc<EventBus>,
    pub questions: Arc<QuestionGate>,
    pub pause: Arc<PauseGate>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub cancel: CancellationToken,
    pub aggregate: Arc<Mutex<Aggregate>>,
}

impl PhaseContext {
    pub async fn log(&self, level: crate::events::LogLevel, message: impl Into<String>) {
        let message = message.into();
        self.events.publish(crate::events::ScanEvent::LogAdded {
            level,
            message: message.clone(),
        });
        self.aggregate.lock().await.log(level, message);
    }

    pub fn is_stopped(&self) -> bool {
        self.pause.is_stopped()
    }
}

/// Runs every phase in order. A failed phase transitions the scan to
/// `error` and aborts remaining phases; a stop between phases is honored
/// before the next one begins.
pub async fn run_all(ctx: &PhaseContext) -> Result<(), ScanError> {
    run_phase(ctx, PhaseId::Init, |ctx| Box::pin(init::run(ctx))).await?;
    if ctx.pause.is_stopped() {
        return Ok(());
    }

    run_phase(ctx, PhaseId::Discovery, |ctx| Box::pin(discovery::run(ctx))).await?;
    if ctx.pause.is_stopped() {
        return Ok(());
    }

    if ctx.config.flags.sqli {
        run_phase(ctx, PhaseId::Sqli, |ctx| Box::pin(sqli::run(ctx))).await?;
    } else {
        ctx.aggregate
            .lock()
            .await
            .set_phase_status(PhaseId::Sqli, PhaseStatus::Skipped);
    }
    if ctx.pause.is_stopped() {
        return Ok(());
    }

    if ctx.config.flags.xss {
        run_phase(ctx, PhaseId::Xss, |ctx| Box::pin(xss::run(ctx))).await?;
    } else {
        ctx.aggregate
            .lock()
            .await
            .set_phase_status(PhaseId::Xss, PhaseStatus::Skipped);
    }
    if ctx.pause.is_stopped() {
        return Ok(());
    }

    run_phase(ctx, PhaseId::Report, |ctx| Box::pin(report::run(ctx))).await?;
    Ok(())
}

type BoxedPhaseFuture<'a> = std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ScanError>> + Send + 'a>>;

async fn run_phase<'a, F>(ctx: &'a PhaseContext, id: PhaseId, f: F) -> Result<(), ScanError>
where
    F: FnOnce(&'a PhaseContext) -> BoxedPhaseFuture<'a>,
{
    ctx.pause.await_not_paused().await;
    if ctx.pause.is_stopped() {
        return Ok(());
    }

    ctx.aggregate
        .lock()
        .await
        .set_phase_status(id, PhaseStatus::Running);
    ctx.events.publish(crate::events::ScanEvent::PhaseStarted { phase: id });

    let result = f(ctx).await;

    match result {
        Ok(()) => {
            if !ctx.pause.is_stopped() {
                ctx.aggregate
                    .lock()
                    .await
                    .set_phase_status(id, PhaseStatus::Completed);
                ctx.events
                    .publish(crate::events::ScanEvent::PhaseCompleted { phase: id });
            }
            Ok(())
        }
        Err(err) => {
            ctx.aggregate
                .lock()
                .await
                .set_phase_status(id, PhaseStatus::Error);
            Err(err)
        }
    }
}
