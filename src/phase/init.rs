//! `init` phase: probes configured tool availability, then asks one
//! didactic question before discovery begins.

use super::PhaseContext;
use crate::errors::ScanError;
use crate::events::LogLevel;
use crate::model::{Difficulty, PhaseId, QuestionSpec};
use crate::process::resolve_invocation;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc;

const VERSION_PROBE_DEADLINE: Duration = Duration::from_secs(5);

/// Matches a version probe's "press enter to continue"-style prompt, so the
/// supervisor's auto-respond mode can clear it without a human in the loop.
static PRESS_ENTER_PROMPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)press .* to continue").unwrap());

pub async fn run(ctx: &PhaseContext) -> Result<(), ScanError> {
    if ctx.config.flags.sqli {
        probe_tool(ctx, "sqlmap-init", &ctx.config.sqli_tool_path, "sqlmap").await;
    }
    if ctx.config.flags.xss {
        probe_tool(ctx, "xss-init", &ctx.config.xss_tool_path, "xsstrike").await;
    }

    if let Some(result) = ctx.questions.ask(init_question(), &ctx.events, &ctx.cancel).await {
        ctx.aggregate.lock().await.push_question_result(result);
    }

    Ok(())
}

async fn probe_tool(ctx: &PhaseContext, registry_key: &str, tool_path: &str, label: &'static str) {
    let mut invocation = resolve_invocation(tool_path, vec!["--version".to_string()]);
    invocation.shell_fallback = true;
    invocation.auto_respond_pattern = Some(PRESS_ENTER_PROMPT.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let report = ctx
        .supervisor
        .spawn(registry_key, &invocation, VERSION_PROBE_DEADLINE, &ctx.cancel, tx)
        .await;

    // Drain captured lines so the channel doesn't pile up; init doesn't
    // need the version string itself, only whether the probe succeeded.
    while rx.try_recv().is_ok() {}

    match report {
        Ok(report) if report.success() => {
            ctx.log(LogLevel::Info, format!("{label} is available")).await;
        }
        Ok(_) => {
            ctx.log(LogLevel::Warn, format!("{label} --version probe did not exit cleanly; phases using it may no-op")).await;
        }
        Err(err) => {
            ctx.log(LogLevel::Warn, format!("{label} could not be invoked: {err}")).await;
        }
    }
}

fn init_question() -> QuestionSpec {
    QuestionSpec {
        id: Some("init-1".into()),
        phase: PhaseId::Init,
        text: "Which HTTP methods will this scan test for injectable parameters?".into(),
        options: vec![
            "GET and POST".into(),
            "GET only".into(),
            "PUT and DELETE".into(),
        ],
        correct_index: 0,
        points: 10,
        difficulty: Difficulty::Facil,
    }
}
