//! `sqli` phase (gated by `flags.sqli`): for each discovered endpoint,
//! invokes the SQLi tool across four sub-phases, attributing any reported
//! vulnerability back to the endpoint and one of its parameters.

use super::PhaseContext;
use crate::errors::ScanError;
use crate::events::{LogLevel, ScanEvent};
use crate::model::{Endpoint, Parameter, PhaseStatus, SqliSubPhase};
use crate::parser::scan_sqli_line;
use crate::process::{resolve_invocation, ToolOutputLine};
use crate::util::short_hash;
use std::time::Duration;
use tokio::sync::mpsc;

const SUBPHASES: [SqliSubPhase; 4] = [
    SqliSubPhase::Detection,
    SqliSubPhase::Fingerprint,
    SqliSubPhase::Technique,
    SqliSubPhase::Exploit,
];

pub async fn run(ctx: &PhaseContext) -> Result<(), ScanError> {
    let endpoints: Vec<Endpoint> = ctx.aggregate.lock().await.endpoints.values().cloned().collect();
    let deadline = Duration::from_secs(ctx.config.timeout_secs);

    for endpoint in &endpoints {
        ctx.pause.await_not_paused().await;
        if ctx.pause.is_stopped() {
            return Ok(());
        }

        let mut param_names: Vec<String> = ctx
            .aggregate
            .lock()
            .await
            .parameters
            .iter()
            .filter(|p| p.endpoint_key == endpoint.dedup_key())
            .map(|p| p.name.clone())
            .collect();
        // No parameters were discovered for this endpoint: fall back to the
        // wildcard sentinel so the tool still gets to pick its own injection
        // point rather than leaving the endpoint untested.
        if param_names.is_empty() {
            param_names.push(Parameter::WILDCARD.to_string());
        }

        for subphase in SUBPHASES {
            ctx.pause.await_not_paused().await;
            if ctx.pause.is_stopped() {
                return Ok(());
            }

            run_subphase(ctx, endpoint, &param_names, subphase, deadline).await;
        }
    }

    Ok(())
}

async fn run_subphase(
    ctx: &PhaseContext,
    endpoint: &Endpoint,
    param_names: &[String],
    subphase: SqliSubPhase,
    deadline: Duration,
) {
    ctx.aggregate.lock().await.set_sqli_subphase(subphase, PhaseStatus::Running);
    ctx.events.publish(ScanEvent::SubPhaseStarted {
        phase: crate::model::PhaseId::Sqli,
        name: subphase_name(subphase).to_string(),
    });

    let args = build_args(ctx, endpoint, param_names, subphase);
    let invocation = resolve_invocation(&ctx.config.sqli_tool_path, args);
    let registry_key = format!("sqli-endpoint-{}-{}", short_hash(&endpoint.url), subphase_name(subphase));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut spawn_task = std::pin::pin!(ctx
        .supervisor
        .spawn(&registry_key, &invocation, deadline, &ctx.cancel, tx));

    let exit_status = loop {
        tokio::select! {
            line = rx.recv() => {
                if let Some(ToolOutputLine::Stdout(text)) = line {
                    handle_sqli_line(ctx, &endpoint.url, param_names, &text).await;
                }
            }
            result = &mut spawn_task => {
                while let Ok(ToolOutputLine::Stdout(text)) = rx.try_recv() {
                    handle_sqli_line(ctx, &endpoint.url, param_names, &text).await;
                }
                break result;
            }
        }
    };

    if let Err(err) = exit_status {
        ctx.log(LogLevel::Warn, format!("sqli {}: {err}", subphase_name(subphase))).await;
        ctx.aggregate.lock().await.set_sqli_subphase(subphase, PhaseStatus::Error);
    } else {
        ctx.aggregate.lock().await.set_sqli_subphase(subphase, PhaseStatus::Completed);
    }
    ctx.events.publish(ScanEvent::SubPhaseCompleted {
        phase: crate::model::PhaseId::Sqli,
        name: subphase_name(subphase).to_string(),
    });
}

async fn handle_sqli_line(ctx: &PhaseContext, endpoint_url: &str, param_names: &[String], line: &str) {
    if let Some(vuln) = scan_sqli_line(line, endpoint_url, param_names) {
        let added = ctx.aggregate.lock().await.add_vulnerability(vuln.clone());
        if added {
            ctx.events.publish(ScanEvent::VulnerabilityFound { vulnerability: vuln });
        }
    }
}

fn subphase_name(subphase: SqliSubPhase) -> &'static str {
    match subphase {
        SqliSubPhase::Detection => "detection",
        SqliSubPhase::Fingerprint => "fingerprint",
        SqliSubPhase::Technique => "technique",
        SqliSubPhase::Exploit => "exploit",
    }
}

fn build_args(ctx: &PhaseContext, endpoint: &Endpoint, param_names: &[String], subphase: SqliSubPhase) -> Vec<String> {
    let mut args = vec!["-u".to_string(), endpoint.url.clone()];
    // The wildcard sentinel means "let the tool select": omit `-p` entirely
    // rather than passing it the literal "*".
    let is_wildcard_only = param_names.len() == 1 && param_names[0] == Parameter::WILDCARD;
    if !is_wildcard_only {
        args.push("-p".to_string());
        args.push(param_names.join(","));
    }
    args.extend([
        "--level".to_string(),
        ctx.config.sqli_level.to_string(),
        "--risk".to_string(),
        ctx.config.sqli_risk.to_string(),
        "--threads".to_string(),
        ctx.config.thread_count.to_string(),
        "--batch".to_string(),
        "--random-agent".to_string(),
    ]);
    match subphase {
        SqliSubPhase::Fingerprint => args.push("--fingerprint".to_string()),
        SqliSubPhase::Exploit => {
            args.push("--current-db".to_string());
            args.push("--banner".to_string());
        }
        SqliSubPhase::Detection | SqliSubPhase::Technique => {}
    }
    if let Some(dbms) = &ctx.config.dbms_hint {
        args.push("--dbms".to_string());
        args.push(dbms.clone());
    }
    for header in &ctx.config.headers {
        args.push("-H".to_string());
        args.push(header.as_cli_value());
    }
    args
}
