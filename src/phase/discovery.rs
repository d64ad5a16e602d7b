//! `discovery` phase: crawls the target with the SQLi tool, then reads the
//! resulting CSV into the endpoint/parameter aggregate and writes the two
//! derived targets files. Always runs regardless of `flags`, since both
//! `sqli` and `xss` depend on the endpoints it discovers.

use super::PhaseContext;
use crate::discovery::{parse_csv, write_get_targets, write_post_targets};
use crate::errors::ScanError;
use crate::events::{LogLevel, ScanEvent};
use crate::model::{Difficulty, PhaseId, QuestionSpec};
use crate::parser::{find_discovery_csv, is_completion_marker};
use crate::process::{resolve_invocation, ToolOutputLine};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Grace period between graceful and forceful termination for the crawl
/// invocation specifically (spec.md §4.6: 5000ms, vs the 300ms default).
const CRAWL_GRACE_PERIOD: Duration = Duration::from_secs(5);
const CRAWL_DEADLINE: Duration = Duration::from_secs(20 * 60);
const POST_MARKER_DELAY: Duration = Duration::from_secs(1);
const CSV_SEARCH_ATTEMPTS: u32 = 3;
const CSV_SEARCH_INTERVAL: Duration = Duration::from_secs(2);

/// The four interactive-prompt responses sqlmap's crawler asks for in
/// order: don't check the sitemap, store crawling results to a temp file,
/// proceed on redirect, and skip the resume-from-identified-injection
/// prompt.
const CRAWL_ANSWERS: &str = "N,Y,Y,Y";

pub async fn run(ctx: &PhaseContext) -> Result<(), ScanError> {
    let args = build_crawl_args(ctx);
    let invocation = resolve_invocation(&ctx.config.sqli_tool_path, args);
    let (tx, mut rx) = mpsc::unbounded_channel();

    // The crawl's own completion marker drives an early, intentional
    // cancellation; the scan-wide stop() drives an ordinary one. Either
    // should unblock `spawn_with_grace`, so both fire into one merged
    // token via a small forwarding task.
    let marker_cancel = CancellationToken::new();
    let effective_cancel = CancellationToken::new();
    {
        let effective_cancel = effective_cancel.clone();
        let scan_cancel = ctx.cancel.clone();
        let marker_cancel = marker_cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = scan_cancel.cancelled() => effective_cancel.cancel(),
                _ = marker_cancel.cancelled() => effective_cancel.cancel(),
            }
        });
    }

    let watcher = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let ToolOutputLine::Stdout(text) = &line {
                if is_completion_marker(text) {
                    tokio::time::sleep(POST_MARKER_DELAY).await;
                    marker_cancel.cancel();
                    break;
                }
            }
        }
    });

    let spawn_result = ctx
        .supervisor
        .spawn_with_grace(
            "sqli-crawl",
            &invocation,
            CRAWL_DEADLINE,
            CRAWL_GRACE_PERIOD,
            &effective_cancel,
            tx,
        )
        .await;
    let _ = watcher.await;

    match spawn_result {
        Ok(_) => {}
        Err(err) => {
            ctx.log(LogLevel::Warn, format!("crawl invocation failed: {err}")).await;
        }
    }

    let csv_path = find_discovery_csv(&ctx.config.tmp_dir, CSV_SEARCH_ATTEMPTS, CSV_SEARCH_INTERVAL).await;
    let csv_path = match csv_path {
        Some(path) => path,
        None => {
            ctx.log(
                LogLevel::Warn,
                format!(
                    "no discovery csv found under {}; discovery yields zero endpoints",
                    ctx.config.tmp_dir.display()
                ),
            )
            .await;
            ask_discovery_question(ctx).await;
            return Ok(());
        }
    };

    let contents = match std::fs::read_to_string(&csv_path) {
        Ok(contents) => contents,
        Err(err) => {
            ctx.log(LogLevel::Warn, format!("failed to read discovery csv {}: {err}", csv_path.display())).await;
            ask_discovery_question(ctx).await;
            return Ok(());
        }
    };

    let rows = match parse_csv(&contents) {
        Ok(rows) => rows,
        Err(err) => {
            ctx.log(LogLevel::Warn, format!("discovery csv malformed: {err}")).await;
            Vec::new()
        }
    };

    {
        let mut agg = ctx.aggregate.lock().await;
        for (endpoint, parameters) in &rows {
            agg.add_endpoint(endpoint.clone(), parameters.clone());
        }
    }

    for (endpoint, _) in &rows {
        ctx.events.publish(ScanEvent::EndpointDiscovered {
            url: endpoint.url.clone(),
            method: endpoint.method.to_string(),
        });
        for name in &endpoint.parameters {
            ctx.events.publish(ScanEvent::ParameterDiscovered {
                url: endpoint.url.clone(),
                name: name.clone(),
            });
        }
    }

    std::fs::create_dir_all(&ctx.config.output_dir)?;
    let endpoints: Vec<_> = rows.into_iter().map(|(endpoint, _)| endpoint).collect();
    write_get_targets(&ctx.config.output_dir, &endpoints)?;
    write_post_targets(&ctx.config.output_dir, &endpoints)?;

    ask_discovery_question(ctx).await;
    Ok(())
}

async fn ask_discovery_question(ctx: &PhaseContext) {
    let spec = QuestionSpec {
        id: Some("discovery-1".into()),
        phase: PhaseId::Discovery,
        text: "Why might a crawler be given fake answers to interactive prompts?".into(),
        options: vec![
            "So it runs unattended in batch mode".into(),
            "To make it run faster".into(),
            "To disable logging".into(),
        ],
        correct_index: 0,
        points: 10,
        difficulty: Difficulty::Media,
    };
    if let Some(result) = ctx.questions.ask(spec, &ctx.events, &ctx.cancel).await {
        ctx.aggregate.lock().await.push_question_result(result);
    }
}

fn build_crawl_args(ctx: &PhaseContext) -> Vec<String> {
    let mut args = vec![
        "-u".to_string(),
        ctx.config.target_url.clone(),
        "--crawl".to_string(),
        ctx.config.crawl_depth.to_string(),
        format!("--answers=\"{CRAWL_ANSWERS}\""),
        "--forms".to_string(),
        "--batch".to_string(),
        "--random-agent".to_string(),
        "--threads".to_string(),
        ctx.config.thread_count.to_string(),
        "--tmp-dir".to_string(),
        ctx.config.tmp_dir.display().to_string(),
        "-v".to_string(),
        "1".to_string(),
    ];
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
