//! `xss` phase (gated by `flags.xss`): spawns the XSS tool once per
//! discovered GET target and parses its buffered JSON findings output.

use super::PhaseContext;
use crate::errors::ScanError;
use crate::events::{LogLevel, ScanEvent};
use crate::model::{Endpoint, Method};
use crate::parser::parse_xss_findings;
use crate::process::{resolve_invocation, ToolOutputLine};
use crate::util::short_hash;
use std::time::Duration;
use tokio::sync::mpsc;

pub async fn run(ctx: &PhaseContext) -> Result<(), ScanError> {
    let targets: Vec<Endpoint> = ctx
        .aggregate
        .lock()
        .await
        .endpoints
        .values()
        .filter(|e| e.method == Method::Get)
        .cloned()
        .collect();
    let deadline = Duration::from_secs(ctx.config.timeout_secs);

    for endpoint in &targets {
        ctx.pause.await_not_paused().await;
        if ctx.pause.is_stopped() {
            return Ok(());
        }

        let args = build_args(&ctx.config, endpoint);
        let invocation = resolve_invocation(&ctx.config.xss_tool_path, args);
        let registry_key = format!("xss-{}", short_hash(&endpoint.url));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let exit = ctx
            .supervisor
            .spawn(&registry_key, &invocation, deadline, &ctx.cancel, tx)
            .await;

        let mut stdout = String::new();
        while let Ok(line) = rx.try_recv() {
            if let ToolOutputLine::Stdout(text) = line {
                stdout.push_str(&text);
                stdout.push('\n');
            }
        }

        match exit {
            Ok(_) => {
                let findings = parse_xss_findings(&stdout, &endpoint.url);
                if findings.is_empty() && !stdout.trim().is_empty() && !stdout.contains('[') {
                    ctx.log(
                        LogLevel::Warn,
                        format!("xss output for {} was not valid json; treating as zero findings", endpoint.url),
                    )
                    .await;
                }
                for vuln in findings {
                    let added = ctx.aggregate.lock().await.add_vulnerability(vuln.clone());
                    if added {
                        ctx.events.publish(ScanEvent::VulnerabilityFound { vulnerability: vuln });
                    }
                }
            }
            Err(err) => {
                ctx.log(LogLevel::Warn, format!("xss invocation for {} failed: {err}", endpoint.url)).await;
            }
        }
    }

    Ok(())
}

fn build_args(config: &crate::config::ScanConfig, endpoint: &Endpoint) -> Vec<String> {
    let mut args = vec![
        "url".to_string(),
        endpoint.url.clone(),
        "--format".to_string(),
        "json".to_string(),
        "--timeout".to_string(),
        config.timeout_secs.to_string(),
    ];
    for header in &config.headers {
        if header.name.eq_ignore_ascii_case("cookie") {
            args.push("--cookie".to_string());
            args.push(header.value.clone());
        } else {
            args.push("--header".to_string());
            args.push(header.as_cli_value());
        }
    }
    if config.xss_blind {
        args.push("--blind".to_string());
    }
    args
}
