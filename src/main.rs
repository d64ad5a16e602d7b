//! `scanctl`: a demonstration CLI driving one `Orchestrator` scan end to
//! end, rendering its event stream and forwarding `question:asked` events
//! to an interactive prompt.

use clap::{Parser, Subcommand};
use scan_orchestrator::config::ScanConfigBuilder;
use scan_orchestrator::events::{recv_logging_lag, ScanEvent};
use scan_orchestrator::orchestrator::Orchestrator;
use scan_orchestrator::ui::ScanUi;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "scanctl", version, about = "Phase-driven SQLi/XSS scan orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scan against a target URL to completion.
    Scan {
        /// Absolute target URL.
        target_url: String,

        /// Run the SQLi phase.
        #[arg(long)]
        sqli: bool,

        /// Run the XSS phase.
        #[arg(long)]
        xss: bool,

        /// Test for blind XSS (out-of-band) instead of reflected/stored.
        #[arg(long)]
        blind: bool,

        #[arg(long, default_value = "sqlmap")]
        sqli_tool: String,

        #[arg(long, default_value = "xsstrike")]
        xss_tool: String,

        #[arg(long, default_value_t = 2)]
        crawl_depth: u32,

        #[arg(long, default_value_t = 1)]
        sqli_level: u8,

        #[arg(long, default_value_t = 1)]
        sqli_risk: u8,

        #[arg(long, default_value_t = 4)]
        threads: u32,

        #[arg(long, default_value_t = 30)]
        timeout: u64,

        #[arg(long)]
        dbms: Option<String>,

        /// Custom header, `Name: Value`. May be repeated.
        #[arg(long = "header")]
        headers: Vec<String>,

        #[arg(long, default_value = "./scan-output")]
        output_dir: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scan {
            target_url,
            sqli,
            xss,
            blind,
            sqli_tool,
            xss_tool,
            crawl_depth,
            sqli_level,
            sqli_risk,
            threads,
            timeout,
            dbms,
            headers,
            output_dir,
        } => {
            let mut builder = ScanConfigBuilder::new()
                .target_url(target_url)
                .sqli(sqli)
                .xss(xss)
                .xss_blind(blind)
                .sqli_tool_path(sqli_tool)
                .xss_tool_path(xss_tool)
                .crawl_depth(crawl_depth)
                .sqli_level(sqli_level)
                .sqli_risk(sqli_risk)
                .thread_count(threads)
                .timeout_secs(timeout)
                .output_dir(output_dir);
            if let Some(dbms) = dbms {
                builder = builder.dbms_hint(dbms);
            }
            for header in headers {
                builder = builder.header(header);
            }
            let config = builder.build()?;

            let orchestrator = Arc::new(Orchestrator::new(config));
            let ui = Arc::new(ScanUi::new());
            let mut events = orchestrator.subscribe();

            let render_orchestrator = orchestrator.clone();
            let render_ui = ui.clone();
            let render_task = tokio::spawn(async move {
                while let Some(event) = recv_logging_lag(&mut events).await {
                    render_ui.render(&event);
                    if let ScanEvent::QuestionAsked { spec } = &event {
                        if let Ok(selected) = render_ui.prompt_question(spec) {
                            render_orchestrator.answer_question(selected).await;
                        }
                    }
                    if matches!(
                        event,
                        ScanEvent::ScanCompleted { .. } | ScanEvent::ScanError { .. } | ScanEvent::ScanStopped
                    ) {
                        break;
                    }
                }
            });

            orchestrator.start().await?;

            tokio::select! {
                _ = render_task => {}
                _ = tokio::signal::ctrl_c() => {
                    orchestrator.stop().await.ok();
                }
            }

            Ok(())
        }
    }
}
