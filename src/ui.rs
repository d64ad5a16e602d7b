//! Terminal rendering for the `scanctl` demonstration CLI: a progress bar
//! per phase and styled event lines, plus the `dialoguer` prompt used to
//! answer a `QuestionSpec` interactively.
//!
//! Grounded in the teacher's `ui/mod.rs`/`ui/progress.rs` `OrchestratorUI`:
//! one `indicatif::MultiProgress` tracking named phases, with `console`
//! styling applied per event kind rather than per tool-use block.

use crate::events::{LogLevel, ScanEvent};
use crate::model::{PhaseId, QuestionSpec};
use console::style;
use dialoguer::Select;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;

pub struct ScanUi {
    multi: MultiProgress,
    phase_bars: HashMap<PhaseId, ProgressBar>,
}

impl ScanUi {
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let mut phase_bars = HashMap::new();
        for phase in [PhaseId::Init, PhaseId::Discovery, PhaseId::Sqli, PhaseId::Xss, PhaseId::Report] {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
                    .unwrap()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "),
            );
            bar.set_prefix(phase.to_string());
            bar.set_message("pending");
            phase_bars.insert(phase, bar);
        }
        Self { multi, phase_bars }
    }

    /// Renders one scan event as a styled terminal line and/or a phase
    /// progress bar update.
    pub fn render(&self, event: &ScanEvent) {
        match event {
            ScanEvent::ScanStarted => {
                self.println(style("scan started").bold().to_string());
            }
            ScanEvent::ScanPaused => self.println(style("scan paused").yellow().to_string()),
            ScanEvent::ScanResumed => self.println(style("scan resumed").green().to_string()),
            ScanEvent::ScanStopped => self.println(style("scan stopped").red().to_string()),
            ScanEvent::ScanCompleted {
                final_score, grade, vulnerability_count, ..
            } => {
                self.println(format!(
                    "{} score={} grade={} vulnerabilities={}",
                    style("scan completed").bold().green(),
                    final_score,
                    grade,
                    vulnerability_count
                ));
            }
            ScanEvent::ScanError { message } => {
                self.println(format!("{} {}", style("scan error").bold().red(), message));
            }
            ScanEvent::PhaseStarted { phase } => {
                if let Some(bar) = self.phase_bars.get(phase) {
                    bar.enable_steady_tick(std::time::Duration::from_millis(120));
                    bar.set_message("running");
                }
            }
            ScanEvent::PhaseCompleted { phase } => {
                if let Some(bar) = self.phase_bars.get(phase) {
                    bar.disable_steady_tick();
                    bar.finish_with_message(style("completed").green().to_string());
                }
            }
            ScanEvent::SubPhaseStarted { phase, name } => {
                if let Some(bar) = self.phase_bars.get(phase) {
                    bar.set_message(format!("{name}…"));
                }
            }
            ScanEvent::SubPhaseCompleted { .. } => {}
            ScanEvent::LogAdded { level, message } => self.println(format_log(*level, message)),
            ScanEvent::EndpointDiscovered { url, method } => {
                self.println(format!("  {} {} {}", style("endpoint").cyan(), method, url));
            }
            ScanEvent::ParameterDiscovered { url, name } => {
                self.println(format!("  {} {} on {}", style("parameter").cyan(), name, url));
            }
            ScanEvent::VulnerabilityFound { vulnerability } => {
                self.println(format!(
                    "  {} {:?}/{:?} {} param={}",
                    style("vulnerability").bold().red(),
                    vulnerability.kind,
                    vulnerability.severity,
                    vulnerability.endpoint_url,
                    vulnerability.parameter
                ));
            }
            ScanEvent::QuestionAsked { spec } => {
                self.println(format!("  {} {}", style("question").magenta(), spec.text));
            }
            ScanEvent::QuestionResultEvent { result } => {
                let verdict = if result.correct { style("correct").green() } else { style("incorrect").red() };
                self.println(format!("  {} (+{} pts)", verdict, result.points_earned));
            }
        }
    }

    /// Blocks on a `dialoguer::Select` prompt and returns the chosen
    /// option's index, to be delivered via `Orchestrator::answer_question`.
    pub fn prompt_question(&self, spec: &QuestionSpec) -> std::io::Result<usize> {
        Select::new()
            .with_prompt(&spec.text)
            .items(&spec.options)
            .default(0)
            .interact()
    }

    fn println(&self, line: impl AsRef<str>) {
        let _ = self.multi.println(line.as_ref());
    }
}

impl Default for ScanUi {
    fn default() -> Self {
        Self::new()
    }
}

fn format_log(level: LogLevel, message: &str) -> String {
    match level {
        LogLevel::Info => format!("  {} {}", style("info").dim(), message),
        LogLevel::Warn => format!("  {} {}", style("warn").yellow(), message),
        LogLevel::Error => format!("  {} {}", style("error").red(), message),
    }
}
