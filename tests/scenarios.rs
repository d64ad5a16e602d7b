//! End-to-end scenarios driving a real `Orchestrator` against small shell
//! scripts standing in for `sqlmap`/`xsstrike`. Each script is resolved
//! through the `.sh` interpreter mapping in `process::supervisor`, so no
//! execute bit is required, though one is set for realism.

use scan_orchestrator::config::ScanConfigBuilder;
use scan_orchestrator::events::{recv_logging_lag, ScanEvent};
use scan_orchestrator::model::ScanState;
use scan_orchestrator::orchestrator::{Orchestrator, ScanStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Waits (bounded by `within`) for the next event satisfying `pred`,
/// draining and ignoring everything else.
async fn wait_for_event<F>(events: &mut broadcast::Receiver<ScanEvent>, within: Duration, mut pred: F) -> ScanEvent
where
    F: FnMut(&ScanEvent) -> bool,
{
    tokio::time::timeout(within, async {
        loop {
            match recv_logging_lag(events).await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event bus closed before a matching event arrived"),
            }
        }
    })
    .await
    .expect("timed out waiting for expected event")
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }
    path
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

async fn wait_for_terminal(orchestrator: &Orchestrator) -> ScanStatus {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let status = orchestrator.get_status().await;
            if status.state.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("scan did not reach a terminal state in time")
}

/// A crawler that announces completion and writes one GET endpoint with
/// `id` as a query parameter; a scanner branch that reports it vulnerable.
const CRAWL_ONE_GET_AND_VULNERABLE: &str = r#"#!/bin/sh
tmp_dir=""
prev=""
for a in "$@"; do
  if [ "$prev" = "--tmp-dir" ]; then tmp_dir="$a"; fi
  prev="$a"
done
case "$*" in
  *--crawl*)
    echo "found a total of 1 targets"
    printf 'URL,POST\nhttp://t/a?id=1,\n' > "$tmp_dir/discovered.csv"
    ;;
  *)
    echo "Parameter: id is vulnerable"
    ;;
esac
"#;

#[tokio::test(flavor = "multi_thread")]
async fn happy_path_sqli_only_finds_one_vulnerability() {
    let tmp = tempfile::tempdir().unwrap();
    let tool = write_script(tmp.path(), "fake_sqli.sh", CRAWL_ONE_GET_AND_VULNERABLE);

    let config = ScanConfigBuilder::new()
        .target_url("http://t/")
        .sqli(true)
        .sqli_tool_path(path_arg(&tool))
        .tmp_dir(tmp.path().to_path_buf())
        .output_dir(tmp.path().join("out"))
        .timeout_secs(5)
        .build()
        .unwrap();

    let orchestrator = Orchestrator::new(config);
    orchestrator.start().await.unwrap();
    let status = wait_for_terminal(&orchestrator).await;

    assert_eq!(status.state, ScanState::Finalized);
    assert_eq!(status.stats.vulnerabilities_found, 1);
    assert_eq!(status.vulnerabilities.len(), 1);
    assert_eq!(status.vulnerabilities[0].endpoint_url, "http://t/a?id=1");
    assert_eq!(status.vulnerabilities[0].parameter, "id");
}

/// SQLi stdout reports the same injectable parameter twice in one
/// invocation; the dedup set must collapse it to a single Vulnerability.
const CRAWL_ONE_GET_AND_DUPLICATE_VULNERABLE: &str = r#"#!/bin/sh
tmp_dir=""
prev=""
for a in "$@"; do
  if [ "$prev" = "--tmp-dir" ]; then tmp_dir="$a"; fi
  prev="$a"
done
case "$*" in
  *--crawl*)
    echo "found a total of 1 targets"
    printf 'URL,POST\nhttp://t/a?id=1,\n' > "$tmp_dir/discovered.csv"
    ;;
  *)
    printf 'Parameter: id is vulnerable\nParameter: id is vulnerable\n'
    ;;
esac
"#;

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_finding_collapses_to_one_vulnerability() {
    let tmp = tempfile::tempdir().unwrap();
    let tool = write_script(tmp.path(), "fake_sqli.sh", CRAWL_ONE_GET_AND_DUPLICATE_VULNERABLE);

    let config = ScanConfigBuilder::new()
        .target_url("http://t/")
        .sqli(true)
        .sqli_tool_path(path_arg(&tool))
        .tmp_dir(tmp.path().to_path_buf())
        .output_dir(tmp.path().join("out"))
        .timeout_secs(5)
        .build()
        .unwrap();

    let orchestrator = Orchestrator::new(config);
    orchestrator.start().await.unwrap();
    let status = wait_for_terminal(&orchestrator).await;

    assert_eq!(status.stats.vulnerabilities_found, 1);
    assert_eq!(status.vulnerabilities.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn crawl_with_no_csv_yields_zero_endpoints() {
    let tmp = tempfile::tempdir().unwrap();
    let tool = write_script(tmp.path(), "fake_sqli.sh", "#!/bin/sh\nexit 0\n");

    let config = ScanConfigBuilder::new()
        .target_url("http://t/")
        .sqli(true)
        .sqli_tool_path(path_arg(&tool))
        .tmp_dir(tmp.path().to_path_buf())
        .output_dir(tmp.path().join("out"))
        .timeout_secs(5)
        .build()
        .unwrap();

    let orchestrator = Orchestrator::new(config);
    orchestrator.start().await.unwrap();
    let status = wait_for_terminal(&orchestrator).await;

    assert_eq!(status.state, ScanState::Finalized);
    assert!(status.endpoints.is_empty());
    assert!(status.vulnerabilities.is_empty());
    assert_eq!(status.stats.vulnerabilities_found, 0);
    assert!(status.recent_logs.iter().any(|l| l.message.contains("no discovery csv found")));
}

/// A long-running scanner branch so `stop()` has something in flight to
/// terminate; the crawler branch still returns one GET endpoint promptly.
const CRAWL_ONE_GET_THEN_HANG: &str = r#"#!/bin/sh
tmp_dir=""
prev=""
for a in "$@"; do
  if [ "$prev" = "--tmp-dir" ]; then tmp_dir="$a"; fi
  prev="$a"
done
case "$*" in
  *--crawl*)
    echo "found a total of 1 targets"
    printf 'URL,POST\nhttp://t/a?id=1,\n' > "$tmp_dir/discovered.csv"
    ;;
  *)
    sleep 30
    ;;
esac
"#;

#[tokio::test(flavor = "multi_thread")]
async fn stop_during_sqli_drains_the_registry_and_emits_scan_stopped() {
    let tmp = tempfile::tempdir().unwrap();
    let tool = write_script(tmp.path(), "fake_sqli.sh", CRAWL_ONE_GET_THEN_HANG);

    let config = ScanConfigBuilder::new()
        .target_url("http://t/")
        .sqli(true)
        .sqli_tool_path(path_arg(&tool))
        .tmp_dir(tmp.path().to_path_buf())
        .output_dir(tmp.path().join("out"))
        .timeout_secs(60)
        .build()
        .unwrap();

    let orchestrator = Arc::new(Orchestrator::new(config));
    let mut events = orchestrator.subscribe();
    orchestrator.start().await.unwrap();

    // Wait until the sqli phase is actually under way before stopping, so
    // there is a real in-flight process for stop() to terminate.
    wait_for_event(&mut events, Duration::from_secs(20), |e| {
        matches!(e, ScanEvent::SubPhaseStarted { .. })
    })
    .await;

    orchestrator.stop().await.unwrap();

    let registry_drained = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if orchestrator.get_status().await.state == ScanState::Stopped {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(registry_drained.is_ok(), "scan did not transition to stopped in time");

    let saw_completed = tokio::time::timeout(Duration::from_millis(200), async {
        loop {
            if let Some(ScanEvent::ScanCompleted { .. }) = recv_logging_lag(&mut events).await {
                return true;
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(!saw_completed, "scan:completed must never follow scan:stopped");
}

const CRAWL_ONE_GET_FOR_XSS: &str = r#"#!/bin/sh
tmp_dir=""
prev=""
for a in "$@"; do
  if [ "$prev" = "--tmp-dir" ]; then tmp_dir="$a"; fi
  prev="$a"
done
case "$*" in
  *--crawl*)
    echo "found a total of 1 targets"
    printf 'URL,POST\nhttp://t/search?q=1,\n' > "$tmp_dir/discovered.csv"
    ;;
  *)
    ;;
esac
"#;

#[tokio::test(flavor = "multi_thread")]
async fn malformed_xss_json_yields_zero_vulnerabilities_and_a_warning() {
    let tmp = tempfile::tempdir().unwrap();
    let crawler = write_script(tmp.path(), "fake_sqli.sh", CRAWL_ONE_GET_FOR_XSS);
    let xss_tool = write_script(tmp.path(), "fake_xss.sh", "#!/bin/sh\necho 'not json'\n");

    let config = ScanConfigBuilder::new()
        .target_url("http://t/")
        .xss(true)
        .sqli_tool_path(path_arg(&crawler))
        .xss_tool_path(path_arg(&xss_tool))
        .tmp_dir(tmp.path().to_path_buf())
        .output_dir(tmp.path().join("out"))
        .timeout_secs(5)
        .build()
        .unwrap();

    let orchestrator = Orchestrator::new(config);
    orchestrator.start().await.unwrap();
    let status = wait_for_terminal(&orchestrator).await;

    assert_eq!(status.state, ScanState::Finalized);
    assert!(status.vulnerabilities.is_empty());
    assert!(status
        .recent_logs
        .iter()
        .any(|l| l.message.contains("was not valid json")));
}

/// A crawl that discovers one GET endpoint with no query string or body at
/// all; the scanner branch records whether it was invoked without `-p` so
/// the test can confirm the wildcard fallback fired instead of the
/// endpoint being silently skipped.
const CRAWL_ONE_PARAMETERLESS_GET: &str = r#"#!/bin/sh
tmp_dir=""
prev=""
has_p="no"
for a in "$@"; do
  if [ "$prev" = "--tmp-dir" ]; then tmp_dir="$a"; fi
  if [ "$a" = "-p" ]; then has_p="yes"; fi
  prev="$a"
done
case "$*" in
  *--crawl*)
    echo "found a total of 1 targets"
    printf 'URL,POST\nhttp://t/a,\n' > "$tmp_dir/discovered.csv"
    ;;
  *)
    echo "$has_p" > "$tmp_dir/had_dash_p"
    ;;
esac
"#;

#[tokio::test(flavor = "multi_thread")]
async fn parameterless_endpoint_is_tested_via_wildcard_instead_of_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let tool = write_script(tmp.path(), "fake_sqli.sh", CRAWL_ONE_PARAMETERLESS_GET);

    let config = ScanConfigBuilder::new()
        .target_url("http://t/")
        .sqli(true)
        .sqli_tool_path(path_arg(&tool))
        .tmp_dir(tmp.path().to_path_buf())
        .output_dir(tmp.path().join("out"))
        .timeout_secs(5)
        .build()
        .unwrap();

    let orchestrator = Orchestrator::new(config);
    orchestrator.start().await.unwrap();
    let status = wait_for_terminal(&orchestrator).await;

    assert_eq!(status.state, ScanState::Finalized);
    let marker = tmp.path().join("had_dash_p");
    assert!(marker.exists(), "sqli tool was never invoked for the parameterless endpoint");
    assert_eq!(std::fs::read_to_string(marker).unwrap().trim(), "no");
}

#[tokio::test(flavor = "multi_thread")]
async fn pause_over_a_question_delays_the_answer_until_the_scan_continues() {
    let tmp = tempfile::tempdir().unwrap();
    let tool = write_script(tmp.path(), "fake_sqli.sh", CRAWL_ONE_GET_AND_VULNERABLE);

    let config = ScanConfigBuilder::new()
        .target_url("http://t/")
        .sqli(true)
        .sqli_tool_path(path_arg(&tool))
        .tmp_dir(tmp.path().to_path_buf())
        .output_dir(tmp.path().join("out"))
        .timeout_secs(5)
        .build()
        .unwrap();

    let orchestrator = Arc::new(Orchestrator::new(config));
    let mut events = orchestrator.subscribe();
    orchestrator.start().await.unwrap();

    let spec = match wait_for_event(&mut events, Duration::from_secs(10), |e| {
        matches!(e, ScanEvent::QuestionAsked { .. })
    })
    .await
    {
        ScanEvent::QuestionAsked { spec } => spec,
        _ => unreachable!(),
    };

    let answering = orchestrator.clone();
    let correct_index = spec.correct_index;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        answering.answer_question(correct_index).await;
    });

    let result = match wait_for_event(&mut events, Duration::from_secs(10), |e| {
        matches!(e, ScanEvent::QuestionResultEvent { .. })
    })
    .await
    {
        ScanEvent::QuestionResultEvent { result } => result,
        _ => unreachable!(),
    };
    assert!(result.correct);

    let status = wait_for_terminal(&orchestrator).await;
    assert_eq!(status.state, ScanState::Finalized);
}
