//! Detects the line marker the crawl invocation prints to say "crawling is
//! done", and the retry loop for locating the resulting CSV artifact,
//! which may lag a few seconds behind that completion line.
//!
//! Grounded in the teacher's `signals/parser.rs`: fixed regex statics
//! compiled once via `LazyLock`, matched line-by-line against a tool's
//! stdout stream rather than parsing structured output.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

static CRAWL_FOUND_TARGETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)found a total of \d+ targets?").unwrap());

/// True if `line` is the crawl tool's "found a total of N targets" marker.
pub fn is_completion_marker(line: &str) -> bool {
    CRAWL_FOUND_TARGETS.is_match(line)
}

/// Find the newest `*.csv` file under `tmp_dir` modified within the last
/// hour, retrying up to `attempts` times with `interval` between tries.
/// The crawl tool's completion line can print slightly before its CSV is
/// flushed to disk, so a single pass right after the marker is seen is
/// not reliable, per spec.md's discovery-artifact-reader edge case.
pub async fn find_discovery_csv(
    tmp_dir: &Path,
    attempts: u32,
    interval: Duration,
) -> Option<PathBuf> {
    for attempt in 0..attempts.max(1) {
        if let Some(found) = newest_recent_csv(tmp_dir) {
            return Some(found);
        }
        if attempt + 1 < attempts {
            tokio::time::sleep(interval).await;
        }
    }
    None
}

fn newest_recent_csv(tmp_dir: &Path) -> Option<PathBuf> {
    let now = SystemTime::now();
    let one_hour_ago = now.checked_sub(Duration::from_secs(3600));

    WalkDir::new(tmp_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            match one_hour_ago {
                Some(cutoff) if modified < cutoff => None,
                _ => Some((modified, entry.path().to_path_buf())),
            }
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_crawl_completion_phrasing() {
        assert!(is_completion_marker(
            "[15:02:03] [INFO] found a total of 12 targets"
        ));
        assert!(is_completion_marker("found a total of 1 target"));
    }

    #[test]
    fn ignores_unrelated_lines() {
        assert!(!is_completion_marker("[INFO] testing connection to target"));
    }

    #[tokio::test]
    async fn find_discovery_csv_locates_recent_csv_in_tmp_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fresh.csv"), "URL,POST").unwrap();
        let found = find_discovery_csv(dir.path(), 3, Duration::from_millis(10)).await;
        assert_eq!(found, Some(dir.path().join("fresh.csv")));
    }

    #[tokio::test]
    async fn find_discovery_csv_gives_up_after_attempts_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let found = find_discovery_csv(dir.path(), 2, Duration::from_millis(5)).await;
        assert_eq!(found, None);
    }
}
