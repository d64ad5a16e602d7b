//! Extracts `Vulnerability` records from a tool's line-oriented stdout.
//!
//! Grounded in the teacher's `signals/parser.rs` regex-driven line
//! classification: a fixed set of statics, matched against each streamed
//! line rather than parsing structured output. `extract_json_array` below
//! covers the XSS tool's buffered-JSON-array output shape.

use crate::model::{Severity, VulnKind, Vulnerability};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

/// Lines that are pure tool chrome: ASCII-art banners, legal disclaimers,
/// timestamp-prefixed startup info, quit/continue prompts. Never a
/// vulnerability signal, dropped before any other classification runs.
static BANNER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(___|legal disclaimer|usage of sqlmap|press .* to continue|\[\d+:\d+:\d+\])").unwrap()
});

static VULNERABILITY_SIGNAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)vulnerable|injectable|injection point").unwrap());

static PARAMETER_COLON_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Parameter:\s*.*?([A-Za-z0-9_]+)\s*$").unwrap());

static CRITICAL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[CRITICAL\].*?([A-Za-z0-9_]+)\s*$").unwrap());

/// Scans one streamed sqlmap line. `candidate_params` is the endpoint's
/// known parameter list, checked in order per the parameter-attribution
/// rule: the first candidate for which the line contains its name, or
/// matches `Parameter: … <name>`, or `[CRITICAL] … <name>`, is attributed.
/// SQLi findings are always `Severity::Critical` per spec.
pub fn scan_sqli_line(line: &str, endpoint_url: &str, candidate_params: &[String]) -> Option<Vulnerability> {
    if BANNER_LINE.is_match(line) {
        return None;
    }
    if !VULNERABILITY_SIGNAL.is_match(line) {
        return None;
    }

    let parameter = attribute_parameter(line, candidate_params)?;
    Some(Vulnerability {
        kind: VulnKind::Sqli,
        severity: Severity::Critical,
        endpoint_url: endpoint_url.to_string(),
        parameter,
        description: line.trim().to_string(),
    })
}

fn attribute_parameter(line: &str, candidate_params: &[String]) -> Option<String> {
    for name in candidate_params {
        if line.contains(name.as_str())
            || PARAMETER_COLON_NAME
                .captures(line)
                .is_some_and(|c| &c[1] == name.as_str())
            || CRITICAL_NAME
                .captures(line)
                .is_some_and(|c| &c[1] == name.as_str())
        {
            return Some(name.clone());
        }
    }
    None
}

/// One entry of the xsstrike-shaped JSON findings array.
#[derive(Debug, Deserialize)]
struct XssFindingJson {
    param: String,
    poc: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    evidence: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    cwe: Option<String>,
}

/// Parses a full XSS tool stdout payload: an array of finding objects.
/// `--format json` output is emitted once at the end of the run rather
/// than streamed line-by-line, so this takes the whole buffered stdout.
pub fn parse_xss_findings(stdout: &str, fallback_endpoint_url: &str) -> Vec<Vulnerability> {
    let Some(json) = extract_json_array(stdout) else {
        return Vec::new();
    };
    let Ok(findings) = serde_json::from_str::<Vec<XssFindingJson>>(&json) else {
        return Vec::new();
    };

    findings
        .into_iter()
        .map(|f| Vulnerability {
            kind: VulnKind::Xss,
            severity: xss_severity(f.severity.as_deref(), &f.poc),
            endpoint_url: f.url.unwrap_or_else(|| fallback_endpoint_url.to_string()),
            parameter: f.param,
            description: f.evidence.unwrap_or(f.poc),
        })
        .collect()
}

fn xss_severity(explicit: Option<&str>, poc: &str) -> Severity {
    if let Some(label) = explicit {
        return match label.to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            _ => Severity::Low,
        };
    }
    if poc.to_ascii_lowercase().contains("alert") {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// Bracket-counting scan for a top-level JSON array amid other stdout text.
fn extract_json_array(text: &str) -> Option<String> {
    let start = text.find('[')?;
    let mut depth = 0;
    let mut end = start;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    end = start + i + 1;
                    break;
                }
            }
            _ => {}
        }
    }
    if depth == 0 && end > start {
        Some(text[start..end].to_string())
    } else {
        None
    }
}
