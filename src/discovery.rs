//! Discovery Artifact Reader: turns the crawl tool's CSV into the
//! deduplicated `Endpoint`/`Parameter` set, and writes the two derived
//! targets files spec.md §6 requires downstream collaborators to read.
//!
//! The CSV is deliberately *not* RFC 4180: its header is the literal
//! `URL,POST` and each data row is URL followed by a single comma and a
//! POST body that may itself contain commas — only the first comma is
//! the separator. A quoting-aware CSV crate would corrupt such bodies, so
//! this is hand-parsed with `str::split_once(',')` (see DESIGN.md).

use crate::errors::ScanError;
use crate::model::{Endpoint, Method, ParamKind, Parameter};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static QUERY_PARAM_FALLBACK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?&]([^=&]+)=").unwrap());

const EXPECTED_HEADER: &str = "URL,POST";

/// One parsed CSV data row, before merging into the endpoint/parameter set.
struct DiscoveryRow {
    url: String,
    body: Option<String>,
}

/// Parses the crawl CSV's body into `(endpoint, parameters)` pairs. The
/// caller folds these into a `DedupSet` keyed by `(method, url)`.
pub fn parse_csv(contents: &str) -> Result<Vec<(Endpoint, Vec<Parameter>)>, ScanError> {
    let mut lines = contents.lines();
    let header = lines.next().unwrap_or_default().trim();
    if header != EXPECTED_HEADER {
        return Err(ScanError::ParseError {
            what: "discovery csv header",
            detail: format!("expected `{EXPECTED_HEADER}`, got `{header}`"),
        });
    }

    let mut results = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        match parse_row(line) {
            Some(row) => results.push(build_endpoint(row)),
            None => {
                tracing::warn!(line, "skipping malformed discovery csv row");
            }
        }
    }
    Ok(results)
}

fn parse_row(line: &str) -> Option<DiscoveryRow> {
    let (url, body) = line.split_once(',')?;
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    let body = body.trim();
    Some(DiscoveryRow {
        url: url.to_string(),
        body: if body.is_empty() {
            None
        } else {
            Some(body.to_string())
        },
    })
}

fn build_endpoint(row: DiscoveryRow) -> (Endpoint, Vec<Parameter>) {
    let method = if row.body.is_some() { Method::Post } else { Method::Get };
    let mut endpoint = Endpoint::new(row.url.clone(), method);
    endpoint.post_data = row.body.clone();

    let mut names = Vec::new();
    let mut kinds = Vec::new();
    for name in query_param_names(&row.url) {
        if !names.contains(&name) {
            names.push(name);
            kinds.push(ParamKind::Query);
        }
    }
    if let Some(body) = &row.body {
        for name in body_param_names(body) {
            if !names.contains(&name) {
                names.push(name);
                kinds.push(ParamKind::Body);
            }
        }
    }
    endpoint.parameters = names.clone();

    let key = endpoint.dedup_key();
    let parameters = names
        .into_iter()
        .zip(kinds)
        .map(|(name, kind)| Parameter {
            endpoint_key: key.clone(),
            name,
            kind,
            testable: true,
        })
        .collect();

    (endpoint, parameters)
}

fn query_param_names(url: &str) -> Vec<String> {
    if let Ok(parsed) = url::Url::parse(url) {
        return parsed
            .query_pairs()
            .map(|(name, _)| name.into_owned())
            .collect();
    }
    QUERY_PARAM_FALLBACK
        .captures_iter(url)
        .map(|c| c[1].to_string())
        .collect()
}

fn body_param_names(body: &str) -> Vec<String> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').map(|(name, _)| name).unwrap_or(pair).to_string())
        .collect()
}

/// Writes `get_targets.txt`: one discovered GET endpoint URL per line.
pub fn write_get_targets(output_dir: &Path, endpoints: &[Endpoint]) -> Result<(), ScanError> {
    let mut contents = String::new();
    for endpoint in endpoints.iter().filter(|e| e.method == Method::Get) {
        contents.push_str(&endpoint.url);
        contents.push('\n');
    }
    std::fs::write(output_dir.join("get_targets.txt"), contents)?;
    Ok(())
}

/// Writes `post_targets.txt`: one `URL|||BODY` line per discovered POST
/// endpoint. If an endpoint carries no recorded body, one is reconstructed
/// from its parameter names as `name1=&name2=…`.
pub fn write_post_targets(output_dir: &Path, endpoints: &[Endpoint]) -> Result<(), ScanError> {
    let mut contents = String::new();
    for endpoint in endpoints.iter().filter(|e| e.method == Method::Post) {
        let body = endpoint.post_data.clone().unwrap_or_else(|| {
            endpoint
                .parameters
                .iter()
                .map(|name| format!("{name}="))
                .collect::<Vec<_>>()
                .join("&")
        });
        contents.push_str(&endpoint.url);
        contents.push_str("|||");
        contents.push_str(&body);
        contents.push('\n');
    }
    std::fs::write(output_dir.join("post_targets.txt"), contents)?;
    Ok(())
}
