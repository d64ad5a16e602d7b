//! `ScanConfig`: the immutable, validated configuration for one scan.
//!
//! Mirrors the teacher's `Config::new`-then-freeze shape, but the core never
//! reads a config file or environment variable itself (spec.md explicitly
//! excludes configuration loading) — callers build a `ScanConfig` from
//! already-resolved values via `ScanConfigBuilder`, and `validate()` is the
//! one fallible step.

use crate::errors::ConfigError;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolFlags {
    pub sqli: bool,
    pub xss: bool,
}

/// A single `Name: Value` custom header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidHeader(raw.to_string()))?;
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidHeader(raw.to_string()));
        }
        Ok(Header {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    pub fn as_cli_value(&self) -> String {
        format!("{}: {}", self.name, self.value)
    }
}

/// Immutable, validated scan configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub target_url: String,
    pub flags: ToolFlags,
    pub sqli_tool_path: String,
    pub xss_tool_path: String,
    pub crawl_depth: u32,
    pub sqli_level: u8,
    pub sqli_risk: u8,
    pub thread_count: u32,
    pub timeout_secs: u64,
    pub dbms_hint: Option<String>,
    pub headers: Vec<Header>,
    pub output_dir: PathBuf,
    pub tmp_dir: PathBuf,
    /// Passes `--blind` to the XSS tool, per spec.md §4.6/§6.
    pub xss_blind: bool,
}

/// Builder that accumulates raw values and performs `ScanConfig::validate`
/// on `build()`. Optional fields default the way spec.md §3 describes.
#[derive(Debug, Clone, Default)]
pub struct ScanConfigBuilder {
    target_url: Option<String>,
    sqli: bool,
    xss: bool,
    sqli_tool_path: Option<String>,
    xss_tool_path: Option<String>,
    crawl_depth: Option<u32>,
    sqli_level: Option<u8>,
    sqli_risk: Option<u8>,
    thread_count: Option<u32>,
    timeout_secs: Option<u64>,
    dbms_hint: Option<String>,
    headers: Vec<String>,
    output_dir: Option<PathBuf>,
    tmp_dir: Option<PathBuf>,
    xss_blind: bool,
}

impl ScanConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    pub fn sqli(mut self, enabled: bool) -> Self {
        self.sqli = enabled;
        self
    }

    pub fn xss(mut self, enabled: bool) -> Self {
        self.xss = enabled;
        self
    }

    pub fn sqli_tool_path(mut self, path: impl Into<String>) -> Self {
        self.sqli_tool_path = Some(path.into());
        self
    }

    pub fn xss_tool_path(mut self, path: impl Into<String>) -> Self {
        self.xss_tool_path = Some(path.into());
        self
    }

    pub fn crawl_depth(mut self, depth: u32) -> Self {
        self.crawl_depth = Some(depth);
        self
    }

    pub fn sqli_level(mut self, level: u8) -> Self {
        self.sqli_level = Some(level);
        self
    }

    pub fn sqli_risk(mut self, risk: u8) -> Self {
        self.sqli_risk = Some(risk);
        self
    }

    pub fn thread_count(mut self, n: u32) -> Self {
        self.thread_count = Some(n);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn dbms_hint(mut self, hint: impl Into<String>) -> Self {
        self.dbms_hint = Some(hint.into());
        self
    }

    pub fn header(mut self, raw: impl Into<String>) -> Self {
        self.headers.push(raw.into());
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }

    pub fn xss_blind(mut self, enabled: bool) -> Self {
        self.xss_blind = enabled;
        self
    }

    pub fn build(self) -> Result<ScanConfig, ConfigError> {
        let target_url = self.target_url.ok_or(ConfigError::MissingTargetUrl)?;
        if target_url.trim().is_empty() {
            return Err(ConfigError::MissingTargetUrl);
        }
        if !looks_like_absolute_url(&target_url) {
            return Err(ConfigError::InvalidTargetUrl(target_url));
        }

        if !self.sqli && !self.xss {
            return Err(ConfigError::NoToolsEnabled);
        }

        let crawl_depth = self.crawl_depth.unwrap_or(2);
        let sqli_level = self.sqli_level.unwrap_or(1);
        if !(1..=5).contains(&sqli_level) {
            return Err(ConfigError::InvalidSqliLevel(sqli_level));
        }
        let sqli_risk = self.sqli_risk.unwrap_or(1);
        if !(1..=3).contains(&sqli_risk) {
            return Err(ConfigError::InvalidSqliRisk(sqli_risk));
        }
        let thread_count = self.thread_count.unwrap_or(4);
        if thread_count < 1 {
            return Err(ConfigError::InvalidThreadCount(thread_count));
        }
        let timeout_secs = self.timeout_secs.unwrap_or(30);
        if timeout_secs < 1 {
            return Err(ConfigError::InvalidTimeout(timeout_secs));
        }

        let mut headers = Vec::with_capacity(self.headers.len());
        for raw in &self.headers {
            headers.push(Header::parse(raw)?);
        }

        let sqli_tool_path = self.sqli_tool_path.unwrap_or_else(|| "sqlmap".to_string());
        validate_tool_path("sqli", &sqli_tool_path)?;
        let xss_tool_path = self.xss_tool_path.unwrap_or_else(|| "xsstrike".to_string());
        validate_tool_path("xss", &xss_tool_path)?;

        Ok(ScanConfig {
            target_url,
            flags: ToolFlags {
                sqli: self.sqli,
                xss: self.xss,
            },
            sqli_tool_path,
            xss_tool_path,
            crawl_depth,
            sqli_level,
            sqli_risk,
            thread_count,
            timeout_secs,
            dbms_hint: self.dbms_hint,
            headers,
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("./scan-output")),
            tmp_dir: self.tmp_dir.unwrap_or_else(std::env::temp_dir),
            xss_blind: self.xss_blind,
        })
    }
}

/// A tool path must be a non-blank token: either a bare command name
/// resolved via `PATH`, or a path to a script/executable. Catches the
/// empty-string and whitespace-only cases `resolve_invocation` would
/// otherwise hand straight to `Command::new`.
fn validate_tool_path(tool: &'static str, path: &str) -> Result<(), ConfigError> {
    if path.trim().is_empty() {
        return Err(ConfigError::InvalidToolPath { tool, path: path.to_string() });
    }
    Ok(())
}

fn looks_like_absolute_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_target_url_is_fatal() {
        let result = ScanConfigBuilder::new().sqli(true).build();
        assert!(matches!(result, Err(ConfigError::MissingTargetUrl)));
    }

    #[test]
    fn no_tools_enabled_is_fatal() {
        let result = ScanConfigBuilder::new()
            .target_url("http://example.test/")
            .build();
        assert!(matches!(result, Err(ConfigError::NoToolsEnabled)));
    }

    #[test]
    fn relative_url_is_rejected() {
        let result = ScanConfigBuilder::new()
            .target_url("/not/absolute")
            .sqli(true)
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidTargetUrl(_))));
    }

    #[test]
    fn valid_config_builds() {
        let config = ScanConfigBuilder::new()
            .target_url("http://example.test/")
            .sqli(true)
            .xss(true)
            .header("X-Api-Key: abc123")
            .build()
            .unwrap();
        assert_eq!(config.crawl_depth, 2);
        assert_eq!(config.headers[0].name, "X-Api-Key");
        assert_eq!(config.headers[0].value, "abc123");
    }

    #[test]
    fn invalid_header_is_rejected() {
        let result = ScanConfigBuilder::new()
            .target_url("http://example.test/")
            .sqli(true)
            .header("not-a-header")
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidHeader(_))));
    }

    #[test]
    fn blank_tool_path_is_rejected() {
        let result = ScanConfigBuilder::new()
            .target_url("http://example.test/")
            .sqli(true)
            .sqli_tool_path("   ")
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidToolPath { tool: "sqli", .. })));
    }

    #[test]
    fn out_of_range_sqli_level_is_rejected() {
        let result = ScanConfigBuilder::new()
            .target_url("http://example.test/")
            .sqli(true)
            .sqli_level(9)
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidSqliLevel(9))));
    }
}
