//! The in-memory data model owned by a single `Orchestrator` instance.
//!
//! Nothing here is shared between scans; every `ScanId` gets its own
//! `Orchestrator` and its own copy of every type below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one scan. Every `Orchestrator` instance owns exactly one.
pub type ScanId = uuid::Uuid;

/// HTTP method of a discovered endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// A `(URL, method)` pair potentially carrying request parameters and body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub method: Method,
    /// Ordered, unique parameter names.
    pub parameters: Vec<String>,
    pub post_data: Option<String>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, method: Method) -> Self {
        Self {
            url: url.into(),
            method,
            parameters: Vec::new(),
            post_data: None,
        }
    }

    pub fn dedup_key(&self) -> (Method, String) {
        (self.method, self.url.clone())
    }

    /// Merge another observation of the "same" endpoint (same dedup key)
    /// into this one: union parameters in first-seen order, and adopt the
    /// other's postData if ours is empty and theirs is not.
    pub fn merge(&mut self, other: &Endpoint) {
        for p in &other.parameters {
            if !self.parameters.contains(p) {
                self.parameters.push(p.clone());
            }
        }
        if self.post_data.as_deref().unwrap_or("").is_empty() {
            if let Some(ref body) = other.post_data {
                if !body.is_empty() {
                    self.post_data = Some(body.clone());
                }
            }
        }
    }
}

/// Where a parameter was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Query,
    Body,
}

/// A named input observed on an `Endpoint`, eligible for injection testing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub endpoint_key: (Method, String),
    pub name: String,
    pub kind: ParamKind,
    pub testable: bool,
}

impl Parameter {
    /// The sentinel meaning "let the tool select a parameter itself".
    pub const WILDCARD: &'static str = "*";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VulnKind {
    Sqli,
    Xss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A confirmed injection point reported by one of the external tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub kind: VulnKind,
    pub severity: Severity,
    pub endpoint_url: String,
    pub parameter: String,
    pub description: String,
}

impl Vulnerability {
    pub fn dedup_key(&self) -> (VulnKind, String, String) {
        (self.kind, self.endpoint_url.clone(), self.parameter.clone())
    }
}

/// Difficulty tier of a `QuestionSpec`, controlling its point multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Facil,
    Media,
    Dificil,
}

impl Difficulty {
    pub fn multiplier(self) -> f64 {
        match self {
            Difficulty::Facil => 1.0,
            Difficulty::Media => 1.5,
            Difficulty::Dificil => 2.0,
        }
    }
}

/// A didactic multiple-choice question presented between/within phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub id: Option<String>,
    pub phase: PhaseId,
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub points: u32,
    pub difficulty: Difficulty,
}

/// The graded outcome of answering a `QuestionSpec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: Option<String>,
    pub phase: PhaseId,
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub user_index: usize,
    pub correct: bool,
    pub points: u32,
    pub points_earned: u32,
    pub answered_at: DateTime<Utc>,
}

/// One named step in the ordered scan pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseId {
    Init,
    Discovery,
    Sqli,
    Xss,
    Report,
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PhaseId::Init => "init",
            PhaseId::Discovery => "discovery",
            PhaseId::Sqli => "sqli",
            PhaseId::Xss => "xss",
            PhaseId::Report => "report",
        };
        write!(f, "{s}")
    }
}

/// A step within the `sqli` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqliSubPhase {
    Detection,
    Fingerprint,
    Technique,
    Exploit,
}

/// A step within the `xss` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XssSubPhase {
    Context,
    Payload,
    Fuzzing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Error,
    Skipped,
}

/// The orchestrator's record of a single phase's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub id: PhaseId,
    pub name: String,
    pub status: PhaseStatus,
    pub sqli_subphases: Vec<(SqliSubPhase, PhaseStatus)>,
    pub xss_subphases: Vec<(XssSubPhase, PhaseStatus)>,
}

impl PhaseRecord {
    pub fn new(id: PhaseId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: PhaseStatus::Pending,
            sqli_subphases: Vec::new(),
            xss_subphases: Vec::new(),
        }
    }
}

/// Monotonically non-decreasing scan counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stats {
    pub total_requests: u64,
    pub vulnerabilities_found: u64,
    pub endpoints_discovered: u64,
    pub parameters_found: u64,
}

/// Terminal/non-terminal lifecycle state of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Pending,
    InProgress,
    Finalized,
    Error,
    Stopped,
}

impl ScanState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ScanState::Finalized | ScanState::Error | ScanState::Stopped
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            ScanState::Pending => "pending",
            ScanState::InProgress => "in_progress",
            ScanState::Finalized => "finalized",
            ScanState::Error => "error",
            ScanState::Stopped => "stopped",
        }
    }
}

/// An insertion-ordered, dedup-by-key collection. Used for both the
/// Endpoint set (keyed by `(method, url)`, merging on duplicate) and the
/// Vulnerability set (keyed by `(kind, endpoint, parameter)`, first write
/// wins, later writes silently dropped) per spec.md's invariants.
#[derive(Debug, Clone, Default)]
pub struct DedupSet<K: std::hash::Hash + Eq + Clone, V> {
    order: Vec<K>,
    items: std::collections::HashMap<K, V>,
}

impl<K: std::hash::Hash + Eq + Clone, V> DedupSet<K, V> {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            items: std::collections::HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.items.contains_key(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.items.get_mut(key)
    }

    /// Insert a new key/value if absent. Returns true if inserted.
    pub fn insert_if_absent(&mut self, key: K, value: V) -> bool {
        if self.items.contains_key(&key) {
            return false;
        }
        self.order.push(key.clone());
        self.items.insert(key, value);
        true
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.order.iter().map(|k| &self.items[k])
    }

    pub fn into_values(self) -> Vec<V> {
        let DedupSet { order, mut items } = self;
        order
            .into_iter()
            .map(|k| items.remove(&k).expect("order/items invariant"))
            .collect()
    }
}
