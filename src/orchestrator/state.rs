//! `Aggregate`: the orchestrator's in-memory view of one scan — endpoints,
//! parameters, vulnerabilities, question results, stats, phase records,
//! and a bounded log — all mutation funneling through one mutex-guarded
//! struct so `get_status()` always reads a consistent snapshot.
//!
//! Grounded in the teacher's `orchestrator/state.rs` append-only
//! `StateManager`/`StateEntry` log, generalized from a single phase-state
//! log into the fuller aggregate this spec's `getStatus()` needs.

use crate::model::{
    DedupSet, Endpoint, Method, PhaseId, PhaseRecord, PhaseStatus, Parameter, QuestionResult,
    ScanState, SqliSubPhase, Stats, VulnKind, Vulnerability, XssSubPhase,
};
use std::collections::VecDeque;

const MAX_LOG_ENTRIES: usize = 50;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: chrono::DateTime<chrono::Utc>,
    pub level: crate::events::LogLevel,
    pub message: String,
}

pub struct Aggregate {
    pub state: ScanState,
    pub phases: Vec<PhaseRecord>,
    pub endpoints: DedupSet<(Method, String), Endpoint>,
    pub parameters: Vec<Parameter>,
    pub vulnerabilities: DedupSet<(VulnKind, String, String), Vulnerability>,
    pub question_results: Vec<QuestionResult>,
    pub stats: Stats,
    logs: VecDeque<LogEntry>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self {
            state: ScanState::Pending,
            phases: vec![
                PhaseRecord::new(PhaseId::Init, "init"),
                PhaseRecord::new(PhaseId::Discovery, "discovery"),
                PhaseRecord::new(PhaseId::Sqli, "sqli"),
                PhaseRecord::new(PhaseId::Xss, "xss"),
                PhaseRecord::new(PhaseId::Report, "report"),
            ],
            endpoints: DedupSet::new(),
            parameters: Vec::new(),
            vulnerabilities: DedupSet::new(),
            question_results: Vec::new(),
            stats: Stats::default(),
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
        }
    }

    pub fn phase_mut(&mut self, id: PhaseId) -> &mut PhaseRecord {
        self.phases
            .iter_mut()
            .find(|p| p.id == id)
            .expect("every PhaseId has a PhaseRecord")
    }

    pub fn set_phase_status(&mut self, id: PhaseId, status: PhaseStatus) {
        self.phase_mut(id).status = status;
    }

    pub fn set_sqli_subphase(&mut self, subphase: SqliSubPhase, status: PhaseStatus) {
        let phase = self.phase_mut(PhaseId::Sqli);
        if let Some(entry) = phase.sqli_subphases.iter_mut().find(|(s, _)| *s == subphase) {
            entry.1 = status;
        } else {
            phase.sqli_subphases.push((subphase, status));
        }
    }

    pub fn set_xss_subphase(&mut self, subphase: XssSubPhase, status: PhaseStatus) {
        let phase = self.phase_mut(PhaseId::Xss);
        if let Some(entry) = phase.xss_subphases.iter_mut().find(|(s, _)| *s == subphase) {
            entry.1 = status;
        } else {
            phase.xss_subphases.push((subphase, status));
        }
    }

    /// Folds a discovered/merged endpoint and its derived parameters into
    /// the aggregate per the `(method, url)` dedup-and-merge invariant.
    pub fn add_endpoint(&mut self, endpoint: Endpoint, parameters: Vec<Parameter>) {
        let key = endpoint.dedup_key();
        if !self.endpoints.insert_if_absent(key.clone(), endpoint.clone()) {
            if let Some(existing) = self.endpoints.get_mut(&key) {
                existing.merge(&endpoint);
            }
        } else {
            self.stats.endpoints_discovered += 1;
        }
        for param in parameters {
            if !self.parameters.iter().any(|p| p.endpoint_key == param.endpoint_key && p.name == param.name) {
                self.stats.parameters_found += 1;
                self.parameters.push(param);
            }
        }
    }

    /// Adds a vulnerability if its `(kind, endpoint, parameter)` key has
    /// not been seen before; a second observation is silently dropped, per
    /// spec.md's dedup invariant. Returns whether it was newly added.
    pub fn add_vulnerability(&mut self, vuln: Vulnerability) -> bool {
        let key = vuln.dedup_key();
        let added = self.vulnerabilities.insert_if_absent(key, vuln);
        if added {
            self.stats.vulnerabilities_found += 1;
        }
        added
    }

    pub fn push_question_result(&mut self, result: QuestionResult) {
        self.question_results.push(result);
    }

    pub fn log(&mut self, level: crate::events::LogLevel, message: impl Into<String>) {
        if self.logs.len() == MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            at: chrono::Utc::now(),
            level,
            message: message.into(),
        });
    }

    pub fn recent_logs(&self) -> Vec<LogEntry> {
        self.logs.iter().cloned().collect()
    }
}

impl Default for Aggregate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParamKind, Severity};

    #[test]
    fn add_endpoint_twice_unions_parameters() {
        let mut agg = Aggregate::new();
        let mut e1 = Endpoint::new("http://t/a", Method::Get);
        e1.parameters = vec!["id".into()];
        agg.add_endpoint(e1, vec![]);

        let mut e2 = Endpoint::new("http://t/a", Method::Get);
        e2.parameters = vec!["id".into(), "name".into()];
        agg.add_endpoint(e2, vec![]);

        assert_eq!(agg.endpoints.len(), 1);
        assert_eq!(agg.stats.endpoints_discovered, 1);
        let stored = agg.endpoints.values().next().unwrap();
        assert_eq!(stored.parameters, vec!["id", "name"]);
    }

    #[test]
    fn add_vulnerability_dedupes_by_key() {
        let mut agg = Aggregate::new();
        let vuln = Vulnerability {
            kind: VulnKind::Sqli,
            severity: Severity::Critical,
            endpoint_url: "http://t/a".into(),
            parameter: "id".into(),
            description: "injectable".into(),
        };
        assert!(agg.add_vulnerability(vuln.clone()));
        assert!(!agg.add_vulnerability(vuln));
        assert_eq!(agg.stats.vulnerabilities_found, 1);
    }

    #[test]
    fn recent_logs_caps_at_max_entries() {
        let mut agg = Aggregate::new();
        for i in 0..60 {
            agg.log(crate::events::LogLevel::Info, format!("entry {i}"));
        }
        assert_eq!(agg.recent_logs().len(), MAX_LOG_ENTRIES);
        assert_eq!(agg.recent_logs().first().unwrap().message, "entry 10");
    }

    #[test]
    fn parameters_not_duplicated_for_same_endpoint() {
        let mut agg = Aggregate::new();
        let endpoint = Endpoint::new("http://t/a", Method::Get);
        let key = endpoint.dedup_key();
        let param = Parameter {
            endpoint_key: key,
            name: "id".into(),
            kind: ParamKind::Query,
            testable: true,
        };
        agg.add_endpoint(endpoint.clone(), vec![param.clone()]);
        agg.add_endpoint(endpoint, vec![param]);
        assert_eq!(agg.parameters.len(), 1);
        assert_eq!(agg.stats.parameters_found, 1);
    }
}
