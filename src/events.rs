//! Typed event fan-out for scan lifecycle, discovery, and finding events.
//!
//! The source system used a stringly-typed pub/sub (event names like
//! `"scan:started"`). Per the redesign direction, this is a closed sum type
//! dispatched over a `tokio::sync::broadcast` channel: multiple independent
//! subscribers, delivery best-effort and ordered per-subscriber, a slow
//! subscriber's dropped events are logged rather than retried.
//!
//! `endpoint:crawl-discovered` from the source spec is intentionally not a
//! variant here — it is a private hand-off from the process supervisor back
//! into the discovery phase (see `phase::discovery`), never published on
//! this bus.

use crate::model::{PhaseId, QuestionResult, QuestionSpec, Stats, Vulnerability};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One published occurrence on a scan's event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ScanEvent {
    ScanStarted,
    ScanPaused,
    ScanResumed,
    ScanStopped,
    ScanCompleted {
        quiz_points_earned: u32,
        quiz_points_possible: u32,
        vulnerability_count: u64,
        final_score: u32,
        grade: String,
    },
    ScanError {
        message: String,
    },
    PhaseStarted {
        phase: PhaseId,
    },
    PhaseCompleted {
        phase: PhaseId,
    },
    SubPhaseStarted {
        phase: PhaseId,
        name: String,
    },
    SubPhaseCompleted {
        phase: PhaseId,
        name: String,
    },
    LogAdded {
        level: LogLevel,
        message: String,
    },
    EndpointDiscovered {
        url: String,
        method: String,
    },
    ParameterDiscovered {
        url: String,
        name: String,
    },
    VulnerabilityFound {
        vulnerability: Vulnerability,
    },
    QuestionAsked {
        spec: QuestionSpec,
    },
    QuestionResultEvent {
        result: QuestionResult,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Capacity of the broadcast channel's internal ring buffer. A subscriber
/// that falls this far behind the publisher starts missing events; it will
/// observe `RecvError::Lagged` and should treat that as "some events were
/// dropped", per spec.md's best-effort delivery guarantee.
const CHANNEL_CAPACITY: usize = 256;

/// Typed fan-out channel for a single scan's events.
pub struct EventBus {
    sender: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe a new, independent receiver. Each subscriber sees every
    /// event published after this call, in publish order, regardless of
    /// what other subscribers do.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Never blocks the publisher: if there are no
    /// subscribers this is a no-op; if a subscriber's buffer overflows,
    /// that subscriber independently detects the gap via `Lagged`.
    pub fn publish(&self, event: ScanEvent) {
        // send() only errors when there are zero receivers, which is not
        // a fault condition for a publish-and-forget bus.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain a subscriber's currently-available events without blocking,
/// logging (not retrying) any detected gap. Used by tests and by the
/// demonstration CLI's non-interactive paths.
pub async fn recv_logging_lag(rx: &mut broadcast::Receiver<ScanEvent>) -> Option<ScanEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(dropped = n, "event subscriber lagged; events were dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(ScanEvent::ScanStarted);
        bus.publish(ScanEvent::PhaseStarted {
            phase: PhaseId::Init,
        });

        let first = recv_logging_lag(&mut rx).await.unwrap();
        assert!(matches!(first, ScanEvent::ScanStarted));
        let second = recv_logging_lag(&mut rx).await.unwrap();
        assert!(matches!(second, ScanEvent::PhaseStarted { phase: PhaseId::Init }));
    }

    #[tokio::test]
    async fn independent_subscribers_each_get_full_stream() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(ScanEvent::ScanStarted);

        assert!(matches!(
            recv_logging_lag(&mut rx1).await.unwrap(),
            ScanEvent::ScanStarted
        ));
        assert!(matches!(
            recv_logging_lag(&mut rx2).await.unwrap(),
            ScanEvent::ScanStarted
        ));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(ScanEvent::ScanStarted);
    }
}
