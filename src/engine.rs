/// Security engine module
///
/// Owns the shared mutable state of the monitor: the event history and the
/// current security status. Recording an event runs the rule engine and
/// hands any match to the alert dispatcher; queries return point-in-time
/// snapshots safe to serve while capture keeps running.

use crate::alert::AlertDispatcher;
use crate::events::{EventHistory, SoundEvent};
use crate::rules::RuleEngine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Security level of the site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    Normal,
    Critical,
}

/// Current security assessment
///
/// Replaced as a whole on every rule match or reset; never mutated in
/// place, so readers always observe a consistent value.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityStatus {
    pub level: ThreatLevel,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl SecurityStatus {
    fn monitoring() -> Self {
        Self {
            level: ThreatLevel::Normal,
            detail: "System Monitoring".to_string(),
            timestamp: Utc::now(),
        }
    }
}

struct EngineState {
    history: EventHistory,
    status: SecurityStatus,
    events_recorded: u64,
    matches_found: u64,
}

/// The monitor's synchronized core
///
/// Single writer (the capture loop) records events; the status service
/// reads snapshots concurrently. All shared state lives behind one lock and
/// every critical section is bounded - alert delivery happens after the
/// lock is released.
pub struct SentryEngine {
    rules: RuleEngine,
    dispatcher: AlertDispatcher,
    state: RwLock<EngineState>,
    clear_on_reset: bool,
}

impl SentryEngine {
    pub fn new(
        rules: RuleEngine,
        dispatcher: AlertDispatcher,
        history_capacity: usize,
        clear_on_reset: bool,
    ) -> Self {
        Self {
            rules,
            dispatcher,
            state: RwLock::new(EngineState {
                history: EventHistory::new(history_capacity),
                status: SecurityStatus::monitoring(),
                events_recorded: 0,
                matches_found: 0,
            }),
            clear_on_reset,
        }
    }

    /// Record a gated classification and evaluate the threat rules.
    ///
    /// On a match the status is replaced with CRITICAL and the transition is
    /// dispatched, even if the level was already CRITICAL (the detail may
    /// differ). With no match the status is left unchanged - there is no
    /// automatic decay back to NORMAL.
    pub async fn record(&self, event: SoundEvent) {
        let transition = {
            let mut state = self.state.write().await;
            state.history.push(event);
            state.events_recorded += 1;

            match self.rules.evaluate(&state.history) {
                Some(matched) => {
                    let detail = matched.detail();
                    let timestamp = Utc::now();
                    warn!("Threat detected: {}", detail);

                    state.matches_found += 1;
                    state.status = SecurityStatus {
                        level: ThreatLevel::Critical,
                        detail: detail.clone(),
                        timestamp,
                    };
                    Some((detail, timestamp))
                }
                None => None,
            }
        };

        // Deliver outside the lock so slow notifiers never block readers
        if let Some((detail, timestamp)) = transition {
            self.dispatcher.dispatch(&detail, timestamp).await;
        }
    }

    /// Snapshot of the current security status
    pub async fn status(&self) -> SecurityStatus {
        self.state.read().await.status.clone()
    }

    /// Snapshot of the event history, oldest-first
    pub async fn history(&self) -> Vec<SoundEvent> {
        self.state.read().await.history.snapshot()
    }

    /// Restore NORMAL status; clears the history when configured to
    pub async fn reset(&self) -> SecurityStatus {
        let mut state = self.state.write().await;

        state.status = SecurityStatus {
            level: ThreatLevel::Normal,
            detail: "System Reset".to_string(),
            timestamp: Utc::now(),
        };
        if self.clear_on_reset {
            state.history.clear();
        }

        info!("Security status reset");
        state.status.clone()
    }

    /// Counters for periodic diagnostics
    pub async fn counters(&self) -> (u64, u64) {
        let state = self.state.read().await;
        (state.events_recorded, state.matches_found)
    }
}
