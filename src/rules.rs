/// Threat rule engine module
///
/// Matches the retained event history against configured threat patterns:
/// single-sound immediate threats and time-bounded two-sound sequences.

use crate::events::{EventHistory, SoundEvent};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Two-sound threat rule: `first` then `second` within `max_gap_secs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencePattern {
    /// Keyword matched against the earlier event's label
    pub first: String,

    /// Keyword matched against the later event's label
    pub second: String,

    /// Maximum allowed gap between the two events, in seconds
    pub max_gap_secs: f64,
}

impl SequencePattern {
    pub fn new(first: impl Into<String>, second: impl Into<String>, max_gap_secs: f64) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
            max_gap_secs,
        }
    }
}

/// A matched threat, carrying the labels of the offending events
#[derive(Debug, Clone, PartialEq)]
pub enum ThreatMatch {
    /// A single sound from the immediate keyword list
    Immediate { label: String },

    /// A two-sound sequence within a pattern's time window
    Sequence { first: String, second: String },
}

impl ThreatMatch {
    /// Human-readable detail string for status and alerts
    pub fn detail(&self) -> String {
        match self {
            ThreatMatch::Immediate { label } => {
                format!("Immediate threat: {} detected", label)
            }
            ThreatMatch::Sequence { first, second } => {
                format!("Threat sequence: {} followed by {}", first, second)
            }
        }
    }
}

/// Pattern matcher over the event history
///
/// Configuration is fixed at construction; `evaluate` is a pure function of
/// the history contents, so the same history always yields the same result.
pub struct RuleEngine {
    /// Lower-cased immediate keywords
    immediate: Vec<String>,

    /// Sequence patterns with lower-cased keywords
    sequences: Vec<SequencePattern>,
}

impl RuleEngine {
    pub fn new(immediate_keywords: &[String], sequences: &[SequencePattern]) -> Self {
        let immediate = immediate_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();

        let sequences = sequences
            .iter()
            .map(|p| SequencePattern {
                first: p.first.to_lowercase(),
                second: p.second.to_lowercase(),
                max_gap_secs: p.max_gap_secs,
            })
            .collect();

        Self {
            immediate,
            sequences,
        }
    }

    /// Evaluate the history against all configured patterns.
    ///
    /// The immediate rule is checked first and short-circuits. Otherwise
    /// every ordered pair (i before j) over the whole retained history is
    /// scanned in (pattern, i, j) order and the first match wins - a pair
    /// of older events still within a pattern's window counts even if
    /// neither is the newest event.
    pub fn evaluate(&self, history: &EventHistory) -> Option<ThreatMatch> {
        let latest = history.latest()?;

        if self.matches_immediate(latest) {
            debug!("Immediate threat keyword in: {}", latest.label);
            return Some(ThreatMatch::Immediate {
                label: latest.label.clone(),
            });
        }

        let events: Vec<&SoundEvent> = history.iter().collect();

        for pattern in &self.sequences {
            for i in 0..events.len() {
                if !label_contains(&events[i].label, &pattern.first) {
                    continue;
                }
                for j in (i + 1)..events.len() {
                    if !label_contains(&events[j].label, &pattern.second) {
                        continue;
                    }

                    let gap = (events[j].captured_at - events[i].captured_at).num_milliseconds()
                        as f64
                        / 1000.0;
                    // Insertion order is time order, so a negative gap is a defect
                    debug_assert!(gap >= 0.0, "event history out of order");

                    if gap > 0.0 && gap <= pattern.max_gap_secs {
                        debug!(
                            "Sequence match: {} -> {} ({:.1}s gap)",
                            events[i].label, events[j].label, gap
                        );
                        return Some(ThreatMatch::Sequence {
                            first: events[i].label.clone(),
                            second: events[j].label.clone(),
                        });
                    }
                }
            }
        }

        None
    }

    fn matches_immediate(&self, event: &SoundEvent) -> bool {
        self.immediate.iter().any(|k| label_contains(&event.label, k))
    }
}

/// Case-insensitive substring test; `keyword` must already be lower-cased
fn label_contains(label: &str, keyword: &str) -> bool {
    label.to_lowercase().contains(keyword)
}
