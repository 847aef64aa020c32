/// Event history module
///
/// Fixed-capacity rolling record of classified sounds, ordered by capture
/// time. The rule engine scans this history for threat patterns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::trace;

/// One classified sound that passed all gates
#[derive(Debug, Clone, Serialize)]
pub struct SoundEvent {
    /// Classifier label, e.g. "Glass break"
    pub label: String,

    /// Classifier confidence (0.0 - 1.0)
    pub confidence: f32,

    /// When the triggering chunk was captured
    pub captured_at: DateTime<Utc>,
}

impl SoundEvent {
    pub fn new(label: impl Into<String>, confidence: f32, captured_at: DateTime<Utc>) -> Self {
        Self {
            label: label.into(),
            confidence,
            captured_at,
        }
    }
}

/// Fixed-capacity FIFO of sound events
///
/// Appends happen from a single task, so insertion order is capture order.
/// The oldest event is evicted once capacity is reached.
#[derive(Debug)]
pub struct EventHistory {
    events: VecDeque<SoundEvent>,
    capacity: usize,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, evicting the oldest beyond capacity
    pub fn push(&mut self, event: SoundEvent) {
        if self.events.len() == self.capacity {
            let evicted = self.events.pop_front();
            trace!("Event history full, evicted: {:?}", evicted.map(|e| e.label));
        }
        self.events.push_back(event);
    }

    /// Most recent event, if any
    pub fn latest(&self) -> Option<&SoundEvent> {
        self.events.back()
    }

    /// Events oldest-first
    pub fn iter(&self) -> impl Iterator<Item = &SoundEvent> {
        self.events.iter()
    }

    /// Owned snapshot of the history, oldest-first
    pub fn snapshot(&self) -> Vec<SoundEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
