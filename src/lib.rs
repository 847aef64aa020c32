/// Audio Sentry library
///
/// Acoustic security monitoring: a gated capture loop feeds classified sound
/// events into a pattern-matching rule engine with throttled alerting.

pub mod alert;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod events;
pub mod ring_buffer;
pub mod rules;
pub mod server;
pub mod source;

// Re-export main types
pub use alert::{AlertDispatcher, CsvLogSink, LogSink, NoopNotifier, Notifier, WebhookNotifier};
pub use capture::CaptureLoop;
pub use classifier::{Classification, Classifier, ClassifierError, EnergyClassifier};
pub use config::{ConfigError, SentryConfig};
pub use engine::{SecurityStatus, SentryEngine, ThreatLevel};
pub use events::{EventHistory, SoundEvent};
pub use ring_buffer::{AudioChunk, RingBuffer, Sample};
pub use rules::{RuleEngine, SequencePattern, ThreatMatch};
pub use source::{AudioSource, ChannelSource, SourceChunk, WavSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
