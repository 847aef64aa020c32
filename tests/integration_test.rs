/// Integration tests for the audio sentry pipeline
///
/// Drives the full capture -> classify -> rules -> alert path with scripted
/// collaborators, and exercises the HTTP control plane over a real listener.

use async_trait::async_trait;
use audio_sentry::alert::{AlertDispatcher, LogError, LogSink, NotifyError, Notifier};
use audio_sentry::config::DetectionConfig;
use audio_sentry::engine::{SentryEngine, ThreatLevel};
use audio_sentry::events::SoundEvent;
use audio_sentry::rules::{RuleEngine, SequencePattern};
use audio_sentry::source::{ChannelSource, SourceChunk};
use audio_sentry::{CaptureLoop, Classification, Classifier, ClassifierError};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Classifier that replays a scripted sequence of results
struct ScriptedClassifier {
    responses: Mutex<VecDeque<Vec<Classification>>>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    fn new(responses: Vec<Vec<Classification>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(
        &self,
        _window: &[f32],
        _sample_rate: u32,
    ) -> Result<Vec<Classification>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![Classification::new("Background noise", 0.9)]))
    }
}

struct RecordingNotifier {
    texts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn new() -> Self {
        Self {
            texts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

struct RecordingLogSink {
    rows: Mutex<Vec<String>>,
}

impl RecordingLogSink {
    fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LogSink for RecordingLogSink {
    async fn append(&self, _timestamp: DateTime<Utc>, detail: &str) -> Result<(), LogError> {
        self.rows.lock().unwrap().push(detail.to_string());
        Ok(())
    }
}

fn default_rules() -> RuleEngine {
    RuleEngine::new(
        &[
            "Siren".to_string(),
            "Alarm".to_string(),
            "Explosion".to_string(),
            "Gunshot".to_string(),
            "Screaming".to_string(),
        ],
        &[
            SequencePattern::new("Glass", "Footsteps", 10.0),
            SequencePattern::new("Glass", "Whispering", 10.0),
            SequencePattern::new("Screaming", "Crying", 5.0),
        ],
    )
}

fn detection() -> DetectionConfig {
    DetectionConfig {
        volume_gate: 0.03,
        confidence_gate: 0.25,
        ignore_labels: vec!["Silence".to_string(), "Background noise".to_string()],
        classify_timeout_secs: 5,
    }
}

fn silence_chunk() -> SourceChunk {
    SourceChunk::new(vec![0.0; 441])
}

fn loud_chunk() -> SourceChunk {
    SourceChunk::new(vec![0.9; 441])
}

/// Feed silence, then a glass break, then footsteps: no events during
/// silence, one unmatched event after the glass, CRITICAL with exactly one
/// notification once the sequence completes.
#[tokio::test]
async fn test_end_to_end_threat_sequence() {
    let classifier = Arc::new(ScriptedClassifier::new(vec![
        vec![
            Classification::new("Glass break", 0.9),
            Classification::new("Thump", 0.4),
        ],
        vec![
            Classification::new("Footsteps", 0.6),
            Classification::new("Background noise", 0.3),
        ],
    ]));
    let notifier = Arc::new(RecordingNotifier::new());
    let log = Arc::new(RecordingLogSink::new());

    let dispatcher =
        AlertDispatcher::new(notifier.clone(), log.clone(), Duration::from_secs(60));
    let engine = Arc::new(SentryEngine::new(default_rules(), dispatcher, 15, true));

    let capture = CaptureLoop::new(10, &detection(), classifier.clone(), engine.clone());
    let (tx, source) = ChannelSource::channel(44_100, 32);
    let shutdown = CancellationToken::new();
    let capture_task = tokio::spawn(capture.run(source, shutdown));

    // Phase 1: ten chunks of silence never reach the classifier
    for _ in 0..10 {
        tx.send(silence_chunk()).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(classifier.calls(), 0);
    assert!(engine.history().await.is_empty());
    assert_eq!(engine.status().await.level, ThreatLevel::Normal);

    // Phase 2: a loud chunk classified as glass; one event, no pattern yet
    tx.send(loud_chunk()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(classifier.calls(), 1);
    let history = engine.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].label, "Glass break");
    assert_eq!(engine.status().await.level, ThreatLevel::Normal);

    // Phase 3: footsteps within the 10s window complete the sequence
    tx.send(loud_chunk()).await.unwrap();
    drop(tx);
    capture_task.await.unwrap();

    assert_eq!(classifier.calls(), 2);
    assert_eq!(engine.history().await.len(), 2);

    let status = engine.status().await;
    assert_eq!(status.level, ThreatLevel::Critical);
    assert!(status.detail.contains("Glass break"));
    assert!(status.detail.contains("Footsteps"));

    let sent = notifier.texts.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("Glass break"));

    assert_eq!(log.rows.lock().unwrap().len(), 1);
}

/// Low-confidence and ignore-listed classifications never become events
#[tokio::test]
async fn test_end_to_end_gated_classifications() {
    let classifier = Arc::new(ScriptedClassifier::new(vec![
        vec![Classification::new("Footsteps", 0.2)],
        vec![Classification::new("Silence", 0.9)],
    ]));
    let notifier = Arc::new(RecordingNotifier::new());
    let log = Arc::new(RecordingLogSink::new());

    let dispatcher =
        AlertDispatcher::new(notifier.clone(), log.clone(), Duration::from_secs(60));
    let engine = Arc::new(SentryEngine::new(default_rules(), dispatcher, 15, true));

    let capture = CaptureLoop::new(10, &detection(), classifier.clone(), engine.clone());
    let (tx, source) = ChannelSource::channel(44_100, 32);
    let capture_task = tokio::spawn(capture.run(source, CancellationToken::new()));

    tx.send(loud_chunk()).await.unwrap();
    tx.send(loud_chunk()).await.unwrap();
    drop(tx);
    capture_task.await.unwrap();

    assert_eq!(classifier.calls(), 2);
    assert!(engine.history().await.is_empty());
    assert_eq!(engine.status().await.level, ThreatLevel::Normal);
    assert!(notifier.texts.lock().unwrap().is_empty());
}

/// An immediate threat fires on a single sound and stays CRITICAL until an
/// explicit reset
#[tokio::test]
async fn test_end_to_end_immediate_threat_and_reset() {
    let classifier = Arc::new(ScriptedClassifier::new(vec![vec![Classification::new(
        "Civil defense siren",
        0.8,
    )]]));
    let notifier = Arc::new(RecordingNotifier::new());
    let log = Arc::new(RecordingLogSink::new());

    let dispatcher =
        AlertDispatcher::new(notifier.clone(), log.clone(), Duration::from_secs(60));
    let engine = Arc::new(SentryEngine::new(default_rules(), dispatcher, 15, true));

    let capture = CaptureLoop::new(10, &detection(), classifier, engine.clone());
    let (tx, source) = ChannelSource::channel(44_100, 32);
    let capture_task = tokio::spawn(capture.run(source, CancellationToken::new()));

    tx.send(loud_chunk()).await.unwrap();
    drop(tx);
    capture_task.await.unwrap();

    let status = engine.status().await;
    assert_eq!(status.level, ThreatLevel::Critical);
    assert!(status.detail.contains("Civil defense siren"));
    assert_eq!(notifier.texts.lock().unwrap().len(), 1);

    let status = engine.reset().await;
    assert_eq!(status.level, ThreatLevel::Normal);
    assert_eq!(status.detail, "System Reset");
    assert!(engine.history().await.is_empty());
}

/// The HTTP control plane serves status, history and reset while the
/// engine is live
#[tokio::test]
async fn test_http_control_plane() {
    let notifier = Arc::new(RecordingNotifier::new());
    let log = Arc::new(RecordingLogSink::new());
    let dispatcher = AlertDispatcher::new(notifier, log, Duration::from_secs(60));
    let engine = Arc::new(SentryEngine::new(default_rules(), dispatcher, 15, true));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn(audio_sentry::server::serve(
        listener,
        engine.clone(),
        shutdown.clone(),
    ));

    let base = format!("http://{}", addr);
    let client = reqwest::Client::new();

    // Fresh engine reports NORMAL and an empty history
    let status: serde_json::Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["level"], "NORMAL");

    let history: serde_json::Value = client
        .get(format!("{}/history", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 0);

    // A recorded siren shows up in both views
    engine
        .record(SoundEvent::new("Siren", 0.9, Utc::now()))
        .await;

    let status: serde_json::Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["level"], "CRITICAL");
    assert!(status["detail"].as_str().unwrap().contains("Siren"));

    let history: serde_json::Value = client
        .get(format!("{}/history", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["label"], "Siren");

    // Reset restores NORMAL over the same surface
    let reset: serde_json::Value = client
        .post(format!("{}/reset", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reset["success"], true);

    let status: serde_json::Value = client
        .get(format!("{}/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["level"], "NORMAL");
    assert_eq!(status["detail"], "System Reset");

    shutdown.cancel();
    server_task.await.unwrap().unwrap();
}

/// Repeated matches inside the throttle window log every transition but
/// notify only once
#[tokio::test]
async fn test_end_to_end_throttled_notifications() {
    let classifier = Arc::new(ScriptedClassifier::new(vec![
        vec![Classification::new("Siren", 0.8)],
        vec![Classification::new("Fire alarm", 0.7)],
    ]));
    let notifier = Arc::new(RecordingNotifier::new());
    let log = Arc::new(RecordingLogSink::new());

    let dispatcher =
        AlertDispatcher::new(notifier.clone(), log.clone(), Duration::from_secs(60));
    let engine = Arc::new(SentryEngine::new(default_rules(), dispatcher, 15, true));

    let capture = CaptureLoop::new(10, &detection(), classifier, engine.clone());
    let (tx, source) = ChannelSource::channel(44_100, 32);
    let capture_task = tokio::spawn(capture.run(source, CancellationToken::new()));

    tx.send(loud_chunk()).await.unwrap();
    tx.send(loud_chunk()).await.unwrap();
    drop(tx);
    capture_task.await.unwrap();

    // Both CRITICAL transitions logged, one notification within the window
    assert_eq!(log.rows.lock().unwrap().len(), 2);
    assert_eq!(notifier.texts.lock().unwrap().len(), 1);

    let status = engine.status().await;
    assert_eq!(status.level, ThreatLevel::Critical);
    assert!(status.detail.contains("Fire alarm"));
}
