/// Capture loop module
///
/// Drives the audio source: every chunk lands in the ring buffer, the peak
/// gate decides whether to classify the consolidated window, and gated
/// classifications become recorded events. Everything on this path recovers
/// locally - a bad chunk or failed classification never stops the loop.

use crate::classifier::Classifier;
use crate::config::DetectionConfig;
use crate::engine::SentryEngine;
use crate::events::SoundEvent;
use crate::ring_buffer::{AudioChunk, RingBuffer};
use crate::source::{AudioSource, SourceChunk};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Real-time capture and analysis loop
///
/// Owns the ring buffer exclusively; shared state is reached only through
/// the engine. At most one classification is in flight - the loop awaits
/// the classifier before pulling the next chunk, accepting skipped triggers
/// over unbounded queuing.
pub struct CaptureLoop {
    ring: RingBuffer,
    classifier: Arc<dyn Classifier>,
    engine: Arc<SentryEngine>,
    volume_gate: f32,
    confidence_gate: f32,
    ignore_labels: Vec<String>,
    classify_timeout: Duration,
    chunks_seen: u64,
    triggers: u64,
}

impl CaptureLoop {
    pub fn new(
        ring_chunks: usize,
        detection: &DetectionConfig,
        classifier: Arc<dyn Classifier>,
        engine: Arc<SentryEngine>,
    ) -> Self {
        Self {
            ring: RingBuffer::new(ring_chunks),
            classifier,
            engine,
            volume_gate: detection.volume_gate,
            confidence_gate: detection.confidence_gate,
            ignore_labels: detection.ignore_labels.clone(),
            classify_timeout: Duration::from_secs(detection.classify_timeout_secs),
            chunks_seen: 0,
            triggers: 0,
        }
    }

    /// Run until the source ends or the shutdown token fires
    pub async fn run<S: AudioSource>(mut self, mut source: S, shutdown: CancellationToken) {
        let sample_rate = source.sample_rate();
        info!("Capture loop started at {} Hz", sample_rate);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Capture loop stopping (shutdown requested)");
                    break;
                }
                next = source.next_chunk() => match next {
                    Some(chunk) => self.handle_chunk(chunk, sample_rate).await,
                    None => {
                        info!("Audio source closed");
                        break;
                    }
                }
            }
        }

        let (recorded, matched) = self.engine.counters().await;
        info!(
            "Capture loop finished: {} chunks, {} triggers, {} events, {} matches",
            self.chunks_seen, self.triggers, recorded, matched
        );
    }

    async fn handle_chunk(&mut self, chunk: SourceChunk, sample_rate: u32) {
        if let Some(status) = &chunk.status {
            // Best-effort: the chunk is still processed
            warn!("Audio source reported: {}", status);
        }

        let chunk = AudioChunk::new(chunk.samples);
        let peak = chunk.peak();
        self.ring.append(chunk);

        self.chunks_seen += 1;
        if self.chunks_seen % 1000 == 0 {
            debug!(
                "Processed {} chunks, {} analysis triggers",
                self.chunks_seen, self.triggers
            );
        }

        // Volume gate: skip the expensive classifier on silence
        if peak <= self.volume_gate {
            return;
        }

        self.triggers += 1;
        let window = self.ring.consolidate();

        let ranked = match timeout(
            self.classify_timeout,
            self.classifier.classify(&window, sample_rate),
        )
        .await
        {
            Ok(Ok(ranked)) => ranked,
            Ok(Err(e)) => {
                warn!("Classification failed, window discarded: {}", e);
                return;
            }
            Err(_) => {
                warn!(
                    "Classification timed out after {:?}, window discarded",
                    self.classify_timeout
                );
                return;
            }
        };

        let Some(top) = ranked.into_iter().next() else {
            debug!("Classifier returned no labels");
            return;
        };

        // Confidence gate: below-threshold classifications produce no event
        if top.confidence <= self.confidence_gate {
            debug!(
                "Below confidence gate: {} ({:.0}%)",
                top.label,
                top.confidence * 100.0
            );
            return;
        }

        if self
            .ignore_labels
            .iter()
            .any(|l| l.eq_ignore_ascii_case(&top.label))
        {
            debug!("Ignored label: {}", top.label);
            return;
        }

        info!("Heard: {} ({:.0}%)", top.label, top.confidence * 100.0);

        let event = SoundEvent::new(top.label, top.confidence, Utc::now());
        self.engine.record(event).await;
    }
}
