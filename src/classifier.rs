/// Sound classifier module
///
/// Narrow contract around the external classifier: analysis window in,
/// ranked (label, confidence) pairs out. Ships a band-energy stand-in
/// implementation for running without a real model integration.

use crate::ring_buffer::Sample;
use async_trait::async_trait;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Empty analysis window")]
    EmptyWindow,

    #[error("Invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// One ranked classification
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Sound classification contract
///
/// Implementations are assumed deterministic for a fixed window and must
/// return results highest-confidence first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        window: &[Sample],
        sample_rate: u32,
    ) -> Result<Vec<Classification>, ClassifierError>;
}

/// Band-energy stand-in classifier
///
/// Used when no model integration is wired in: buckets the window by RMS
/// energy into a coarse label. Real deployments substitute a model-backed
/// `Classifier` implementation; everything downstream only sees the trait.
pub struct EnergyClassifier {
    /// RMS below this is reported as silence
    silence_rms: f32,

    /// RMS above this is reported as a loud impulsive sound
    loud_rms: f32,
}

impl EnergyClassifier {
    pub fn new() -> Self {
        Self {
            silence_rms: 0.01,
            loud_rms: 0.3,
        }
    }

    fn rms(window: &[Sample]) -> f32 {
        let sum_squares: f64 = window.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum_squares / window.len() as f64).sqrt() as f32
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for EnergyClassifier {
    async fn classify(
        &self,
        window: &[Sample],
        sample_rate: u32,
    ) -> Result<Vec<Classification>, ClassifierError> {
        if window.is_empty() {
            return Err(ClassifierError::EmptyWindow);
        }
        if sample_rate == 0 {
            return Err(ClassifierError::InvalidSampleRate(sample_rate));
        }

        let rms = Self::rms(window);
        trace!("Classifying {} samples, rms={:.4}", window.len(), rms);

        let ranked = if rms < self.silence_rms {
            vec![
                Classification::new("Silence", 0.9),
                Classification::new("Background noise", 0.1),
            ]
        } else if rms > self.loud_rms {
            vec![
                Classification::new("Bang", 0.6),
                Classification::new("Background noise", 0.3),
            ]
        } else {
            vec![
                Classification::new("Background noise", 0.5),
                Classification::new("Silence", 0.2),
            ]
        };

        Ok(ranked)
    }
}
