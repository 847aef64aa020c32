/// Audio source module
///
/// Abstract audio acquisition: fixed-size sample chunks at a known rate,
/// with an optional non-fatal status attached to any chunk. Ships a
/// channel-fed source (used by the microphone bridge and tests) and a WAV
/// replay source; live capture is feature-gated behind `capture`.

use crate::ring_buffer::Sample;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("WAV read failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("Unsupported WAV layout: {0}")]
    UnsupportedLayout(String),

    #[error("Audio device error: {0}")]
    Device(String),
}

/// One delivery from an audio source
#[derive(Debug, Clone)]
pub struct SourceChunk {
    pub samples: Vec<Sample>,

    /// Non-fatal device status reported alongside this chunk, if any.
    /// The chunk is still processed; the status is surfaced as a diagnostic.
    pub status: Option<String>,
}

impl SourceChunk {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            status: None,
        }
    }

    pub fn with_status(samples: Vec<Sample>, status: impl Into<String>) -> Self {
        Self {
            samples,
            status: Some(status.into()),
        }
    }
}

/// Sequence of fixed-size, fixed-rate audio chunks
///
/// `next_chunk` returns `None` once the source is exhausted or closed.
#[async_trait]
pub trait AudioSource: Send {
    fn sample_rate(&self) -> u32;

    async fn next_chunk(&mut self) -> Option<SourceChunk>;
}

/// Source fed through a bounded channel
///
/// The producing side (a capture thread, a test script) pushes chunks with
/// the returned sender; dropping the sender ends the source.
pub struct ChannelSource {
    rx: mpsc::Receiver<SourceChunk>,
    sample_rate: u32,
}

impl ChannelSource {
    pub fn channel(sample_rate: u32, capacity: usize) -> (mpsc::Sender<SourceChunk>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx, sample_rate })
    }
}

#[async_trait]
impl AudioSource for ChannelSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn next_chunk(&mut self) -> Option<SourceChunk> {
        self.rx.recv().await
    }
}

/// Offline replay of a WAV file in fixed-size chunks
///
/// Multi-channel files are downmixed by averaging; a trailing partial chunk
/// is dropped so every delivered chunk has the same length.
pub struct WavSource {
    chunks: VecDeque<Vec<Sample>>,
    sample_rate: u32,
}

impl WavSource {
    pub fn open(path: impl AsRef<Path>, chunk_samples: usize) -> Result<Self, SourceError> {
        let reader = hound::WavReader::open(path.as_ref())?;
        let spec = reader.spec();

        let samples = read_normalized(reader)?;
        let mono = downmix(&samples, spec.channels as usize);

        let chunks: VecDeque<Vec<Sample>> = mono
            .chunks_exact(chunk_samples)
            .map(|c| c.to_vec())
            .collect();

        info!(
            "Loaded WAV replay: {} Hz, {} chunks of {} samples",
            spec.sample_rate,
            chunks.len(),
            chunk_samples
        );

        Ok(Self {
            chunks,
            sample_rate: spec.sample_rate,
        })
    }
}

#[async_trait]
impl AudioSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn next_chunk(&mut self) -> Option<SourceChunk> {
        self.chunks.pop_front().map(SourceChunk::new)
    }
}

fn read_normalized<R: std::io::Read>(
    reader: hound::WavReader<R>,
) -> Result<Vec<Sample>, SourceError> {
    let spec = reader.spec();

    match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(SourceError::from),
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(SourceError::UnsupportedLayout(format!(
                    "{} bits per sample",
                    spec.bits_per_sample
                )));
            }
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(SourceError::from)
        }
    }
}

fn downmix(samples: &[Sample], channels: usize) -> Vec<Sample> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<Sample>() / channels as Sample)
        .collect()
}

/// Live microphone capture over cpal
///
/// The stream lives on a dedicated thread (cpal streams are not `Send`);
/// chunks are bridged into the async runtime through a bounded channel.
/// Device errors are attached to the next chunk as a status rather than
/// tearing the source down.
#[cfg(feature = "capture")]
pub use mic::MicSource;

#[cfg(feature = "capture")]
mod mic {
    use super::*;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::sync::{Arc, Mutex};
    use tracing::debug;

    pub struct MicSource {
        inner: ChannelSource,
        stop_tx: Option<std::sync::mpsc::Sender<()>>,
    }

    impl MicSource {
        pub fn open(sample_rate: u32, chunk_samples: usize) -> Result<Self, SourceError> {
            let (chunk_tx, inner) = ChannelSource::channel(sample_rate, 32);
            let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
            let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), SourceError>>();

            std::thread::spawn(move || {
                let stream = match build_stream(sample_rate, chunk_samples, chunk_tx) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Keep the stream alive until the source is dropped
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Microphone capture thread stopped");
            });

            ready_rx
                .recv()
                .map_err(|_| SourceError::Device("capture thread died".to_string()))??;

            info!("Microphone capture started at {} Hz", sample_rate);
            Ok(Self {
                inner,
                stop_tx: Some(stop_tx),
            })
        }
    }

    fn build_stream(
        sample_rate: u32,
        chunk_samples: usize,
        chunk_tx: mpsc::Sender<SourceChunk>,
    ) -> Result<cpal::Stream, SourceError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| SourceError::Device("no default input device".to_string()))?;

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let pending_status: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let status_for_errors = pending_status.clone();

        let mut accumulator: Vec<Sample> = Vec::with_capacity(chunk_samples);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        accumulator.push(sample);
                        if accumulator.len() == chunk_samples {
                            let samples = std::mem::replace(
                                &mut accumulator,
                                Vec::with_capacity(chunk_samples),
                            );
                            let status = pending_status.lock().unwrap().take();
                            let chunk = SourceChunk { samples, status };
                            // Drop the chunk if the consumer is behind
                            let _ = chunk_tx.try_send(chunk);
                        }
                    }
                },
                move |err| {
                    *status_for_errors.lock().unwrap() = Some(err.to_string());
                },
                None,
            )
            .map_err(|e| SourceError::Device(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SourceError::Device(e.to_string()))?;

        Ok(stream)
    }

    #[async_trait]
    impl AudioSource for MicSource {
        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }

        async fn next_chunk(&mut self) -> Option<SourceChunk> {
            self.inner.next_chunk().await
        }
    }

    impl Drop for MicSource {
        fn drop(&mut self) {
            if let Some(stop_tx) = self.stop_tx.take() {
                let _ = stop_tx.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn write_test_wav(path: &Path, samples: &[i16], channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[tokio::test]
    async fn test_channel_source_delivers_in_order() {
        let (tx, mut source) = ChannelSource::channel(44100, 8);
        assert_eq!(source.sample_rate(), 44100);

        tx.send(SourceChunk::new(vec![0.1])).await.unwrap();
        tx.send(SourceChunk::with_status(vec![0.2], "input overflow"))
            .await
            .unwrap();
        drop(tx);

        let first = source.next_chunk().await.unwrap();
        assert_eq!(first.samples, vec![0.1]);
        assert!(first.status.is_none());

        let second = source.next_chunk().await.unwrap();
        assert_eq!(second.status.as_deref(), Some("input overflow"));

        assert!(source.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_wav_source_chunks_fixed_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wav");

        // 10 samples, chunked by 4: two full chunks, partial tail dropped
        let samples: Vec<i16> = (0..10).map(|i| i * 1000).collect();
        write_test_wav(&path, &samples, 1);

        let mut source = WavSource::open(&path, 4).unwrap();
        assert_eq!(source.sample_rate(), 8000);

        let first = source.next_chunk().await.unwrap();
        assert_eq!(first.samples.len(), 4);
        assert_relative_eq!(first.samples[1], 1000.0 / 32768.0, epsilon = 1e-6);

        assert!(source.next_chunk().await.is_some());
        assert!(source.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_wav_source_downmixes_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");

        // Interleaved L/R pairs averaging to 1500
        write_test_wav(&path, &[1000, 2000, 1000, 2000], 2);

        let mut source = WavSource::open(&path, 2).unwrap();
        let chunk = source.next_chunk().await.unwrap();

        assert_eq!(chunk.samples.len(), 2);
        assert_relative_eq!(chunk.samples[0], 1500.0 / 32768.0, epsilon = 1e-6);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix(&samples, 1), samples);
    }
}
