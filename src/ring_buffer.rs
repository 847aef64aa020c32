/// Audio ring buffer module
///
/// Holds the most recent N fixed-size audio chunks and consolidates them
/// into one contiguous analysis window on demand.

use cache_padded::CachePadded;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::Mutex;
use tracing::trace;

/// Audio sample format (32-bit float, roughly -1.0 to 1.0)
pub type Sample = f32;

/// One fixed-duration block of captured audio samples.
///
/// Immutable after construction; the ring buffer takes ownership on append.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    samples: Vec<Sample>,
}

impl AudioChunk {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Peak absolute amplitude of the chunk, used by the volume gate.
    pub fn peak(&self) -> Sample {
        self.samples.iter().fold(0.0, |max, s| max.max(s.abs()))
    }
}

type ChunkRb = HeapRb<AudioChunk>;
type ChunkProducer = <ChunkRb as Split>::Prod;
type ChunkConsumer = <ChunkRb as Split>::Cons;

/// Ring buffer of audio chunks
///
/// Fixed capacity, FIFO: appending at capacity evicts the oldest chunk.
/// Length never exceeds the capacity chosen at construction.
pub struct RingBuffer {
    producer: CachePadded<Mutex<ChunkProducer>>,
    consumer: CachePadded<Mutex<ChunkConsumer>>,
}

impl RingBuffer {
    /// Create a ring buffer holding at most `capacity` chunks
    pub fn new(capacity: usize) -> Self {
        trace!("Creating ring buffer with capacity: {} chunks", capacity);

        let rb = HeapRb::<AudioChunk>::new(capacity);
        let (producer, consumer) = rb.split();

        Self {
            producer: CachePadded::new(Mutex::new(producer)),
            consumer: CachePadded::new(Mutex::new(consumer)),
        }
    }

    /// Append a chunk, evicting the oldest if at capacity (never blocks)
    pub fn append(&self, chunk: AudioChunk) {
        let mut producer = self.producer.lock().unwrap();

        if producer.vacant_len() == 0 {
            let mut consumer = self.consumer.lock().unwrap();
            consumer.skip(1);
        }

        // Cannot fail: a slot was just freed if none was vacant
        let _ = producer.try_push(chunk);
    }

    /// Concatenate all held chunks in arrival order into one window.
    ///
    /// While the buffer is still filling this returns an undersized window
    /// built from whatever chunks are present; analysis before the buffer
    /// is full simply sees less context.
    pub fn consolidate(&self) -> Vec<Sample> {
        let consumer = self.consumer.lock().unwrap();

        let total: usize = consumer.iter().map(|chunk| chunk.len()).sum();
        let mut window = Vec::with_capacity(total);

        for chunk in consumer.iter() {
            window.extend_from_slice(chunk.samples());
        }

        window
    }

    /// Number of chunks currently held
    pub fn len(&self) -> usize {
        let consumer = self.consumer.lock().unwrap();
        consumer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of chunks
    pub fn capacity(&self) -> usize {
        let consumer = self.consumer.lock().unwrap();
        consumer.capacity().get()
    }

    /// Drop all held chunks
    pub fn clear(&self) {
        let mut consumer = self.consumer.lock().unwrap();
        let occupied = consumer.occupied_len();
        consumer.skip(occupied);
        trace!("Cleared ring buffer");
    }
}
