//! Fixed-capacity ring buffer of `(timestamp, value)` samples.

use ndarray::Array1;

use crate::error::{ConfigError, Result};

/// Ring buffer holding the most recent `capacity` samples of one channel.
///
/// Backing storage is allocated once. `push` overwrites the oldest entry when
/// full and never reallocates; `clear` zeroes in place.
#[derive(Debug, Clone)]
pub struct CircularSampleBuffer {
    time: Vec<f32>,
    value: Vec<f32>,
    cursor: usize,
    len: usize,
}

impl CircularSampleBuffer {
    /// Create a buffer with room for `capacity` samples.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ConfigError::Validation("buffer capacity must be > 0".to_string()).into());
        }
        Ok(Self {
            time: vec![0.0; capacity],
            value: vec![0.0; capacity],
            cursor: 0,
            len: 0,
        })
    }

    /// Write one sample at the cursor and advance it modulo capacity.
    #[inline]
    pub fn push(&mut self, value: f32, timestamp: f32) {
        self.time[self.cursor] = timestamp;
        self.value[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.capacity();
        self.len = (self.len + 1).min(self.capacity());
    }

    /// Chronologically ordered copy of the whole backing store.
    ///
    /// Always `capacity` long. Before the buffer first fills, the
    /// not-yet-written slots come first as zeros, followed by the live
    /// samples oldest to newest.
    pub fn read(&self) -> (Array1<f32>, Array1<f32>) {
        (
            Array1::from(self.rotated(&self.time)),
            Array1::from(self.rotated(&self.value)),
        )
    }

    /// Chronologically ordered copy of the live samples only.
    pub fn read_live(&self) -> (Array1<f32>, Array1<f32>) {
        let skip = self.capacity() - self.len;
        let time = self.rotated(&self.time).split_off(skip);
        let value = self.rotated(&self.value).split_off(skip);
        (Array1::from(time), Array1::from(value))
    }

    fn rotated(&self, lane: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(lane.len());
        out.extend_from_slice(&lane[self.cursor..]);
        out.extend_from_slice(&lane[..self.cursor]);
        out
    }

    /// Most recently pushed sample as `(timestamp, value)`.
    pub fn latest(&self) -> Option<(f32, f32)> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.cursor + self.capacity() - 1) % self.capacity();
        Some((self.time[idx], self.value[idx]))
    }

    /// Number of live samples (at most capacity).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.value.len()
    }

    /// Current write position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Zero the storage and rewind the cursor without reallocating.
    pub fn clear(&mut self) {
        self.time.iter_mut().for_each(|t| *t = 0.0);
        self.value.iter_mut().for_each(|v| *v = 0.0);
        self.cursor = 0;
        self.len = 0;
    }
}
