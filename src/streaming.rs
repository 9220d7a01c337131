//! Producer/consumer sample ring
//!
//! Hosts that render on one thread and play on another put a [`SampleRing`]
//! between the two. The engine itself is single-threaded; the ring is the
//! only shared state.
//!
//! Memory is fixed at `capacity * size_of::<i16>()` whatever the duration.

use crate::engine::MixingEngine;
use crate::{NesSndError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Largest accepted ring (64 MB of samples).
const MAX_CAPACITY: usize = 64 * 1024 * 1024 / std::mem::size_of::<i16>();

/// Fixed-capacity ring of 16-bit samples.
///
/// # Thread Safety
/// - One producer (the rendering thread)
/// - One consumer (the audio callback)
/// - Sample storage sits behind a `parking_lot::Mutex`; the cursors are
///   atomics so fill queries never take the lock
#[derive(Debug)]
pub struct SampleRing {
    buffer: Mutex<Vec<i16>>,
    /// Total samples ever written
    write_pos: AtomicUsize,
    /// Total samples ever read
    read_pos: AtomicUsize,
    /// Power of two
    capacity: usize,
    mask: usize,
}

impl SampleRing {
    /// Create a ring holding at least `requested_capacity - 1` samples.
    /// The capacity is rounded up to a power of two.
    ///
    /// # Errors
    ///
    /// Returns [`NesSndError::RingBuffer`] for a zero or oversized capacity.
    pub fn new(requested_capacity: usize) -> Result<Self> {
        if requested_capacity == 0 {
            return Err(NesSndError::RingBuffer("capacity must be greater than 0".into()));
        }
        let capacity = requested_capacity.next_power_of_two();
        if capacity > MAX_CAPACITY {
            return Err(NesSndError::RingBuffer(format!(
                "capacity {capacity} exceeds maximum {MAX_CAPACITY}"
            )));
        }

        Ok(Self {
            buffer: Mutex::new(vec![0; capacity]),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
        })
    }

    /// Ring size in samples (one slot always stays free).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples ready for the consumer.
    pub fn available_read(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Samples the producer can write without overrunning.
    pub fn available_write(&self) -> usize {
        self.capacity - self.available_read() - 1
    }

    /// True when nothing is waiting to be read.
    pub fn is_empty(&self) -> bool {
        self.available_read() == 0
    }

    /// Fill level, 0.0 to 1.0.
    pub fn fill_percentage(&self) -> f32 {
        self.available_read() as f32 / self.capacity as f32
    }

    /// Copy as many of `samples` as fit. Returns the number written.
    pub fn write(&self, samples: &[i16]) -> usize {
        let mut buf = self.buffer.lock();

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let free = self.capacity - write_pos.wrapping_sub(read_pos) - 1;
        let count = samples.len().min(free);
        if count == 0 {
            return 0;
        }

        let start = write_pos & self.mask;
        let first = count.min(self.capacity - start);
        buf[start..start + first].copy_from_slice(&samples[..first]);
        buf[..count - first].copy_from_slice(&samples[first..count]);
        drop(buf);

        self.write_pos.store(write_pos.wrapping_add(count), Ordering::Release);
        count
    }

    /// Move up to `dest.len()` samples out. Returns the number read.
    pub fn read(&self, dest: &mut [i16]) -> usize {
        let buf = self.buffer.lock();

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let count = dest.len().min(write_pos.wrapping_sub(read_pos));
        if count == 0 {
            return 0;
        }

        let start = read_pos & self.mask;
        let first = count.min(self.capacity - start);
        dest[..first].copy_from_slice(&buf[start..start + first]);
        dest[first..count].copy_from_slice(&buf[..count - first]);
        drop(buf);

        self.read_pos.store(read_pos.wrapping_add(count), Ordering::Release);
        count
    }

    /// Move every sample the engine has ready, as far as the ring has room.
    /// Returns the number moved; the rest stay in the engine.
    pub fn fill_from(&self, engine: &mut MixingEngine) -> usize {
        let count = engine.samples_avail().min(self.available_write());
        if count == 0 {
            return 0;
        }
        let mut scratch = vec![0i16; count];
        let read = engine.read_samples(&mut scratch, count);
        let written = self.write(&scratch[..read]);
        debug_assert_eq!(written, read, "single producer lost ring space");
        written
    }

    /// Drop every pending sample.
    pub fn flush(&self) {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write_pos, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Region, TndMode};
    use std::sync::Arc;

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        let ring = SampleRing::new(1000).unwrap();
        assert_eq!(ring.capacity(), 1024);
        assert!(ring.is_empty());
        assert_eq!(ring.available_write(), 1023);
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(matches!(SampleRing::new(0), Err(NesSndError::RingBuffer(_))));
        let err = SampleRing::new(MAX_CAPACITY + 1).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_write_then_read() {
        let ring = SampleRing::new(16).unwrap();
        assert_eq!(ring.write(&[1, -2, 3, -4]), 4);
        assert_eq!(ring.available_read(), 4);

        let mut dest = [0i16; 8];
        assert_eq!(ring.read(&mut dest), 4);
        assert_eq!(&dest[..4], &[1, -2, 3, -4]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wrap_around_preserves_order() {
        let ring = SampleRing::new(16).unwrap();
        let first: Vec<i16> = (0..10).collect();
        ring.write(&first);
        let mut dest = [0i16; 6];
        ring.read(&mut dest);

        let second: Vec<i16> = (10..20).collect();
        assert_eq!(ring.write(&second), 10);

        let mut rest = [0i16; 16];
        let read = ring.read(&mut rest);
        let expected: Vec<i16> = (6..20).collect();
        assert_eq!(&rest[..read], expected.as_slice());
    }

    #[test]
    fn test_full_ring_rejects_writes() {
        let ring = SampleRing::new(8).unwrap();
        assert_eq!(ring.write(&[7; 10]), 7);
        assert_eq!(ring.write(&[7]), 0);
        assert!(ring.fill_percentage() > 0.8);

        ring.flush();
        assert!(ring.is_empty());
    }

    #[test]
    fn test_fill_from_engine() {
        let mut engine = MixingEngine::new();
        engine.configure(44_100, Region::Ntsc, TndMode::Single).unwrap();
        engine.reset();
        engine.end_frame();
        let avail = engine.samples_avail();

        let ring = SampleRing::new(512).unwrap();
        let moved = ring.fill_from(&mut engine);
        assert_eq!(moved, 511);
        assert_eq!(engine.samples_avail(), avail - 511);
    }

    #[test]
    fn test_threads_see_every_sample_in_order() {
        let ring = Arc::new(SampleRing::new(64).unwrap());
        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let data: Vec<i16> = (0..1000).map(|i| i as i16).collect();
                let mut sent = 0;
                while sent < data.len() {
                    sent += ring.write(&data[sent..]);
                    std::thread::yield_now();
                }
            })
        };

        let mut received = Vec::new();
        let mut chunk = [0i16; 32];
        while received.len() < 1000 {
            let n = ring.read(&mut chunk);
            received.extend_from_slice(&chunk[..n]);
            std::thread::yield_now();
        }
        producer.join().unwrap();
        assert!(received.iter().enumerate().all(|(i, &s)| s == i as i16));
    }
}
