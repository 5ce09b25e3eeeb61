//! Lock-free single-producer/single-consumer sample ring
//!
//! The audio callback thread pushes, the processing thread snapshots. The
//! producer is canonical: on overrun it overwrites the oldest samples and
//! never blocks or allocates. Slots hold the float bits in atomics and the
//! write cursor carries the release/acquire ordering, so a snapshot taken
//! while the producer laps it reads torn *history*, never torn *values*.

use std::sync::atomic::{AtomicU64, Ordering};

use atomic_float::AtomicF32;

use crate::SampleTime;

/// Ring capacity in samples (4x the FFT frame)
pub const RING_CAPACITY: usize = 16_384;

/// Fixed-capacity circular sample store shared between the audio producer
/// and the processing consumer
pub struct SampleRing {
    slots: Box<[AtomicF32]>,
    /// Total samples ever pushed; monotonic, never wraps in realistic runs
    written: AtomicU64,
    mask: usize,
}

impl SampleRing {
    /// Create a ring with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(RING_CAPACITY)
    }

    /// Create a ring with a custom power-of-two capacity
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "ring capacity must be 2^n");
        let slots = (0..capacity)
            .map(|_| AtomicF32::new(0.0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            written: AtomicU64::new(0),
            mask: capacity - 1,
        }
    }

    /// Capacity in samples
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total samples pushed since construction
    pub fn total_written(&self) -> SampleTime {
        self.written.load(Ordering::Acquire)
    }

    /// Append samples from the producer side
    ///
    /// Wait-free, allocation-free. Older samples are silently overwritten
    /// once the ring is full.
    pub fn push(&self, samples: &[f32]) {
        let start = self.written.load(Ordering::Relaxed);
        for (i, &sample) in samples.iter().enumerate() {
            let idx = (start as usize).wrapping_add(i) & self.mask;
            self.slots[idx].store(sample, Ordering::Relaxed);
        }
        self.written
            .store(start + samples.len() as u64, Ordering::Release);
    }

    /// Copy the most recent `out.len()` samples into `out`
    ///
    /// If fewer samples have ever been pushed, the prefix is zero-filled.
    /// Returns the sample index just past the end of the window, usable as
    /// the frame timestamp.
    pub fn snapshot_last(&self, out: &mut [f32]) -> SampleTime {
        let total = self.written.load(Ordering::Acquire);
        let want = out.len();
        let have = (total as usize).min(want);

        out[..want - have].fill(0.0);
        let first = total - have as u64;
        for (i, slot) in out[want - have..].iter_mut().enumerate() {
            let idx = (first as usize).wrapping_add(i) & self.mask;
            *slot = self.slots[idx].load(Ordering::Relaxed);
        }
        total
    }
}

impl Default for SampleRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_fill_before_first_push() {
        let ring = SampleRing::with_capacity(64);
        let mut out = [1.0f32; 16];
        let t = ring.snapshot_last(&mut out);
        assert_eq!(t, 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_partial_fill_zero_prefix() {
        let ring = SampleRing::with_capacity(64);
        ring.push(&[0.5, -0.5, 0.25]);
        let mut out = [9.0f32; 8];
        let t = ring.snapshot_last(&mut out);
        assert_eq!(t, 3);
        assert_eq!(&out[..5], &[0.0; 5]);
        assert_eq!(&out[5..], &[0.5, -0.5, 0.25]);
    }

    #[test]
    fn test_snapshot_ends_with_latest_samples() {
        let ring = SampleRing::with_capacity(16);
        let samples: Vec<f32> = (0..40).map(|i| i as f32).collect();
        ring.push(&samples);

        let mut out = [0.0f32; 8];
        let t = ring.snapshot_last(&mut out);
        assert_eq!(t, 40);
        let expected: Vec<f32> = (32..40).map(|i| i as f32).collect();
        assert_eq!(&out[..], expected.as_slice());
    }

    #[test]
    fn test_sliding_window_not_queue() {
        let ring = SampleRing::with_capacity(16);
        ring.push(&[1.0; 16]);
        ring.push(&[2.0; 4]);

        // Two consecutive snapshots both see the same latest window.
        let mut a = [0.0f32; 8];
        let mut b = [0.0f32; 8];
        ring.snapshot_last(&mut a);
        ring.snapshot_last(&mut b);
        assert_eq!(a, b);
        assert_eq!(&a[4..], &[2.0; 4]);
        assert_eq!(&a[..4], &[1.0; 4]);
    }

    #[test]
    fn test_overrun_keeps_newest() {
        let ring = SampleRing::with_capacity(8);
        // Push far more than capacity in several bursts.
        for burst in 0..10 {
            let chunk: Vec<f32> = (0..5).map(|i| (burst * 5 + i) as f32).collect();
            ring.push(&chunk);
        }
        let mut out = [0.0f32; 8];
        let t = ring.snapshot_last(&mut out);
        assert_eq!(t, 50);
        let expected: Vec<f32> = (42..50).map(|i| i as f32).collect();
        assert_eq!(&out[..], expected.as_slice());
    }

    #[test]
    fn test_concurrent_push_and_snapshot() {
        use std::sync::Arc;

        let ring = Arc::new(SampleRing::with_capacity(1024));
        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                let chunk = [0.5f32; 64];
                for _ in 0..200 {
                    ring.push(&chunk);
                }
            })
        };

        let mut out = [0.0f32; 256];
        for _ in 0..100 {
            ring.snapshot_last(&mut out);
            for &s in &out {
                assert!(s == 0.0 || s == 0.5);
            }
        }
        producer.join().unwrap();

        ring.snapshot_last(&mut out);
        assert!(out.iter().all(|&s| s == 0.5));
        assert_eq!(ring.total_written(), 200 * 64);
    }
}
