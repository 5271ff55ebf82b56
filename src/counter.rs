use std::sync::atomic::{AtomicU64, Ordering};

/// Issues the sequence numbers that identify dumped requests.
pub trait Sequence: Send + Sync {
    /// Returns the current value and advances the sequence.
    fn next(&self) -> u64;
}

/// Process-wide request counter, starting at zero.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sequence for Counter {
    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}
