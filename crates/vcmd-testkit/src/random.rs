//! Deterministic randomness
//!
//! [`SequenceRandom`] hands out queued chunks first, one per draw, then falls
//! back to a counter so every later draw is still distinct and reproducible.

use std::collections::VecDeque;
use std::sync::Mutex;
use vcmd_protocol::RandomSource;

#[derive(Debug, Default)]
struct SequenceState {
    queued: VecDeque<Vec<u8>>,
    draws: u64,
}

/// Reproducible [`RandomSource`]
#[derive(Debug, Default)]
pub struct SequenceRandom {
    state: Mutex<SequenceState>,
}

impl SequenceRandom {
    /// Counter-only source
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that returns `chunks` in order before falling back to the counter
    pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
        let random = Self::new();
        for chunk in chunks {
            random.push(chunk);
        }
        random
    }

    /// Queue one chunk; it must match the length of the draw that takes it
    pub fn push(&self, chunk: Vec<u8>) {
        self.state.lock().unwrap().queued.push_back(chunk);
    }

    /// Number of draws served so far
    pub fn draws(&self) -> u64 {
        self.state.lock().unwrap().draws
    }
}

impl RandomSource for SequenceRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        let mut state = self.state.lock().unwrap();
        state.draws += 1;

        if let Some(chunk) = state.queued.pop_front() {
            assert_eq!(chunk.len(), dest.len(), "queued chunk has the wrong length");
            dest.copy_from_slice(&chunk);
            return;
        }

        // 0x5e padding, draw number in the trailing bytes
        dest.fill(0x5e);
        let counter = state.draws.to_be_bytes();
        let take = dest.len().min(counter.len());
        let start = dest.len() - take;
        dest[start..].copy_from_slice(&counter[counter.len() - take..]);
    }
}
