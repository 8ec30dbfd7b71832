// SPDX-License-Identifier: MIT OR Apache-2.0

use std::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::rngs::SysRng;
use rand::seq::IteratorRandom;
use rand::{Rng as _, RngExt as _, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_core::UnwrapErr;

/// Random number generator driving all probabilistic protocol decisions of one process.
///
/// Uses the ChaCha algorithm behind a mutex so that the shared inbox can draw delivery delays
/// through `&self` while the owning process samples gossip targets and eviction candidates.
#[derive(Debug)]
pub struct Rng {
    rng: Mutex<ChaCha20Rng>,
}

impl Default for Rng {
    fn default() -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_rng(&mut UnwrapErr(SysRng))),
        }
    }
}

#[cfg(any(test, feature = "test_utils"))]
impl Rng {
    /// Construct a deterministic generator from a fixed seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_seed(seed)),
        }
    }
}

impl Rng {
    pub(crate) fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut out = [0u8; N];
        self.lock().fill_bytes(&mut out);
        out
    }

    /// Uniformly random integer from an inclusive range.
    pub(crate) fn random_range(&self, range: RangeInclusive<u64>) -> u64 {
        self.lock().random_range(range)
    }

    /// Uniformly random index into a collection of the given length.
    pub(crate) fn random_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.lock().random_range(0..len))
    }

    /// Uniformly random element of an iterator.
    pub(crate) fn choose<I>(&self, iter: I) -> Option<I::Item>
    where
        I: IntoIterator,
    {
        iter.into_iter().choose(&mut *self.lock())
    }

    /// Up to `amount` distinct elements of an iterator, sampled uniformly.
    pub(crate) fn choose_multiple<I>(&self, iter: I, amount: usize) -> Vec<I::Item>
    where
        I: IntoIterator,
    {
        iter.into_iter().choose_multiple(&mut *self.lock(), amount)
    }

    fn lock(&self) -> MutexGuard<'_, ChaCha20Rng> {
        // A poisoned lock only means another thread panicked mid-draw; the generator state
        // itself is still usable.
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
