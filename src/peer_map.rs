// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;

use crate::ProcessId;
use crate::rng::Rng;

/// Bounded membership buffer mapping peers to a propagation frequency.
///
/// Backs both the gossip targeting view and the subscription pool. The frequency counts how
/// often a peer has been observed in incoming gossip; eviction is biased towards high
/// frequencies, since a peer everybody talks about is safe to forget locally while a rarely
/// mentioned one would otherwise vanish from the network's collective memory.
#[derive(Debug, Default)]
pub(crate) struct PeerMap {
    entries: HashMap<ProcessId, u64>,
}

impl PeerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &ProcessId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.entries.keys().copied()
    }

    #[cfg(test)]
    pub fn frequency(&self, id: &ProcessId) -> Option<u64> {
        self.entries.get(id).copied()
    }

    /// Record one observation of a peer: absent peers enter at frequency zero, then the
    /// frequency is incremented.
    pub fn observe(&mut self, id: ProcessId) {
        *self.entries.entry(id).or_insert(0) += 1;
    }

    /// Insert a peer at frequency zero if absent, without counting an observation.
    pub fn seed(&mut self, id: ProcessId) {
        self.entries.entry(id).or_insert(0);
    }

    /// Insert or overwrite a peer with an explicit frequency (demotion from another buffer).
    pub fn set(&mut self, id: ProcessId, frequency: u64) {
        self.entries.insert(id, frequency);
    }

    pub fn remove(&mut self, id: &ProcessId) -> Option<u64> {
        self.entries.remove(id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Pick the entry to evict next.
    ///
    /// With frequency-based purging enabled a uniformly sampled candidate is only accepted once
    /// its frequency exceeds `bias` times the buffer average; rejected candidates have their
    /// frequency incremented and the sampling repeats. With `bias < 1` the increments guarantee
    /// termination. Without the optimization any entry is picked uniformly.
    pub fn select_for_eviction(
        &mut self,
        frequency_biased: bool,
        bias: f64,
        rng: &Rng,
    ) -> Option<ProcessId> {
        if self.entries.is_empty() {
            return None;
        }

        if !frequency_biased {
            return rng.choose(self.entries.keys().copied());
        }

        let average = self.entries.values().sum::<u64>() as f64 / self.entries.len() as f64;

        loop {
            let candidate = rng.choose(self.entries.keys().copied())?;
            let frequency = self.entries.get(&candidate).copied().unwrap_or(0);
            if frequency as f64 > bias * average {
                return Some(candidate);
            }
            self.entries.entry(candidate).and_modify(|frequency| *frequency += 1);
        }
    }

    /// Sample up to `amount` distinct peers uniformly at random.
    pub fn random_targets(&self, amount: usize, rng: &Rng) -> Vec<ProcessId> {
        rng.choose_multiple(self.entries.keys().copied(), amount)
    }
}

#[cfg(test)]
mod tests {
    use super::PeerMap;
    use crate::rng::Rng;

    #[test]
    fn observe_enters_at_one_and_counts_up() {
        let mut map = PeerMap::new();

        map.observe(7);
        assert_eq!(map.frequency(&7), Some(1));

        map.observe(7);
        assert_eq!(map.frequency(&7), Some(2));

        map.seed(8);
        assert_eq!(map.frequency(&8), Some(0));
        map.seed(7);
        assert_eq!(map.frequency(&7), Some(2));
    }

    #[test]
    fn uniform_eviction_terminates_on_all_zero() {
        let mut map = PeerMap::new();
        for id in 0..4 {
            map.seed(id);
        }

        let rng = Rng::from_seed([4; 32]);
        let picked = map.select_for_eviction(true, 0.5, &rng);
        assert!(picked.is_some());
    }

    #[test]
    fn eviction_prefers_frequent_entries() {
        let rng = Rng::from_seed([5; 32]);
        let mut survivors_low = 0;

        // Half the peers are well-known (frequency 10), half are rare (frequency 1). Evicting
        // five entries should mostly remove the well-known ones.
        for _ in 0..16 {
            let mut map = PeerMap::new();
            for id in 0..5 {
                map.set(id, 10);
            }
            for id in 5..10 {
                map.set(id, 1);
            }

            for _ in 0..5 {
                let victim = map.select_for_eviction(true, 0.5, &rng).unwrap();
                map.remove(&victim);
            }

            survivors_low += map.ids().filter(|id| *id >= 5).count();
        }

        // Out of 80 survivors a uniform eviction would keep 40 rare peers on average; the
        // biased one has to keep clearly more.
        assert!(survivors_low > 52, "only {survivors_low} rare peers survived");
    }

    #[test]
    fn random_targets_are_distinct_and_clamped() {
        let mut map = PeerMap::new();
        for id in 0..3 {
            map.seed(id);
        }

        let rng = Rng::from_seed([6; 32]);
        let mut targets = map.random_targets(5, &rng);
        targets.sort();
        targets.dedup();
        assert_eq!(targets.len(), 3);
    }
}
