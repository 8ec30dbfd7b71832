// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol constants, tunable per deployment and validated before a process is constructed.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::Age;

/// Default maximum number of peers kept in the partial membership view.
pub const DEFAULT_VIEW_MAX: usize = 30;

/// Default maximum number of buffered subscription notices.
pub const DEFAULT_SUBS_MAX: usize = 15;

/// Default maximum number of buffered unsubscription notices.
pub const DEFAULT_UNSUBS_MAX: usize = 15;

/// Default maximum number of events held between two gossip rounds.
pub const DEFAULT_EVENTS_MAX: usize = 30;

/// Default maximum number of remembered delivered event ids.
pub const DEFAULT_EVENT_IDS_MAX: usize = 60;

/// Default maximum number of archived events kept for retransmission.
pub const DEFAULT_ARCHIVED_MAX: usize = 60;

/// Default number of ticks an unsubscription notice stays valid.
pub const DEFAULT_UNSUBS_VALIDITY: u64 = 50;

/// Default hop-age gap beyond which an event counts as beaten by a fresher one from the same
/// origin.
pub const DEFAULT_LONG_AGO: Age = 10;

/// Default frequency-purging multiplier.
pub const DEFAULT_FREQUENCY_BIAS: f64 = 0.5;

/// Default gossip fanout.
pub const DEFAULT_FANOUT: usize = 3;

/// Default number of ticks before a missing event becomes eligible for a retrieve request.
pub const DEFAULT_RECOVERY_DELAY: u64 = 20;

/// Default number of ticks before a pending retrieve request advances to its next stage.
pub const DEFAULT_RECOVERY_TIMEOUT: u64 = 20;

/// Default upper bound on the random message delivery delay.
pub const DEFAULT_MESSAGE_MAX_DELAY: u64 = 5;

/// Configuration parameters of a single process.
///
/// All buffer bounds are hard caps which hold at every tick boundary. Construction of a
/// [`Process`](crate::Process) fails fast on invalid values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of peers in the membership view used for gossip targeting.
    pub view_max: usize,

    /// Maximum number of subscription notices kept for re-propagation.
    pub subs_max: usize,

    /// Maximum number of unsubscription notices kept for propagation.
    pub unsubs_max: usize,

    /// Maximum number of events buffered between gossip rounds.
    pub events_max: usize,

    /// Maximum number of delivered event ids remembered for duplicate suppression.
    pub event_ids_max: usize,

    /// Maximum number of retired events archived for retransmission.
    pub archived_max: usize,

    /// Ticks before a buffered unsubscription notice expires.
    pub unsubs_validity: u64,

    /// Hop-age gap for per-origin event purging: an event beaten by a sibling from the same
    /// origin by more than this many hops is dropped first when the event buffer overflows.
    pub long_ago: Age,

    /// Frequency-purging multiplier, in `0.0..1.0`.
    ///
    /// ```text
    /// 0.0 = evict any sampled entry
    /// 0.9 = retain entries until their frequency clearly exceeds the buffer average
    /// ```
    ///
    /// Entries whose propagation frequency exceeds this multiple of the buffer average are
    /// considered well-known everywhere and safe to drop locally.
    pub frequency_bias: f64,

    /// Number of gossip targets per round, clamped to the view size.
    pub fanout: usize,

    /// Ticks a missing event must stay unresolved before a retrieve request is sent.
    pub recovery_delay: u64,

    /// Ticks before an unanswered retrieve request advances to its next stage.
    pub recovery_timeout: u64,

    /// Upper bound (inclusive) on the random delivery delay of a message, in ticks.
    pub message_max_delay: u64,

    /// Deliver every message exactly one tick after it was sent instead of after a uniformly
    /// random delay in `1..=message_max_delay`.
    pub sync_delivery: bool,

    /// Purge the event buffer by hop age (two-stage) instead of uniformly at random.
    pub age_based_event_purging: bool,

    /// Evict membership entries biased towards high propagation frequencies instead of
    /// uniformly at random.
    pub frequency_based_membership_purging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            view_max: DEFAULT_VIEW_MAX,
            subs_max: DEFAULT_SUBS_MAX,
            unsubs_max: DEFAULT_UNSUBS_MAX,
            events_max: DEFAULT_EVENTS_MAX,
            event_ids_max: DEFAULT_EVENT_IDS_MAX,
            archived_max: DEFAULT_ARCHIVED_MAX,
            unsubs_validity: DEFAULT_UNSUBS_VALIDITY,
            long_ago: DEFAULT_LONG_AGO,
            frequency_bias: DEFAULT_FREQUENCY_BIAS,
            fanout: DEFAULT_FANOUT,
            recovery_delay: DEFAULT_RECOVERY_DELAY,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            message_max_delay: DEFAULT_MESSAGE_MAX_DELAY,
            sync_delivery: false,
            age_based_event_purging: true,
            frequency_based_membership_purging: true,
        }
    }
}

impl Config {
    /// Check all parameters, failing on the first invalid one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, cap) in [
            ("view_max", self.view_max),
            ("subs_max", self.subs_max),
            ("unsubs_max", self.unsubs_max),
            ("events_max", self.events_max),
            ("event_ids_max", self.event_ids_max),
            ("archived_max", self.archived_max),
        ] {
            if cap == 0 {
                return Err(ConfigError::ZeroCapacity(name));
            }
        }

        if self.fanout == 0 {
            return Err(ConfigError::ZeroFanout);
        }

        if !(0.0..1.0).contains(&self.frequency_bias) {
            return Err(ConfigError::FrequencyBiasOutOfRange(self.frequency_bias));
        }

        if self.message_max_delay == 0 {
            return Err(ConfigError::ZeroMessageDelay);
        }

        if self.recovery_timeout == 0 {
            return Err(ConfigError::ZeroRecoveryTimeout);
        }

        Ok(())
    }
}

/// Error types for invalid protocol configurations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A buffer capacity was configured as zero.
    #[error("buffer capacity \"{0}\" must be at least 1")]
    ZeroCapacity(&'static str),

    /// The gossip fanout was configured as zero.
    #[error("gossip fanout must be at least 1")]
    ZeroFanout,

    /// The frequency-purging multiplier lies outside `0.0..1.0`.
    #[error("frequency bias must be in 0.0..1.0, got {0}")]
    FrequencyBiasOutOfRange(f64),

    /// The maximum message delay was configured as zero.
    #[error("maximum message delay must be at least 1 tick")]
    ZeroMessageDelay,

    /// The recovery timeout was configured as zero.
    #[error("recovery timeout must be at least 1 tick")]
    ZeroRecoveryTimeout,
}
