use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::instructions::check_upkeep::UpkeepStatus;
use crate::traits::RandomWordsRequest;

/// Block confirmations the oracle waits for before answering a request.
pub const REQUEST_CONFIRMATIONS: u16 = 3;

/// Random words requested per draw. One word picks one winner.
pub const NUM_WORDS: u32 = 1;

/// Identifier of a raffle participant, as understood by the settlement layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Participant(String);

impl Participant {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation token returned by the oracle for a randomness request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 256-bit random value delivered by the oracle, big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RandomWord(pub [u8; 32]);

impl RandomWord {
    /// Embed a `u64` in the low-order bytes of a word.
    pub fn from_u64(value: u64) -> Self {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&value.to_be_bytes());
        Self(word)
    }

    /// `self mod modulus`, computed over the full 256-bit value.
    ///
    /// No debiasing is applied: with 2^256 possible words the skew towards
    /// low indices is negligible for any realistic player count.
    ///
    /// # Panics
    ///
    /// Panics if `modulus` is zero.
    pub fn reduce(&self, modulus: usize) -> usize {
        assert!(modulus > 0, "modulus must be non-zero");
        let m = modulus as u128;
        let mut acc: u128 = 0;
        for byte in self.0 {
            acc = ((acc << 8) | u128::from(byte)) % m;
        }
        acc as usize
    }
}

/// Round lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RafflePhase {
    /// Accepting entries and draw initiation.
    Open,
    /// A draw is in progress; no entries are accepted.
    Calculating,
}

impl fmt::Display for RafflePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RafflePhase::Open => f.write_str("open"),
            RafflePhase::Calculating => f.write_str("calculating"),
        }
    }
}

/// Randomness request tuning passed through to the oracle on every draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessParams {
    /// Oracle key / gas lane the request is routed through.
    pub key_hash: String,
    /// Oracle subscription paying for the request.
    pub subscription_id: u64,
    /// Budget for the fulfillment callback.
    pub callback_gas_limit: u32,
}

/// Immutable raffle configuration, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundConfig {
    /// Minimum payment accepted by `enter`.
    pub entrance_fee: u64,
    /// Minimum time between two draws.
    pub interval: Duration,
    pub randomness: RandomnessParams,
    /// Identity of the only caller allowed to deliver random words.
    pub coordinator: String,
}

impl RoundConfig {
    /// Build the request sent to the oracle when a draw starts.
    pub fn randomness_request(&self) -> RandomWordsRequest {
        RandomWordsRequest {
            key_hash: self.randomness.key_hash.clone(),
            subscription_id: self.randomness.subscription_id,
            request_confirmations: REQUEST_CONFIRMATIONS,
            callback_gas_limit: self.randomness.callback_gas_limit,
            num_words: NUM_WORDS,
        }
    }
}

/// The in-flight correlation record between a draw and its fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub request_id: RequestId,
    pub requested_at: Instant,
}

/// A winner whose payout was rejected by the settlement layer.
///
/// The randomness behind it has already been consumed; remediation pays
/// this same winner rather than drawing again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StalledPayout {
    pub request_id: RequestId,
    pub winner: Participant,
    pub random_word: RandomWord,
}

/// Live round state. Owned by [`crate::Raffle`] behind its lock.
#[derive(Debug, Clone)]
pub struct RoundState {
    pub phase: RafflePhase,
    /// Entrants in entry order. Duplicates are separate entries.
    pub players: Vec<Participant>,
    /// When the previous round closed (or the raffle was created).
    pub last_draw: Instant,
    pub recent_winner: Option<Participant>,
    pub pending: Option<PendingRequest>,
    pub stalled_payout: Option<StalledPayout>,
}

impl RoundState {
    pub fn new(now: Instant) -> Self {
        Self {
            phase: RafflePhase::Open,
            players: Vec::new(),
            last_draw: now,
            recent_winner: None,
            pending: None,
            stalled_payout: None,
        }
    }
}

/// Serializable point-in-time view of the raffle, taken under one lock.
#[derive(Debug, Clone, Serialize)]
pub struct RaffleSnapshot {
    pub phase: RafflePhase,
    pub pot: u64,
    pub entrance_fee: u64,
    pub interval_secs: u64,
    pub players: Vec<Participant>,
    pub recent_winner: Option<Participant>,
    pub secs_since_last_draw: u64,
    pub pending_request: Option<RequestId>,
    /// How long the pending draw has been waiting for its random words.
    pub secs_pending: Option<u64>,
    pub stalled_payout: Option<StalledPayout>,
    /// The keeper probe as evaluated at snapshot time.
    pub upkeep: UpkeepStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_small_values() {
        assert_eq!(RandomWord::from_u64(7).reduce(3), 1);
        assert_eq!(RandomWord::from_u64(6).reduce(3), 0);
        assert_eq!(RandomWord::from_u64(0).reduce(5), 0);
        assert_eq!(RandomWord::from_u64(u64::MAX).reduce(1), 0);
    }

    #[test]
    fn reduce_uses_all_256_bits() {
        // 2^64 mod 10 = 6
        let mut bytes = [0u8; 32];
        bytes[23] = 1;
        assert_eq!(RandomWord(bytes).reduce(10), 6);

        // 2^256 - 1 is divisible by 3 and 5
        let max = RandomWord([0xff; 32]);
        assert_eq!(max.reduce(3), 0);
        assert_eq!(max.reduce(5), 0);
        assert_eq!(max.reduce(7), 1);
    }

    #[test]
    fn randomness_request_uses_fixed_constants() {
        let config = RoundConfig {
            entrance_fee: 100,
            interval: Duration::from_secs(30),
            randomness: RandomnessParams {
                key_hash: "lane-a".into(),
                subscription_id: 9,
                callback_gas_limit: 500_000,
            },
            coordinator: "coordinator".into(),
        };

        let request = config.randomness_request();
        assert_eq!(request.key_hash, "lane-a");
        assert_eq!(request.subscription_id, 9);
        assert_eq!(request.callback_gas_limit, 500_000);
        assert_eq!(request.request_confirmations, REQUEST_CONFIRMATIONS);
        assert_eq!(request.num_words, 1);
    }
}
