//! Contracts for the raffle's external collaborators.
//!
//! Both traits use generic bounds (`Raffle<O, S>`) rather than trait
//! objects, so implementations may be plain `async fn`s.

use serde::Serialize;
use std::future::Future;
use thiserror::Error;

use crate::state::{Participant, RequestId};

/// Parameters of a single randomness request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RandomWordsRequest {
    pub key_hash: String,
    pub subscription_id: u64,
    pub request_confirmations: u16,
    pub callback_gas_limit: u32,
    pub num_words: u32,
}

/// Reasons an oracle can refuse a randomness request.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("unknown key hash {0}")]
    UnknownKeyHash(String),
    #[error("invalid subscription {0}")]
    InvalidSubscription(u64),
    #[error("num words {requested} exceeds max {max}")]
    NumWordsTooLarge { requested: u32, max: u32 },
    #[error("callback gas limit {requested} exceeds max {max}")]
    GasLimitTooBig { requested: u32, max: u32 },
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

/// Reasons the settlement layer can reject a payout.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("pot is empty")]
    EmptyPot,
    #[error("pot overflow: {pot} + {amount}")]
    PotOverflow { pot: u64, amount: u64 },
    #[error("transfer to {0} rejected")]
    Rejected(Participant),
    #[error("settlement unavailable: {0}")]
    Unavailable(String),
}

/// Asynchronous source of verifiable randomness.
///
/// Accepting a request returns a correlation id immediately; the random
/// words arrive later through [`crate::Raffle::fulfill_random_words`].
pub trait RandomnessOracle: Send + Sync {
    fn request_random_words(
        &self,
        request: RandomWordsRequest,
    ) -> impl Future<Output = Result<RequestId, OracleError>> + Send;
}

/// Holder of the pot. The only path by which funds leave the raffle.
pub trait Settlement: Send + Sync {
    /// Add an entry payment to the pot. On error the pot is unchanged.
    fn credit(&self, from: &Participant, amount: u64) -> Result<(), SettlementError>;

    /// Current pot balance.
    fn pot_balance(&self) -> u64;

    /// Transfer the entire pot to `winner`, returning the amount paid.
    fn payout(
        &self,
        winner: &Participant,
    ) -> impl Future<Output = Result<u64, SettlementError>> + Send;
}
