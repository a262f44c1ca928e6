use thiserror::Error;

use crate::state::{Participant, RafflePhase, RequestId};
use crate::traits::{OracleError, SettlementError};

/// Error codes for the raffle.
///
/// Every variant aborts the attempted operation without changing round
/// state, except [`RaffleError::PayoutFailed`], which leaves the round in
/// `Calculating` with its randomness consumed.
#[derive(Debug, Error)]
pub enum RaffleError {
    /// The entry payment is below the configured entrance fee.
    #[error("insufficient payment: paid {paid}, entrance fee is {required}")]
    InsufficientPayment { paid: u64, required: u64 },

    /// The settlement layer refused to take the entry payment.
    #[error("entry payment from {player} rejected: {source}")]
    PaymentRejected {
        player: Participant,
        #[source]
        source: SettlementError,
    },

    /// Entries are closed while a draw is in progress.
    #[error("raffle is not open")]
    RoundNotOpen,

    /// A draw was attempted while the upkeep predicate is false.
    #[error("upkeep not needed (balance={balance}, players={players}, phase={phase})")]
    UpkeepNotNeeded {
        balance: u64,
        players: usize,
        phase: RafflePhase,
    },

    /// The oracle refused the randomness request. Nothing was committed.
    #[error("randomness request failed: {0}")]
    RandomnessRequestFailed(#[source] OracleError),

    /// Random words were delivered by someone other than the coordinator.
    #[error("only coordinator can fulfill (have {have}, want {want})")]
    OnlyCoordinatorCanFulfill { have: String, want: String },

    /// The request id does not match the outstanding draw.
    #[error("no pending draw for request {request_id}")]
    UnknownRequest { request_id: RequestId },

    /// The fulfillment carried no random words.
    #[error("fulfillment for request {request_id} carried no random words")]
    MissingRandomWords { request_id: RequestId },

    /// A draw is pending but the round has no players to pick from.
    #[error("draw {request_id} pending with no players")]
    NoPlayers { request_id: RequestId },

    /// The settlement layer rejected the transfer of the pot to the winner.
    #[error("payout to {winner} failed: {source}")]
    PayoutFailed {
        winner: Participant,
        #[source]
        source: SettlementError,
    },

    /// Payout retry requested but no payout is stalled.
    #[error("no stalled payout to retry")]
    NoStalledPayout,

    /// Player query past the end of the player list.
    #[error("player index {index} out of range (players={len})")]
    IndexOutOfRange { index: usize, len: usize },
}
