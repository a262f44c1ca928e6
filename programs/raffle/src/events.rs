use serde::Serialize;

use crate::state::{Participant, RequestId};

/// Notifications published by the raffle on its broadcast channel.
///
/// Publishing never blocks and never fails an operation; events sent while
/// nobody is subscribed are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RaffleEvent {
    /// A participant entered the open round.
    EntryRecorded { player: Participant },
    /// A draw started and randomness was requested.
    DrawRequested { request_id: RequestId },
    /// The round closed and the pot was paid out.
    WinnerSelected {
        request_id: RequestId,
        winner: Participant,
        amount: u64,
    },
    /// The settlement layer rejected the payout; the round stays calculating.
    PayoutFailed {
        request_id: RequestId,
        winner: Participant,
        reason: String,
    },
}
