use tracing::{info, instrument};

use crate::errors::RaffleError;
use crate::instructions::fulfill_random_words::pay_winner;
use crate::state::Participant;
use crate::traits::{RandomnessOracle, Settlement};
use crate::Raffle;

/// Pay the winner of a draw whose payout was rejected.
///
/// Uses the winner recorded at fulfillment time. On success the round
/// closes exactly as a successful fulfillment would have.
#[instrument(skip_all)]
pub(crate) async fn handler<O, S>(raffle: &Raffle<O, S>) -> Result<Participant, RaffleError>
where
    O: RandomnessOracle,
    S: Settlement,
{
    let mut state = raffle.state.lock().await;

    let Some(stalled) = state.stalled_payout.clone() else {
        return Err(RaffleError::NoStalledPayout);
    };

    info!(
        request_id = %stalled.request_id,
        winner = %stalled.winner,
        "Retrying stalled payout"
    );

    pay_winner(
        raffle,
        &mut state,
        stalled.request_id,
        stalled.winner,
        stalled.random_word,
    )
    .await
}
