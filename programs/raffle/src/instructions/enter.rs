use tracing::debug;

use crate::errors::RaffleError;
use crate::events::RaffleEvent;
use crate::state::{Participant, RafflePhase};
use crate::traits::{RandomnessOracle, Settlement};
use crate::Raffle;

/// Record an entry into the open round.
///
/// The payment check runs before the phase check, so an underpayment is
/// rejected the same way in every phase.
pub(crate) async fn handler<O, S>(
    raffle: &Raffle<O, S>,
    participant: Participant,
    paid: u64,
) -> Result<(), RaffleError>
where
    O: RandomnessOracle,
    S: Settlement,
{
    let required = raffle.config.entrance_fee;
    if paid < required {
        return Err(RaffleError::InsufficientPayment { paid, required });
    }

    let mut state = raffle.state.lock().await;
    if state.phase != RafflePhase::Open {
        return Err(RaffleError::RoundNotOpen);
    }

    raffle
        .settlement
        .credit(&participant, paid)
        .map_err(|source| RaffleError::PaymentRejected {
            player: participant.clone(),
            source,
        })?;
    state.players.push(participant.clone());

    debug!(
        player = %participant,
        paid,
        players = state.players.len(),
        "Entry recorded"
    );

    raffle.emit(RaffleEvent::EntryRecorded {
        player: participant,
    });

    Ok(())
}
