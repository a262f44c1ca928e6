use tokio::time::Instant;
use tracing::{error, info, instrument};

use crate::errors::RaffleError;
use crate::events::RaffleEvent;
use crate::state::{Participant, RafflePhase, RandomWord, RequestId, RoundState, StalledPayout};
use crate::traits::{RandomnessOracle, Settlement};
use crate::Raffle;

/// Pick the winner for `word` among `players`: `word mod players.len()`.
///
/// Returns `None` when there are no players.
pub fn select_winner<'a>(players: &'a [Participant], word: &RandomWord) -> Option<&'a Participant> {
    if players.is_empty() {
        return None;
    }
    players.get(word.reduce(players.len()))
}

/// Deliver random words for the outstanding draw.
///
/// Caller, request id and payload are all validated before anything is
/// touched. Once they pass, the pending request is consumed: a second
/// delivery for the same id is rejected even if the payout below fails.
#[instrument(skip_all, fields(request_id = %request_id))]
pub(crate) async fn handler<O, S>(
    raffle: &Raffle<O, S>,
    caller: &str,
    request_id: RequestId,
    random_words: &[RandomWord],
) -> Result<Participant, RaffleError>
where
    O: RandomnessOracle,
    S: Settlement,
{
    if caller != raffle.config.coordinator {
        return Err(RaffleError::OnlyCoordinatorCanFulfill {
            have: caller.to_string(),
            want: raffle.config.coordinator.clone(),
        });
    }

    let mut state = raffle.state.lock().await;

    match state.pending {
        Some(pending) if pending.request_id == request_id => {}
        _ => return Err(RaffleError::UnknownRequest { request_id }),
    }

    let Some(word) = random_words.first().copied() else {
        return Err(RaffleError::MissingRandomWords { request_id });
    };

    let Some(winner) = select_winner(&state.players, &word).cloned() else {
        error!(players = 0, "Pending draw has no players");
        return Err(RaffleError::NoPlayers { request_id });
    };

    state.pending = None;

    info!(
        winner = %winner,
        players = state.players.len(),
        "Picked raffle winner"
    );

    pay_winner(raffle, &mut state, request_id, winner, word).await
}

/// Transfer the pot to `winner` and close the round.
///
/// On failure the round stays `Calculating` with the winner recorded as a
/// stalled payout; players and the previous winner are left untouched.
pub(crate) async fn pay_winner<O, S>(
    raffle: &Raffle<O, S>,
    state: &mut RoundState,
    request_id: RequestId,
    winner: Participant,
    random_word: RandomWord,
) -> Result<Participant, RaffleError>
where
    O: RandomnessOracle,
    S: Settlement,
{
    match raffle.settlement.payout(&winner).await {
        Ok(amount) => {
            state.recent_winner = Some(winner.clone());
            state.players.clear();
            state.phase = RafflePhase::Open;
            state.last_draw = Instant::now();
            state.stalled_payout = None;

            info!(winner = %winner, amount, "Winner paid, raffle reopened");

            raffle.emit(RaffleEvent::WinnerSelected {
                request_id,
                winner: winner.clone(),
                amount,
            });

            Ok(winner)
        }
        Err(e) => {
            error!(winner = %winner, error = %e, "Payout failed, raffle stalled");

            state.stalled_payout = Some(StalledPayout {
                request_id,
                winner: winner.clone(),
                random_word,
            });

            raffle.emit(RaffleEvent::PayoutFailed {
                request_id,
                winner: winner.clone(),
                reason: e.to_string(),
            });

            Err(RaffleError::PayoutFailed { winner, source: e })
        }
    }
}
