use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::errors::RaffleError;
use crate::events::RaffleEvent;
use crate::instructions::check_upkeep::should_draw;
use crate::state::{PendingRequest, RafflePhase, RequestId};
use crate::traits::{RandomnessOracle, Settlement};
use crate::Raffle;

/// Start a draw.
///
/// The upkeep predicate is re-evaluated under the lock instead of trusting
/// the keeper's earlier probe. The phase moves to `Calculating` only after
/// the oracle has accepted the request, so a rejected request leaves the
/// round exactly as it was.
#[instrument(skip_all)]
pub(crate) async fn handler<O, S>(raffle: &Raffle<O, S>) -> Result<RequestId, RaffleError>
where
    O: RandomnessOracle,
    S: Settlement,
{
    let mut state = raffle.state.lock().await;
    let now = Instant::now();
    let balance = raffle.settlement.pot_balance();

    if !should_draw(&state, &raffle.config, now, balance) {
        return Err(RaffleError::UpkeepNotNeeded {
            balance,
            players: state.players.len(),
            phase: state.phase,
        });
    }

    let request = raffle.config.randomness_request();
    let request_id = match raffle.oracle.request_random_words(request).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "Oracle rejected randomness request");
            return Err(RaffleError::RandomnessRequestFailed(e));
        }
    };

    state.phase = RafflePhase::Calculating;
    state.pending = Some(PendingRequest {
        request_id,
        requested_at: now,
    });

    info!(
        %request_id,
        players = state.players.len(),
        balance,
        "Requested raffle winner"
    );

    raffle.emit(RaffleEvent::DrawRequested { request_id });

    Ok(request_id)
}
