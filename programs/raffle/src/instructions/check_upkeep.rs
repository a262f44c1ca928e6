use serde::Serialize;
use tokio::time::Instant;

use crate::state::{RafflePhase, RoundConfig, RoundState};
use crate::traits::{RandomnessOracle, Settlement};
use crate::Raffle;

/// Result of the keeper's read-only probe, with the inputs that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpkeepStatus {
    pub upkeep_needed: bool,
    pub phase: RafflePhase,
    pub players: usize,
    pub balance: u64,
    pub elapsed_ms: u64,
}

/// Whether a draw should start now.
///
/// True only when the round is open, strictly more than `interval` has
/// passed since the last draw, there is at least one player and the pot
/// is funded.
pub fn should_draw(
    state: &RoundState,
    config: &RoundConfig,
    now: Instant,
    pot_balance: u64,
) -> bool {
    let is_open = state.phase == RafflePhase::Open;
    let time_passed = now.saturating_duration_since(state.last_draw) > config.interval;
    let has_players = !state.players.is_empty();
    let has_balance = pot_balance > 0;
    is_open && time_passed && has_players && has_balance
}

impl UpkeepStatus {
    /// Evaluate the probe against a locked state.
    pub(crate) fn evaluate(
        state: &RoundState,
        config: &RoundConfig,
        now: Instant,
        balance: u64,
    ) -> Self {
        Self {
            upkeep_needed: should_draw(state, config, now, balance),
            phase: state.phase,
            players: state.players.len(),
            balance,
            elapsed_ms: now.saturating_duration_since(state.last_draw).as_millis() as u64,
        }
    }
}

pub(crate) async fn handler<O, S>(raffle: &Raffle<O, S>) -> UpkeepStatus
where
    O: RandomnessOracle,
    S: Settlement,
{
    let state = raffle.state.lock().await;
    let balance = raffle.settlement.pot_balance();
    UpkeepStatus::evaluate(&state, &raffle.config, Instant::now(), balance)
}
