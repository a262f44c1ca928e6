pub mod errors;
pub mod events;
pub mod instructions;
pub mod state;
pub mod traits;

use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::trace;

pub use errors::RaffleError;
pub use events::RaffleEvent;
pub use instructions::check_upkeep::{should_draw, UpkeepStatus};
pub use instructions::fulfill_random_words::select_winner;
pub use state::{
    Participant, RaffleSnapshot, RafflePhase, RandomWord, RandomnessParams, RequestId,
    RoundConfig, StalledPayout, NUM_WORDS, REQUEST_CONFIRMATIONS,
};
pub use traits::{OracleError, RandomWordsRequest, RandomnessOracle, Settlement, SettlementError};

use state::RoundState;

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Periodic raffle drawn with verifiable randomness.
///
/// Participants pay a fixed fee to enter. Once the draw interval has
/// elapsed, and while the round has players and a funded pot, a keeper may
/// start a draw: the raffle asks the oracle for a random word and stops
/// accepting entries. The oracle later delivers the word, the raffle picks
/// `word mod players` as the winner, pays out the whole pot and reopens.
///
/// ## Round lifecycle
///
/// 1. **Enter**: [`Raffle::enter`] appends players while the round is `Open`.
/// 2. **Probe**: [`Raffle::check_upkeep`] reports whether a draw is due.
/// 3. **Draw**: [`Raffle::perform_upkeep`] re-checks, requests randomness
///    and moves the round to `Calculating`.
/// 4. **Fulfill**: [`Raffle::fulfill_random_words`] selects and pays the
///    winner, then reopens the round.
///
/// All state lives behind one async mutex. The oracle request and the
/// payout are awaited while holding it, so the phase and the pending
/// request are never observed half-updated.
pub struct Raffle<O, S> {
    pub(crate) config: RoundConfig,
    pub(crate) state: Mutex<RoundState>,
    pub(crate) oracle: O,
    pub(crate) settlement: S,
    events: broadcast::Sender<RaffleEvent>,
}

impl<O, S> Raffle<O, S>
where
    O: RandomnessOracle,
    S: Settlement,
{
    /// Create an open raffle. The first draw is due one interval from now.
    pub fn new(config: RoundConfig, oracle: O, settlement: S) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            state: Mutex::new(RoundState::new(Instant::now())),
            oracle,
            settlement,
            events,
        }
    }

    /// Subscribe to raffle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RaffleEvent> {
        self.events.subscribe()
    }

    /// Enter the open round, paying `paid` towards the pot.
    ///
    /// Payment above the entrance fee is kept in the pot; it is not refunded.
    pub async fn enter(&self, participant: Participant, paid: u64) -> Result<(), RaffleError> {
        instructions::enter::handler(self, participant, paid).await
    }

    /// Read-only probe for the keeper: is a draw due right now?
    pub async fn check_upkeep(&self) -> UpkeepStatus {
        instructions::check_upkeep::handler(self).await
    }

    /// Start a draw if one is due, returning the oracle's request id.
    ///
    /// Fails with [`RaffleError::UpkeepNotNeeded`] when the predicate is
    /// false, so it is safe to call speculatively.
    pub async fn perform_upkeep(&self) -> Result<RequestId, RaffleError> {
        instructions::perform_upkeep::handler(self).await
    }

    /// Oracle callback delivering the random words for `request_id`.
    ///
    /// Only the configured coordinator may call this, and only once per
    /// draw. Returns the winner that was paid.
    pub async fn fulfill_random_words(
        &self,
        caller: &str,
        request_id: RequestId,
        random_words: &[RandomWord],
    ) -> Result<Participant, RaffleError> {
        instructions::fulfill_random_words::handler(self, caller, request_id, random_words).await
    }

    /// Re-attempt a payout rejected during fulfillment.
    ///
    /// Pays the already-selected winner; randomness is never re-requested.
    pub async fn retry_payout(&self) -> Result<Participant, RaffleError> {
        instructions::retry_payout::handler(self).await
    }

    pub fn entrance_fee(&self) -> u64 {
        self.config.entrance_fee
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn num_words(&self) -> u32 {
        NUM_WORDS
    }

    pub fn request_confirmations(&self) -> u16 {
        REQUEST_CONFIRMATIONS
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn settlement(&self) -> &S {
        &self.settlement
    }

    pub async fn raffle_state(&self) -> RafflePhase {
        self.state.lock().await.phase
    }

    pub async fn number_of_players(&self) -> usize {
        self.state.lock().await.players.len()
    }

    /// Player at `index`, in entry order.
    pub async fn player(&self, index: usize) -> Result<Participant, RaffleError> {
        let state = self.state.lock().await;
        state
            .players
            .get(index)
            .cloned()
            .ok_or(RaffleError::IndexOutOfRange {
                index,
                len: state.players.len(),
            })
    }

    pub async fn recent_winner(&self) -> Option<Participant> {
        self.state.lock().await.recent_winner.clone()
    }

    /// When the previous round closed.
    pub async fn last_timestamp(&self) -> Instant {
        self.state.lock().await.last_draw
    }

    pub async fn pending_request(&self) -> Option<RequestId> {
        self.state.lock().await.pending.map(|p| p.request_id)
    }

    pub async fn stalled_payout(&self) -> Option<StalledPayout> {
        self.state.lock().await.stalled_payout.clone()
    }

    /// Round state, pot and upkeep probe read under a single lock.
    pub async fn snapshot(&self) -> RaffleSnapshot {
        let state = self.state.lock().await;
        let now = Instant::now();
        let pot = self.settlement.pot_balance();
        RaffleSnapshot {
            phase: state.phase,
            pot,
            entrance_fee: self.config.entrance_fee,
            interval_secs: self.config.interval.as_secs(),
            players: state.players.clone(),
            recent_winner: state.recent_winner.clone(),
            secs_since_last_draw: now.saturating_duration_since(state.last_draw).as_secs(),
            pending_request: state.pending.map(|p| p.request_id),
            secs_pending: state
                .pending
                .map(|p| now.saturating_duration_since(p.requested_at).as_secs()),
            stalled_payout: state.stalled_payout.clone(),
            upkeep: UpkeepStatus::evaluate(&state, &self.config, now, pot),
        }
    }

    pub(crate) fn emit(&self, event: RaffleEvent) {
        trace!(?event, "Publishing raffle event");
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}
