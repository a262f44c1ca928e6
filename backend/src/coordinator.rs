//! In-process VRF coordinator: accepts randomness requests from the raffle
//! and delivers the random words back through its fulfillment callback.
//!
//! Each accepted request:
//! 1. Is assigned the next request id and a seed bound to its routing
//!    parameters.
//! 2. Is queued to the fulfiller, which waits for the requested confirmation
//!    depth (simulated as `block_time * request_confirmations`).
//! 3. Is answered with HMAC-SHA256 randomness expanded into `num_words`
//!    words and delivered via `Raffle::fulfill_random_words`.

use raffle::{OracleError, RaffleError, RandomWord, RandomWordsRequest, RandomnessOracle, RequestId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::AppRaffle;
use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::vrf::{compute_randomness, expand_randomness, request_seed};

/// Capacity of the queue between the coordinator and the fulfiller.
const REQUEST_QUEUE_CAPACITY: usize = 256;

/// A randomness request accepted by the coordinator, awaiting fulfillment.
#[derive(Debug, Clone)]
pub struct RandomWordsRequested {
    pub request_id: u64,
    pub seed: [u8; 32],
    pub num_words: u32,
    pub request_confirmations: u16,
    pub requested_at: Instant,
}

/// Coordinator side of the oracle protocol.
pub struct Coordinator {
    key_hash: String,
    subscription_id: u64,
    max_num_words: u32,
    max_callback_gas_limit: u32,
    /// Monotonically increasing counter used to assign request ids.
    request_counter: AtomicU64,
    tx: mpsc::Sender<RandomWordsRequested>,
}

impl Coordinator {
    /// Create a coordinator serving the configured key hash and subscription.
    ///
    /// The returned receiver must be handed to [`run_fulfiller`].
    pub fn new(config: &AppConfig) -> (Self, mpsc::Receiver<RandomWordsRequested>) {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let coordinator = Self {
            key_hash: config.key_hash.clone(),
            subscription_id: config.subscription_id,
            max_num_words: config.max_num_words,
            max_callback_gas_limit: config.max_callback_gas_limit,
            request_counter: AtomicU64::new(1),
            tx,
        };
        (coordinator, rx)
    }

    fn validate(&self, request: &RandomWordsRequest) -> Result<(), OracleError> {
        if request.key_hash != self.key_hash {
            return Err(OracleError::UnknownKeyHash(request.key_hash.clone()));
        }
        if request.subscription_id != self.subscription_id {
            return Err(OracleError::InvalidSubscription(request.subscription_id));
        }
        if request.num_words > self.max_num_words {
            return Err(OracleError::NumWordsTooLarge {
                requested: request.num_words,
                max: self.max_num_words,
            });
        }
        if request.callback_gas_limit > self.max_callback_gas_limit {
            return Err(OracleError::GasLimitTooBig {
                requested: request.callback_gas_limit,
                max: self.max_callback_gas_limit,
            });
        }
        Ok(())
    }
}

impl RandomnessOracle for Coordinator {
    async fn request_random_words(
        &self,
        request: RandomWordsRequest,
    ) -> Result<RequestId, OracleError> {
        self.validate(&request)?;

        let request_id = self.request_counter.fetch_add(1, Ordering::SeqCst);
        let event = RandomWordsRequested {
            request_id,
            seed: request_seed(&request.key_hash, request.subscription_id, request_id),
            num_words: request.num_words,
            request_confirmations: request.request_confirmations,
            requested_at: Instant::now(),
        };

        self.tx
            .send(event)
            .await
            .map_err(|_| OracleError::Unavailable("fulfiller stopped".into()))?;

        info!(
            request_id,
            num_words = request.num_words,
            confirmations = request.request_confirmations,
            "Accepted randomness request"
        );

        Ok(RequestId(request_id))
    }
}

/// Compute the words delivered for a request.
pub fn fulfillment_words(hmac_secret: &[u8], event: &RandomWordsRequested) -> Vec<RandomWord> {
    let randomness = compute_randomness(hmac_secret, &event.seed, event.request_id);
    expand_randomness(&randomness, event.num_words)
}

/// Main fulfiller loop.
pub async fn run_fulfiller(
    config: AppConfig,
    mut rx: mpsc::Receiver<RandomWordsRequested>,
    raffle: Arc<AppRaffle>,
    metrics: Arc<Metrics>,
) {
    while let Some(event) = rx.recv().await {
        let cfg = config.clone();
        let raffle = raffle.clone();
        let met = metrics.clone();

        tokio::spawn(async move {
            info!(
                request_id = event.request_id,
                num_words = event.num_words,
                "Fulfilling randomness request"
            );

            fulfill_request(&cfg, &raffle, &met, event).await;
        });
    }

    info!("Fulfiller channel closed, shutting down");
}

#[instrument(skip_all, fields(request_id = event.request_id))]
async fn fulfill_request(
    config: &AppConfig,
    raffle: &AppRaffle,
    metrics: &Metrics,
    event: RandomWordsRequested,
) {
    let confirmation_delay = config.block_time * u32::from(event.request_confirmations);
    tokio::time::sleep_until(event.requested_at + confirmation_delay).await;

    let words = fulfillment_words(&config.hmac_secret, &event);

    match raffle
        .fulfill_random_words(&config.coordinator_id, RequestId(event.request_id), &words)
        .await
    {
        Ok(winner) => {
            let latency_ms = event.requested_at.elapsed().as_millis() as u64;
            metrics.record_fulfillment(latency_ms);
            info!(winner = %winner, latency_ms, "Fulfilled successfully");
        }
        Err(e) => handle_fulfillment_error(event.request_id, e, metrics),
    }
}

fn handle_fulfillment_error(request_id: u64, error: RaffleError, metrics: &Metrics) {
    match error {
        RaffleError::PayoutFailed { .. } => {
            // Randomness is consumed; only a payout retry can close the round.
            error!(
                request_id,
                error = %error,
                "Raffle stalled on payout, retry via /admin/retry-payout"
            );
        }
        RaffleError::UnknownRequest { .. } | RaffleError::OnlyCoordinatorCanFulfill { .. } => {
            metrics.record_rejected_fulfillment();
            warn!(
                request_id,
                reason = %error,
                "Skipping request (non-retryable)"
            );
        }
        other => {
            metrics.record_rejected_fulfillment();
            error!(
                request_id,
                error = %other,
                "Failed to fulfill"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::treasury::Treasury;
    use raffle::{Participant, Raffle, RaffleEvent, RafflePhase, Settlement};
    use std::time::Duration;

    fn request(config: &AppConfig) -> RandomWordsRequest {
        config.round_config().randomness_request()
    }

    #[tokio::test]
    async fn assigns_increasing_ids_and_queues_requests() {
        let config = AppConfig::for_tests();
        let (coordinator, mut rx) = Coordinator::new(&config);

        let first = coordinator.request_random_words(request(&config)).await.unwrap();
        let second = coordinator.request_random_words(request(&config)).await.unwrap();

        assert_eq!(first, RequestId(1));
        assert_eq!(second, RequestId(2));

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.request_id, 1);
        assert_eq!(queued.num_words, 1);
        assert_eq!(queued.request_confirmations, 3);
        assert_eq!(queued.seed, request_seed(&config.key_hash, config.subscription_id, 1));
        assert_eq!(rx.recv().await.unwrap().request_id, 2);
    }

    #[tokio::test]
    async fn rejects_requests_it_cannot_serve() {
        let config = AppConfig::for_tests();
        let (coordinator, _rx) = Coordinator::new(&config);

        let mut wrong_lane = request(&config);
        wrong_lane.key_hash = "other-lane".into();
        assert!(matches!(
            coordinator.request_random_words(wrong_lane).await,
            Err(OracleError::UnknownKeyHash(_))
        ));

        let mut wrong_sub = request(&config);
        wrong_sub.subscription_id = 99;
        assert!(matches!(
            coordinator.request_random_words(wrong_sub).await,
            Err(OracleError::InvalidSubscription(99))
        ));

        let mut too_many = request(&config);
        too_many.num_words = config.max_num_words + 1;
        assert!(matches!(
            coordinator.request_random_words(too_many).await,
            Err(OracleError::NumWordsTooLarge { .. })
        ));

        let mut too_much_gas = request(&config);
        too_much_gas.callback_gas_limit = config.max_callback_gas_limit + 1;
        assert!(matches!(
            coordinator.request_random_words(too_much_gas).await,
            Err(OracleError::GasLimitTooBig { .. })
        ));
    }

    #[tokio::test]
    async fn unavailable_when_fulfiller_stopped() {
        let config = AppConfig::for_tests();
        let (coordinator, rx) = Coordinator::new(&config);
        drop(rx);

        assert!(matches!(
            coordinator.request_random_words(request(&config)).await,
            Err(OracleError::Unavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn fulfiller_completes_the_draw() {
        let config = AppConfig::for_tests();
        let (coordinator, rx) = Coordinator::new(&config);
        let raffle = Arc::new(Raffle::new(config.round_config(), coordinator, Treasury::new()));
        let metrics = Arc::new(Metrics::new());
        let mut events = raffle.subscribe();

        tokio::spawn(run_fulfiller(config.clone(), rx, raffle.clone(), metrics.clone()));

        let entrants = ["alice", "bob", "carol"];
        for name in entrants {
            raffle.enter(Participant::new(name), config.entrance_fee).await.unwrap();
        }
        tokio::time::advance(config.draw_interval + Duration::from_secs(1)).await;

        let request_id = raffle.perform_upkeep().await.unwrap();
        assert_eq!(raffle.raffle_state().await, RafflePhase::Calculating);

        let winner = loop {
            match events.recv().await.unwrap() {
                RaffleEvent::WinnerSelected { winner, amount, .. } => {
                    assert_eq!(amount, 300);
                    break winner;
                }
                _ => continue,
            }
        };

        let expected_event = RandomWordsRequested {
            request_id: request_id.0,
            seed: request_seed(&config.key_hash, config.subscription_id, request_id.0),
            num_words: 1,
            request_confirmations: 3,
            requested_at: Instant::now(),
        };
        let word = fulfillment_words(&config.hmac_secret, &expected_event)[0];
        assert_eq!(winner.as_str(), entrants[word.reduce(entrants.len())]);

        assert_eq!(raffle.raffle_state().await, RafflePhase::Open);
        assert_eq!(raffle.settlement().balance_of(&winner), 300);
        assert_eq!(raffle.settlement().pot_balance(), 0);
        assert_eq!(metrics.fulfillment_count.load(Ordering::Relaxed), 1);
        assert!(metrics.avg_latency_ms() >= 1_200);
    }
}
