//! Upkeep keeper: the raffle's trigger source.
//!
//! Polls [`Raffle::check_upkeep`](raffle::Raffle::check_upkeep) on a fixed
//! interval and calls `perform_upkeep` when a draw is due. The raffle
//! re-validates on every call, so a draw the keeper believed was due may
//! still be rejected if conditions changed in between.

use raffle::{RaffleError, UpkeepStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::AppRaffle;
use crate::metrics::Metrics;

/// Outcome of a single keeper tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The probe reported no upkeep needed.
    Idle,
    /// A draw was started.
    DrawRequested,
    /// The probe said yes but the raffle rejected the draw.
    Rejected,
    /// The draw failed for another reason (e.g. the oracle refused).
    Failed,
}

/// Probe once and start a draw if one is due.
pub async fn tick(raffle: &AppRaffle, metrics: &Metrics) -> TickOutcome {
    let status = raffle.check_upkeep().await;
    if !status.upkeep_needed {
        debug!(
            phase = %status.phase,
            players = status.players,
            balance = status.balance,
            elapsed_ms = status.elapsed_ms,
            "Upkeep not needed"
        );
        return TickOutcome::Idle;
    }

    start_draw(raffle, metrics, &status).await
}

/// Start the draw the probe in `status` reported as due.
async fn start_draw(raffle: &AppRaffle, metrics: &Metrics, status: &UpkeepStatus) -> TickOutcome {
    match raffle.perform_upkeep().await {
        Ok(request_id) => {
            info!(%request_id, players = status.players, "Draw started");
            TickOutcome::DrawRequested
        }
        Err(RaffleError::UpkeepNotNeeded {
            balance,
            players,
            phase,
        }) => {
            debug!(balance, players, %phase, "Draw no longer needed");
            TickOutcome::Rejected
        }
        Err(e) => {
            metrics.record_upkeep_failure();
            error!(error = %e, "Failed to start draw");
            TickOutcome::Failed
        }
    }
}

/// Run the keeper loop forever.
pub async fn run_keeper(raffle: Arc<AppRaffle>, poll_interval: Duration, metrics: Arc<Metrics>) {
    info!(poll = ?poll_interval, "Starting keeper");

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        tick(&raffle, &metrics).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::coordinator::{Coordinator, RandomWordsRequested};
    use crate::treasury::Treasury;
    use raffle::{Participant, Raffle, RafflePhase};
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    fn new_raffle(config: &AppConfig) -> (AppRaffle, mpsc::Receiver<RandomWordsRequested>) {
        let (coordinator, rx) = Coordinator::new(config);
        (Raffle::new(config.round_config(), coordinator, Treasury::new()), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn idle_until_interval_elapses() {
        let config = AppConfig::for_tests();
        let (raffle, _rx) = new_raffle(&config);
        let metrics = Metrics::new();

        assert_eq!(tick(&raffle, &metrics).await, TickOutcome::Idle);

        raffle
            .enter(Participant::new("alice"), config.entrance_fee)
            .await
            .unwrap();
        assert_eq!(tick(&raffle, &metrics).await, TickOutcome::Idle);

        tokio::time::advance(config.draw_interval + Duration::from_secs(1)).await;
        assert_eq!(tick(&raffle, &metrics).await, TickOutcome::DrawRequested);
        assert_eq!(raffle.raffle_state().await, RafflePhase::Calculating);

        // Pending draw: the probe stays false.
        assert_eq!(tick(&raffle, &metrics).await, TickOutcome::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn draw_started_elsewhere_is_rejected() {
        let config = AppConfig::for_tests();
        let (raffle, _rx) = new_raffle(&config);
        let metrics = Metrics::new();

        raffle
            .enter(Participant::new("alice"), config.entrance_fee)
            .await
            .unwrap();
        tokio::time::advance(config.draw_interval + Duration::from_secs(1)).await;

        let status = raffle.check_upkeep().await;
        assert!(status.upkeep_needed);

        // Another caller wins the race between probe and draw.
        raffle.perform_upkeep().await.unwrap();

        assert_eq!(
            start_draw(&raffle, &metrics, &status).await,
            TickOutcome::Rejected
        );
        assert_eq!(metrics.upkeep_failures.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn oracle_refusal_counts_as_failure() {
        let config = AppConfig::for_tests();
        let (raffle, rx) = new_raffle(&config);
        let metrics = Metrics::new();
        drop(rx);

        raffle
            .enter(Participant::new("alice"), config.entrance_fee)
            .await
            .unwrap();
        tokio::time::advance(config.draw_interval + Duration::from_secs(1)).await;

        assert_eq!(tick(&raffle, &metrics).await, TickOutcome::Failed);
        assert_eq!(raffle.raffle_state().await, RafflePhase::Open);
        assert_eq!(metrics.upkeep_failures.load(Ordering::Relaxed), 1);
    }
}
