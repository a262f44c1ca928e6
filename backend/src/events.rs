//! Raffle notification listener.
//!
//! Subscribes to the raffle's broadcast channel, writes every notification
//! to the log as structured fields and feeds the event-driven counters.

use raffle::RaffleEvent;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::metrics::Metrics;

/// Consume raffle events until the raffle is dropped.
pub async fn log_events(mut rx: broadcast::Receiver<RaffleEvent>, metrics: Arc<Metrics>) {
    loop {
        match rx.recv().await {
            Ok(event) => record_event(&event, &metrics),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event listener lagged, notifications dropped");
            }
            Err(RecvError::Closed) => {
                info!("Event channel closed, stopping listener");
                return;
            }
        }
    }
}

fn record_event(event: &RaffleEvent, metrics: &Metrics) {
    match event {
        RaffleEvent::EntryRecorded { player } => {
            metrics.record_entry();
            info!(player = %player, "EntryRecorded");
        }
        RaffleEvent::DrawRequested { request_id } => {
            metrics.record_draw_requested();
            info!(%request_id, "DrawRequested");
        }
        RaffleEvent::WinnerSelected {
            request_id,
            winner,
            amount,
        } => {
            metrics.record_round_completed();
            info!(%request_id, winner = %winner, amount, "WinnerSelected");
        }
        RaffleEvent::PayoutFailed {
            request_id,
            winner,
            reason,
        } => {
            metrics.record_payout_failure();
            warn!(%request_id, winner = %winner, reason = %reason, "PayoutFailed");
        }
    }
}
