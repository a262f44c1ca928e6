//! In-memory settlement layer holding the raffle pot and winner balances.

use raffle::{Participant, Settlement, SettlementError};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default)]
struct Ledger {
    pot: u64,
    balances: HashMap<Participant, u64>,
    total_paid_out: u64,
}

/// Custodian of entry payments. Pays the whole pot out on request.
#[derive(Default)]
pub struct Treasury {
    ledger: Mutex<Ledger>,
}

impl Treasury {
    pub fn new() -> Self {
        Self::default()
    }

    /// Winnings credited to `participant` so far.
    pub fn balance_of(&self, participant: &Participant) -> u64 {
        self.ledger()
            .balances
            .get(participant)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_paid_out(&self) -> u64 {
        self.ledger().total_paid_out
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // The ledger is left consistent between statements; recover from poison.
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Settlement for Treasury {
    fn credit(&self, from: &Participant, amount: u64) -> Result<(), SettlementError> {
        let mut ledger = self.ledger();
        let pot = ledger.pot;
        ledger.pot = pot
            .checked_add(amount)
            .ok_or(SettlementError::PotOverflow { pot, amount })?;
        debug!(from = %from, amount, pot = ledger.pot, "Credited entry to pot");
        Ok(())
    }

    fn pot_balance(&self) -> u64 {
        self.ledger().pot
    }

    async fn payout(&self, winner: &Participant) -> Result<u64, SettlementError> {
        let mut ledger = self.ledger();
        let amount = ledger.pot;
        if amount == 0 {
            return Err(SettlementError::EmptyPot);
        }

        let balance = ledger.balances.get(winner).copied().unwrap_or(0);
        let new_balance = balance
            .checked_add(amount)
            .ok_or_else(|| SettlementError::Rejected(winner.clone()))?;

        ledger.balances.insert(winner.clone(), new_balance);
        ledger.pot = 0;
        ledger.total_paid_out = ledger.total_paid_out.saturating_add(amount);

        debug!(winner = %winner, amount, "Pot transferred");
        Ok(amount)
    }
}
