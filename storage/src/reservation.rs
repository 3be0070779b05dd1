//! In-process reservations of UTXOs already picked as transaction inputs.
//!
//! Reservations are never persisted: they protect against two transactions
//! of the same process spending one output, nothing more.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use walletdb_types::{Timestamp, UtxoId};

#[derive(Debug, Default)]
pub struct UtxoReservations {
    entries: Mutex<HashMap<UtxoId, Timestamp>>,
}

impl UtxoReservations {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<UtxoId, Timestamp>> {
        // The map holds plain values; a panic elsewhere cannot leave it torn.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve `id` until `until`, replacing any earlier reservation.
    pub fn reserve(&self, id: UtxoId, until: Timestamp) {
        self.entries().insert(id, until);
    }

    pub fn release(&self, id: &UtxoId) {
        self.entries().remove(id);
    }

    pub fn is_reserved(&self, id: &UtxoId, now: Timestamp) -> bool {
        let mut entries = self.entries();
        match entries.get(id) {
            Some(until) if until.is_after(now) => true,
            Some(_) => {
                entries.remove(id);
                false
            }
            None => false,
        }
    }

    /// Ids reserved at `now`; expired entries are dropped on the way.
    pub fn active(&self, now: Timestamp) -> HashSet<UtxoId> {
        let mut entries = self.entries();
        entries.retain(|_, until| until.is_after(now));
        entries.keys().copied().collect()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}
