//! In-memory storage backend for walletdb.
//!
//! Each index keeps its tables in ordered maps keyed by the typed composite
//! keys from `walletdb-store`, behind one mutex per index. A write to an
//! index touches all of its tables under a single lock, so primary and
//! secondary entries never drift apart here; `validate` still runs the same
//! checks as the persistent backend.

pub mod address;
pub mod history;
pub mod token;
pub mod utxo;
pub mod wallet;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use walletdb_store::{Direction, KeyRange, StoreError, WalletStore};

pub use address::MemoryAddressStore;
pub use history::MemoryHistoryStore;
pub use token::MemoryTokenStore;
pub use utxo::MemoryUtxoStore;
pub use wallet::MemoryWalletStore;

/// All five indices of one wallet, held in memory.
#[derive(Default)]
pub struct MemoryStore {
    addresses: MemoryAddressStore,
    history: MemoryHistoryStore,
    utxos: MemoryUtxoStore,
    tokens: MemoryTokenStore,
    wallet: MemoryWalletStore,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WalletStore for MemoryStore {
    type Addresses = MemoryAddressStore;
    type History = MemoryHistoryStore;
    type Utxos = MemoryUtxoStore;
    type Tokens = MemoryTokenStore;
    type Wallet = MemoryWalletStore;

    fn address_store(&self) -> &MemoryAddressStore {
        &self.addresses
    }

    fn history_store(&self) -> &MemoryHistoryStore {
        &self.history
    }

    fn utxo_store(&self) -> &MemoryUtxoStore {
        &self.utxos
    }

    fn token_store(&self) -> &MemoryTokenStore {
        &self.tokens
    }

    fn wallet_store(&self) -> &MemoryWalletStore {
        &self.wallet
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Backend("in-memory table lock poisoned".into()))
}

/// Copy up to `limit` entries of `range` out of `map`, resolving each value
/// through `resolve` (which may drop dangling entries by returning `None`).
pub(crate) fn page<K, V, T>(
    map: &BTreeMap<K, V>,
    range: &KeyRange<K>,
    limit: usize,
    mut resolve: impl FnMut(&K, &V) -> Option<T>,
) -> Vec<(K, Option<T>)>
where
    K: Ord + Clone,
{
    if range.is_empty() {
        return Vec::new();
    }
    let iter = map.range(range.as_ref_bounds());
    let entries: Box<dyn Iterator<Item = (&K, &V)>> = match range.direction {
        Direction::Forward => Box::new(iter),
        Direction::Reverse => Box::new(iter.rev()),
    };
    entries
        .take(limit)
        .map(|(k, v)| (k.clone(), resolve(k, v)))
        .collect()
}
