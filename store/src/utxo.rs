//! UTXO index trait.
//!
//! Each UTXO lives in a primary table keyed by `(tx_id, index)` and in two
//! range-queryable secondary tables ([`crate::TokenUtxoKey`],
//! [`crate::TokenAddressUtxoKey`]). Locked outputs are additionally tracked
//! in a separate table until an external caller decides the lock expired.

use crate::cursor::StoreIter;
use crate::selection::{SelectOptions, Selection, SelectionContext, UtxoRangeQuery};
use crate::StoreError;
use walletdb_types::{LockedUtxo, Utxo, UtxoId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UtxoValidation {
    pub count: u64,
    pub repaired: u64,
}

pub trait UtxoStore {
    /// Write the primary record and both secondary entries.
    fn save_utxo(&self, utxo: &Utxo) -> Result<(), StoreError>;

    fn get_utxo(&self, id: &UtxoId) -> Result<Option<Utxo>, StoreError>;

    /// Remove the primary record and both secondary entries; returns the
    /// removed record.
    fn delete_utxo(&self, id: &UtxoId) -> Result<Option<Utxo>, StoreError>;

    /// All UTXOs in primary key order.
    fn utxo_iter(&self) -> Result<StoreIter<'_, Utxo>, StoreError>;

    /// Scan the secondary index matching `query` (address-scoped when an
    /// address is given) between its value bounds.
    fn utxo_range(&self, query: &UtxoRangeQuery) -> Result<StoreIter<'_, Utxo>, StoreError>;

    fn utxo_count(&self) -> Result<u64, StoreError>;

    fn save_locked_utxo(&self, locked: &LockedUtxo) -> Result<(), StoreError>;

    fn get_locked_utxo(&self, id: &UtxoId) -> Result<Option<LockedUtxo>, StoreError>;

    fn locked_utxo_iter(&self) -> Result<StoreIter<'_, LockedUtxo>, StoreError>;

    /// Drop the locked record; returns whether one existed.
    fn unlock_utxo(&self, id: &UtxoId) -> Result<bool, StoreError>;

    /// Recreate missing secondary entries; fail on conflicting ones.
    fn validate(&self) -> Result<UtxoValidation, StoreError>;

    /// Remove every UTXO and locked record.
    fn clear(&self) -> Result<(), StoreError>;

    /// Lazily select UTXOs; see [`crate::selection`] for the rules.
    fn select_utxos(
        &self,
        options: SelectOptions,
        ctx: SelectionContext,
    ) -> Result<Selection<'_>, StoreError> {
        options.check()?;
        let candidates = self.utxo_range(&options.range_query())?;
        Ok(Selection::new(candidates, options, ctx))
    }
}
