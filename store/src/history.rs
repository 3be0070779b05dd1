//! History index trait.

use crate::cursor::{Direction, StoreIter};
use crate::StoreError;
use walletdb_types::{HistoryTx, TokenUid, TxId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HistoryValidation {
    pub count: u64,
    pub repaired: u64,
}

/// Transaction records keyed by id with a `(timestamp, tx_id)` secondary view.
pub trait HistoryStore {
    /// Upsert a transaction; returns `true` when the id was not stored before.
    ///
    /// The transaction counter only moves on insert.
    fn save_tx(&self, tx: &HistoryTx) -> Result<bool, StoreError>;

    fn get_tx(&self, tx_id: &TxId) -> Result<Option<HistoryTx>, StoreError>;

    /// Transactions through the time-ordered view in the given direction.
    fn history_range(&self, direction: Direction) -> Result<StoreIter<'_, HistoryTx>, StoreError>;

    /// Most recent first; with a token, only transactions where that token
    /// is attached to any input or output.
    fn history_iter(&self, token: Option<TokenUid>) -> Result<StoreIter<'_, HistoryTx>, StoreError> {
        let iter = self.history_range(Direction::Reverse)?;
        Ok(match token {
            None => iter,
            Some(token) => Box::new(iter.filter(move |item| match item {
                Ok(tx) => tx.touches_token(&token),
                Err(_) => true,
            })),
        })
    }

    fn history_count(&self) -> Result<u64, StoreError>;

    /// Recreate missing time-ordered entries; fail on conflicting ones.
    fn validate(&self) -> Result<HistoryValidation, StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}
