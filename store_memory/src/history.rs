use std::collections::BTreeMap;
use std::sync::Mutex;

use walletdb_store::{
    Direction, HistoryStore, HistoryTimeKey, HistoryValidation, KeyRange, PagedCursor, StoreError,
    StoreIter,
};
use walletdb_types::{HistoryTx, TxId};

use crate::{lock, page};

#[derive(Default)]
struct HistoryTables {
    by_id: BTreeMap<TxId, HistoryTx>,
    by_time: BTreeMap<HistoryTimeKey, TxId>,
    count: u64,
}

#[derive(Default)]
pub struct MemoryHistoryStore {
    tables: Mutex<HistoryTables>,
}

impl HistoryStore for MemoryHistoryStore {
    fn save_tx(&self, tx: &HistoryTx) -> Result<bool, StoreError> {
        let mut tables = lock(&self.tables)?;
        let previous = tables.by_id.insert(tx.tx_id, tx.clone());
        let inserted = match previous {
            Some(old) => {
                if old.timestamp != tx.timestamp {
                    tables.by_time.remove(&HistoryTimeKey::new(old.timestamp, old.tx_id));
                }
                false
            }
            None => {
                tables.count += 1;
                true
            }
        };
        tables.by_time.insert(HistoryTimeKey::new(tx.timestamp, tx.tx_id), tx.tx_id);
        Ok(inserted)
    }

    fn get_tx(&self, tx_id: &TxId) -> Result<Option<HistoryTx>, StoreError> {
        Ok(lock(&self.tables)?.by_id.get(tx_id).cloned())
    }

    fn history_range(&self, direction: Direction) -> Result<StoreIter<'_, HistoryTx>, StoreError> {
        let cursor = PagedCursor::new(
            KeyRange::all(direction),
            move |range: &KeyRange<HistoryTimeKey>, limit| {
                let tables = lock(&self.tables)?;
                Ok(page(&tables.by_time, range, limit, |key, tx_id| {
                    // Entries left behind by a timestamp change are skipped.
                    tables
                        .by_id
                        .get(tx_id)
                        .filter(|tx| tx.timestamp == key.timestamp)
                        .cloned()
                }))
            },
        );
        Ok(Box::new(cursor.filter_map(Result::transpose)))
    }

    fn history_count(&self) -> Result<u64, StoreError> {
        Ok(lock(&self.tables)?.count)
    }

    fn validate(&self) -> Result<HistoryValidation, StoreError> {
        let mut guard = lock(&self.tables)?;
        let tables = &mut *guard;
        let mut report = HistoryValidation::default();

        for (tx_id, tx) in &tables.by_id {
            let key = HistoryTimeKey::new(tx.timestamp, *tx_id);
            match tables.by_time.get(&key) {
                None => {
                    tracing::warn!(%tx_id, "repairing missing history time entry");
                    tables.by_time.insert(key, *tx_id);
                    report.repaired += 1;
                }
                Some(indexed) if indexed != tx_id => {
                    return Err(StoreError::InconsistentDatabase(format!(
                        "time entry for {tx_id} points at {indexed}"
                    )));
                }
                Some(_) => {}
            }
            report.count += 1;
        }
        tables.count = report.count;
        Ok(report)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables)?;
        tables.by_id.clear();
        tables.by_time.clear();
        tables.count = 0;
        Ok(())
    }
}
