//! LMDB implementation of HistoryStore.
//!
//! - `history_db`: `tx_id(32)` → bincode `HistoryTx`.
//! - `history_time_db`: `timestamp_be(8) ++ tx_id(32)` → `tx_id(32)`.
//!   Big-endian timestamps sort lexicographically by time.
//! - `meta_db["history_count"]`: `u64` big-endian, bumped on insert only.

use std::sync::Arc;

use heed::{Env, RoTxn};

use walletdb_store::{
    Direction, HistoryStore, HistoryTimeKey, HistoryValidation, IndexKey, KeyRange, StoreError,
    StoreIter,
};
use walletdb_types::{HistoryTx, TxId};

use crate::cursor::{decode, encode, scan, Table};
use crate::LmdbError;

const HISTORY_COUNT_KEY: &[u8] = b"history_count";

pub struct LmdbHistoryStore {
    pub(crate) env: Arc<Env>,
    pub(crate) history_db: Table,
    pub(crate) history_time_db: Table,
    pub(crate) meta_db: Table,
}

fn read_count(meta_db: &Table, txn: &RoTxn) -> Result<u64, LmdbError> {
    match meta_db.get(txn, HISTORY_COUNT_KEY)? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes
                .try_into()
                .map_err(|_| LmdbError::Serialization("history_count has unexpected byte length".into()))?;
            Ok(u64::from_be_bytes(arr))
        }
        None => Ok(0),
    }
}

impl HistoryStore for LmdbHistoryStore {
    fn save_tx(&self, tx: &HistoryTx) -> Result<bool, StoreError> {
        let id_key = tx.tx_id.encode();
        let bytes = encode(tx)?;

        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let previous: Option<HistoryTx> = match self.history_db.get(&wtxn, &id_key).map_err(LmdbError::from)? {
            Some(old) => Some(decode(old)?),
            None => None,
        };
        if let Some(old) = &previous {
            if old.timestamp != tx.timestamp {
                self.history_time_db
                    .delete(&mut wtxn, &HistoryTimeKey::new(old.timestamp, old.tx_id).encode())
                    .map_err(LmdbError::from)?;
            }
        }
        self.history_db
            .put(&mut wtxn, &id_key, &bytes)
            .map_err(LmdbError::from)?;
        self.history_time_db
            .put(&mut wtxn, &HistoryTimeKey::new(tx.timestamp, tx.tx_id).encode(), &id_key)
            .map_err(LmdbError::from)?;
        let inserted = previous.is_none();
        if inserted {
            let count = read_count(&self.meta_db, &wtxn)? + 1;
            self.meta_db
                .put(&mut wtxn, HISTORY_COUNT_KEY, &count.to_be_bytes())
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(inserted)
    }

    fn get_tx(&self, tx_id: &TxId) -> Result<Option<HistoryTx>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.history_db.get(&rtxn, tx_id.as_bytes()).map_err(LmdbError::from)? {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn history_range(&self, direction: Direction) -> Result<StoreIter<'_, HistoryTx>, StoreError> {
        let history_db = self.history_db;
        Ok(scan(
            &self.env,
            self.history_time_db,
            KeyRange::all(direction),
            move |rtxn, key, tx_id| {
                let Some(bytes) = history_db.get(rtxn, tx_id).map_err(LmdbError::from)? else {
                    return Ok(None);
                };
                let tx: HistoryTx = decode(bytes)?;
                // Entries left behind by a timestamp change are skipped.
                let time_key = HistoryTimeKey::decode(key)?;
                Ok((tx.timestamp == time_key.timestamp).then_some(tx))
            },
        ))
    }

    fn history_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(read_count(&self.meta_db, &rtxn)?)
    }

    fn validate(&self) -> Result<HistoryValidation, StoreError> {
        let mut report = HistoryValidation::default();
        let mut missing = Vec::new();
        let time_db = self.history_time_db;
        let entries = scan(
            &self.env,
            self.history_db,
            KeyRange::all(Direction::Forward),
            move |rtxn, id_key, bytes| {
                let tx: HistoryTx = decode(bytes)?;
                let time_key = HistoryTimeKey::new(tx.timestamp, tx.tx_id);
                let indexed = time_db
                    .get(rtxn, &time_key.encode())
                    .map_err(LmdbError::from)?
                    .map(<[u8]>::to_vec);
                Ok(Some((TxId::decode(id_key)?, time_key, indexed)))
            },
        );
        for entry in entries {
            let (tx_id, time_key, indexed) = entry?;
            match indexed {
                None => missing.push((tx_id, time_key)),
                Some(indexed) if indexed.as_slice() != tx_id.as_bytes() => {
                    return Err(StoreError::InconsistentDatabase(format!(
                        "time entry for {tx_id} points at {}",
                        TxId::decode(&indexed).map_or_else(|_| "garbage".to_string(), |id| id.to_string())
                    )));
                }
                Some(_) => {}
            }
            report.count += 1;
        }

        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        for (tx_id, time_key) in &missing {
            tracing::warn!(%tx_id, "repairing missing history time entry");
            self.history_time_db
                .put(&mut wtxn, &time_key.encode(), tx_id.as_bytes())
                .map_err(LmdbError::from)?;
        }
        self.meta_db
            .put(&mut wtxn, HISTORY_COUNT_KEY, &report.count.to_be_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        report.repaired = missing.len() as u64;
        Ok(report)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.history_db.clear(&mut wtxn).map_err(LmdbError::from)?;
        self.history_time_db.clear(&mut wtxn).map_err(LmdbError::from)?;
        self.meta_db
            .delete(&mut wtxn, HISTORY_COUNT_KEY)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;
    use walletdb_store::WalletStore;
    use walletdb_types::{Timestamp, TokenUid, TxOutput};

    fn open() -> (tempfile::TempDir, LmdbEnvironment) {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 30, 10 * 1024 * 1024).unwrap();
        (dir, env)
    }

    fn tx(n: u8, ts: u64) -> HistoryTx {
        HistoryTx::new(TxId::new([n; 32]), Timestamp::new(ts))
    }

    fn ids(iter: StoreIter<'_, HistoryTx>) -> Vec<u8> {
        iter.map(|r| r.unwrap().tx_id.as_bytes()[0]).collect()
    }

    #[test]
    fn newest_first_and_upsert_counts_once() {
        let (_dir, env) = open();
        let store = env.history_store();
        assert!(store.save_tx(&tx(1, 100)).unwrap());
        assert!(store.save_tx(&tx(2, 300)).unwrap());
        assert!(store.save_tx(&tx(3, 200)).unwrap());
        assert!(!store.save_tx(&tx(1, 400)).unwrap());

        assert_eq!(store.history_count().unwrap(), 3);
        assert_eq!(ids(store.history_iter(None).unwrap()), vec![1, 2, 3]);
        assert_eq!(ids(store.history_range(Direction::Forward).unwrap()), vec![3, 2, 1]);
    }

    #[test]
    fn paging_covers_long_histories() {
        let (_dir, env) = open();
        let store = env.history_store();
        for n in 0..150u8 {
            store.save_tx(&tx(n, u64::from(n) * 10)).unwrap();
        }
        let newest: Vec<u8> = ids(store.history_iter(None).unwrap());
        assert_eq!(newest.len(), 150);
        assert_eq!(newest.first(), Some(&149));
        assert_eq!(newest.last(), Some(&0));
    }

    #[test]
    fn token_filter() {
        let (_dir, env) = open();
        let store = env.history_store();
        let mut a = tx(1, 10);
        a.outputs.push(TxOutput::new(1, "cafe", "W1"));
        store.save_tx(&a).unwrap();
        store.save_tx(&tx(2, 20)).unwrap();
        assert_eq!(ids(store.history_iter(Some(TokenUid::new("cafe"))).unwrap()), vec![1]);
    }

    #[test]
    fn validate_repairs_and_recounts() {
        let (_dir, env) = open();
        let store = env.history_store();
        store.save_tx(&tx(1, 10)).unwrap();
        store.save_tx(&tx(2, 20)).unwrap();
        let mut wtxn = env.env().write_txn().unwrap();
        store
            .history_time_db
            .delete(&mut wtxn, &HistoryTimeKey::new(Timestamp::new(10), TxId::new([1; 32])).encode())
            .unwrap();
        store.meta_db.put(&mut wtxn, HISTORY_COUNT_KEY, &9u64.to_be_bytes()).unwrap();
        wtxn.commit().unwrap();

        let report = store.validate().unwrap();
        assert_eq!((report.count, report.repaired), (2, 1));
        assert_eq!(store.history_count().unwrap(), 2);
        assert_eq!(ids(store.history_iter(None).unwrap()), vec![2, 1]);
    }

    #[test]
    fn validate_fails_on_conflicting_entry() {
        let (_dir, env) = open();
        let store = env.history_store();
        store.save_tx(&tx(1, 10)).unwrap();
        let mut wtxn = env.env().write_txn().unwrap();
        store
            .history_time_db
            .put(
                &mut wtxn,
                &HistoryTimeKey::new(Timestamp::new(10), TxId::new([1; 32])).encode(),
                &[7u8; 32],
            )
            .unwrap();
        wtxn.commit().unwrap();
        assert!(matches!(store.validate(), Err(StoreError::InconsistentDatabase(_))));
    }
}
