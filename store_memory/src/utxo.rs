use std::collections::BTreeMap;
use std::sync::Mutex;

use walletdb_store::{
    Direction, KeyRange, PagedCursor, StoreError, StoreIter, TokenAddressUtxoKey, TokenUtxoKey,
    UtxoRangeQuery, UtxoStore, UtxoValidation,
};
use walletdb_types::{LockedUtxo, Utxo, UtxoId};

use crate::{lock, page};

#[derive(Default)]
struct UtxoTables {
    utxos: BTreeMap<UtxoId, Utxo>,
    by_token: BTreeMap<TokenUtxoKey, UtxoId>,
    by_token_address: BTreeMap<TokenAddressUtxoKey, UtxoId>,
    locked: BTreeMap<UtxoId, LockedUtxo>,
}

impl UtxoTables {
    fn remove_secondaries(&mut self, utxo: &Utxo) {
        self.by_token.remove(&TokenUtxoKey::for_utxo(utxo));
        self.by_token_address.remove(&TokenAddressUtxoKey::for_utxo(utxo));
    }

    /// Primary record behind a secondary entry, if the entry is still current.
    fn resolve(&self, id: &UtxoId, current: impl Fn(&Utxo) -> bool) -> Option<Utxo> {
        self.utxos.get(id).filter(|u| current(u)).cloned()
    }
}

#[derive(Default)]
pub struct MemoryUtxoStore {
    tables: Mutex<UtxoTables>,
}

impl UtxoStore for MemoryUtxoStore {
    fn save_utxo(&self, utxo: &Utxo) -> Result<(), StoreError> {
        if !utxo.token.is_valid() || !utxo.address.is_valid() {
            return Err(StoreError::InvalidQuery(format!(
                "utxo {} has an unindexable token or address",
                utxo.id()
            )));
        }
        let mut tables = lock(&self.tables)?;
        let id = utxo.id();
        if let Some(old) = tables.utxos.insert(id, utxo.clone()) {
            tables.remove_secondaries(&old);
        }
        tables.by_token.insert(TokenUtxoKey::for_utxo(utxo), id);
        tables.by_token_address.insert(TokenAddressUtxoKey::for_utxo(utxo), id);
        Ok(())
    }

    fn get_utxo(&self, id: &UtxoId) -> Result<Option<Utxo>, StoreError> {
        Ok(lock(&self.tables)?.utxos.get(id).cloned())
    }

    fn delete_utxo(&self, id: &UtxoId) -> Result<Option<Utxo>, StoreError> {
        let mut tables = lock(&self.tables)?;
        let removed = tables.utxos.remove(id);
        if let Some(utxo) = &removed {
            tables.remove_secondaries(utxo);
        }
        tables.locked.remove(id);
        Ok(removed)
    }

    fn utxo_iter(&self) -> Result<StoreIter<'_, Utxo>, StoreError> {
        let cursor = PagedCursor::new(
            KeyRange::all(Direction::Forward),
            move |range: &KeyRange<UtxoId>, limit| {
                let tables = lock(&self.tables)?;
                Ok(page(&tables.utxos, range, limit, |_, utxo| Some(utxo.clone())))
            },
        );
        Ok(Box::new(cursor.filter_map(Result::transpose)))
    }

    fn utxo_range(&self, query: &UtxoRangeQuery) -> Result<StoreIter<'_, Utxo>, StoreError> {
        match &query.address {
            None => {
                let range = KeyRange::inclusive(
                    TokenUtxoKey::lower(query.kind, &query.token, query.min_value),
                    TokenUtxoKey::upper(query.kind, &query.token, query.max_value),
                    query.direction,
                );
                let cursor = PagedCursor::new(range, move |range: &KeyRange<TokenUtxoKey>, limit| {
                    let tables = lock(&self.tables)?;
                    Ok(page(&tables.by_token, range, limit, |key, id| {
                        tables.resolve(id, |u| TokenUtxoKey::for_utxo(u) == *key)
                    }))
                });
                Ok(Box::new(cursor.filter_map(Result::transpose)))
            }
            Some(address) => {
                let range = KeyRange::inclusive(
                    TokenAddressUtxoKey::lower(query.kind, &query.token, address, query.min_value),
                    TokenAddressUtxoKey::upper(query.kind, &query.token, address, query.max_value),
                    query.direction,
                );
                let cursor = PagedCursor::new(
                    range,
                    move |range: &KeyRange<TokenAddressUtxoKey>, limit| {
                        let tables = lock(&self.tables)?;
                        Ok(page(&tables.by_token_address, range, limit, |key, id| {
                            tables.resolve(id, |u| TokenAddressUtxoKey::for_utxo(u) == *key)
                        }))
                    },
                );
                Ok(Box::new(cursor.filter_map(Result::transpose)))
            }
        }
    }

    fn utxo_count(&self) -> Result<u64, StoreError> {
        Ok(lock(&self.tables)?.utxos.len() as u64)
    }

    fn save_locked_utxo(&self, locked: &LockedUtxo) -> Result<(), StoreError> {
        lock(&self.tables)?.locked.insert(locked.id(), locked.clone());
        Ok(())
    }

    fn get_locked_utxo(&self, id: &UtxoId) -> Result<Option<LockedUtxo>, StoreError> {
        Ok(lock(&self.tables)?.locked.get(id).cloned())
    }

    fn locked_utxo_iter(&self) -> Result<StoreIter<'_, LockedUtxo>, StoreError> {
        let cursor = PagedCursor::new(
            KeyRange::all(Direction::Forward),
            move |range: &KeyRange<UtxoId>, limit| {
                let tables = lock(&self.tables)?;
                Ok(page(&tables.locked, range, limit, |_, locked| Some(locked.clone())))
            },
        );
        Ok(Box::new(cursor.filter_map(Result::transpose)))
    }

    fn unlock_utxo(&self, id: &UtxoId) -> Result<bool, StoreError> {
        Ok(lock(&self.tables)?.locked.remove(id).is_some())
    }

    fn validate(&self) -> Result<UtxoValidation, StoreError> {
        let mut guard = lock(&self.tables)?;
        let tables = &mut *guard;
        let mut report = UtxoValidation::default();

        for (key, id) in &tables.by_token {
            if key.utxo_id() != *id {
                return Err(StoreError::InconsistentDatabase(format!(
                    "token index entry for {} points at {id}",
                    key.utxo_id()
                )));
            }
        }
        for (key, id) in &tables.by_token_address {
            if key.utxo_id() != *id {
                return Err(StoreError::InconsistentDatabase(format!(
                    "token/address index entry for {} points at {id}",
                    key.utxo_id()
                )));
            }
        }

        for (id, utxo) in &tables.utxos {
            let token_key = TokenUtxoKey::for_utxo(utxo);
            if !tables.by_token.contains_key(&token_key) {
                tracing::warn!(utxo = %id, "repairing missing token index entry");
                tables.by_token.insert(token_key, *id);
                report.repaired += 1;
            }
            let address_key = TokenAddressUtxoKey::for_utxo(utxo);
            if !tables.by_token_address.contains_key(&address_key) {
                tracing::warn!(utxo = %id, "repairing missing token/address index entry");
                tables.by_token_address.insert(address_key, *id);
                report.repaired += 1;
            }
            report.count += 1;
        }
        Ok(report)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables)?;
        tables.utxos.clear();
        tables.by_token.clear();
        tables.by_token_address.clear();
        tables.locked.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walletdb_store::{SelectOptions, SelectionContext, UtxoKind, ValueOrder};
    use walletdb_types::{
        Address, AuthorityFlags, HistoryTx, Timestamp, TokenUid, TxId, TxOutput, TxVersion,
    };

    fn utxo(n: u8, token: &str, address: &str, value: u64) -> Utxo {
        Utxo {
            tx_id: TxId::new([n; 32]),
            index: 0,
            token: TokenUid::new(token),
            address: Address::new(address),
            value,
            authorities: AuthorityFlags::NONE,
            timelock: None,
            height: None,
            version: TxVersion::Regular,
        }
    }

    fn values(iter: StoreIter<'_, Utxo>) -> Vec<u64> {
        iter.map(|r| r.unwrap().value).collect()
    }

    fn populated() -> MemoryUtxoStore {
        let store = MemoryUtxoStore::default();
        store.save_utxo(&utxo(1, "00", "W1", 30)).unwrap();
        store.save_utxo(&utxo(2, "00", "W2", 10)).unwrap();
        store.save_utxo(&utxo(3, "00", "W1", 20)).unwrap();
        store.save_utxo(&utxo(4, "cafe", "W1", 5)).unwrap();
        let mut mint = utxo(5, "00", "W1", 1);
        mint.authorities = AuthorityFlags::MINT;
        store.save_utxo(&mint).unwrap();
        store
    }

    #[test]
    fn range_scans_partition_by_kind_token_and_address() {
        let store = populated();
        let all = UtxoRangeQuery::token(TokenUid::native());
        assert_eq!(values(store.utxo_range(&all).unwrap()), vec![10, 20, 30]);

        let reversed = UtxoRangeQuery {
            direction: Direction::Reverse,
            ..all.clone()
        };
        assert_eq!(values(store.utxo_range(&reversed).unwrap()), vec![30, 20, 10]);

        let scoped = UtxoRangeQuery {
            address: Some(Address::new("W1")),
            ..all.clone()
        };
        assert_eq!(values(store.utxo_range(&scoped).unwrap()), vec![20, 30]);

        let bounded = UtxoRangeQuery {
            min_value: 15,
            max_value: 25,
            ..all.clone()
        };
        assert_eq!(values(store.utxo_range(&bounded).unwrap()), vec![20]);

        let authority = UtxoRangeQuery {
            kind: UtxoKind::Authority,
            ..all
        };
        assert_eq!(values(store.utxo_range(&authority).unwrap()), vec![1]);
    }

    #[test]
    fn resave_with_new_value_replaces_secondary_entries() {
        let store = populated();
        store.save_utxo(&utxo(2, "00", "W2", 40)).unwrap();
        let all = UtxoRangeQuery::token(TokenUid::native());
        assert_eq!(values(store.utxo_range(&all).unwrap()), vec![20, 30, 40]);
        assert_eq!(store.utxo_count().unwrap(), 5);
    }

    #[test]
    fn delete_removes_all_entries() {
        let store = populated();
        let id = UtxoId::new(TxId::new([3; 32]), 0);
        assert_eq!(store.delete_utxo(&id).unwrap().map(|u| u.value), Some(20));
        assert!(store.delete_utxo(&id).unwrap().is_none());
        let all = UtxoRangeQuery::token(TokenUid::native());
        assert_eq!(values(store.utxo_range(&all).unwrap()), vec![10, 30]);
        assert_eq!(store.validate().unwrap().repaired, 0);
    }

    #[test]
    fn selection_reads_through_index_order() {
        let store = populated();
        let picked: Vec<u64> = store
            .select_utxos(SelectOptions::for_token("00").target(25), SelectionContext::default())
            .unwrap()
            .map(|r| r.unwrap().value)
            .collect();
        assert_eq!(picked, vec![10, 20]);

        let mut largest_first = SelectOptions::for_token("00").target(25);
        largest_first.order = ValueOrder::Descending;
        let picked: Vec<u64> = store
            .select_utxos(largest_first, SelectionContext::default())
            .unwrap()
            .map(|r| r.unwrap().value)
            .collect();
        assert_eq!(picked, vec![30]);
    }

    #[test]
    fn locked_records_follow_their_utxo() {
        let store = MemoryUtxoStore::default();
        let mut tx = HistoryTx::new(TxId::new([8; 32]), Timestamp::new(1));
        let mut out = TxOutput::new(7, "00", "W1");
        out.timelock = Some(Timestamp::new(10_000));
        tx.outputs.push(out);
        let locked = LockedUtxo { tx: tx.clone(), index: 0 };
        let u = locked.utxo().unwrap();

        store.save_utxo(&u).unwrap();
        store.save_locked_utxo(&locked).unwrap();
        assert_eq!(store.locked_utxo_iter().unwrap().count(), 1);

        assert!(store.unlock_utxo(&u.id()).unwrap());
        assert!(!store.unlock_utxo(&u.id()).unwrap());

        store.save_locked_utxo(&locked).unwrap();
        store.delete_utxo(&u.id()).unwrap();
        assert!(store.get_locked_utxo(&u.id()).unwrap().is_none());
    }

    #[test]
    fn validate_repairs_missing_secondary_entries() {
        let store = populated();
        {
            let mut tables = lock(&store.tables).unwrap();
            let u = tables.utxos.get(&UtxoId::new(TxId::new([1; 32]), 0)).cloned().unwrap();
            tables.by_token.remove(&TokenUtxoKey::for_utxo(&u));
            tables.by_token_address.remove(&TokenAddressUtxoKey::for_utxo(&u));
        }
        let all = UtxoRangeQuery::token(TokenUid::native());
        assert_eq!(values(store.utxo_range(&all).unwrap()), vec![10, 20]);

        let report = store.validate().unwrap();
        assert_eq!((report.count, report.repaired), (5, 2));
        assert_eq!(values(store.utxo_range(&all).unwrap()), vec![10, 20, 30]);
    }

    #[test]
    fn validate_fails_on_mismatched_entry() {
        let store = populated();
        {
            let mut tables = lock(&store.tables).unwrap();
            let key = tables.by_token.keys().next().cloned().unwrap();
            tables.by_token.insert(key, UtxoId::new(TxId::new([99; 32]), 3));
        }
        assert!(matches!(store.validate(), Err(StoreError::InconsistentDatabase(_))));
    }
}
