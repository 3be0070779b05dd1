//! LMDB implementation of UtxoStore.
//!
//! - `utxos_db`: `tx_id(32) ++ index_be(4)` → bincode `Utxo`.
//! - `utxo_token_db`: encoded [`TokenUtxoKey`] → `UtxoId`.
//! - `utxo_token_address_db`: encoded [`TokenAddressUtxoKey`] → `UtxoId`.
//! - `locked_utxos_db`: `UtxoId` → bincode `LockedUtxo`.
//!
//! The primary record and both secondary entries are written in one write
//! transaction.

use std::sync::Arc;

use heed::{Env, RoTxn, RwTxn};

use walletdb_store::{
    Direction, IndexKey, KeyRange, StoreError, StoreIter, TokenAddressUtxoKey, TokenUtxoKey,
    UtxoRangeQuery, UtxoStore, UtxoValidation,
};
use walletdb_types::{LockedUtxo, Utxo, UtxoId};

use crate::cursor::{decode, encode, scan, scan_values, Table};
use crate::LmdbError;

pub struct LmdbUtxoStore {
    pub(crate) env: Arc<Env>,
    pub(crate) utxos_db: Table,
    pub(crate) utxo_token_db: Table,
    pub(crate) utxo_token_address_db: Table,
    pub(crate) locked_utxos_db: Table,
}

/// Primary record behind a secondary entry, if the entry is still current.
fn resolve_secondary(
    utxos_db: &Table,
    rtxn: &RoTxn,
    key: &[u8],
    id: &[u8],
    current_key: impl Fn(&Utxo) -> Vec<u8>,
) -> Result<Option<Utxo>, StoreError> {
    let Some(bytes) = utxos_db.get(rtxn, id).map_err(LmdbError::from)? else {
        return Ok(None);
    };
    let utxo: Utxo = decode(bytes)?;
    Ok((current_key(&utxo) == key).then_some(utxo))
}

impl LmdbUtxoStore {
    fn remove_with_secondaries(&self, wtxn: &mut RwTxn, id_key: &[u8]) -> Result<Option<Utxo>, StoreError> {
        let previous: Option<Utxo> = match self.utxos_db.get(wtxn, id_key).map_err(LmdbError::from)? {
            Some(bytes) => Some(decode(bytes)?),
            None => None,
        };
        if let Some(old) = &previous {
            self.utxo_token_db
                .delete(wtxn, &TokenUtxoKey::for_utxo(old).encode())
                .map_err(LmdbError::from)?;
            self.utxo_token_address_db
                .delete(wtxn, &TokenAddressUtxoKey::for_utxo(old).encode())
                .map_err(LmdbError::from)?;
            self.utxos_db.delete(wtxn, id_key).map_err(LmdbError::from)?;
        }
        Ok(previous)
    }
}

impl UtxoStore for LmdbUtxoStore {
    fn save_utxo(&self, utxo: &Utxo) -> Result<(), StoreError> {
        if !utxo.token.is_valid() || !utxo.address.is_valid() {
            return Err(StoreError::InvalidQuery(format!(
                "utxo {} has an unindexable token or address",
                utxo.id()
            )));
        }
        let id_key = utxo.id().encode();
        let bytes = encode(utxo)?;

        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.remove_with_secondaries(&mut wtxn, &id_key)?;
        self.utxos_db
            .put(&mut wtxn, &id_key, &bytes)
            .map_err(LmdbError::from)?;
        self.utxo_token_db
            .put(&mut wtxn, &TokenUtxoKey::for_utxo(utxo).encode(), &id_key)
            .map_err(LmdbError::from)?;
        self.utxo_token_address_db
            .put(&mut wtxn, &TokenAddressUtxoKey::for_utxo(utxo).encode(), &id_key)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_utxo(&self, id: &UtxoId) -> Result<Option<Utxo>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.utxos_db.get(&rtxn, &id.encode()).map_err(LmdbError::from)? {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn delete_utxo(&self, id: &UtxoId) -> Result<Option<Utxo>, StoreError> {
        let id_key = id.encode();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let removed = self.remove_with_secondaries(&mut wtxn, &id_key)?;
        self.locked_utxos_db
            .delete(&mut wtxn, &id_key)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(removed)
    }

    fn utxo_iter(&self) -> Result<StoreIter<'_, Utxo>, StoreError> {
        Ok(scan_values(&self.env, self.utxos_db))
    }

    fn utxo_range(&self, query: &UtxoRangeQuery) -> Result<StoreIter<'_, Utxo>, StoreError> {
        let utxos_db = self.utxos_db;
        Ok(match &query.address {
            None => {
                let range = KeyRange::inclusive(
                    TokenUtxoKey::lower(query.kind, &query.token, query.min_value).encode(),
                    TokenUtxoKey::upper(query.kind, &query.token, query.max_value).encode(),
                    query.direction,
                );
                scan(&self.env, self.utxo_token_db, range, move |rtxn, key, id| {
                    resolve_secondary(&utxos_db, rtxn, key, id, |u| TokenUtxoKey::for_utxo(u).encode())
                })
            }
            Some(address) => {
                let range = KeyRange::inclusive(
                    TokenAddressUtxoKey::lower(query.kind, &query.token, address, query.min_value).encode(),
                    TokenAddressUtxoKey::upper(query.kind, &query.token, address, query.max_value).encode(),
                    query.direction,
                );
                scan(&self.env, self.utxo_token_address_db, range, move |rtxn, key, id| {
                    resolve_secondary(&utxos_db, rtxn, key, id, |u| {
                        TokenAddressUtxoKey::for_utxo(u).encode()
                    })
                })
            }
        })
    }

    fn utxo_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.utxos_db.len(&rtxn).map_err(LmdbError::from)?)
    }

    fn save_locked_utxo(&self, locked: &LockedUtxo) -> Result<(), StoreError> {
        let bytes = encode(locked)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.locked_utxos_db
            .put(&mut wtxn, &locked.id().encode(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_locked_utxo(&self, id: &UtxoId) -> Result<Option<LockedUtxo>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.locked_utxos_db.get(&rtxn, &id.encode()).map_err(LmdbError::from)? {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn locked_utxo_iter(&self) -> Result<StoreIter<'_, LockedUtxo>, StoreError> {
        Ok(scan_values(&self.env, self.locked_utxos_db))
    }

    fn unlock_utxo(&self, id: &UtxoId) -> Result<bool, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let existed = self
            .locked_utxos_db
            .delete(&mut wtxn, &id.encode())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(existed)
    }

    fn validate(&self) -> Result<UtxoValidation, StoreError> {
        for (table, name) in [
            (self.utxo_token_db, "token"),
            (self.utxo_token_address_db, "token/address"),
        ] {
            let mismatched = scan(&self.env, table, KeyRange::all(Direction::Forward), move |_, key, id| {
                // Both key layouts end with the 36-byte utxo id.
                let embedded = key.len().checked_sub(36).map(|start| &key[start..]);
                Ok((embedded != Some(id)).then(|| key.to_vec()))
            });
            if let Some(key) = mismatched.take(1).next() {
                let key = key?;
                return Err(StoreError::InconsistentDatabase(format!(
                    "{name} index entry {} does not point at its own utxo",
                    key.iter().map(|b| format!("{b:02x}")).collect::<String>()
                )));
            }
        }

        let mut report = UtxoValidation::default();
        let mut missing: Vec<(Vec<u8>, Vec<u8>, Table, UtxoId)> = Vec::new();
        let token_db = self.utxo_token_db;
        let address_db = self.utxo_token_address_db;
        let entries = scan(
            &self.env,
            self.utxos_db,
            KeyRange::all(Direction::Forward),
            move |rtxn, id_key, bytes| {
                let utxo: Utxo = decode(bytes)?;
                let token_key = TokenUtxoKey::for_utxo(&utxo).encode();
                let address_key = TokenAddressUtxoKey::for_utxo(&utxo).encode();
                let has_token = token_db.get(rtxn, &token_key).map_err(LmdbError::from)?.is_some();
                let has_address = address_db.get(rtxn, &address_key).map_err(LmdbError::from)?.is_some();
                Ok(Some((id_key.to_vec(), utxo.id(), (!has_token).then_some(token_key), (!has_address).then_some(address_key))))
            },
        );
        for entry in entries {
            let (id_key, id, token_key, address_key) = entry?;
            if let Some(key) = token_key {
                missing.push((key, id_key.clone(), token_db, id));
            }
            if let Some(key) = address_key {
                missing.push((key, id_key, address_db, id));
            }
            report.count += 1;
        }

        if !missing.is_empty() {
            let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
            for (key, id_key, table, id) in &missing {
                tracing::warn!(utxo = %id, "repairing missing utxo index entry");
                table.put(&mut wtxn, key, id_key).map_err(LmdbError::from)?;
            }
            wtxn.commit().map_err(LmdbError::from)?;
            report.repaired = missing.len() as u64;
        }
        Ok(report)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.utxos_db.clear(&mut wtxn).map_err(LmdbError::from)?;
        self.utxo_token_db.clear(&mut wtxn).map_err(LmdbError::from)?;
        self.utxo_token_address_db.clear(&mut wtxn).map_err(LmdbError::from)?;
        self.locked_utxos_db.clear(&mut wtxn).map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
