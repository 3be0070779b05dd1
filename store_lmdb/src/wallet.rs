//! LMDB implementation of WalletDataStore.
//!
//! All records share `wallet_db`: `counters` and `access_data` hold bincode
//! values, free-form items live under `item:<key>` as JSON.

use std::sync::Arc;

use heed::Env;

use walletdb_store::{StoreError, WalletDataStore};
use walletdb_types::{AccessData, WalletCounters};

use crate::cursor::{decode, encode, Table};
use crate::LmdbError;

const COUNTERS_KEY: &[u8] = b"counters";
const ACCESS_DATA_KEY: &[u8] = b"access_data";

pub struct LmdbWalletStore {
    pub(crate) env: Arc<Env>,
    pub(crate) wallet_db: Table,
}

fn item_key(key: &str) -> Vec<u8> {
    let mut k = b"item:".to_vec();
    k.extend_from_slice(key.as_bytes());
    k
}

impl LmdbWalletStore {
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self
            .wallet_db
            .get(&rtxn, key)
            .map_err(LmdbError::from)?
            .map(<[u8]>::to_vec))
    }

    fn put_raw(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.wallet_db.put(&mut wtxn, key, value).map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn delete_raw(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.wallet_db.delete(&mut wtxn, key).map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

impl WalletDataStore for LmdbWalletStore {
    fn get_counters(&self) -> Result<WalletCounters, StoreError> {
        match self.get_raw(COUNTERS_KEY)? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Ok(WalletCounters::default()),
        }
    }

    fn set_counters(&self, counters: &WalletCounters) -> Result<(), StoreError> {
        self.put_raw(COUNTERS_KEY, &encode(counters)?)
    }

    fn get_access_data(&self) -> Result<Option<AccessData>, StoreError> {
        match self.get_raw(ACCESS_DATA_KEY)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_access_data(&self, data: &AccessData) -> Result<(), StoreError> {
        self.put_raw(ACCESS_DATA_KEY, &encode(data)?)
    }

    fn clean_access_data(&self) -> Result<(), StoreError> {
        self.delete_raw(ACCESS_DATA_KEY)
    }

    fn get_item(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        match self.get_raw(&item_key(key))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(LmdbError::from)?)),
            None => Ok(None),
        }
    }

    fn set_item(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(LmdbError::from)?;
        self.put_raw(&item_key(key), &bytes)
    }

    fn delete_item(&self, key: &str) -> Result<(), StoreError> {
        self.delete_raw(&item_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;
    use walletdb_store::WalletStore;
    use walletdb_types::ScanningPolicy;

    #[test]
    fn counters_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let env = LmdbEnvironment::open(dir.path(), 30, 10 * 1024 * 1024).unwrap();
            let store = env.wallet_store();
            store.set_last_loaded_address_index(40).unwrap();
            store.set_best_block_height(1234).unwrap();
            store
                .set_scanning_policy(ScanningPolicy::IndexLimit { start: 0, end: 40 })
                .unwrap();
            store.save_access_data(&AccessData::read_only("xpub6")).unwrap();
            store.set_item("network", &serde_json::json!("testnet")).unwrap();
        }
        let env = LmdbEnvironment::open(dir.path(), 30, 10 * 1024 * 1024).unwrap();
        let store = env.wallet_store();
        let counters = store.get_counters().unwrap();
        assert_eq!(counters.last_loaded_address_index, 40);
        assert_eq!(counters.best_block_height, 1234);
        assert_eq!(counters.scanning_policy, ScanningPolicy::IndexLimit { start: 0, end: 40 });
        assert_eq!(store.get_access_data().unwrap().unwrap().xpubkey, "xpub6");
        assert_eq!(store.get_item("network").unwrap(), Some(serde_json::json!("testnet")));
    }

    #[test]
    fn defaults_on_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 30, 10 * 1024 * 1024).unwrap();
        let store = env.wallet_store();
        assert_eq!(store.get_counters().unwrap(), WalletCounters::default());
        assert!(store.get_access_data().unwrap().is_none());
        store.delete_item("missing").unwrap();
    }
}
