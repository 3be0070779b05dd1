use std::collections::HashMap;
use std::sync::Mutex;

use walletdb_store::{StoreError, WalletDataStore};
use walletdb_types::{AccessData, WalletCounters};

use crate::lock;

#[derive(Default)]
struct WalletTables {
    counters: WalletCounters,
    access: Option<AccessData>,
    items: HashMap<String, serde_json::Value>,
}

#[derive(Default)]
pub struct MemoryWalletStore {
    tables: Mutex<WalletTables>,
}

impl WalletDataStore for MemoryWalletStore {
    fn get_counters(&self) -> Result<WalletCounters, StoreError> {
        Ok(lock(&self.tables)?.counters.clone())
    }

    fn set_counters(&self, counters: &WalletCounters) -> Result<(), StoreError> {
        lock(&self.tables)?.counters = counters.clone();
        Ok(())
    }

    fn get_access_data(&self) -> Result<Option<AccessData>, StoreError> {
        Ok(lock(&self.tables)?.access.clone())
    }

    fn save_access_data(&self, data: &AccessData) -> Result<(), StoreError> {
        lock(&self.tables)?.access = Some(data.clone());
        Ok(())
    }

    fn clean_access_data(&self) -> Result<(), StoreError> {
        lock(&self.tables)?.access = None;
        Ok(())
    }

    fn get_item(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(lock(&self.tables)?.items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        lock(&self.tables)?.items.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn delete_item(&self, key: &str) -> Result<(), StoreError> {
        lock(&self.tables)?.items.remove(key);
        Ok(())
    }
}
