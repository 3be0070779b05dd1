//! In-memory implementation of AddressStore.

use std::collections::BTreeMap;
use std::sync::Mutex;

use walletdb_store::{
    AddressStore, AddressValidation, Direction, KeyRange, PagedCursor, StoreError, StoreIter,
};
use walletdb_types::{Address, AddressInfo, AddressMetadata};

use crate::{lock, page};

#[derive(Default)]
struct AddressTables {
    by_address: BTreeMap<Address, AddressInfo>,
    by_index: BTreeMap<u32, Address>,
    meta: BTreeMap<Address, AddressMetadata>,
}

#[derive(Default)]
pub struct MemoryAddressStore {
    tables: Mutex<AddressTables>,
    /// Set by `validate`; kept in step with inserts afterwards.
    validated_count: Mutex<Option<u64>>,
}

impl AddressStore for MemoryAddressStore {
    fn save_address(&self, info: &AddressInfo) -> Result<(), StoreError> {
        if !info.base58.is_valid() {
            return Err(StoreError::DuplicateRecord(format!(
                "address {:?} is empty or malformed",
                info.base58.as_str()
            )));
        }
        let mut tables = lock(&self.tables)?;
        if tables.by_address.contains_key(&info.base58) {
            return Err(StoreError::DuplicateRecord(format!("address {}", info.base58)));
        }
        if let Some(other) = tables.by_index.get(&info.bip32_index) {
            return Err(StoreError::DuplicateRecord(format!(
                "derivation index {} already holds {}",
                info.bip32_index, other
            )));
        }
        tables.by_address.insert(info.base58.clone(), info.clone());
        tables.by_index.insert(info.bip32_index, info.base58.clone());
        drop(tables);

        if let Some(count) = lock(&self.validated_count)?.as_mut() {
            *count += 1;
        }
        Ok(())
    }

    fn get_address(&self, address: &Address) -> Result<Option<AddressInfo>, StoreError> {
        Ok(lock(&self.tables)?.by_address.get(address).cloned())
    }

    fn get_address_at_index(&self, index: u32) -> Result<Option<AddressInfo>, StoreError> {
        let tables = lock(&self.tables)?;
        Ok(tables
            .by_index
            .get(&index)
            .and_then(|address| tables.by_address.get(address))
            .cloned())
    }

    fn address_iter(&self) -> Result<StoreIter<'_, AddressInfo>, StoreError> {
        let cursor = PagedCursor::new(KeyRange::all(Direction::Forward), move |range: &KeyRange<u32>, limit| {
            let tables = lock(&self.tables)?;
            Ok(page(&tables.by_index, range, limit, |_, address| {
                tables.by_address.get(address).cloned()
            }))
        });
        Ok(Box::new(cursor.filter_map(Result::transpose)))
    }

    fn address_count(&self) -> Result<u64, StoreError> {
        if let Some(count) = *lock(&self.validated_count)? {
            return Ok(count);
        }
        let mut count = 0;
        for item in self.address_iter()? {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_address_meta(&self, address: &Address) -> Result<Option<AddressMetadata>, StoreError> {
        Ok(lock(&self.tables)?.meta.get(address).cloned())
    }

    fn edit_address_meta(&self, address: &Address, meta: &AddressMetadata) -> Result<(), StoreError> {
        lock(&self.tables)?.meta.insert(address.clone(), meta.clone());
        Ok(())
    }

    fn clear_address_meta(&self) -> Result<(), StoreError> {
        lock(&self.tables)?.meta.clear();
        Ok(())
    }

    fn validate(&self) -> Result<AddressValidation, StoreError> {
        let mut guard = lock(&self.tables)?;
        let tables = &mut *guard;
        let mut report = AddressValidation::default();

        for (address, info) in &tables.by_address {
            match tables.by_index.get(&info.bip32_index) {
                None => {
                    tracing::warn!(index = info.bip32_index, %address, "repairing missing address index entry");
                    tables.by_index.insert(info.bip32_index, address.clone());
                    report.repaired += 1;
                }
                Some(indexed) if indexed != address => {
                    return Err(StoreError::InconsistentDatabase(format!(
                        "derivation index {} maps to {} but {} claims it",
                        info.bip32_index, indexed, address
                    )));
                }
                Some(_) => {}
            }
            report.first_index = Some(report.first_index.map_or(info.bip32_index, |i| i.min(info.bip32_index)));
            report.last_index = Some(report.last_index.map_or(info.bip32_index, |i| i.max(info.bip32_index)));
            report.count += 1;
        }
        drop(guard);

        *lock(&self.validated_count)? = Some(report.count);
        Ok(report)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables)?;
        tables.by_address.clear();
        tables.by_index.clear();
        tables.meta.clear();
        drop(tables);
        if let Some(count) = lock(&self.validated_count)?.as_mut() {
            *count = 0;
        }
        Ok(())
    }
}
