//! LMDB implementation of AddressStore.
//!
//! - `addresses_db`: address bytes → bincode `AddressInfo`.
//! - `address_index_db`: `index_be(4)` → address bytes.
//! - `address_meta_db`: address bytes → bincode `AddressMetadata`.

use std::sync::Arc;

use heed::Env;

use walletdb_store::{
    AddressStore, AddressValidation, Direction, IndexKey, KeyRange, StoreError, StoreIter,
};
use walletdb_types::{Address, AddressInfo, AddressMetadata};

use crate::cursor::{decode, encode, scan, Table};
use crate::LmdbError;

pub struct LmdbAddressStore {
    pub(crate) env: Arc<Env>,
    pub(crate) addresses_db: Table,
    pub(crate) address_index_db: Table,
    pub(crate) address_meta_db: Table,
}

impl AddressStore for LmdbAddressStore {
    fn save_address(&self, info: &AddressInfo) -> Result<(), StoreError> {
        if !info.base58.is_valid() {
            return Err(StoreError::DuplicateRecord(format!(
                "address {:?} is empty or malformed",
                info.base58.as_str()
            )));
        }
        let key = info.base58.encode();
        let index_key = info.bip32_index.encode();
        let bytes = encode(info)?;

        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self.addresses_db.get(&wtxn, &key).map_err(LmdbError::from)?.is_some() {
            return Err(StoreError::DuplicateRecord(format!("address {}", info.base58)));
        }
        if let Some(other) = self.address_index_db.get(&wtxn, &index_key).map_err(LmdbError::from)? {
            return Err(StoreError::DuplicateRecord(format!(
                "derivation index {} already holds {}",
                info.bip32_index,
                String::from_utf8_lossy(other)
            )));
        }
        self.addresses_db
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbError::from)?;
        self.address_index_db
            .put(&mut wtxn, &index_key, &key)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_address(&self, address: &Address) -> Result<Option<AddressInfo>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.addresses_db.get(&rtxn, &address.encode()).map_err(LmdbError::from)? {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn get_address_at_index(&self, index: u32) -> Result<Option<AddressInfo>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let Some(address) = self
            .address_index_db
            .get(&rtxn, &index.encode())
            .map_err(LmdbError::from)?
        else {
            return Ok(None);
        };
        match self.addresses_db.get(&rtxn, address).map_err(LmdbError::from)? {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn address_iter(&self) -> Result<StoreIter<'_, AddressInfo>, StoreError> {
        let addresses_db = self.addresses_db;
        Ok(scan(
            &self.env,
            self.address_index_db,
            KeyRange::all(Direction::Forward),
            move |rtxn, _, address| match addresses_db.get(rtxn, address).map_err(LmdbError::from)? {
                Some(bytes) => Ok(Some(decode(bytes)?)),
                None => Ok(None),
            },
        ))
    }

    fn address_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.addresses_db.len(&rtxn).map_err(LmdbError::from)?)
    }

    fn get_address_meta(&self, address: &Address) -> Result<Option<AddressMetadata>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.address_meta_db.get(&rtxn, &address.encode()).map_err(LmdbError::from)? {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn edit_address_meta(&self, address: &Address, meta: &AddressMetadata) -> Result<(), StoreError> {
        let bytes = encode(meta)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.address_meta_db
            .put(&mut wtxn, &address.encode(), &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn clear_address_meta(&self) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.address_meta_db.clear(&mut wtxn).map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn validate(&self) -> Result<AddressValidation, StoreError> {
        let mut report = AddressValidation::default();
        let mut missing = Vec::new();
        let address_index_db = self.address_index_db;
        let entries = scan(
            &self.env,
            self.addresses_db,
            KeyRange::all(Direction::Forward),
            move |rtxn, _, bytes| {
                let info: AddressInfo = decode(bytes)?;
                let indexed = address_index_db
                    .get(rtxn, &info.bip32_index.encode())
                    .map_err(LmdbError::from)?
                    .map(<[u8]>::to_vec);
                Ok(Some((info, indexed)))
            },
        );
        for entry in entries {
            let (info, indexed) = entry?;
            match indexed {
                None => missing.push(info.clone()),
                Some(address) if address != info.base58.as_str().as_bytes() => {
                    return Err(StoreError::InconsistentDatabase(format!(
                        "derivation index {} maps to {} but {} claims it",
                        info.bip32_index,
                        String::from_utf8_lossy(&address),
                        info.base58
                    )));
                }
                Some(_) => {}
            }
            report.first_index =
                Some(report.first_index.map_or(info.bip32_index, |i| i.min(info.bip32_index)));
            report.last_index =
                Some(report.last_index.map_or(info.bip32_index, |i| i.max(info.bip32_index)));
            report.count += 1;
        }

        if !missing.is_empty() {
            let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
            for info in &missing {
                tracing::warn!(index = info.bip32_index, address = %info.base58, "repairing missing address index entry");
                self.address_index_db
                    .put(&mut wtxn, &info.bip32_index.encode(), &info.base58.encode())
                    .map_err(LmdbError::from)?;
            }
            wtxn.commit().map_err(LmdbError::from)?;
            report.repaired = missing.len() as u64;
        }
        Ok(report)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.addresses_db.clear(&mut wtxn).map_err(LmdbError::from)?;
        self.address_index_db.clear(&mut wtxn).map_err(LmdbError::from)?;
        self.address_meta_db.clear(&mut wtxn).map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
