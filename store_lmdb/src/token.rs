//! LMDB implementation of TokenStore.

use std::sync::Arc;

use heed::{Env, RoTxn};

use walletdb_store::{Direction, IndexKey, KeyRange, StoreError, StoreIter, TokenStore};
use walletdb_types::{ContractRecord, TokenInfo, TokenMetadata, TokenUid, TokenView};

use crate::cursor::{decode, encode, scan, scan_values, Table};
use crate::LmdbError;

pub struct LmdbTokenStore {
    pub(crate) env: Arc<Env>,
    pub(crate) tokens_db: Table,
    pub(crate) token_meta_db: Table,
    pub(crate) registered_tokens_db: Table,
    pub(crate) contracts_db: Table,
}

fn view(meta_db: &Table, rtxn: &RoTxn, info_bytes: &[u8]) -> Result<TokenView, StoreError> {
    let info: TokenInfo = decode(info_bytes)?;
    let metadata = match meta_db.get(rtxn, &info.uid.encode()).map_err(LmdbError::from)? {
        Some(bytes) => decode(bytes)?,
        None => TokenMetadata::default(),
    };
    Ok(TokenView { info, metadata })
}

impl LmdbTokenStore {
    fn views(&self, table: Table) -> StoreIter<'_, TokenView> {
        let meta_db = self.token_meta_db;
        scan(&self.env, table, KeyRange::all(Direction::Forward), move |rtxn, _, bytes| {
            Ok(Some(view(&meta_db, rtxn, bytes)?))
        })
    }

    fn put(&self, table: &Table, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        table.put(&mut wtxn, key, value).map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn delete(&self, table: &Table, key: &[u8]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        table.delete(&mut wtxn, key).map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn clear_tables(&self, tables: &[Table]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        for table in tables {
            table.clear(&mut wtxn).map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

impl TokenStore for LmdbTokenStore {
    fn save_token(&self, info: &TokenInfo) -> Result<(), StoreError> {
        let key = info.uid.encode();
        let bytes = encode(info)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self.tokens_db.get(&wtxn, &key).map_err(LmdbError::from)?.is_some() {
            return Err(StoreError::DuplicateRecord(format!("token {}", info.uid)));
        }
        self.tokens_db
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_token(&self, uid: &TokenUid) -> Result<Option<TokenView>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.tokens_db.get(&rtxn, &uid.encode()).map_err(LmdbError::from)? {
            Some(bytes) => Ok(Some(view(&self.token_meta_db, &rtxn, bytes)?)),
            None => Ok(None),
        }
    }

    fn token_iter(&self) -> Result<StoreIter<'_, TokenView>, StoreError> {
        Ok(self.views(self.tokens_db))
    }

    fn delete_tokens(&self, uids: &[TokenUid]) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        for uid in uids {
            let key = uid.encode();
            self.tokens_db.delete(&mut wtxn, &key).map_err(LmdbError::from)?;
            self.token_meta_db.delete(&mut wtxn, &key).map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_token_meta(&self, uid: &TokenUid) -> Result<Option<TokenMetadata>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.token_meta_db.get(&rtxn, &uid.encode()).map_err(LmdbError::from)? {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn edit_token_meta(&self, uid: &TokenUid, meta: &TokenMetadata) -> Result<(), StoreError> {
        self.put(&self.token_meta_db, &uid.encode(), &encode(meta)?)
    }

    fn clear_token_meta(&self) -> Result<(), StoreError> {
        self.clear_tables(&[self.token_meta_db])
    }

    fn register_token(&self, info: &TokenInfo) -> Result<(), StoreError> {
        self.put(&self.registered_tokens_db, &info.uid.encode(), &encode(info)?)
    }

    fn unregister_token(&self, uid: &TokenUid) -> Result<(), StoreError> {
        self.delete(&self.registered_tokens_db, &uid.encode())
    }

    fn is_token_registered(&self, uid: &TokenUid) -> Result<bool, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self
            .registered_tokens_db
            .get(&rtxn, &uid.encode())
            .map_err(LmdbError::from)?
            .is_some())
    }

    fn registered_token_iter(&self) -> Result<StoreIter<'_, TokenView>, StoreError> {
        Ok(self.views(self.registered_tokens_db))
    }

    fn register_contract(&self, contract: &ContractRecord) -> Result<(), StoreError> {
        self.put(&self.contracts_db, contract.contract_id.as_bytes(), &encode(contract)?)
    }

    fn unregister_contract(&self, contract_id: &str) -> Result<(), StoreError> {
        self.delete(&self.contracts_db, contract_id.as_bytes())
    }

    fn get_contract(&self, contract_id: &str) -> Result<Option<ContractRecord>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        match self.contracts_db.get(&rtxn, contract_id.as_bytes()).map_err(LmdbError::from)? {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn contract_iter(&self) -> Result<StoreIter<'_, ContractRecord>, StoreError> {
        Ok(scan_values(&self.env, self.contracts_db))
    }

    fn clear_contracts(&self) -> Result<(), StoreError> {
        self.clear_tables(&[self.contracts_db])
    }

    fn clear(&self, clean_index: bool, clean_registered_tokens: bool) -> Result<(), StoreError> {
        let mut tables = Vec::new();
        if clean_index {
            tables.extend([self.tokens_db, self.token_meta_db]);
        }
        if clean_registered_tokens {
            tables.push(self.registered_tokens_db);
        }
        self.clear_tables(&tables)
    }
}
