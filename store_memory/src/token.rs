use std::collections::BTreeMap;
use std::sync::Mutex;

use walletdb_store::{Direction, KeyRange, PagedCursor, StoreError, StoreIter, TokenStore};
use walletdb_types::{ContractRecord, TokenInfo, TokenMetadata, TokenUid, TokenView};

use crate::{lock, page};

#[derive(Default)]
struct TokenTables {
    tokens: BTreeMap<TokenUid, TokenInfo>,
    meta: BTreeMap<TokenUid, TokenMetadata>,
    registered: BTreeMap<TokenUid, TokenInfo>,
    contracts: BTreeMap<String, ContractRecord>,
}

impl TokenTables {
    fn view(&self, info: &TokenInfo) -> TokenView {
        TokenView {
            info: info.clone(),
            metadata: self.meta.get(&info.uid).copied().unwrap_or_default(),
        }
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tables: Mutex<TokenTables>,
}

impl MemoryTokenStore {
    fn views<'a>(&'a self, registered: bool) -> StoreIter<'a, TokenView> {
        let cursor = PagedCursor::new(
            KeyRange::all(Direction::Forward),
            move |range: &KeyRange<TokenUid>, limit| {
                let tables = lock(&self.tables)?;
                let source = if registered { &tables.registered } else { &tables.tokens };
                Ok(page(source, range, limit, |_, info| Some(tables.view(info))))
            },
        );
        Box::new(cursor.filter_map(Result::transpose))
    }
}

impl TokenStore for MemoryTokenStore {
    fn save_token(&self, info: &TokenInfo) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables)?;
        if tables.tokens.contains_key(&info.uid) {
            return Err(StoreError::DuplicateRecord(format!("token {}", info.uid)));
        }
        tables.tokens.insert(info.uid.clone(), info.clone());
        Ok(())
    }

    fn get_token(&self, uid: &TokenUid) -> Result<Option<TokenView>, StoreError> {
        let tables = lock(&self.tables)?;
        Ok(tables.tokens.get(uid).map(|info| tables.view(info)))
    }

    fn token_iter(&self) -> Result<StoreIter<'_, TokenView>, StoreError> {
        Ok(self.views(false))
    }

    fn delete_tokens(&self, uids: &[TokenUid]) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables)?;
        for uid in uids {
            tables.tokens.remove(uid);
            tables.meta.remove(uid);
        }
        Ok(())
    }

    fn get_token_meta(&self, uid: &TokenUid) -> Result<Option<TokenMetadata>, StoreError> {
        Ok(lock(&self.tables)?.meta.get(uid).copied())
    }

    fn edit_token_meta(&self, uid: &TokenUid, meta: &TokenMetadata) -> Result<(), StoreError> {
        lock(&self.tables)?.meta.insert(uid.clone(), *meta);
        Ok(())
    }

    fn clear_token_meta(&self) -> Result<(), StoreError> {
        lock(&self.tables)?.meta.clear();
        Ok(())
    }

    fn register_token(&self, info: &TokenInfo) -> Result<(), StoreError> {
        lock(&self.tables)?.registered.insert(info.uid.clone(), info.clone());
        Ok(())
    }

    fn unregister_token(&self, uid: &TokenUid) -> Result<(), StoreError> {
        lock(&self.tables)?.registered.remove(uid);
        Ok(())
    }

    fn is_token_registered(&self, uid: &TokenUid) -> Result<bool, StoreError> {
        Ok(lock(&self.tables)?.registered.contains_key(uid))
    }

    fn registered_token_iter(&self) -> Result<StoreIter<'_, TokenView>, StoreError> {
        Ok(self.views(true))
    }

    fn register_contract(&self, contract: &ContractRecord) -> Result<(), StoreError> {
        lock(&self.tables)?
            .contracts
            .insert(contract.contract_id.clone(), contract.clone());
        Ok(())
    }

    fn unregister_contract(&self, contract_id: &str) -> Result<(), StoreError> {
        lock(&self.tables)?.contracts.remove(contract_id);
        Ok(())
    }

    fn get_contract(&self, contract_id: &str) -> Result<Option<ContractRecord>, StoreError> {
        Ok(lock(&self.tables)?.contracts.get(contract_id).cloned())
    }

    fn contract_iter(&self) -> Result<StoreIter<'_, ContractRecord>, StoreError> {
        let cursor = PagedCursor::new(
            KeyRange::all(Direction::Forward),
            move |range: &KeyRange<String>, limit| {
                let tables = lock(&self.tables)?;
                Ok(page(&tables.contracts, range, limit, |_, c| Some(c.clone())))
            },
        );
        Ok(Box::new(cursor.filter_map(Result::transpose)))
    }

    fn clear_contracts(&self) -> Result<(), StoreError> {
        lock(&self.tables)?.contracts.clear();
        Ok(())
    }

    fn clear(&self, clean_index: bool, clean_registered_tokens: bool) -> Result<(), StoreError> {
        let mut tables = lock(&self.tables)?;
        if clean_index {
            tables.tokens.clear();
            tables.meta.clear();
        }
        if clean_registered_tokens {
            tables.registered.clear();
        }
        Ok(())
    }
}
