//! Token index trait.
//!
//! Configuration and metadata live under separate keys so a token can be
//! read before any metadata was computed. The registered set is distinct
//! from known tokens: history can reveal a token the user never chose to track.

use crate::cursor::StoreIter;
use crate::StoreError;
use walletdb_types::{ContractRecord, TokenInfo, TokenMetadata, TokenUid, TokenView};

pub trait TokenStore {
    /// Fails with [`StoreError::DuplicateRecord`] when the uid is known.
    fn save_token(&self, info: &TokenInfo) -> Result<(), StoreError>;

    /// Configuration merged with metadata, defaulting metadata to zero.
    fn get_token(&self, uid: &TokenUid) -> Result<Option<TokenView>, StoreError>;

    fn has_token(&self, uid: &TokenUid) -> Result<bool, StoreError> {
        Ok(self.get_token(uid)?.is_some())
    }

    /// Known tokens in uid order.
    fn token_iter(&self) -> Result<StoreIter<'_, TokenView>, StoreError>;

    fn delete_tokens(&self, uids: &[TokenUid]) -> Result<(), StoreError>;

    fn get_token_meta(&self, uid: &TokenUid) -> Result<Option<TokenMetadata>, StoreError>;

    fn edit_token_meta(&self, uid: &TokenUid, meta: &TokenMetadata) -> Result<(), StoreError>;

    fn clear_token_meta(&self) -> Result<(), StoreError>;

    fn register_token(&self, info: &TokenInfo) -> Result<(), StoreError>;

    fn unregister_token(&self, uid: &TokenUid) -> Result<(), StoreError>;

    fn is_token_registered(&self, uid: &TokenUid) -> Result<bool, StoreError>;

    /// Registered tokens in uid order, merged with metadata.
    fn registered_token_iter(&self) -> Result<StoreIter<'_, TokenView>, StoreError>;

    fn register_contract(&self, contract: &ContractRecord) -> Result<(), StoreError>;

    fn unregister_contract(&self, contract_id: &str) -> Result<(), StoreError>;

    fn get_contract(&self, contract_id: &str) -> Result<Option<ContractRecord>, StoreError>;

    fn contract_iter(&self) -> Result<StoreIter<'_, ContractRecord>, StoreError>;

    fn clear_contracts(&self) -> Result<(), StoreError>;

    /// Wipe known tokens (with their metadata) and/or the registered set.
    fn clear(&self, clean_index: bool, clean_registered_tokens: bool) -> Result<(), StoreError>;
}
