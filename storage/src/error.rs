use thiserror::Error;

use walletdb_store::StoreError;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("current address is not loaded")]
    CurrentAddressNotLoaded,

    #[error("token lookup failed for {uid}: {reason}")]
    TokenLookup { uid: String, reason: String },
}
