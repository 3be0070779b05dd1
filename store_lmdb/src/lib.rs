//! LMDB storage backend for walletdb.
//!
//! Implements every index trait from `walletdb-store` using the `heed` LMDB
//! bindings. Each index maps to one or more named databases within a single
//! environment; keys are the byte encodings of the typed composite keys.

pub mod address;
mod cursor;
pub mod environment;
pub mod error;
pub mod history;
pub mod integrity;
pub mod token;
pub mod utxo;
mod version;
pub mod wallet;

pub use address::LmdbAddressStore;
pub use environment::{LmdbEnvironment, DEFAULT_MAP_SIZE, DEFAULT_MAX_DBS};
pub use error::LmdbError;
pub use history::LmdbHistoryStore;
pub use integrity::{check_data_dir, check_integrity, IntegrityReport};
pub use token::LmdbTokenStore;
pub use utxo::LmdbUtxoStore;
pub use wallet::LmdbWalletStore;
