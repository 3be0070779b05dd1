//! Abstract index traits for the walletdb storage engine.
//!
//! Every storage backend (LMDB, in-memory) implements these traits. The
//! orchestrator and the rest of the workspace depend only on the traits,
//! so both backends must satisfy the same behaviour.

pub mod address;
pub mod cursor;
pub mod error;
pub mod history;
pub mod keys;
pub mod selection;
pub mod token;
pub mod utxo;
pub mod wallet;

pub use address::{AddressStore, AddressValidation};
pub use cursor::{Direction, KeyRange, PagedCursor, StoreIter, PAGE_SIZE};
pub use error::StoreError;
pub use history::{HistoryStore, HistoryValidation};
pub use keys::{HistoryTimeKey, IndexKey, TokenAddressUtxoKey, TokenUtxoKey, UtxoKind};
pub use selection::{
    SelectOptions, Selection, SelectionContext, UtxoFilter, UtxoRangeQuery, ValueOrder,
};
pub use token::TokenStore;
pub use utxo::{UtxoStore, UtxoValidation};
pub use wallet::WalletDataStore;

/// Version of the on-disk key layout. Persistent backends refuse to open a
/// database written with a different version.
pub const INDEX_VERSION: &str = "1";

/// Results of validating every index of a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub addresses: AddressValidation,
    pub history: HistoryValidation,
    pub utxos: UtxoValidation,
}

impl ValidationReport {
    pub fn repaired(&self) -> u64 {
        self.addresses.repaired + self.history.repaired + self.utxos.repaired
    }
}

/// A complete wallet store: the five indices of one wallet account.
///
/// Implementors expose each index through an accessor; cross-index
/// invariants are enforced by the orchestrator built on top.
pub trait WalletStore {
    type Addresses: AddressStore;
    type History: HistoryStore;
    type Utxos: UtxoStore;
    type Tokens: TokenStore;
    type Wallet: WalletDataStore;

    fn address_store(&self) -> &Self::Addresses;
    fn history_store(&self) -> &Self::History;
    fn utxo_store(&self) -> &Self::Utxos;
    fn token_store(&self) -> &Self::Tokens;
    fn wallet_store(&self) -> &Self::Wallet;

    /// Validate the address, history and UTXO indices.
    fn validate(&self) -> Result<ValidationReport, StoreError> {
        Ok(ValidationReport {
            addresses: self.address_store().validate()?,
            history: self.history_store().validate()?,
            utxos: self.utxo_store().validate()?,
        })
    }
}
