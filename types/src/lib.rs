//! Fundamental types for the walletdb storage engine.
//!
//! This crate defines the records shared across every other crate in the workspace:
//! addresses, transaction ids, token uids, timestamps, history transactions,
//! unspent outputs, token/address metadata, and the wallet counters.

pub mod address;
pub mod balance;
pub mod error;
pub mod hash;
pub mod time;
pub mod token;
pub mod tx;
pub mod utxo;
pub mod wallet;

pub use address::{Address, AddressInfo, AddressMetadata};
pub use balance::{AuthorityBalance, Balance, Funds};
pub use error::TypesError;
pub use hash::TxId;
pub use time::Timestamp;
pub use token::{ContractRecord, TokenInfo, TokenMetadata, TokenUid, TokenView};
pub use tx::{HistoryTx, TxInput, TxOutput, TxVersion};
pub use utxo::{AuthorityFlags, LockedUtxo, Utxo, UtxoId};
pub use wallet::{AccessData, EncryptedData, ScanningPolicy, WalletCounters, WalletType};
