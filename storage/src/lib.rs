//! Wallet storage orchestrator.
//!
//! [`Store`] sits on top of any [`walletdb_store::WalletStore`] backend and
//! owns everything that spans more than one index: address watermarks,
//! incremental and full history processing, lock re-evaluation, coin
//! selection with in-process reservations, and storage wipes.

pub mod config;
pub mod error;
pub mod lookup;
pub mod process;
pub mod reservation;
pub mod scanning;
pub mod store;

pub use config::{Backend, ConfigError, StorageConfig};
pub use error::StorageError;
pub use lookup::{LookupError, NoTokenLookup, TokenLookup};
pub use process::{ProcessedTx, ReplaySummary};
pub use reservation::UtxoReservations;
pub use scanning::addresses_to_load;
pub use store::{AddressView, Store};
