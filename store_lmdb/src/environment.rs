//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::{Env, EnvOpenOptions, RwTxn};

use walletdb_store::WalletStore;

use crate::address::LmdbAddressStore;
use crate::cursor::Table;
use crate::history::LmdbHistoryStore;
use crate::integrity::{check_data_dir, check_integrity, IntegrityReport, EXPECTED_DATABASES};
use crate::token::LmdbTokenStore;
use crate::utxo::LmdbUtxoStore;
use crate::version::ensure_index_version;
use crate::wallet::LmdbWalletStore;
use crate::LmdbError;

/// Default LMDB map size (1 GiB).
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

/// Named databases opened by [`LmdbEnvironment::open`], plus headroom.
pub const DEFAULT_MAX_DBS: u32 = 20;

/// Wraps the LMDB environment and the five index stores built on it.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    addresses: LmdbAddressStore,
    history: LmdbHistoryStore,
    utxos: LmdbUtxoStore,
    tokens: LmdbTokenStore,
    wallet: LmdbWalletStore,
}

fn create(env: &Env, wtxn: &mut RwTxn, name: &str) -> Result<Table, LmdbError> {
    Ok(env.create_database(wtxn, Some(name))?)
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    ///
    /// Creates every named database and stamps or verifies the index
    /// version in the same write transaction.
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        if (max_dbs as usize) < EXPECTED_DATABASES.len() {
            return Err(LmdbError::Heed(format!(
                "max_dbs {} is below the {} databases required",
                max_dbs,
                EXPECTED_DATABASES.len()
            )));
        }
        check_data_dir(path)?;
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per path by this process and
        // the data file is never modified outside LMDB.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_dbs)
                .open(path)
        }
        .map_err(LmdbError::from)?;

        let mut wtxn = env.write_txn().map_err(LmdbError::from)?;
        let addresses_db = create(&env, &mut wtxn, "addresses")?;
        let address_index_db = create(&env, &mut wtxn, "address_index")?;
        let address_meta_db = create(&env, &mut wtxn, "address_meta")?;
        let history_db = create(&env, &mut wtxn, "history")?;
        let history_time_db = create(&env, &mut wtxn, "history_time")?;
        let utxos_db = create(&env, &mut wtxn, "utxos")?;
        let utxo_token_db = create(&env, &mut wtxn, "utxo_token")?;
        let utxo_token_address_db = create(&env, &mut wtxn, "utxo_token_address")?;
        let locked_utxos_db = create(&env, &mut wtxn, "locked_utxos")?;
        let tokens_db = create(&env, &mut wtxn, "tokens")?;
        let token_meta_db = create(&env, &mut wtxn, "token_meta")?;
        let registered_tokens_db = create(&env, &mut wtxn, "registered_tokens")?;
        let contracts_db = create(&env, &mut wtxn, "contracts")?;
        let wallet_db = create(&env, &mut wtxn, "wallet")?;
        let meta_db = create(&env, &mut wtxn, "meta")?;
        ensure_index_version(&mut wtxn, &meta_db)?;
        wtxn.commit().map_err(LmdbError::from)?;

        tracing::info!(path = %path.display(), map_size, max_dbs, "opened LMDB wallet environment");

        let env = Arc::new(env);
        Ok(Self {
            addresses: LmdbAddressStore {
                env: env.clone(),
                addresses_db,
                address_index_db,
                address_meta_db,
            },
            history: LmdbHistoryStore {
                env: env.clone(),
                history_db,
                history_time_db,
                meta_db,
            },
            utxos: LmdbUtxoStore {
                env: env.clone(),
                utxos_db,
                utxo_token_db,
                utxo_token_address_db,
                locked_utxos_db,
            },
            tokens: LmdbTokenStore {
                env: env.clone(),
                tokens_db,
                token_meta_db,
                registered_tokens_db,
                contracts_db,
            },
            wallet: LmdbWalletStore {
                env: env.clone(),
                wallet_db,
            },
            env,
        })
    }

    /// Open with [`DEFAULT_MAX_DBS`] and [`DEFAULT_MAP_SIZE`].
    pub fn open_default(path: &Path) -> Result<Self, LmdbError> {
        Self::open(path, DEFAULT_MAX_DBS, DEFAULT_MAP_SIZE)
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Count the entries of every database, collecting read failures.
    pub fn check_integrity(&self) -> Result<IntegrityReport, LmdbError> {
        check_integrity(&self.env)
    }
}

impl WalletStore for LmdbEnvironment {
    type Addresses = LmdbAddressStore;
    type History = LmdbHistoryStore;
    type Utxos = LmdbUtxoStore;
    type Tokens = LmdbTokenStore;
    type Wallet = LmdbWalletStore;

    fn address_store(&self) -> &LmdbAddressStore {
        &self.addresses
    }

    fn history_store(&self) -> &LmdbHistoryStore {
        &self.history
    }

    fn utxo_store(&self) -> &LmdbUtxoStore {
        &self.utxos
    }

    fn token_store(&self) -> &LmdbTokenStore {
        &self.tokens
    }

    fn wallet_store(&self) -> &LmdbWalletStore {
        &self.wallet
    }
}
