//! The wallet store orchestrator.
//!
//! `Store` wraps any [`WalletStore`] backend and keeps the cross-index
//! invariants the individual indices cannot see: address watermarks follow
//! saved addresses and transactions, selection sees the chain height and
//! the in-process reservations, and wipes cover every index they affect.

use std::ops::RangeInclusive;
use std::sync::Arc;

use walletdb_store::{
    AddressStore, HistoryStore, SelectOptions, Selection, SelectionContext, TokenStore, UtxoStore,
    ValidationReport, WalletDataStore, WalletStore,
};
use walletdb_types::{
    Address, AddressInfo, AddressMetadata, HistoryTx, ScanningPolicy, TokenInfo, TokenUid, Utxo, UtxoId,
    WalletCounters,
};
use walletdb_utils::{Clock, SystemClock};

use crate::config::StorageConfig;
use crate::reservation::UtxoReservations;
use crate::scanning;
use crate::StorageError;

/// Wallet item set once the configured gap limit has been applied.
const POLICY_SEEDED_ITEM: &str = "scanning-policy-seeded";

/// An address record merged with its metadata (zeroed when absent).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressView {
    pub info: AddressInfo,
    pub metadata: AddressMetadata,
}

pub struct Store<S: WalletStore> {
    pub(crate) backend: S,
    pub(crate) reward_lock: u64,
    selection_ttl_secs: u64,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) reservations: UtxoReservations,
}

impl<S: WalletStore> Store<S> {
    /// Wrap `backend`, making sure the native token is known and a fresh
    /// gap-limit wallet uses the configured gap limit.
    pub fn new(backend: S, config: &StorageConfig) -> Result<Self, StorageError> {
        config.validate()?;

        let tokens = backend.token_store();
        if !tokens.has_token(&TokenUid::native())? {
            tokens.save_token(&TokenInfo::native())?;
        }

        let wallet = backend.wallet_store();
        if wallet.get_item(POLICY_SEEDED_ITEM)?.is_none() {
            let counters = wallet.get_counters()?;
            if counters.current_address_index.is_none()
                && matches!(counters.scanning_policy, ScanningPolicy::GapLimit { .. })
            {
                wallet.set_gap_limit(config.gap_limit)?;
            }
            wallet.set_item(POLICY_SEEDED_ITEM, &serde_json::Value::Bool(true))?;
        }

        Ok(Self {
            backend,
            reward_lock: config.reward_lock,
            selection_ttl_secs: config.utxo_selection_ttl_secs,
            clock: Arc::new(SystemClock),
            reservations: UtxoReservations::new(),
        })
    }

    /// Replace the wall clock used for lock evaluation and reservations.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn into_inner(self) -> S {
        self.backend
    }

    pub fn reward_lock(&self) -> u64 {
        self.reward_lock
    }

    pub fn counters(&self) -> Result<WalletCounters, StorageError> {
        Ok(self.backend.wallet_store().get_counters()?)
    }

    pub fn set_best_block_height(&self, height: u64) -> Result<(), StorageError> {
        Ok(self.backend.wallet_store().set_best_block_height(height)?)
    }

    /// Chain state used to evaluate time and height locks right now.
    pub fn selection_context(&self) -> Result<SelectionContext, StorageError> {
        Ok(SelectionContext {
            now: self.clock.now(),
            current_height: self.backend.wallet_store().best_block_height()?,
            reward_lock: self.reward_lock,
        })
    }

    // ── Addresses ──────────────────────────────────────────────────────

    /// Save a freshly derived address and move the loaded watermark.
    pub fn save_address(&self, info: &AddressInfo) -> Result<(), StorageError> {
        self.backend.address_store().save_address(info)?;
        let index = info.bip32_index;
        self.backend.wallet_store().update_counters(|c| {
            if c.current_address_index.is_none() {
                c.current_address_index = Some(index);
            }
            c.last_loaded_address_index = c.last_loaded_address_index.max(index);
        })?;
        Ok(())
    }

    pub fn is_address_mine(&self, address: &Address) -> Result<bool, StorageError> {
        Ok(self.backend.address_store().address_exists(address)?)
    }

    pub fn address_info(&self, address: &Address) -> Result<Option<AddressView>, StorageError> {
        let addresses = self.backend.address_store();
        let Some(info) = addresses.get_address(address)? else {
            return Ok(None);
        };
        let metadata = addresses.get_address_meta(address)?.unwrap_or_default();
        Ok(Some(AddressView { info, metadata }))
    }

    /// Address at the current index. With `mark_as_used` the current index
    /// moves one step forward, never past the last loaded address.
    pub fn current_address(&self, mark_as_used: bool) -> Result<AddressInfo, StorageError> {
        let wallet = self.backend.wallet_store();
        let counters = wallet.get_counters()?;
        let index = counters
            .current_address_index
            .ok_or(StorageError::CurrentAddressNotLoaded)?;
        let info = self
            .backend
            .address_store()
            .get_address_at_index(index)?
            .ok_or(StorageError::CurrentAddressNotLoaded)?;
        if mark_as_used && index < counters.last_loaded_address_index {
            wallet.set_current_address_index(index + 1)?;
        }
        Ok(info)
    }

    /// Next derivation range the discovery loop has to derive and save.
    pub fn addresses_to_load(&self) -> Result<Option<RangeInclusive<u32>>, StorageError> {
        let counters = self.backend.wallet_store().get_counters()?;
        let has_addresses = self.backend.address_store().address_count()? > 0;
        Ok(scanning::addresses_to_load(
            counters.scanning_policy,
            &counters,
            has_addresses,
        ))
    }

    // ── History ────────────────────────────────────────────────────────

    /// Upsert a transaction and advance the used watermark when it touches
    /// a wallet address beyond it. Returns whether the id was new.
    pub fn save_tx(&self, tx: &HistoryTx) -> Result<bool, StorageError> {
        let inserted = self.backend.history_store().save_tx(tx)?;
        if let Some(max) = self.max_owned_index(tx)? {
            self.advance_last_used(max)?;
        }
        Ok(inserted)
    }

    pub(crate) fn max_owned_index(&self, tx: &HistoryTx) -> Result<Option<u32>, StorageError> {
        let addresses = self.backend.address_store();
        let mut max = None;
        for address in tx.addresses() {
            if let Some(info) = addresses.get_address(address)? {
                max = max.max(Some(info.bip32_index));
            }
        }
        Ok(max)
    }

    /// Move `last_used` to `max` if higher; the current address follows to
    /// the first unused one, bounded by what has been loaded.
    pub(crate) fn advance_last_used(&self, max: u32) -> Result<(), StorageError> {
        self.backend.wallet_store().update_counters(|c| {
            if c.last_used_address_index.map_or(true, |used| max > used) {
                c.last_used_address_index = Some(max);
                let next = max.saturating_add(1).min(c.last_loaded_address_index);
                c.current_address_index = Some(c.current_address_index.map_or(next, |cur| cur.max(next)));
            }
        })?;
        Ok(())
    }

    // ── UTXO selection ─────────────────────────────────────────────────

    /// Lazily select UTXOs with the current chain height and clock.
    ///
    /// With `only_available_utxos`, outputs reserved through
    /// [`Store::mark_utxo_selected`] at call time are skipped as well.
    pub fn select_utxos(&self, mut options: SelectOptions) -> Result<Selection<'_>, StorageError> {
        options.check()?;
        let ctx = self.selection_context()?;
        if options.only_available_utxos {
            let reserved = self.reservations.active(ctx.now);
            if !reserved.is_empty() {
                let inner = options.filter.take();
                options.filter = Some(Arc::new(move |utxo: &Utxo| {
                    !reserved.contains(&utxo.id()) && inner.as_ref().map_or(true, |f| f(utxo))
                }));
            }
        }
        Ok(self.backend.utxo_store().select_utxos(options, ctx)?)
    }

    /// Reserve (or release) a UTXO picked as an input. The reservation lasts
    /// `ttl_secs`, or the configured default.
    pub fn mark_utxo_selected(&self, id: &UtxoId, selected: bool, ttl_secs: Option<u64>) {
        if selected {
            let until = self.clock.now().plus_secs(ttl_secs.unwrap_or(self.selection_ttl_secs));
            self.reservations.reserve(*id, until);
        } else {
            self.reservations.release(id);
        }
    }

    pub fn is_utxo_selected(&self, id: &UtxoId) -> bool {
        self.reservations.is_reserved(id, self.clock.now())
    }

    // ── Maintenance ────────────────────────────────────────────────────

    /// Check and repair every index; run once per process before trusting
    /// cached counts.
    pub fn validate(&self) -> Result<ValidationReport, StorageError> {
        let report = self.backend.validate()?;
        if report.repaired() > 0 {
            tracing::warn!(repaired = report.repaired(), "validation repaired index entries");
        } else {
            tracing::info!(
                addresses = report.addresses.count,
                transactions = report.history.count,
                utxos = report.utxos.count,
                "storage validated"
            );
        }
        Ok(report)
    }

    /// Wipe any combination of the history, address and token scopes.
    ///
    /// - history: transactions, UTXOs (locked ones included), reservations
    ///   and every metadata record derived from history;
    /// - addresses: the address index with its metadata and the address
    ///   watermarks; chain height and scanning policy are kept;
    /// - tokens: known and registered tokens plus contracts; the native
    ///   token is saved again.
    pub fn clean_storage(
        &self,
        clean_history: bool,
        clean_addresses: bool,
        clean_tokens: bool,
    ) -> Result<(), StorageError> {
        if clean_history {
            self.backend.history_store().clear()?;
            self.backend.utxo_store().clear()?;
            self.backend.token_store().clear_token_meta()?;
            self.backend.address_store().clear_address_meta()?;
            self.reservations.clear();
        }
        if clean_addresses {
            self.backend.address_store().clear()?;
            self.backend.wallet_store().reset_address_counters()?;
        }
        if clean_tokens {
            let tokens = self.backend.token_store();
            tokens.clear(true, true)?;
            tokens.clear_contracts()?;
            tokens.save_token(&TokenInfo::native())?;
        }
        tracing::info!(clean_history, clean_addresses, clean_tokens, "storage cleaned");
        Ok(())
    }
}
