//! Deriving UTXOs and metadata from history.
//!
//! Metadata is credited when a UTXO is stored and debited when it is
//! removed, always in the bucket matching its lock state, so token and
//! address balances equal the sums over the stored UTXOs.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use walletdb_store::{
    AddressStore, Direction, HistoryStore, SelectionContext, StoreError, TokenStore, UtxoStore, WalletStore,
};
use walletdb_types::{
    Address, AddressMetadata, HistoryTx, LockedUtxo, TokenInfo, TokenMetadata, TokenUid, TxId, TxVersion,
    Utxo, UtxoId,
};

use crate::lookup::TokenLookup;
use crate::store::Store;
use crate::StorageError;

/// What one processed transaction touched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessedTx {
    /// Tokens moved through wallet-owned inputs or outputs.
    pub tokens: BTreeSet<TokenUid>,
    /// Highest derivation index among the wallet addresses involved.
    pub max_address_index: Option<u32>,
}

/// Outcome of a full history replay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub transactions: u64,
    pub voided: u64,
    pub utxos: u64,
    /// Unknown tokens resolved through the lookup.
    pub tokens_fetched: u64,
}

/// Metadata records loaded on first touch and written back once.
#[derive(Default)]
struct MetaBatch {
    tokens: BTreeMap<TokenUid, TokenMetadata>,
    addresses: BTreeMap<Address, AddressMetadata>,
}

impl MetaBatch {
    fn token<S: WalletStore>(&mut self, backend: &S, uid: &TokenUid) -> Result<&mut TokenMetadata, StoreError> {
        Ok(match self.tokens.entry(uid.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(backend.token_store().get_token_meta(uid)?.unwrap_or_default()),
        })
    }

    fn address<S: WalletStore>(
        &mut self,
        backend: &S,
        address: &Address,
    ) -> Result<&mut AddressMetadata, StoreError> {
        Ok(match self.addresses.entry(address.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                entry.insert(backend.address_store().get_address_meta(address)?.unwrap_or_default())
            }
        })
    }

    fn credit<S: WalletStore>(&mut self, backend: &S, utxo: &Utxo, locked: bool) -> Result<(), StoreError> {
        self.token(backend, &utxo.token)?
            .balance
            .credit(utxo.value, utxo.authorities, locked);
        self.address(backend, &utxo.address)?
            .balance_mut(&utxo.token)
            .credit(utxo.value, utxo.authorities, locked);
        Ok(())
    }

    fn debit<S: WalletStore>(&mut self, backend: &S, utxo: &Utxo, locked: bool) -> Result<(), StoreError> {
        self.token(backend, &utxo.token)?
            .balance
            .debit(utxo.value, utxo.authorities, locked);
        self.address(backend, &utxo.address)?
            .balance_mut(&utxo.token)
            .debit(utxo.value, utxo.authorities, locked);
        Ok(())
    }

    fn unlock<S: WalletStore>(&mut self, backend: &S, utxo: &Utxo) -> Result<(), StoreError> {
        self.token(backend, &utxo.token)?
            .balance
            .unlock(utxo.value, utxo.authorities);
        self.address(backend, &utxo.address)?
            .balance_mut(&utxo.token)
            .unlock(utxo.value, utxo.authorities);
        Ok(())
    }

    fn flush<S: WalletStore>(self, backend: &S) -> Result<(), StoreError> {
        for (uid, meta) in &self.tokens {
            backend.token_store().edit_token_meta(uid, meta)?;
        }
        for (address, meta) in &self.addresses {
            backend.address_store().edit_address_meta(address, meta)?;
        }
        Ok(())
    }
}

impl<S: WalletStore> Store<S> {
    /// Save a transaction and, when it is new, fold it into UTXOs and
    /// metadata. Updates of a stored transaction (a voided flip, a new
    /// height) only take effect on the next [`Store::process_history`].
    pub fn add_tx(&self, tx: &HistoryTx) -> Result<Option<ProcessedTx>, StorageError> {
        if !self.save_tx(tx)? {
            tracing::debug!(tx_id = %tx.tx_id, "transaction updated, replay needed to reprocess");
            return Ok(None);
        }
        Ok(Some(self.process_new_tx(tx)?))
    }

    /// Fold one transaction into UTXOs and metadata. Voided transactions
    /// are ignored.
    pub fn process_new_tx(&self, tx: &HistoryTx) -> Result<ProcessedTx, StorageError> {
        let ctx = self.selection_context()?;
        self.apply_tx(tx, &ctx)
    }

    fn apply_tx(&self, tx: &HistoryTx, ctx: &SelectionContext) -> Result<ProcessedTx, StorageError> {
        let mut processed = ProcessedTx::default();
        if tx.is_voided {
            return Ok(processed);
        }
        let addresses = self.backend.address_store();
        let utxos = self.backend.utxo_store();
        let mut batch = MetaBatch::default();
        let mut touched_addresses = BTreeSet::new();

        for (index, output) in (0u32..).zip(&tx.outputs) {
            let Some(address) = &output.address else { continue };
            let Some(info) = addresses.get_address(address)? else { continue };
            processed.max_address_index = processed.max_address_index.max(Some(info.bip32_index));
            processed.tokens.insert(output.token.clone());
            touched_addresses.insert(address.clone());

            if let Some(spender) = output.spent_by {
                if self.is_live_spender(spender)? {
                    continue;
                }
            }
            let Some(utxo) = Utxo::from_output(tx, index) else { continue };
            if utxos.get_utxo(&utxo.id())?.is_some() {
                continue;
            }
            let locked = utxo.is_locked(ctx.now, ctx.current_height, ctx.reward_lock);
            utxos.save_utxo(&utxo)?;
            if locked {
                utxos.save_locked_utxo(&LockedUtxo { tx: tx.clone(), index })?;
            }
            batch.credit(&self.backend, &utxo, locked)?;
        }

        for input in &tx.inputs {
            let Some(address) = &input.address else { continue };
            let Some(info) = addresses.get_address(address)? else { continue };
            processed.max_address_index = processed.max_address_index.max(Some(info.bip32_index));
            processed.tokens.insert(input.token.clone());
            touched_addresses.insert(address.clone());

            let id = UtxoId::new(input.tx_id, input.index);
            if let Some(utxo) = utxos.get_utxo(&id)? {
                let was_locked = utxos.get_locked_utxo(&id)?.is_some();
                utxos.delete_utxo(&id)?;
                batch.debit(&self.backend, &utxo, was_locked)?;
            }
            self.mark_spent(&id, tx.tx_id)?;
        }

        for uid in &processed.tokens {
            batch.token(&self.backend, uid)?.num_transactions += 1;
        }
        for address in &touched_addresses {
            batch.address(&self.backend, address)?.num_transactions += 1;
        }
        batch.flush(&self.backend)?;

        if tx.version == TxVersion::CreateToken {
            self.save_created_token(tx)?;
        }
        Ok(processed)
    }

    /// A `spent_by` mark only counts while the spender is stored and not
    /// voided; a reorg can leave marks pointing at dropped spenders.
    fn is_live_spender(&self, spender: TxId) -> Result<bool, StorageError> {
        Ok(self
            .backend
            .history_store()
            .get_tx(&spender)?
            .is_some_and(|tx| !tx.is_voided))
    }

    /// Record `spender` on the stored funding transaction's output.
    fn mark_spent(&self, id: &UtxoId, spender: TxId) -> Result<(), StorageError> {
        let history = self.backend.history_store();
        let Some(mut funding) = history.get_tx(&id.tx_id)? else {
            return Ok(());
        };
        let Some(output) = funding.outputs.get_mut(id.index as usize) else {
            return Ok(());
        };
        if output.spent_by != Some(spender) {
            output.spent_by = Some(spender);
            history.save_tx(&funding)?;
        }
        Ok(())
    }

    fn save_created_token(&self, tx: &HistoryTx) -> Result<(), StorageError> {
        let (Some(name), Some(symbol)) = (&tx.token_name, &tx.token_symbol) else {
            return Ok(());
        };
        let uid = TokenUid::new(tx.tx_id.to_string());
        let tokens = self.backend.token_store();
        if !tokens.has_token(&uid)? {
            tokens.save_token(&TokenInfo::new(uid, name.as_str(), symbol.as_str()))?;
        }
        Ok(())
    }

    /// Rebuild UTXOs and metadata from the stored history, oldest first.
    ///
    /// Tokens seen in history but unknown to the token index are resolved
    /// through `lookup`; a failed lookup aborts the replay.
    pub fn process_history(&self, lookup: &dyn TokenLookup) -> Result<ReplaySummary, StorageError> {
        self.backend.utxo_store().clear()?;
        self.backend.token_store().clear_token_meta()?;
        self.backend.address_store().clear_address_meta()?;

        let ctx = self.selection_context()?;
        let mut summary = ReplaySummary::default();
        let mut seen_tokens = BTreeSet::new();
        let mut max_index = None;
        for tx in self.backend.history_store().history_range(Direction::Forward)? {
            let tx = tx?;
            summary.transactions += 1;
            if tx.is_voided {
                summary.voided += 1;
            }
            let processed = self.apply_tx(&tx, &ctx)?;
            seen_tokens.extend(processed.tokens);
            max_index = max_index.max(processed.max_address_index);
        }

        let tokens = self.backend.token_store();
        for uid in seen_tokens {
            if tokens.has_token(&uid)? {
                continue;
            }
            match lookup.lookup(&uid) {
                Ok(Some(info)) => {
                    tokens.save_token(&info)?;
                    summary.tokens_fetched += 1;
                }
                Ok(None) => tracing::warn!(token = %uid, "token seen in history is unknown"),
                Err(e) => {
                    return Err(StorageError::TokenLookup {
                        uid: uid.to_string(),
                        reason: e.to_string(),
                    })
                }
            }
        }

        if let Some(max) = max_index {
            self.advance_last_used(max)?;
        }
        summary.utxos = self.backend.utxo_store().utxo_count()?;
        tracing::info!(
            transactions = summary.transactions,
            voided = summary.voided,
            utxos = summary.utxos,
            tokens_fetched = summary.tokens_fetched,
            "history replayed"
        );
        Ok(summary)
    }

    /// Re-evaluate every locked UTXO against the current clock and chain
    /// height; expired locks move their value to the unlocked bucket.
    /// Returns how many UTXOs were unlocked.
    pub fn process_locked_utxos(&self) -> Result<u64, StorageError> {
        let ctx = self.selection_context()?;
        let utxos = self.backend.utxo_store();
        let locked: Vec<LockedUtxo> = utxos.locked_utxo_iter()?.collect::<Result<_, _>>()?;

        let mut batch = MetaBatch::default();
        let mut unlocked = 0;
        for record in locked {
            let id = record.id();
            let Some(utxo) = utxos.get_utxo(&id)? else {
                // Spent while locked; only the watch entry is left.
                utxos.unlock_utxo(&id)?;
                continue;
            };
            if utxo.is_locked(ctx.now, ctx.current_height, ctx.reward_lock) {
                continue;
            }
            batch.unlock(&self.backend, &utxo)?;
            utxos.unlock_utxo(&id)?;
            unlocked += 1;
            tracing::debug!(utxo = %id, "lock expired");
        }
        batch.flush(&self.backend)?;
        if unlocked > 0 {
            tracing::info!(unlocked, "promoted expired locks");
        }
        Ok(unlocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use walletdb_store::SelectOptions;
    use walletdb_store_memory::MemoryStore;
    use walletdb_types::{AddressInfo, AuthorityFlags, Balance, Funds, Timestamp, TxInput, TxOutput};
    use walletdb_utils::NullClock;

    use crate::config::StorageConfig;
    use crate::lookup::{LookupError, NoTokenLookup};

    fn store_at(now: u64) -> (Store<MemoryStore>, Arc<NullClock>) {
        let clock = Arc::new(NullClock::new(now));
        let store = Store::new(MemoryStore::new(), &StorageConfig::default())
            .unwrap()
            .with_clock(clock.clone());
        for (n, name) in ["W0", "W1", "W2"].iter().enumerate() {
            store.save_address(&AddressInfo::new(*name, n as u32)).unwrap();
        }
        (store, clock)
    }

    fn receive(n: u8, ts: u64, outputs: Vec<TxOutput>) -> HistoryTx {
        let mut tx = HistoryTx::new(TxId::new([n; 32]), Timestamp::new(ts));
        tx.outputs = outputs;
        tx
    }

    fn spend(n: u8, ts: u64, from: &HistoryTx, index: u32) -> HistoryTx {
        let output = &from.outputs[index as usize];
        let mut tx = HistoryTx::new(TxId::new([n; 32]), Timestamp::new(ts));
        tx.inputs.push(TxInput {
            tx_id: from.tx_id,
            index,
            value: output.value,
            token: output.token.clone(),
            address: output.address.clone(),
            authorities: output.authorities,
            timelock: output.timelock,
        });
        tx.outputs.push(TxOutput::new(output.value, output.token.clone(), "foreign"));
        tx
    }

    fn native_balance(store: &Store<MemoryStore>) -> Balance {
        store
            .backend()
            .token_store()
            .get_token_meta(&TokenUid::native())
            .unwrap()
            .unwrap_or_default()
            .balance
    }

    #[test]
    fn receiving_credits_token_and_address() {
        let (store, _) = store_at(1_000);
        let tx = receive(1, 100, vec![TxOutput::new(50, "00", "W1"), TxOutput::new(7, "00", "foreign")]);
        let processed = store.add_tx(&tx).unwrap().unwrap();
        assert_eq!(processed.max_address_index, Some(1));
        assert_eq!(processed.tokens, BTreeSet::from([TokenUid::native()]));

        assert_eq!(native_balance(&store).tokens, Funds { locked: 0, unlocked: 50 });
        let view = store.address_info(&Address::new("W1")).unwrap().unwrap();
        assert_eq!(view.metadata.num_transactions, 1);
        assert_eq!(view.metadata.balance_for(&TokenUid::native()).tokens.unlocked, 50);
        assert_eq!(store.backend().utxo_store().utxo_count().unwrap(), 1);
    }

    #[test]
    fn spending_removes_utxo_and_marks_funding_output() {
        let (store, _) = store_at(1_000);
        let funding = receive(1, 100, vec![TxOutput::new(50, "00", "W0")]);
        store.add_tx(&funding).unwrap();
        let spender = spend(2, 200, &funding, 0);
        store.add_tx(&spender).unwrap();

        assert_eq!(store.backend().utxo_store().utxo_count().unwrap(), 0);
        assert_eq!(native_balance(&store), Balance::default());
        let stored = store.backend().history_store().get_tx(&funding.tx_id).unwrap().unwrap();
        assert_eq!(stored.outputs[0].spent_by, Some(spender.tx_id));
        let meta = store.backend().token_store().get_token_meta(&TokenUid::native()).unwrap().unwrap();
        assert_eq!(meta.num_transactions, 2);
    }

    #[test]
    fn resaving_a_known_tx_does_not_double_count() {
        let (store, _) = store_at(1_000);
        let tx = receive(1, 100, vec![TxOutput::new(50, "00", "W0")]);
        assert!(store.add_tx(&tx).unwrap().is_some());
        assert!(store.add_tx(&tx).unwrap().is_none());
        assert_eq!(native_balance(&store).tokens.unlocked, 50);
    }

    #[test]
    fn voided_transactions_are_ignored() {
        let (store, _) = store_at(1_000);
        let mut tx = receive(1, 100, vec![TxOutput::new(50, "00", "W0")]);
        tx.is_voided = true;
        let processed = store.add_tx(&tx).unwrap().unwrap();
        assert_eq!(processed, ProcessedTx::default());
        assert_eq!(store.backend().utxo_store().utxo_count().unwrap(), 0);
    }

    #[test]
    fn timelocked_output_lands_in_locked_bucket_then_unlocks() {
        let (store, clock) = store_at(1_000);
        let mut output = TxOutput::new(100, "00", "W2");
        output.timelock = Some(Timestamp::new(2_000));
        let tx = receive(1, 100, vec![output]);
        store.add_tx(&tx).unwrap();

        assert_eq!(native_balance(&store).tokens, Funds { locked: 100, unlocked: 0 });
        assert_eq!(store.backend().utxo_store().locked_utxo_iter().unwrap().count(), 1);
        assert_eq!(store.process_locked_utxos().unwrap(), 0);

        clock.set(2_000);
        assert_eq!(store.process_locked_utxos().unwrap(), 1);
        assert_eq!(native_balance(&store).tokens, Funds { locked: 0, unlocked: 100 });
        let view = store.address_info(&Address::new("W2")).unwrap().unwrap();
        assert_eq!(view.metadata.balance_for(&TokenUid::native()).tokens.unlocked, 100);
        assert_eq!(store.backend().utxo_store().locked_utxo_iter().unwrap().count(), 0);
    }

    #[test]
    fn spending_a_locked_output_debits_locked_bucket() {
        let (store, _) = store_at(1_000);
        let mut output = TxOutput::new(100, "00", "W0");
        output.timelock = Some(Timestamp::new(5_000));
        let funding = receive(1, 100, vec![output]);
        store.add_tx(&funding).unwrap();
        store.add_tx(&spend(2, 200, &funding, 0)).unwrap();
        assert_eq!(native_balance(&store), Balance::default());
        assert_eq!(store.backend().utxo_store().locked_utxo_iter().unwrap().count(), 0);
    }

    #[test]
    fn block_rewards_mature_with_height() {
        let (store, _) = store_at(1_000);
        store.set_best_block_height(10).unwrap();
        let mut block = receive(1, 100, vec![TxOutput::new(6_400, "00", "W0")]);
        block.version = TxVersion::Block;
        block.height = Some(10);
        store.add_tx(&block).unwrap();
        assert_eq!(native_balance(&store).tokens.locked, 6_400);

        let available = SelectOptions::for_token("00").available_only();
        assert_eq!(store.select_utxos(available.clone()).unwrap().count(), 0);

        store.set_best_block_height(10 + store.reward_lock()).unwrap();
        assert_eq!(store.process_locked_utxos().unwrap(), 1);
        assert_eq!(store.select_utxos(available).unwrap().count(), 1);
    }

    #[test]
    fn authority_outputs_count_units() {
        let (store, _) = store_at(1_000);
        let mut mint = TxOutput::new(0, "cafe", "W0");
        mint.authorities = AuthorityFlags::MINT;
        let mut tx = receive(1, 100, vec![mint, TxOutput::new(30, "cafe", "W0")]);
        tx.version = TxVersion::CreateToken;
        tx.token_name = Some("Cafe".into());
        tx.token_symbol = Some("CAF".into());
        store.add_tx(&tx).unwrap();

        let meta = store.backend().token_store().get_token_meta(&TokenUid::new("cafe")).unwrap().unwrap();
        assert_eq!(meta.balance.tokens.unlocked, 30);
        assert_eq!(meta.balance.authorities.mint.unlocked, 1);
        assert!(store
            .backend()
            .token_store()
            .has_token(&TokenUid::new(tx.tx_id.to_string()))
            .unwrap());
    }

    #[test]
    fn replay_rebuilds_the_same_state() {
        let (store, _) = store_at(1_000);
        let funding = receive(1, 100, vec![TxOutput::new(50, "00", "W0"), TxOutput::new(20, "00", "W1")]);
        store.add_tx(&funding).unwrap();
        store.add_tx(&spend(2, 200, &funding, 0)).unwrap();
        let before = native_balance(&store);

        let summary = store.process_history(&NoTokenLookup).unwrap();
        assert_eq!(summary.transactions, 2);
        assert_eq!(summary.utxos, 1);
        assert_eq!(native_balance(&store), before);
        assert_eq!(before.tokens.unlocked, 20);
    }

    #[test]
    fn replay_applies_a_voided_flip() {
        let (store, _) = store_at(1_000);
        let mut tx = receive(1, 100, vec![TxOutput::new(50, "00", "W0")]);
        store.add_tx(&tx).unwrap();
        tx.is_voided = true;
        store.add_tx(&tx).unwrap();
        assert_eq!(native_balance(&store).tokens.unlocked, 50);

        let summary = store.process_history(&NoTokenLookup).unwrap();
        assert_eq!(summary.voided, 1);
        assert_eq!(native_balance(&store), Balance::default());
        assert_eq!(store.backend().utxo_store().utxo_count().unwrap(), 0);
    }

    #[test]
    fn replay_restores_output_of_a_voided_spender() {
        let (store, _) = store_at(1_000);
        let funding = receive(1, 100, vec![TxOutput::new(50, "00", "W0")]);
        store.add_tx(&funding).unwrap();
        let mut spender = spend(2, 200, &funding, 0);
        store.add_tx(&spender).unwrap();
        assert_eq!(native_balance(&store), Balance::default());

        spender.is_voided = true;
        store.add_tx(&spender).unwrap();
        let summary = store.process_history(&NoTokenLookup).unwrap();
        assert_eq!(summary.utxos, 1);
        assert_eq!(native_balance(&store).tokens.unlocked, 50);
    }

    #[test]
    fn spent_mark_without_stored_spender_is_ignored() {
        let (store, _) = store_at(1_000);
        let mut output = TxOutput::new(50, "00", "W0");
        output.spent_by = Some(TxId::new([9; 32]));
        store.add_tx(&receive(1, 100, vec![output])).unwrap();
        assert_eq!(store.backend().utxo_store().utxo_count().unwrap(), 1);
        assert_eq!(native_balance(&store).tokens.unlocked, 50);
    }

    #[test]
    fn replay_resolves_unknown_tokens() {
        let (store, _) = store_at(1_000);
        store.save_tx(&receive(1, 100, vec![TxOutput::new(5, "beef", "W0")])).unwrap();

        let lookup = |uid: &TokenUid| -> Result<Option<TokenInfo>, LookupError> {
            Ok(Some(TokenInfo::new(uid.clone(), "Beef", "BEF")))
        };
        let summary = store.process_history(&lookup).unwrap();
        assert_eq!(summary.tokens_fetched, 1);
        let view = store.backend().token_store().get_token(&TokenUid::new("beef")).unwrap().unwrap();
        assert_eq!(view.info.symbol, "BEF");
        assert_eq!(view.metadata.balance.tokens.unlocked, 5);
    }

    #[test]
    fn failing_lookup_aborts_replay() {
        let (store, _) = store_at(1_000);
        store.save_tx(&receive(1, 100, vec![TxOutput::new(5, "beef", "W0")])).unwrap();
        let lookup = |_: &TokenUid| -> Result<Option<TokenInfo>, LookupError> { Err("node unreachable".into()) };
        assert!(matches!(
            store.process_history(&lookup),
            Err(StorageError::TokenLookup { .. })
        ));
    }

    #[test]
    fn replay_moves_used_watermark() {
        let (store, _) = store_at(1_000);
        store
            .backend()
            .history_store()
            .save_tx(&receive(1, 100, vec![TxOutput::new(5, "00", "W2")]))
            .unwrap();
        assert_eq!(store.counters().unwrap().last_used_address_index, None);
        store.process_history(&NoTokenLookup).unwrap();
        assert_eq!(store.counters().unwrap().last_used_address_index, Some(2));
    }
}
