//! Scenarios run against both backends through the `Store` orchestrator:
//! address watermarks → history → UTXOs and metadata → selection → wipes.
//!
//! Every scenario is a generic function over `WalletStore`; the macro at
//! the bottom instantiates it once for the in-memory backend and once for
//! a throwaway LMDB environment.

use std::sync::Arc;

use walletdb_storage::{NoTokenLookup, StorageConfig, StorageError, Store};
use walletdb_store::{
    AddressStore, HistoryStore, SelectOptions, StoreError, TokenStore, UtxoStore, WalletDataStore, WalletStore,
};
use walletdb_store_lmdb::LmdbEnvironment;
use walletdb_store_memory::MemoryStore;
use walletdb_types::{
    Address, AddressInfo, AddressMetadata, Balance, HistoryTx, Timestamp, TokenInfo, TokenUid, TokenView, TxId,
    TxInput, TxOutput,
};
use walletdb_utils::NullClock;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const NOW: u64 = 1_700_000_000;

fn config(gap_limit: u32) -> StorageConfig {
    StorageConfig {
        gap_limit,
        ..StorageConfig::default()
    }
}

fn open<S: WalletStore>(backend: S, gap_limit: u32) -> (Store<S>, Arc<NullClock>) {
    let clock = Arc::new(NullClock::new(NOW));
    let store = Store::new(backend, &config(gap_limit))
        .expect("open store")
        .with_clock(clock.clone());
    (store, clock)
}

fn load_addresses<S: WalletStore>(store: &Store<S>, count: u32) {
    for index in 0..count {
        store
            .save_address(&AddressInfo::new(format!("W{index}"), index))
            .expect("save address");
    }
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

fn selected_values<S: WalletStore>(store: &Store<S>, options: SelectOptions) -> Vec<u64> {
    store
        .select_utxos(options)
        .expect("select")
        .map(|r| r.expect("candidate").value)
        .collect()
}

/// Sum of the stored UTXOs of `token`, split by lock state.
fn utxo_balance<S: WalletStore>(store: &Store<S>, token: &TokenUid) -> Balance {
    let utxos = store.backend().utxo_store();
    let mut balance = Balance::default();
    for utxo in utxos.utxo_iter().expect("utxo iter") {
        let utxo = utxo.expect("utxo");
        if &utxo.token != token {
            continue;
        }
        let locked = utxos.get_locked_utxo(&utxo.id()).expect("locked lookup").is_some();
        balance.credit(utxo.value, utxo.authorities, locked);
    }
    balance
}

/// Every known token with its metadata, plus every address with its
/// metadata, in index order.
fn metadata_snapshot<S: WalletStore>(store: &Store<S>) -> (Vec<TokenView>, Vec<(Address, AddressMetadata)>) {
    let tokens = store
        .backend()
        .token_store()
        .token_iter()
        .expect("token iter")
        .collect::<Result<Vec<_>, _>>()
        .expect("tokens");
    let addresses = store.backend().address_store();
    let mut metas = Vec::new();
    for info in addresses.address_iter().expect("address iter") {
        let info = info.expect("address");
        let meta = addresses
            .get_address_meta(&info.base58)
            .expect("address meta")
            .unwrap_or_default();
        metas.push((info.base58, meta));
    }
    (tokens, metas)
}

fn token_balance<S: WalletStore>(store: &Store<S>, token: &TokenUid) -> Balance {
    store
        .backend()
        .token_store()
        .get_token_meta(token)
        .expect("token meta")
        .unwrap_or_default()
        .balance
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

fn gap_limit_watermarks<S: WalletStore>(backend: S) {
    let (store, _) = open(backend, 3);
    assert_eq!(store.addresses_to_load().unwrap(), Some(0..=2));
    load_addresses(&store, 3);

    let counters = store.counters().unwrap();
    assert_eq!(counters.last_used_address_index, None);
    assert_eq!(counters.current_address_index, Some(0));
    assert_eq!(counters.last_loaded_address_index, 2);
    assert_eq!(store.addresses_to_load().unwrap(), None);

    store
        .save_tx(&receive(1, NOW - 10, vec![TxOutput::new(10, "00", "W1")]))
        .unwrap();
    let counters = store.counters().unwrap();
    assert_eq!(counters.last_used_address_index, Some(1));
    assert_eq!(counters.current_address_index, Some(2));
    assert_eq!(store.addresses_to_load().unwrap(), Some(3..=4));
}

fn addresses_follow_derivation_order<S: WalletStore>(backend: S) {
    let (store, _) = open(backend, 20);
    for index in [4u32, 0, 3, 1, 2] {
        store
            .save_address(&AddressInfo::new(format!("W{index}"), index))
            .unwrap();
    }
    let addresses = store.backend().address_store();
    let order: Vec<u32> = addresses
        .address_iter()
        .unwrap()
        .map(|a| a.unwrap().bip32_index)
        .collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
    for index in 0..5 {
        let info = addresses.get_address_at_index(index).unwrap().unwrap();
        assert_eq!(info.base58, Address::new(format!("W{index}")));
    }
}

fn duplicate_address_is_rejected<S: WalletStore>(backend: S) {
    let (store, _) = open(backend, 20);
    load_addresses(&store, 2);
    let before = store.counters().unwrap();

    let err = store.save_address(&AddressInfo::new("W1", 1)).unwrap_err();
    assert!(matches!(err, StorageError::Store(StoreError::DuplicateRecord(_))));
    assert_eq!(store.counters().unwrap(), before);
    assert_eq!(store.backend().address_store().address_count().unwrap(), 2);
}

fn tx_round_trip_with_voided_flip<S: WalletStore>(backend: S) {
    let (store, _) = open(backend, 20);
    load_addresses(&store, 1);
    let mut tx = receive(7, NOW - 100, vec![TxOutput::new(25, "00", "W0")]);
    tx.height = Some(42);
    assert!(store.save_tx(&tx).unwrap());

    let history = store.backend().history_store();
    assert_eq!(history.get_tx(&tx.tx_id).unwrap(), Some(tx.clone()));

    tx.is_voided = true;
    assert!(!store.save_tx(&tx).unwrap());
    assert!(history.get_tx(&tx.tx_id).unwrap().unwrap().is_voided);
    assert_eq!(history.history_count().unwrap(), 1);
}

fn timelocked_utxo_selection<S: WalletStore>(backend: S) {
    let (store, _) = open(backend, 20);
    load_addresses(&store, 1);
    let mut output = TxOutput::new(100, "X", "W0");
    output.timelock = Some(Timestamp::new(NOW + 3_600));
    store.add_tx(&receive(1, NOW - 10, vec![output])).unwrap();

    let token = TokenUid::new("X");
    assert!(selected_values(&store, SelectOptions::for_token(token.clone()).available_only()).is_empty());
    assert_eq!(selected_values(&store, SelectOptions::for_token(token)), vec![100]);
}

fn selection_stops_at_first_sufficient_prefix<S: WalletStore>(backend: S) {
    let (store, _) = open(backend, 20);
    load_addresses(&store, 2);
    store
        .add_tx(&receive(
            1,
            NOW - 10,
            vec![
                TxOutput::new(40, "00", "W0"),
                TxOutput::new(10, "00", "W1"),
                TxOutput::new(30, "00", "W0"),
                TxOutput::new(20, "00", "W1"),
            ],
        ))
        .unwrap();

    assert_eq!(selected_values(&store, SelectOptions::for_token("00").target(35)), vec![10, 20, 30]);

    let mut descending = SelectOptions::for_token("00").target(35);
    descending.order = walletdb_store::ValueOrder::Descending;
    assert_eq!(selected_values(&store, descending), vec![40]);

    let mut scoped = SelectOptions::for_token("00");
    scoped.filter_address = Some(Address::new("W1"));
    assert_eq!(selected_values(&store, scoped), vec![10, 20]);
}

fn reserved_utxos_are_skipped<S: WalletStore>(backend: S) {
    let (store, clock) = open(backend, 20);
    load_addresses(&store, 1);
    let tx = receive(1, NOW - 10, vec![TxOutput::new(5, "00", "W0"), TxOutput::new(6, "00", "W0")]);
    store.add_tx(&tx).unwrap();

    let first = store.select_utxos(SelectOptions::for_token("00").target(1)).unwrap().next().unwrap().unwrap();
    store.mark_utxo_selected(&first.id(), true, Some(30));
    assert_eq!(selected_values(&store, SelectOptions::for_token("00").available_only()), vec![6]);

    clock.advance(30);
    assert_eq!(selected_values(&store, SelectOptions::for_token("00").available_only()), vec![5, 6]);
}

fn clean_history_keeps_addresses<S: WalletStore>(backend: S) {
    let (store, _) = open(backend, 20);
    load_addresses(&store, 3);
    store.add_tx(&receive(1, NOW - 10, vec![TxOutput::new(5, "00", "W2")])).unwrap();
    let counters = store.counters().unwrap();

    store.clean_storage(true, false, false).unwrap();

    let backend = store.backend();
    assert_eq!(backend.history_store().history_count().unwrap(), 0);
    assert_eq!(backend.history_store().history_iter(None).unwrap().count(), 0);
    assert_eq!(backend.utxo_store().utxo_count().unwrap(), 0);
    assert_eq!(backend.address_store().address_count().unwrap(), 3);
    assert_eq!(store.counters().unwrap(), counters);
    assert_eq!(token_balance(&store, &TokenUid::native()), Balance::default());
}

fn metadata_matches_utxos_after_replay<S: WalletStore>(backend: S) {
    let (store, clock) = open(backend, 20);
    load_addresses(&store, 3);

    let mut locked = TxOutput::new(70, "00", "W2");
    locked.timelock = Some(Timestamp::new(NOW + 60));
    let funding = receive(
        1,
        NOW - 30,
        vec![TxOutput::new(50, "00", "W0"), TxOutput::new(20, "00", "W1"), locked],
    );
    store.add_tx(&funding).unwrap();
    store.add_tx(&spend(2, NOW - 20, &funding, 0)).unwrap();
    store.add_tx(&spend(3, NOW - 10, &funding, 2)).unwrap();
    store.add_tx(&receive(4, NOW - 5, vec![TxOutput::new(9, "beef", "W1")])).unwrap();

    let native = TokenUid::native();
    assert_eq!(token_balance(&store, &native), utxo_balance(&store, &native));

    clock.advance(120);
    let summary = store.process_history(&NoTokenLookup).unwrap();
    assert_eq!(summary.transactions, 4);
    assert_eq!(summary.utxos, 2);
    assert_eq!(token_balance(&store, &native), utxo_balance(&store, &native));
    assert_eq!(token_balance(&store, &native).tokens.unlocked, 20);
    let beef = TokenUid::new("beef");
    assert_eq!(token_balance(&store, &beef), utxo_balance(&store, &beef));

    let w1 = store.address_info(&Address::new("W1")).unwrap().unwrap();
    assert_eq!(w1.metadata.num_transactions, 2);
    assert_eq!(w1.metadata.balance_for(&beef).tokens.unlocked, 9);
}

fn locked_outputs_unlock_over_time<S: WalletStore>(backend: S) {
    let (store, clock) = open(backend, 20);
    load_addresses(&store, 1);
    let mut output = TxOutput::new(100, "00", "W0");
    output.timelock = Some(Timestamp::new(NOW + 60));
    store.add_tx(&receive(1, NOW - 10, vec![output])).unwrap();

    let native = TokenUid::native();
    assert_eq!(token_balance(&store, &native).tokens.locked, 100);
    assert_eq!(store.process_locked_utxos().unwrap(), 0);

    clock.advance(60);
    assert_eq!(store.process_locked_utxos().unwrap(), 1);
    assert_eq!(token_balance(&store, &native).tokens.unlocked, 100);
    assert_eq!(token_balance(&store, &native), utxo_balance(&store, &native));
    assert_eq!(selected_values(&store, SelectOptions::for_token("00").available_only()), vec![100]);
}

fn healthy_store_validates_cleanly<S: WalletStore>(backend: S) {
    let (store, _) = open(backend, 20);
    load_addresses(&store, 4);
    store.add_tx(&receive(1, NOW - 10, vec![TxOutput::new(5, "00", "W3")])).unwrap();
    let report = store.validate().unwrap();
    assert_eq!(report.repaired(), 0);
    assert_eq!(report.addresses.count, 4);
    assert_eq!(report.addresses.first_index, Some(0));
    assert_eq!(report.addresses.last_index, Some(3));
    assert_eq!(report.history.count, 1);
    assert_eq!(report.utxos.count, 1);
}

fn clean_tokens_drops_contracts<S: WalletStore>(backend: S) {
    let (store, _) = open(backend, 20);
    let tokens = store.backend().token_store();
    tokens.save_token(&TokenInfo::new("cafe", "Cafe", "CAF")).unwrap();
    tokens
        .register_contract(&walletdb_types::ContractRecord {
            contract_id: "c1".into(),
            blueprint_id: "b1".into(),
            blueprint_name: "Swap".into(),
            address: Address::new("W0"),
        })
        .unwrap();
    store.backend().wallet_store().set_best_block_height(9).unwrap();

    store.clean_storage(false, false, true).unwrap();
    assert_eq!(tokens.contract_iter().unwrap().count(), 0);
    assert!(tokens.has_token(&TokenUid::native()).unwrap());
    assert!(!tokens.has_token(&TokenUid::new("cafe")).unwrap());
    assert_eq!(store.counters().unwrap().best_block_height, 9);
}

fn voided_spender_restores_funding_output<S: WalletStore>(backend: S) {
    let (store, _) = open(backend, 20);
    load_addresses(&store, 1);
    let funding = receive(1, NOW - 30, vec![TxOutput::new(50, "00", "W0")]);
    store.add_tx(&funding).unwrap();
    let mut spender = spend(2, NOW - 20, &funding, 0);
    store.add_tx(&spender).unwrap();
    assert_eq!(store.backend().utxo_store().utxo_count().unwrap(), 0);

    spender.is_voided = true;
    store.add_tx(&spender).unwrap();
    let summary = store.process_history(&NoTokenLookup).unwrap();
    assert_eq!(summary.voided, 1);
    assert_eq!(summary.utxos, 1);

    let native = TokenUid::native();
    assert_eq!(token_balance(&store, &native).tokens.unlocked, 50);
    assert_eq!(token_balance(&store, &native), utxo_balance(&store, &native));
    let w0 = store.address_info(&Address::new("W0")).unwrap().unwrap();
    assert_eq!(w0.metadata.balance_for(&native).tokens.unlocked, 50);
    assert_eq!(selected_values(&store, SelectOptions::for_token("00").target(50)), vec![50]);
}

fn replay_twice_gives_identical_metadata<S: WalletStore>(backend: S) {
    let (store, _) = open(backend, 20);
    load_addresses(&store, 3);
    let mut locked = TxOutput::new(70, "00", "W2");
    locked.timelock = Some(Timestamp::new(NOW + 600));
    let funding = receive(
        1,
        NOW - 30,
        vec![TxOutput::new(50, "00", "W0"), TxOutput::new(8, "beef", "W1"), locked],
    );
    store.add_tx(&funding).unwrap();
    store.add_tx(&spend(2, NOW - 20, &funding, 0)).unwrap();

    store.process_history(&NoTokenLookup).unwrap();
    let first = metadata_snapshot(&store);
    let counters = store.counters().unwrap();
    store.process_history(&NoTokenLookup).unwrap();
    assert_eq!(metadata_snapshot(&store), first);
    assert_eq!(store.counters().unwrap(), counters);
    assert_eq!(token_balance(&store, &TokenUid::native()).tokens.locked, 70);
}

fn gap_limit_survives_reopen<S: WalletStore>(backend: S) {
    let (store, _) = open(backend, 20);
    store.backend().wallet_store().set_gap_limit(50).unwrap();
    let (reopened, _) = open(store.into_inner(), 20);
    assert_eq!(reopened.backend().wallet_store().gap_limit().unwrap(), Some(50));
}

// ---------------------------------------------------------------------------
// Backend wiring
// ---------------------------------------------------------------------------

macro_rules! on_both_backends {
    ($($scenario:ident),+ $(,)?) => {
        mod memory {
            $(
                #[test]
                fn $scenario() {
                    super::$scenario(super::MemoryStore::new());
                }
            )+
        }

        mod lmdb {
            $(
                #[test]
                fn $scenario() {
                    let dir = tempfile::tempdir().expect("temp dir");
                    let env = super::LmdbEnvironment::open(dir.path(), 30, 64 * 1024 * 1024)
                        .expect("open env");
                    super::$scenario(env);
                }
            )+
        }
    };
}

on_both_backends!(
    gap_limit_watermarks,
    addresses_follow_derivation_order,
    duplicate_address_is_rejected,
    tx_round_trip_with_voided_flip,
    timelocked_utxo_selection,
    selection_stops_at_first_sufficient_prefix,
    reserved_utxos_are_skipped,
    clean_history_keeps_addresses,
    metadata_matches_utxos_after_replay,
    locked_outputs_unlock_over_time,
    healthy_store_validates_cleanly,
    clean_tokens_drops_contracts,
    voided_spender_restores_funding_output,
    replay_twice_gives_identical_metadata,
    gap_limit_survives_reopen,
);
