//! walletdb command line: inspect, validate and replay a wallet store.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use walletdb_storage::{Backend, NoTokenLookup, StorageConfig, Store};
use walletdb_store::{
    AddressStore, HistoryStore, SelectOptions, TokenStore, UtxoRangeQuery, UtxoStore, WalletStore,
};
use walletdb_store_lmdb::LmdbEnvironment;
use walletdb_store_memory::MemoryStore;
use walletdb_types::TokenUid;
use walletdb_utils::LogFormat;

#[derive(Parser)]
#[command(name = "walletdb", about = "Wallet storage and indexing engine")]
struct Cli {
    /// Directory holding the LMDB environment.
    #[arg(long, env = "WALLETDB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Storage backend: "lmdb" or "memory".
    #[arg(long, env = "WALLETDB_BACKEND", value_parser = parse_backend)]
    backend: Option<Backend>,

    /// Log output: "human" or "json".
    #[arg(long, env = "WALLETDB_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "WALLETDB_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Check every index, repairing missing secondary entries.
    Validate,
    /// List addresses in derivation order.
    Addresses,
    /// List transactions, most recent first.
    History {
        #[arg(long)]
        token: Option<String>,
    },
    /// List unspent outputs, ascending by value for one token.
    Utxos {
        #[arg(long)]
        token: Option<String>,
    },
    /// List known tokens with their balances.
    Tokens,
    /// Print the wallet counters and scanning policy.
    Counters,
    /// Run coin selection for an amount of a token.
    Select {
        #[arg(long, default_value = "00")]
        token: String,
        #[arg(long)]
        amount: u64,
        /// Skip time- and height-locked outputs.
        #[arg(long)]
        available: bool,
    },
    /// Rebuild UTXOs and metadata from the stored history.
    Replay,
    /// Release outputs whose time or height lock has expired.
    Unlock,
}

fn parse_backend(s: &str) -> Result<Backend, String> {
    match s.to_ascii_lowercase().as_str() {
        "lmdb" => Ok(Backend::Lmdb),
        "memory" => Ok(Backend::Memory),
        other => Err(format!("unknown backend {other:?} (expected \"lmdb\" or \"memory\")")),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<StorageConfig> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => StorageConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    walletdb_utils::init_logging(config.log_format, &config.log_level);

    match config.backend {
        Backend::Lmdb => {
            let env = LmdbEnvironment::open(&config.data_dir, config.max_dbs, config.map_size)
                .with_context(|| format!("opening {}", config.data_dir.display()))?;
            if matches!(cli.command, Command::Validate) {
                let report = env.check_integrity()?;
                println!(
                    "{}",
                    json!({
                        "databases_checked": report.databases_checked,
                        "total_entries": report.total_entries,
                        "errors": report.errors,
                    })
                );
                anyhow::ensure!(report.is_healthy(), "integrity check failed");
            }
            run(&Store::new(env, &config)?, &cli.command)
        }
        Backend::Memory => {
            tracing::warn!("memory backend selected, the store starts empty");
            run(&Store::new(MemoryStore::new(), &config)?, &cli.command)
        }
    }
}

fn run<S: WalletStore>(store: &Store<S>, command: &Command) -> anyhow::Result<()> {
    let backend = store.backend();
    match command {
        Command::Validate => {
            let report = store.validate()?;
            println!(
                "{}",
                json!({
                    "addresses": report.addresses.count,
                    "first_index": report.addresses.first_index,
                    "last_index": report.addresses.last_index,
                    "transactions": report.history.count,
                    "utxos": report.utxos.count,
                    "repaired": report.repaired(),
                })
            );
        }
        Command::Addresses => {
            for info in backend.address_store().address_iter()? {
                println!("{}", serde_json::to_string(&info?)?);
            }
        }
        Command::History { token } => {
            let token = token.as_deref().map(TokenUid::new);
            for tx in backend.history_store().history_iter(token)? {
                println!("{}", serde_json::to_string(&tx?)?);
            }
        }
        Command::Utxos { token } => {
            let utxos = backend.utxo_store();
            let iter = match token {
                Some(token) => utxos.utxo_range(&UtxoRangeQuery::token(TokenUid::new(token.as_str())))?,
                None => utxos.utxo_iter()?,
            };
            for utxo in iter {
                println!("{}", serde_json::to_string(&utxo?)?);
            }
        }
        Command::Tokens => {
            for view in backend.token_store().token_iter()? {
                let view = view?;
                let balance = view.metadata.balance;
                println!(
                    "{}",
                    json!({
                        "uid": view.info.uid,
                        "name": view.info.name,
                        "symbol": view.info.symbol,
                        "transactions": view.metadata.num_transactions,
                        "unlocked": balance.tokens.unlocked,
                        "locked": balance.tokens.locked,
                        "mint_authorities": balance.authorities.mint.total(),
                        "melt_authorities": balance.authorities.melt.total(),
                    })
                );
            }
        }
        Command::Counters => {
            println!("{}", serde_json::to_string(&store.counters()?)?);
        }
        Command::Select {
            token,
            amount,
            available,
        } => {
            let mut options = SelectOptions::for_token(token.as_str()).target(*amount);
            options.only_available_utxos = *available;
            let mut selection = store.select_utxos(options)?;
            let mut picked = Vec::new();
            for utxo in selection.by_ref() {
                picked.push(utxo?);
            }
            let total = selection.total();
            for utxo in &picked {
                println!("{}", serde_json::to_string(utxo)?);
            }
            anyhow::ensure!(
                total >= *amount,
                "insufficient funds: selected {total} of {amount} across {} outputs",
                picked.len()
            );
        }
        Command::Replay => {
            let summary = store.process_history(&NoTokenLookup)?;
            println!(
                "{}",
                json!({
                    "transactions": summary.transactions,
                    "voided": summary.voided,
                    "utxos": summary.utxos,
                })
            );
        }
        Command::Unlock => {
            let unlocked = store.process_locked_utxos()?;
            println!("{}", json!({ "unlocked": unlocked }));
        }
    }
    Ok(())
}
