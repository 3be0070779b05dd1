//! LMDB database integrity checks.
//!
//! Run before opening a wallet to detect a damaged or foreign data
//! directory early, before any index is read.

use std::path::Path;

use heed::Env;

use crate::LmdbError;

/// Summary of an integrity check run.
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub databases_checked: u32,
    pub total_entries: u64,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    /// Returns `true` if no errors were detected.
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Database names a walletdb LMDB environment contains.
pub(crate) const EXPECTED_DATABASES: &[&str] = &[
    "addresses",
    "address_index",
    "address_meta",
    "history",
    "history_time",
    "utxos",
    "utxo_token",
    "utxo_token_address",
    "locked_utxos",
    "tokens",
    "token_meta",
    "registered_tokens",
    "contracts",
    "wallet",
    "meta",
];

/// Open each expected database and count its entries. Read failures are
/// recorded in the report rather than causing a hard error.
pub fn check_integrity(env: &Env) -> Result<IntegrityReport, LmdbError> {
    let mut report = IntegrityReport::default();
    let rtxn = env.read_txn().map_err(LmdbError::from)?;

    for &db_name in EXPECTED_DATABASES {
        match env.open_database::<heed::types::Bytes, heed::types::Bytes>(&rtxn, Some(db_name)) {
            Ok(Some(db)) => {
                report.databases_checked += 1;
                match db.len(&rtxn) {
                    Ok(count) => report.total_entries += count,
                    Err(e) => report
                        .errors
                        .push(format!("failed to read database '{}': {}", db_name, e)),
                }
            }
            Ok(None) => report
                .errors
                .push(format!("database '{}' is missing", db_name)),
            Err(e) => report
                .errors
                .push(format!("failed to open database '{}': {}", db_name, e)),
        }
    }

    Ok(report)
}

/// Check that the data directory looks like an LMDB environment.
///
/// A nonexistent directory is a fresh start. An existing directory without
/// `data.mdb` is refused unless it is empty.
pub fn check_data_dir(path: &Path) -> Result<(), LmdbError> {
    if !path.exists() {
        return Ok(());
    }
    if !path.is_dir() {
        return Err(LmdbError::DataDir(format!("{} is not a directory", path.display())));
    }
    if path.join("data.mdb").exists() {
        return Ok(());
    }
    if std::fs::read_dir(path)?.next().is_none() {
        return Ok(());
    }
    Err(LmdbError::DataDir(format!(
        "directory exists but data.mdb is missing at {}",
        path.display()
    )))
}
