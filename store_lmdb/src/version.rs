//! On-disk index version check.
//!
//! A fresh database is stamped with [`INDEX_VERSION`]; an existing one must
//! carry exactly that version or it is refused. The key layout changes only
//! together with the version, so there is no in-place upgrade path: a
//! mismatching database must be cleared and rebuilt from history.

use heed::RwTxn;

use walletdb_store::INDEX_VERSION;

use crate::cursor::Table;
use crate::LmdbError;

pub(crate) const INDEX_VERSION_KEY: &[u8] = b"index_version";

/// Stamp or verify the stored index version inside `wtxn`.
pub(crate) fn ensure_index_version(wtxn: &mut RwTxn, meta_db: &Table) -> Result<(), LmdbError> {
    let stored = meta_db
        .get(wtxn, INDEX_VERSION_KEY)
        .map_err(LmdbError::from)?
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned());

    match stored {
        None => {
            meta_db
                .put(wtxn, INDEX_VERSION_KEY, INDEX_VERSION.as_bytes())
                .map_err(LmdbError::from)?;
            tracing::info!(version = INDEX_VERSION, "stamped fresh index database");
            Ok(())
        }
        Some(found) if found == INDEX_VERSION => {
            tracing::info!(version = INDEX_VERSION, "index version is up to date");
            Ok(())
        }
        Some(found) => Err(LmdbError::VersionMismatch {
            expected: INDEX_VERSION.to_string(),
            found,
        }),
    }
}
