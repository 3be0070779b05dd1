//! Paged range reads over byte-keyed databases.
//!
//! Every key is stored in its `IndexKey` encoding, whose byte order equals
//! the typed order, so cursors page over raw bytes. Each page runs in its
//! own read transaction.

use std::ops::Bound;

use heed::types::Bytes;
use heed::{Database, Env, RoTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use walletdb_store::{Direction, KeyRange, PagedCursor, StoreError, StoreIter};

use crate::LmdbError;

pub(crate) type Table = Database<Bytes, Bytes>;

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LmdbError> {
    Ok(bincode::serialize(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LmdbError> {
    Ok(bincode::deserialize(bytes)?)
}

fn slice_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(k) => Bound::Included(k.as_slice()),
        Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Read up to `limit` entries of `range` from `table`, resolving each value
/// through `resolve` within the same read transaction.
pub(crate) fn page<T>(
    env: &Env,
    table: &Table,
    range: &KeyRange<Vec<u8>>,
    limit: usize,
    mut resolve: impl FnMut(&RoTxn, &[u8], &[u8]) -> Result<Option<T>, StoreError>,
) -> Result<Vec<(Vec<u8>, Option<T>)>, StoreError> {
    if range.is_empty() {
        return Ok(Vec::new());
    }
    let rtxn = env.read_txn().map_err(LmdbError::from)?;
    let bounds = (slice_bound(&range.start), slice_bound(&range.end));
    let mut entries = Vec::with_capacity(limit);
    match range.direction {
        Direction::Forward => {
            for item in table.range(&rtxn, &bounds).map_err(LmdbError::from)?.take(limit) {
                let (key, value) = item.map_err(LmdbError::from)?;
                entries.push((key.to_vec(), resolve(&rtxn, key, value)?));
            }
        }
        Direction::Reverse => {
            for item in table.rev_range(&rtxn, &bounds).map_err(LmdbError::from)?.take(limit) {
                let (key, value) = item.map_err(LmdbError::from)?;
                entries.push((key.to_vec(), resolve(&rtxn, key, value)?));
            }
        }
    }
    Ok(entries)
}

/// Lazy iterator over `range` of `table`; entries resolved to `None` are skipped.
pub(crate) fn scan<'a, T: 'a>(
    env: &'a Env,
    table: Table,
    range: KeyRange<Vec<u8>>,
    mut resolve: impl FnMut(&RoTxn, &[u8], &[u8]) -> Result<Option<T>, StoreError> + 'a,
) -> StoreIter<'a, T> {
    let cursor = PagedCursor::new(range, move |range: &KeyRange<Vec<u8>>, limit| {
        page(env, &table, range, limit, &mut resolve)
    });
    Box::new(cursor.filter_map(Result::transpose))
}

/// Decode every value of a table into a lazy iterator.
pub(crate) fn scan_values<'a, T: DeserializeOwned + 'a>(env: &'a Env, table: Table) -> StoreIter<'a, T> {
    scan(env, table, KeyRange::all(Direction::Forward), |_, _, value| {
        Ok(Some(decode(value)?))
    })
}
