//! Lazy, restartable range iteration shared by every backend.
//!
//! A [`PagedCursor`] pulls fixed-size pages from the backend and resumes each
//! page strictly after the last key it yielded. No snapshot is held between
//! pages, so writes made while a cursor is alive may or may not be observed,
//! and dropping the cursor early needs no cleanup.

use std::collections::VecDeque;
use std::ops::Bound;

use crate::StoreError;

/// Boxed lazy iterator returned by the index traits.
pub type StoreIter<'a, T> = Box<dyn Iterator<Item = Result<T, StoreError>> + 'a>;

/// Entries fetched per backend round trip.
pub const PAGE_SIZE: usize = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Forward,
    /// Descending key order.
    Reverse,
}

/// Key bounds plus scan direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRange<K> {
    pub start: Bound<K>,
    pub end: Bound<K>,
    pub direction: Direction,
}

impl<K: Ord + Clone> KeyRange<K> {
    pub fn all(direction: Direction) -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
            direction,
        }
    }

    pub fn inclusive(low: K, high: K, direction: Direction) -> Self {
        Self {
            start: Bound::Included(low),
            end: Bound::Included(high),
            direction,
        }
    }

    /// Whether no key can satisfy both bounds.
    ///
    /// `BTreeMap::range` panics on such bounds, so callers check first.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(a), Bound::Included(b)) => a > b,
            (Bound::Included(a), Bound::Excluded(b))
            | (Bound::Excluded(a), Bound::Included(b))
            | (Bound::Excluded(a), Bound::Excluded(b)) => a >= b,
            _ => false,
        }
    }

    /// The part of this range still to visit after yielding `last`.
    pub fn resume_after(&self, last: &K) -> Self {
        match self.direction {
            Direction::Forward => Self {
                start: Bound::Excluded(last.clone()),
                end: self.end.clone(),
                direction: self.direction,
            },
            Direction::Reverse => Self {
                start: self.start.clone(),
                end: Bound::Excluded(last.clone()),
                direction: self.direction,
            },
        }
    }

    pub fn as_ref_bounds(&self) -> (Bound<&K>, Bound<&K>) {
        (self.start.as_ref(), self.end.as_ref())
    }

    /// Map both bounds through `f` (e.g. typed key to encoded bytes).
    pub fn map<U>(&self, mut f: impl FnMut(&K) -> U) -> KeyRange<U> {
        let mut map_bound = |b: &Bound<K>| match b {
            Bound::Included(k) => Bound::Included(f(k)),
            Bound::Excluded(k) => Bound::Excluded(f(k)),
            Bound::Unbounded => Bound::Unbounded,
        };
        KeyRange {
            start: map_bound(&self.start),
            end: map_bound(&self.end),
            direction: self.direction,
        }
    }
}

/// Iterator that refills from `fetch` one page at a time.
///
/// `fetch(range, limit)` must return at most `limit` entries of `range` in
/// the range's direction. A short page marks the end of the scan.
pub struct PagedCursor<K, T, F> {
    fetch: F,
    range: KeyRange<K>,
    buffer: VecDeque<(K, T)>,
    page_size: usize,
    exhausted: bool,
}

impl<K, T, F> PagedCursor<K, T, F>
where
    K: Ord + Clone,
    F: FnMut(&KeyRange<K>, usize) -> Result<Vec<(K, T)>, StoreError>,
{
    pub fn new(range: KeyRange<K>, fetch: F) -> Self {
        Self::with_page_size(range, PAGE_SIZE, fetch)
    }

    pub fn with_page_size(range: KeyRange<K>, page_size: usize, fetch: F) -> Self {
        let exhausted = range.is_empty();
        Self {
            fetch,
            range,
            buffer: VecDeque::new(),
            page_size: page_size.max(1),
            exhausted,
        }
    }

    fn refill(&mut self) -> Result<(), StoreError> {
        let page = (self.fetch)(&self.range, self.page_size)?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some((last, _)) = page.last() {
            self.range = self.range.resume_after(last);
            if self.range.is_empty() {
                self.exhausted = true;
            }
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<K, T, F> Iterator for PagedCursor<K, T, F>
where
    K: Ord + Clone,
    F: FnMut(&KeyRange<K>, usize) -> Result<Vec<(K, T)>, StoreError>,
{
    type Item = Result<T, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.refill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(|(_, item)| Ok(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn source(n: u32) -> BTreeMap<u32, u32> {
        (0..n).map(|i| (i, i * 10)).collect()
    }

    fn fetch_from(
        map: &BTreeMap<u32, u32>,
    ) -> impl FnMut(&KeyRange<u32>, usize) -> Result<Vec<(u32, u32)>, StoreError> + '_ {
        move |range, limit| {
            let iter = map.range(range.as_ref_bounds()).map(|(k, v)| (*k, *v));
            Ok(match range.direction {
                Direction::Forward => iter.take(limit).collect(),
                Direction::Reverse => iter.rev().take(limit).collect(),
            })
        }
    }

    #[test]
    fn walks_every_page_forward() {
        let map = source(10);
        let cursor = PagedCursor::with_page_size(KeyRange::all(Direction::Forward), 3, fetch_from(&map));
        let values: Vec<u32> = cursor.map(Result::unwrap).collect();
        assert_eq!(values, (0..10).map(|i| i * 10).collect::<Vec<_>>());
    }

    #[test]
    fn walks_reverse_within_bounds() {
        let map = source(10);
        let range = KeyRange::inclusive(2, 7, Direction::Reverse);
        let cursor = PagedCursor::with_page_size(range, 4, fetch_from(&map));
        let values: Vec<u32> = cursor.map(Result::unwrap).collect();
        assert_eq!(values, vec![70, 60, 50, 40, 30, 20]);
    }

    #[test]
    fn inverted_range_yields_nothing_without_fetching() {
        let range = KeyRange::inclusive(5u32, 1, Direction::Forward);
        let mut cursor = PagedCursor::new(range, |_: &KeyRange<u32>, _| -> Result<Vec<(u32, u32)>, StoreError> {
            panic!("must not fetch an empty range")
        });
        assert!(cursor.next().is_none());
    }

    #[test]
    fn fetch_error_is_yielded_once() {
        let mut cursor = PagedCursor::new(KeyRange::<u32>::all(Direction::Forward), |_: &KeyRange<u32>, _| -> Result<Vec<(u32, u32)>, StoreError> {
            Err(StoreError::Backend("disk gone".into()))
        });
        assert!(matches!(cursor.next(), Some(Err(StoreError::Backend(_)))));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn sees_writes_made_between_pages() {
        let map = std::cell::RefCell::new(source(4));
        let mut cursor = PagedCursor::with_page_size(KeyRange::all(Direction::Forward), 2, |range: &KeyRange<u32>, limit| {
            Ok(map
                .borrow()
                .range(range.as_ref_bounds())
                .take(limit)
                .map(|(k, v)| (*k, *v))
                .collect())
        });
        assert_eq!(cursor.next().unwrap().unwrap(), 0);
        map.borrow_mut().insert(100, 1000);
        let rest: Vec<u32> = cursor.map(Result::unwrap).collect();
        assert_eq!(rest, vec![10, 20, 30, 1000]);
    }
}
