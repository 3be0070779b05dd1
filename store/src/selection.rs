//! Streaming coin selection.
//!
//! Selection is greedy and follows index order: candidates are visited in
//! the order of the chosen secondary index (ascending value by default,
//! descending when reversed) and accepted one by one until the target is
//! met. It does not minimise the number of UTXOs or the change left over.
//!
//! For every candidate inside the key range:
//! 1. with `only_available_utxos`, time- or height-locked outputs are skipped;
//! 2. outputs rejected by the caller predicate are skipped;
//! 3. outputs that would push the running sum past `max_amount` are skipped
//!    and the scan continues;
//! 4. anything else is yielded and added to the running sum and count;
//! 5. the scan stops once `sum >= target_amount` or `count >= max_utxos`.

use std::fmt;
use std::sync::Arc;

use walletdb_types::{Address, AuthorityFlags, Timestamp, TokenUid, Utxo};

use crate::cursor::{Direction, StoreIter};
use crate::keys::UtxoKind;
use crate::StoreError;

/// Caller-supplied acceptance predicate.
pub type UtxoFilter = Arc<dyn Fn(&Utxo) -> bool + Send + Sync>;

/// Order in which candidates are visited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValueOrder {
    #[default]
    Ascending,
    Descending,
}

impl From<ValueOrder> for Direction {
    fn from(order: ValueOrder) -> Self {
        match order {
            ValueOrder::Ascending => Direction::Forward,
            ValueOrder::Descending => Direction::Reverse,
        }
    }
}

/// Query handed to a backend's range scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxoRangeQuery {
    pub kind: UtxoKind,
    pub token: TokenUid,
    /// When set, the address-scoped index is used.
    pub address: Option<Address>,
    /// Inclusive.
    pub min_value: u64,
    /// Inclusive.
    pub max_value: u64,
    pub direction: Direction,
}

impl UtxoRangeQuery {
    /// Every value output of `token`, ascending.
    pub fn token(token: TokenUid) -> Self {
        Self {
            kind: UtxoKind::Value,
            token,
            address: None,
            min_value: 0,
            max_value: u64::MAX,
            direction: Direction::Forward,
        }
    }
}

#[derive(Clone, Default)]
pub struct SelectOptions {
    pub token: TokenUid,
    /// `NONE` selects value outputs; any other mask selects authority
    /// outputs carrying at least one of the requested bits.
    pub authorities: AuthorityFlags,
    pub filter_address: Option<Address>,
    /// Inclusive lower bound on output value.
    pub min_value: Option<u64>,
    /// Inclusive upper bound on output value.
    pub max_value: Option<u64>,
    /// Stop once the selected sum reaches this amount.
    pub target_amount: Option<u64>,
    /// Never let the selected sum exceed this amount.
    pub max_amount: Option<u64>,
    pub max_utxos: Option<usize>,
    pub only_available_utxos: bool,
    pub filter: Option<UtxoFilter>,
    pub order: ValueOrder,
}

impl SelectOptions {
    pub fn for_token(token: impl Into<TokenUid>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn target(mut self, amount: u64) -> Self {
        self.target_amount = Some(amount);
        self
    }

    pub fn available_only(mut self) -> Self {
        self.only_available_utxos = true;
        self
    }

    pub fn with_filter(mut self, filter: impl Fn(&Utxo) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Reject option combinations that have no meaning.
    pub fn check(&self) -> Result<(), StoreError> {
        if self.target_amount.is_some() && self.max_amount.is_some() {
            return Err(StoreError::InvalidQuery(
                "target_amount and max_amount are mutually exclusive".into(),
            ));
        }
        if !self.token.is_valid() {
            return Err(StoreError::InvalidQuery(format!("invalid token uid {:?}", self.token.as_str())));
        }
        if let Some(address) = &self.filter_address {
            if !address.is_valid() {
                return Err(StoreError::InvalidQuery(format!("invalid address {:?}", address.as_str())));
            }
        }
        Ok(())
    }

    pub fn range_query(&self) -> UtxoRangeQuery {
        UtxoRangeQuery {
            kind: UtxoKind::of(self.authorities),
            token: self.token.clone(),
            address: self.filter_address.clone(),
            min_value: self.min_value.unwrap_or(0),
            max_value: self.max_value.unwrap_or(u64::MAX),
            direction: self.order.into(),
        }
    }
}

impl fmt::Debug for SelectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectOptions")
            .field("token", &self.token)
            .field("authorities", &self.authorities)
            .field("filter_address", &self.filter_address)
            .field("min_value", &self.min_value)
            .field("max_value", &self.max_value)
            .field("target_amount", &self.target_amount)
            .field("max_amount", &self.max_amount)
            .field("max_utxos", &self.max_utxos)
            .field("only_available_utxos", &self.only_available_utxos)
            .field("filter", &self.filter.is_some())
            .field("order", &self.order)
            .finish()
    }
}

/// Chain state used to evaluate locks during selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionContext {
    pub now: Timestamp,
    pub current_height: u64,
    /// Blocks a reward output stays locked after its creating block.
    pub reward_lock: u64,
}

/// Lazy selection over a candidate stream.
pub struct Selection<'a> {
    candidates: StoreIter<'a, Utxo>,
    options: SelectOptions,
    ctx: SelectionContext,
    sum: u64,
    count: usize,
    done: bool,
}

impl<'a> Selection<'a> {
    pub fn new(candidates: StoreIter<'a, Utxo>, options: SelectOptions, ctx: SelectionContext) -> Self {
        Self {
            candidates,
            options,
            ctx,
            sum: 0,
            count: 0,
            done: false,
        }
    }

    /// Sum of the values yielded so far.
    pub fn total(&self) -> u64 {
        self.sum
    }

    /// Number of UTXOs yielded so far.
    pub fn count(&self) -> usize {
        self.count
    }

    fn is_satisfied(&self) -> bool {
        self.options.target_amount.map_or(false, |t| self.sum >= t)
            || self.options.max_utxos.map_or(false, |m| self.count >= m)
    }

    fn accepts(&self, utxo: &Utxo) -> bool {
        // The key range already pins token and partition; the mask narrows
        // authority selections to the requested bits.
        if self.options.authorities.is_authority() && !utxo.authorities.intersects(self.options.authorities) {
            return false;
        }
        if self.options.only_available_utxos
            && utxo.is_locked(self.ctx.now, self.ctx.current_height, self.ctx.reward_lock)
        {
            return false;
        }
        if let Some(filter) = &self.options.filter {
            if !filter(utxo) {
                return false;
            }
        }
        if let Some(max) = self.options.max_amount {
            if self.sum.checked_add(utxo.value).map_or(true, |s| s > max) {
                return false;
            }
        }
        true
    }
}

impl Iterator for Selection<'_> {
    type Item = Result<Utxo, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.is_satisfied() {
            self.done = true;
            return None;
        }
        loop {
            let utxo = match self.candidates.next()? {
                Ok(utxo) => utxo,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            if !self.accepts(&utxo) {
                continue;
            }
            self.sum = self.sum.saturating_add(utxo.value);
            self.count += 1;
            return Some(Ok(utxo));
        }
    }
}
