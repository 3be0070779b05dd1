//! Wallet address type, its derivation record and per-address metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Balance, TokenUid};

/// A base58-encoded wallet address.
///
/// Storage keys embed the address followed by a `0x00` terminator, so a
/// valid address is non-empty and never contains a NUL character.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Return the raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this address can be stored (non-empty, NUL-free).
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.0.contains('\0')
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// An address produced by the derivation step.
///
/// Immutable once saved: both the address and the derivation index are unique.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub base58: Address,
    /// Position of the address in the HD derivation path.
    pub bip32_index: u32,
    pub public_key: Option<String>,
}

impl AddressInfo {
    pub fn new(base58: impl Into<Address>, bip32_index: u32) -> Self {
        Self {
            base58: base58.into(),
            bip32_index,
            public_key: None,
        }
    }
}

/// Aggregates derived from history for a single address.
///
/// Rebuildable at any time by replaying history.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressMetadata {
    pub num_transactions: u64,
    pub balance: BTreeMap<TokenUid, Balance>,
}

impl AddressMetadata {
    /// Balance held by this address for `token`, zero when absent.
    pub fn balance_for(&self, token: &TokenUid) -> Balance {
        self.balance.get(token).cloned().unwrap_or_default()
    }

    pub fn balance_mut(&mut self, token: &TokenUid) -> &mut Balance {
        self.balance.entry(token.clone()).or_default()
    }
}
