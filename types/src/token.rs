//! Token identifiers, configuration and aggregate metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Address, Balance};

/// Uid of the chain's native token.
pub const NATIVE_TOKEN_UID: &str = "00";

/// A token uid: the hex id of the token-creation transaction, or `"00"`
/// for the native token.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenUid(String);

impl TokenUid {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn native() -> Self {
        Self(NATIVE_TOKEN_UID.to_string())
    }

    pub fn is_native(&self) -> bool {
        self.0 == NATIVE_TOKEN_UID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this uid can be embedded in a storage key (non-empty, NUL-free).
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.0.contains('\0')
    }
}

impl Default for TokenUid {
    fn default() -> Self {
        Self::native()
    }
}

impl fmt::Display for TokenUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TokenUid {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Token configuration as registered by the token creator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub uid: TokenUid,
    pub name: String,
    pub symbol: String,
}

impl TokenInfo {
    pub fn new(uid: impl Into<TokenUid>, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            symbol: symbol.into(),
        }
    }

    /// Configuration of the native token, always known to every wallet.
    pub fn native() -> Self {
        Self::new(TokenUid::native(), "Native Token", "NTV")
    }
}

/// Aggregates derived from history for one token.
///
/// Must equal the sum over all stored UTXOs of that token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub num_transactions: u64,
    pub balance: Balance,
}

/// Token configuration merged with its metadata (zeroed when absent).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenView {
    pub info: TokenInfo,
    pub metadata: TokenMetadata,
}

/// A contract the user chose to track.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub contract_id: String,
    pub blueprint_id: String,
    pub blueprint_name: String,
    /// Wallet address used to interact with the contract.
    pub address: Address,
}
