//! Wallet counters, scanning policy and access data.

use serde::{Deserialize, Serialize};

/// Default number of unused addresses kept derived past the last used one.
pub const DEFAULT_GAP_LIMIT: u32 = 20;

/// How the discovery loop decides which addresses to derive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanningPolicy {
    /// Keep `gap_limit` unused addresses derived past the last used one.
    GapLimit { gap_limit: u32 },
    /// Derive a fixed inclusive index range.
    IndexLimit { start: u32, end: u32 },
    /// Only derive what the user asks for.
    Manual,
}

impl Default for ScanningPolicy {
    fn default() -> Self {
        Self::GapLimit {
            gap_limit: DEFAULT_GAP_LIMIT,
        }
    }
}

/// Watermark counters tracking address discovery and usage.
///
/// Invariants: `current_address_index <= last_loaded_address_index` and
/// `last_used_address_index <= last_loaded_address_index`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCounters {
    pub last_loaded_address_index: u32,
    /// `None` until a transaction touches a wallet address.
    pub last_used_address_index: Option<u32>,
    /// `None` until the first address is saved.
    pub current_address_index: Option<u32>,
    pub best_block_height: u64,
    pub scanning_policy: ScanningPolicy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletType {
    #[default]
    P2pkh,
    MultiSig,
}

/// Key material encrypted by the wallet layer; stored opaquely.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    pub data: String,
    pub hash: String,
    pub salt: String,
    pub iterations: u32,
    pub pbkdf2_hasher: String,
}

/// One-shot access record written when the wallet is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessData {
    pub wallet_type: WalletType,
    /// Account-level extended public key.
    pub xpubkey: String,
    pub main_key: Option<EncryptedData>,
    pub acct_path_key: Option<EncryptedData>,
    pub auth_key: Option<EncryptedData>,
    pub words: Option<EncryptedData>,
    pub wallet_flags: u8,
}

impl AccessData {
    /// Access data for a read-only wallet holding only public key material.
    pub fn read_only(xpubkey: impl Into<String>) -> Self {
        Self {
            wallet_type: WalletType::P2pkh,
            xpubkey: xpubkey.into(),
            main_key: None,
            acct_path_key: None,
            auth_key: None,
            words: None,
            wallet_flags: 0,
        }
    }
}
