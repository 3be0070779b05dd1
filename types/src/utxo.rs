//! Unspent outputs and authority flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

use crate::{Address, HistoryTx, Timestamp, TokenUid, TxId, TxOutput, TxVersion};

/// Mint/melt authority bits carried by an output.
///
/// An output with no bits set is a plain value-transfer output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuthorityFlags(u8);

impl AuthorityFlags {
    pub const NONE: Self = Self(0);
    pub const MINT: Self = Self(0b01);
    pub const MELT: Self = Self(0b10);
    pub const ALL: Self = Self(0b11);

    /// Unknown bits are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_authority(&self) -> bool {
        self.0 != 0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for AuthorityFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Primary key of an output: `(tx_id, index)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UtxoId {
    pub tx_id: TxId,
    pub index: u32,
}

impl UtxoId {
    pub fn new(tx_id: TxId, index: u32) -> Self {
        Self { tx_id, index }
    }
}

impl fmt::Display for UtxoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.index)
    }
}

/// An unspent output owned by the wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_id: TxId,
    pub index: u32,
    pub token: TokenUid,
    pub address: Address,
    pub value: u64,
    pub authorities: AuthorityFlags,
    pub timelock: Option<Timestamp>,
    /// Height of the creating block, when known.
    pub height: Option<u64>,
    pub version: TxVersion,
}

impl Utxo {
    /// Build the UTXO for output `index` of `tx`; `None` when the output
    /// is missing or has no decoded address.
    pub fn from_output(tx: &HistoryTx, index: u32) -> Option<Self> {
        let output: &TxOutput = tx.outputs.get(index as usize)?;
        let address = output.address.clone()?;
        Some(Self {
            tx_id: tx.tx_id,
            index,
            token: output.token.clone(),
            address,
            value: output.value,
            authorities: output.authorities,
            timelock: output.timelock,
            height: tx.height,
            version: tx.version,
        })
    }

    pub fn id(&self) -> UtxoId {
        UtxoId::new(self.tx_id, self.index)
    }

    pub fn is_authority(&self) -> bool {
        self.authorities.is_authority()
    }

    /// Timelock set and still in the future.
    pub fn is_time_locked(&self, now: Timestamp) -> bool {
        self.timelock.map_or(false, |t| t.is_after(now))
    }

    /// Block reward that has not matured yet.
    ///
    /// A reward output with an unknown height counts as locked.
    pub fn is_height_locked(&self, current_height: u64, reward_lock: u64) -> bool {
        if !self.version.is_block() || reward_lock == 0 {
            return false;
        }
        match self.height {
            Some(h) => current_height < h.saturating_add(reward_lock),
            None => true,
        }
    }

    pub fn is_locked(&self, now: Timestamp, current_height: u64, reward_lock: u64) -> bool {
        self.is_time_locked(now) || self.is_height_locked(current_height, reward_lock)
    }
}

/// An unspent output that is still time- or height-locked.
///
/// Keeps the whole transaction so lock re-evaluation needs no extra lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedUtxo {
    pub tx: HistoryTx,
    pub index: u32,
}

impl LockedUtxo {
    pub fn id(&self) -> UtxoId {
        UtxoId::new(self.tx.tx_id, self.index)
    }

    pub fn output(&self) -> Option<&TxOutput> {
        self.tx.outputs.get(self.index as usize)
    }

    pub fn utxo(&self) -> Option<Utxo> {
        Utxo::from_output(&self.tx, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reward(height: Option<u64>) -> Utxo {
        Utxo {
            tx_id: TxId::new([9; 32]),
            index: 0,
            token: TokenUid::native(),
            address: Address::new("W1"),
            value: 6400,
            authorities: AuthorityFlags::NONE,
            timelock: None,
            height,
            version: TxVersion::Block,
        }
    }

    #[test]
    fn reward_matures_after_lock_window() {
        let u = reward(Some(10));
        assert!(u.is_height_locked(10, 5));
        assert!(u.is_height_locked(14, 5));
        assert!(!u.is_height_locked(15, 5));
        assert!(!u.is_height_locked(0, 0));
    }

    #[test]
    fn reward_without_height_is_locked() {
        assert!(reward(None).is_height_locked(1_000, 1));
    }

    #[test]
    fn timelock_in_future_is_locked() {
        let mut u = reward(Some(0));
        u.version = TxVersion::Regular;
        u.timelock = Some(Timestamp::new(100));
        assert!(u.is_time_locked(Timestamp::new(99)));
        assert!(!u.is_time_locked(Timestamp::new(100)));
        assert!(!u.is_locked(Timestamp::new(150), 0, 10));
    }

    #[test]
    fn authority_flags_mask_unknown_bits() {
        let flags = AuthorityFlags::from_bits(0xff);
        assert_eq!(flags, AuthorityFlags::ALL);
        assert!(flags.contains(AuthorityFlags::MINT));
        assert!(AuthorityFlags::MELT.intersects(flags));
        assert!(!AuthorityFlags::NONE.is_authority());
    }

    #[test]
    fn from_output_requires_address() {
        let mut tx = HistoryTx::new(TxId::new([1; 32]), Timestamp::new(1));
        tx.outputs.push(TxOutput::new(5, "00", "W1"));
        let mut anonymous = TxOutput::new(6, "00", "W2");
        anonymous.address = None;
        tx.outputs.push(anonymous);

        assert_eq!(Utxo::from_output(&tx, 0).map(|u| u.value), Some(5));
        assert!(Utxo::from_output(&tx, 1).is_none());
        assert!(Utxo::from_output(&tx, 2).is_none());
    }
}
