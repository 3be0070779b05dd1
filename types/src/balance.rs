//! Locked/unlocked balance buckets for value and authority outputs.
//!
//! Value outputs add their amount to [`Balance::tokens`]; authority outputs
//! add one unit per authority bit to the mint or melt counters.

use serde::{Deserialize, Serialize};

use crate::AuthorityFlags;

/// A pair of locked and unlocked amounts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funds {
    pub locked: u64,
    pub unlocked: u64,
}

impl Funds {
    pub fn total(&self) -> u64 {
        self.locked.saturating_add(self.unlocked)
    }

    pub fn credit(&mut self, amount: u64, locked: bool) {
        if locked {
            self.locked = self.locked.saturating_add(amount);
        } else {
            self.unlocked = self.unlocked.saturating_add(amount);
        }
    }

    pub fn debit(&mut self, amount: u64, locked: bool) {
        if locked {
            self.locked = self.locked.saturating_sub(amount);
        } else {
            self.unlocked = self.unlocked.saturating_sub(amount);
        }
    }

    /// Move `amount` from the locked to the unlocked bucket.
    pub fn unlock(&mut self, amount: u64) {
        let moved = amount.min(self.locked);
        self.locked -= moved;
        self.unlocked = self.unlocked.saturating_add(moved);
    }
}

/// Authority output counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityBalance {
    pub mint: Funds,
    pub melt: Funds,
}

/// Full balance of one token (for the wallet or for a single address).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub tokens: Funds,
    pub authorities: AuthorityBalance,
}

impl Balance {
    /// Account for an unspent output entering the wallet.
    pub fn credit(&mut self, value: u64, authorities: AuthorityFlags, locked: bool) {
        if authorities.is_authority() {
            if authorities.contains(AuthorityFlags::MINT) {
                self.authorities.mint.credit(1, locked);
            }
            if authorities.contains(AuthorityFlags::MELT) {
                self.authorities.melt.credit(1, locked);
            }
        } else {
            self.tokens.credit(value, locked);
        }
    }

    /// Account for an output leaving the wallet (spent or wiped).
    pub fn debit(&mut self, value: u64, authorities: AuthorityFlags, locked: bool) {
        if authorities.is_authority() {
            if authorities.contains(AuthorityFlags::MINT) {
                self.authorities.mint.debit(1, locked);
            }
            if authorities.contains(AuthorityFlags::MELT) {
                self.authorities.melt.debit(1, locked);
            }
        } else {
            self.tokens.debit(value, locked);
        }
    }

    /// Move an output from the locked to the unlocked bucket.
    pub fn unlock(&mut self, value: u64, authorities: AuthorityFlags) {
        if authorities.is_authority() {
            if authorities.contains(AuthorityFlags::MINT) {
                self.authorities.mint.unlock(1);
            }
            if authorities.contains(AuthorityFlags::MELT) {
                self.authorities.melt.unlock(1);
            }
        } else {
            self.tokens.unlock(value);
        }
    }
}
