//! Wallet counter index trait.

use crate::StoreError;
use walletdb_types::{AccessData, ScanningPolicy, WalletCounters};

/// Scalar wallet counters, the scanning policy, the access-data record and
/// free-form JSON items.
///
/// Backends implement the raw record accessors; the per-field getters and
/// setters are read-modify-write helpers over [`WalletCounters`].
pub trait WalletDataStore {
    fn get_counters(&self) -> Result<WalletCounters, StoreError>;

    fn set_counters(&self, counters: &WalletCounters) -> Result<(), StoreError>;

    fn get_access_data(&self) -> Result<Option<AccessData>, StoreError>;

    /// Written once at wallet creation; later writes are key rotations
    /// driven by the wallet layer.
    fn save_access_data(&self, data: &AccessData) -> Result<(), StoreError>;

    fn clean_access_data(&self) -> Result<(), StoreError>;

    fn get_item(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    fn set_item(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;

    fn delete_item(&self, key: &str) -> Result<(), StoreError>;

    fn current_address_index(&self) -> Result<Option<u32>, StoreError> {
        Ok(self.get_counters()?.current_address_index)
    }

    fn set_current_address_index(&self, index: u32) -> Result<(), StoreError> {
        self.update_counters(|c| c.current_address_index = Some(index))
    }

    fn last_loaded_address_index(&self) -> Result<u32, StoreError> {
        Ok(self.get_counters()?.last_loaded_address_index)
    }

    fn set_last_loaded_address_index(&self, index: u32) -> Result<(), StoreError> {
        self.update_counters(|c| c.last_loaded_address_index = index)
    }

    fn last_used_address_index(&self) -> Result<Option<u32>, StoreError> {
        Ok(self.get_counters()?.last_used_address_index)
    }

    fn set_last_used_address_index(&self, index: u32) -> Result<(), StoreError> {
        self.update_counters(|c| c.last_used_address_index = Some(index))
    }

    fn best_block_height(&self) -> Result<u64, StoreError> {
        Ok(self.get_counters()?.best_block_height)
    }

    fn set_best_block_height(&self, height: u64) -> Result<(), StoreError> {
        self.update_counters(|c| c.best_block_height = height)
    }

    fn scanning_policy(&self) -> Result<ScanningPolicy, StoreError> {
        Ok(self.get_counters()?.scanning_policy)
    }

    fn set_scanning_policy(&self, policy: ScanningPolicy) -> Result<(), StoreError> {
        self.update_counters(|c| c.scanning_policy = policy)
    }

    /// Gap limit of a gap-limit policy, `None` for other policies.
    fn gap_limit(&self) -> Result<Option<u32>, StoreError> {
        Ok(match self.scanning_policy()? {
            ScanningPolicy::GapLimit { gap_limit } => Some(gap_limit),
            _ => None,
        })
    }

    /// Switch to a gap-limit policy with the given limit.
    fn set_gap_limit(&self, gap_limit: u32) -> Result<(), StoreError> {
        self.set_scanning_policy(ScanningPolicy::GapLimit { gap_limit })
    }

    /// Reset the address watermarks, keeping chain height and policy.
    fn reset_address_counters(&self) -> Result<(), StoreError> {
        self.update_counters(|c| {
            c.last_loaded_address_index = 0;
            c.last_used_address_index = None;
            c.current_address_index = None;
        })
    }

    fn update_counters(&self, f: impl FnOnce(&mut WalletCounters)) -> Result<(), StoreError> {
        let mut counters = self.get_counters()?;
        f(&mut counters);
        self.set_counters(&counters)
    }
}
