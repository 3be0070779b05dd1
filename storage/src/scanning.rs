//! Address discovery ranges derived from the scanning policy.

use std::ops::RangeInclusive;

use walletdb_types::{ScanningPolicy, WalletCounters};

/// Next inclusive derivation range the discovery loop must derive and save,
/// or `None` when nothing is missing.
///
/// `has_addresses` disambiguates `last_loaded_address_index == 0` between
/// "index 0 is loaded" and "nothing is loaded yet".
pub fn addresses_to_load(
    policy: ScanningPolicy,
    counters: &WalletCounters,
    has_addresses: bool,
) -> Option<RangeInclusive<u32>> {
    let next = if has_addresses {
        counters.last_loaded_address_index.checked_add(1)?
    } else {
        0
    };
    let (start, end) = match policy {
        ScanningPolicy::GapLimit { gap_limit } => {
            if gap_limit == 0 {
                return None;
            }
            // Keep `gap_limit` unused addresses after the last used one.
            let first_unused = counters
                .last_used_address_index
                .map_or(0, |used| used.saturating_add(1));
            (next, first_unused.saturating_add(gap_limit - 1))
        }
        ScanningPolicy::IndexLimit { start, end } => (next.max(start), end),
        ScanningPolicy::Manual => return None,
    };
    (start <= end).then_some(start..=end)
}
