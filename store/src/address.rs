//! Address index trait.

use crate::cursor::StoreIter;
use crate::StoreError;
use walletdb_types::{Address, AddressInfo, AddressMetadata};

/// Outcome of an address index validation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddressValidation {
    /// Lowest derivation index seen, `None` for an empty index.
    pub first_index: Option<u32>,
    pub last_index: Option<u32>,
    pub count: u64,
    /// Missing index entries recreated during the pass.
    pub repaired: u64,
}

/// Bidirectional address ↔ derivation-index mapping plus per-address metadata.
///
/// The primary table is keyed by address; a secondary table keyed by the
/// fixed-width derivation index provides ordered access.
pub trait AddressStore {
    /// Insert a new address.
    ///
    /// Fails with [`StoreError::DuplicateRecord`] when the address is already
    /// stored or its string is empty, leaving the store unchanged.
    fn save_address(&self, info: &AddressInfo) -> Result<(), StoreError>;

    fn get_address(&self, address: &Address) -> Result<Option<AddressInfo>, StoreError>;

    /// Read through the derivation-index table.
    fn get_address_at_index(&self, index: u32) -> Result<Option<AddressInfo>, StoreError>;

    fn address_exists(&self, address: &Address) -> Result<bool, StoreError> {
        Ok(self.get_address(address)?.is_some())
    }

    /// All addresses in ascending derivation-index order.
    fn address_iter(&self) -> Result<StoreIter<'_, AddressInfo>, StoreError>;

    /// Number of stored addresses. Backends may serve it from a count
    /// cached by [`AddressStore::validate`], or from a native count of the
    /// primary table when the medium keeps one.
    fn address_count(&self) -> Result<u64, StoreError>;

    fn get_address_meta(&self, address: &Address) -> Result<Option<AddressMetadata>, StoreError>;

    fn edit_address_meta(&self, address: &Address, meta: &AddressMetadata) -> Result<(), StoreError>;

    /// Drop every address metadata record (rebuilt by history replay).
    fn clear_address_meta(&self) -> Result<(), StoreError>;

    /// Walk every primary record, recreate missing index entries and fail
    /// with [`StoreError::InconsistentDatabase`] on a conflicting one.
    fn validate(&self) -> Result<AddressValidation, StoreError>;

    /// Remove addresses, the index table and metadata.
    fn clear(&self) -> Result<(), StoreError>;
}
