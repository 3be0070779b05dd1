//! Decoded transactions as delivered by the sync layer.
//!
//! Every input and output arrives already resolved (address, token, value,
//! authorities, timelock); this crate never parses scripts.

use serde::{Deserialize, Serialize};

use crate::{Address, AuthorityFlags, Timestamp, TokenUid, TxId};

/// The kind of vertex a history record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxVersion {
    Block,
    MergeMinedBlock,
    Regular,
    CreateToken,
}

impl TxVersion {
    /// Whether outputs of this vertex are block rewards (height-locked).
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block | Self::MergeMinedBlock)
    }
}

/// An input, resolved against the output it spends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Transaction holding the spent output.
    pub tx_id: TxId,
    /// Output index inside `tx_id`.
    pub index: u32,
    pub value: u64,
    pub token: TokenUid,
    pub address: Option<Address>,
    pub authorities: AuthorityFlags,
    pub timelock: Option<Timestamp>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    pub token: TokenUid,
    /// `None` when the script does not decode to an address.
    pub address: Option<Address>,
    pub authorities: AuthorityFlags,
    pub timelock: Option<Timestamp>,
    /// Transaction that spent this output, if any.
    pub spent_by: Option<TxId>,
}

impl TxOutput {
    /// A plain value output paying `address`.
    pub fn new(value: u64, token: impl Into<TokenUid>, address: impl Into<Address>) -> Self {
        Self {
            value,
            token: token.into(),
            address: Some(address.into()),
            authorities: AuthorityFlags::NONE,
            timelock: None,
            spent_by: None,
        }
    }

    pub fn is_authority(&self) -> bool {
        self.authorities.is_authority()
    }
}

/// A transaction (or block) touching the wallet.
///
/// Upsertable: re-saving the same id overwrites the record in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTx {
    pub tx_id: TxId,
    pub version: TxVersion,
    pub timestamp: Timestamp,
    pub is_voided: bool,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Custom tokens referenced by this transaction.
    pub tokens: Vec<TokenUid>,
    /// Height of the block (for blocks) or of the first confirming block.
    pub height: Option<u64>,
    /// Set on token-creation transactions only.
    pub token_name: Option<String>,
    pub token_symbol: Option<String>,
}

impl HistoryTx {
    pub fn new(tx_id: TxId, timestamp: Timestamp) -> Self {
        Self {
            tx_id,
            version: TxVersion::Regular,
            timestamp,
            is_voided: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
            tokens: Vec::new(),
            height: None,
            token_name: None,
            token_symbol: None,
        }
    }

    /// Whether `token` is attached to any input or output.
    pub fn touches_token(&self, token: &TokenUid) -> bool {
        self.inputs.iter().any(|i| &i.token == token)
            || self.outputs.iter().any(|o| &o.token == token)
    }

    /// Every decoded address appearing on an input or output.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.inputs
            .iter()
            .filter_map(|i| i.address.as_ref())
            .chain(self.outputs.iter().filter_map(|o| o.address.as_ref()))
    }
}
