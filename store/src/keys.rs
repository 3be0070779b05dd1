//! Typed composite keys for the primary and secondary indices.
//!
//! Every key type derives `Ord` in field order and encodes to bytes whose
//! lexical order equals that `Ord`:
//! - integers are fixed-width big-endian;
//! - strings (token uid, address) are written raw followed by a `0x00`
//!   terminator, which sorts a prefix before its extensions exactly like
//!   `String`'s byte-wise ordering. Strings must therefore be NUL-free.
//!
//! Byte layouts:
//! - `TokenUtxoKey`: `kind(1) ++ token ++ 0x00 ++ value_be(8) ++ tx_id(32) ++ index_be(4)`
//! - `TokenAddressUtxoKey`: `kind(1) ++ token ++ 0x00 ++ address ++ 0x00 ++ value_be(8) ++ tx_id(32) ++ index_be(4)`
//! - `HistoryTimeKey`: `timestamp_be(8) ++ tx_id(32)`
//! - `UtxoId`: `tx_id(32) ++ index_be(4)`
//! - derivation index (`u32`): `index_be(4)`

use walletdb_types::{Address, AuthorityFlags, Timestamp, TokenUid, TxId, Utxo, UtxoId};

use crate::StoreError;

const TERMINATOR: u8 = 0x00;
/// `value_be(8) ++ tx_id(32) ++ index_be(4)`
const UTXO_KEY_TAIL: usize = 8 + 32 + 4;

/// A key that can be stored in an ordered byte-keyed table.
pub trait IndexKey: Ord + Clone + Sized {
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Result<Self, StoreError>;
}

/// Partition separating value outputs from authority outputs, so a scan for
/// spendable funds never walks authority records and vice versa.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UtxoKind {
    Value,
    Authority,
}

impl UtxoKind {
    pub fn of(authorities: AuthorityFlags) -> Self {
        if authorities.is_authority() {
            Self::Authority
        } else {
            Self::Value
        }
    }

    fn tag(self) -> u8 {
        match self {
            Self::Value => 0,
            Self::Authority => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, StoreError> {
        match tag {
            0 => Ok(Self::Value),
            1 => Ok(Self::Authority),
            other => Err(StoreError::Serialization(format!("unknown utxo kind tag {other}"))),
        }
    }
}

/// Secondary UTXO key ordered by `(kind, token, value, tx_id, index)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenUtxoKey {
    pub kind: UtxoKind,
    pub token: TokenUid,
    pub value: u64,
    pub tx_id: TxId,
    pub index: u32,
}

impl TokenUtxoKey {
    pub fn for_utxo(utxo: &Utxo) -> Self {
        Self {
            kind: UtxoKind::of(utxo.authorities),
            token: utxo.token.clone(),
            value: utxo.value,
            tx_id: utxo.tx_id,
            index: utxo.index,
        }
    }

    /// Smallest key of the `(kind, token)` partition with `value >= min_value`.
    pub fn lower(kind: UtxoKind, token: &TokenUid, min_value: u64) -> Self {
        Self {
            kind,
            token: token.clone(),
            value: min_value,
            tx_id: TxId::ZERO,
            index: 0,
        }
    }

    /// Largest key of the `(kind, token)` partition with `value <= max_value`.
    pub fn upper(kind: UtxoKind, token: &TokenUid, max_value: u64) -> Self {
        Self {
            kind,
            token: token.clone(),
            value: max_value,
            tx_id: TxId::MAX,
            index: u32::MAX,
        }
    }

    pub fn utxo_id(&self) -> UtxoId {
        UtxoId::new(self.tx_id, self.index)
    }
}

impl IndexKey for TokenUtxoKey {
    fn encode(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + self.token.as_str().len() + 1 + UTXO_KEY_TAIL);
        key.push(self.kind.tag());
        push_terminated(&mut key, self.token.as_str());
        push_tail(&mut key, self.value, &self.tx_id, self.index);
        key
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (&tag, rest) = bytes
            .split_first()
            .ok_or_else(|| StoreError::Serialization("empty token utxo key".into()))?;
        let (token, rest) = split_terminated(rest)?;
        let (value, tx_id, index) = split_tail(rest)?;
        Ok(Self {
            kind: UtxoKind::from_tag(tag)?,
            token: TokenUid::new(token),
            value,
            tx_id,
            index,
        })
    }
}

/// Secondary UTXO key ordered by `(kind, token, address, value, tx_id, index)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAddressUtxoKey {
    pub kind: UtxoKind,
    pub token: TokenUid,
    pub address: Address,
    pub value: u64,
    pub tx_id: TxId,
    pub index: u32,
}

impl TokenAddressUtxoKey {
    pub fn for_utxo(utxo: &Utxo) -> Self {
        Self {
            kind: UtxoKind::of(utxo.authorities),
            token: utxo.token.clone(),
            address: utxo.address.clone(),
            value: utxo.value,
            tx_id: utxo.tx_id,
            index: utxo.index,
        }
    }

    pub fn lower(kind: UtxoKind, token: &TokenUid, address: &Address, min_value: u64) -> Self {
        Self {
            kind,
            token: token.clone(),
            address: address.clone(),
            value: min_value,
            tx_id: TxId::ZERO,
            index: 0,
        }
    }

    pub fn upper(kind: UtxoKind, token: &TokenUid, address: &Address, max_value: u64) -> Self {
        Self {
            kind,
            token: token.clone(),
            address: address.clone(),
            value: max_value,
            tx_id: TxId::MAX,
            index: u32::MAX,
        }
    }

    pub fn utxo_id(&self) -> UtxoId {
        UtxoId::new(self.tx_id, self.index)
    }
}

impl IndexKey for TokenAddressUtxoKey {
    fn encode(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(
            1 + self.token.as_str().len() + 1 + self.address.as_str().len() + 1 + UTXO_KEY_TAIL,
        );
        key.push(self.kind.tag());
        push_terminated(&mut key, self.token.as_str());
        push_terminated(&mut key, self.address.as_str());
        push_tail(&mut key, self.value, &self.tx_id, self.index);
        key
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (&tag, rest) = bytes
            .split_first()
            .ok_or_else(|| StoreError::Serialization("empty token address utxo key".into()))?;
        let (token, rest) = split_terminated(rest)?;
        let (address, rest) = split_terminated(rest)?;
        let (value, tx_id, index) = split_tail(rest)?;
        Ok(Self {
            kind: UtxoKind::from_tag(tag)?,
            token: TokenUid::new(token),
            address: Address::new(address),
            value,
            tx_id,
            index,
        })
    }
}

/// Time-ordered history key `(timestamp, tx_id)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HistoryTimeKey {
    pub timestamp: Timestamp,
    pub tx_id: TxId,
}

impl HistoryTimeKey {
    pub fn new(timestamp: Timestamp, tx_id: TxId) -> Self {
        Self { timestamp, tx_id }
    }
}

impl IndexKey for HistoryTimeKey {
    fn encode(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(40);
        key.extend_from_slice(&self.timestamp.as_secs().to_be_bytes());
        key.extend_from_slice(self.tx_id.as_bytes());
        key
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() != 40 {
            return Err(StoreError::Serialization(format!(
                "history key must be 40 bytes, got {}",
                bytes.len()
            )));
        }
        let secs = read_u64(&bytes[..8])?;
        Ok(Self {
            timestamp: Timestamp::new(secs),
            tx_id: decode_tx_id(&bytes[8..])?,
        })
    }
}

impl IndexKey for UtxoId {
    fn encode(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(36);
        key.extend_from_slice(self.tx_id.as_bytes());
        key.extend_from_slice(&self.index.to_be_bytes());
        key
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.len() != 36 {
            return Err(StoreError::Serialization(format!(
                "utxo id must be 36 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(UtxoId::new(decode_tx_id(&bytes[..32])?, read_u32(&bytes[32..])?))
    }
}

impl IndexKey for TxId {
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        decode_tx_id(bytes)
    }
}

/// Derivation index: fixed-width big-endian so key order is numeric order.
impl IndexKey for u32 {
    fn encode(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        read_u32(bytes)
    }
}

impl IndexKey for Address {
    fn encode(&self) -> Vec<u8> {
        self.as_str().as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(Address::new(decode_str(bytes)?))
    }
}

impl IndexKey for TokenUid {
    fn encode(&self) -> Vec<u8> {
        self.as_str().as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        Ok(TokenUid::new(decode_str(bytes)?))
    }
}

impl IndexKey for String {
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        decode_str(bytes)
    }
}

fn push_terminated(key: &mut Vec<u8>, s: &str) {
    key.extend_from_slice(s.as_bytes());
    key.push(TERMINATOR);
}

fn push_tail(key: &mut Vec<u8>, value: u64, tx_id: &TxId, index: u32) {
    key.extend_from_slice(&value.to_be_bytes());
    key.extend_from_slice(tx_id.as_bytes());
    key.extend_from_slice(&index.to_be_bytes());
}

fn split_terminated(bytes: &[u8]) -> Result<(String, &[u8]), StoreError> {
    let end = bytes
        .iter()
        .position(|&b| b == TERMINATOR)
        .ok_or_else(|| StoreError::Serialization("unterminated key component".into()))?;
    Ok((decode_str(&bytes[..end])?, &bytes[end + 1..]))
}

fn split_tail(bytes: &[u8]) -> Result<(u64, TxId, u32), StoreError> {
    if bytes.len() != UTXO_KEY_TAIL {
        return Err(StoreError::Serialization(format!(
            "utxo key tail must be {UTXO_KEY_TAIL} bytes, got {}",
            bytes.len()
        )));
    }
    Ok((
        read_u64(&bytes[..8])?,
        decode_tx_id(&bytes[8..40])?,
        read_u32(&bytes[40..])?,
    ))
}

fn decode_str(bytes: &[u8]) -> Result<String, StoreError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_tx_id(bytes: &[u8]) -> Result<TxId, StoreError> {
    TxId::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn read_u64(bytes: &[u8]) -> Result<u64, StoreError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Serialization("expected 8-byte integer".into()))?;
    Ok(u64::from_be_bytes(arr))
}

fn read_u32(bytes: &[u8]) -> Result<u32, StoreError> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| StoreError::Serialization("expected 4-byte integer".into()))?;
    Ok(u32::from_be_bytes(arr))
}
