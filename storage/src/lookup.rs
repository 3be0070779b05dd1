//! Fallback token configuration lookup used during history replay.

use walletdb_types::{TokenInfo, TokenUid};

pub type LookupError = Box<dyn std::error::Error + Send + Sync>;

/// Resolves the configuration of a token uid the wallet has not stored yet,
/// typically by asking a full node.
pub trait TokenLookup {
    /// `Ok(None)` means the token is unknown upstream as well.
    fn lookup(&self, uid: &TokenUid) -> Result<Option<TokenInfo>, LookupError>;
}

/// Lookup that never knows anything; unknown tokens stay unknown.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoTokenLookup;

impl TokenLookup for NoTokenLookup {
    fn lookup(&self, _uid: &TokenUid) -> Result<Option<TokenInfo>, LookupError> {
        Ok(None)
    }
}

impl<F> TokenLookup for F
where
    F: Fn(&TokenUid) -> Result<Option<TokenInfo>, LookupError>,
{
    fn lookup(&self, uid: &TokenUid) -> Result<Option<TokenInfo>, LookupError> {
        self(uid)
    }
}
