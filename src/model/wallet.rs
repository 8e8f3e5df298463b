//! Wallet address newtype.
//!
//! The source normalized wallet addresses ad hoc at each call site (lowercase
//! here, trim there). That is exactly the kind of mistake a newtype exists to
//! prevent: construct one once at the boundary and every later comparison,
//! hash, or serialization is guaranteed canonical.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A hex wallet address, canonicalized to lowercase at construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WalletAddress {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for WalletAddress {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_case_and_whitespace() {
        let a = WalletAddress::new("  0xABCDEF  ");
        let b = WalletAddress::new("0xabcdef");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabcdef");
    }
}
