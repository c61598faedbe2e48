//! Identities of the parties and games taking part in an escrow.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::IdentityError;

/// Maximum length of an account address, in bytes.
pub const MAX_ADDRESS_LEN: usize = 32;

/// A `0x`-prefixed hex account address (players, arbiter, escrow custodian).
///
/// Parsing is case-insensitive; the canonical form is lowercase.
/// Odd-length inputs such as `0x1` are left-padded with a zero nibble.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(Vec<u8>);

impl Address {
    /// Deterministically derive an address from arbitrary seed bytes.
    pub fn derive(seed: &[u8]) -> Self {
        Self(Sha256::digest(seed).to_vec())
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdentityError::EmptyIdentity);
        }
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(IdentityError::MissingPrefix)?;
        if digits.is_empty() {
            return Err(IdentityError::EmptyIdentity);
        }

        let bytes = if digits.len() % 2 == 1 {
            hex::decode(format!("0{digits}"))?
        } else {
            hex::decode(digits)?
        };
        if bytes.len() > MAX_ADDRESS_LEN {
            return Err(IdentityError::TooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

/// Identifier of a single chess game (and of the escrow wagered on it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameId(String);

impl GameId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for GameId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdentityError::EmptyIdentity);
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for GameId {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GameId> for String {
    fn from(value: GameId) -> Self {
        value.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
