// crates/fx-core/src/identity.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FxError;

/// A 20-byte account identity: users, the market, the treasury's
/// collaborators, and fee recipients are all addressed by a `Principal`.
///
/// Rendered and parsed as `0x`-prefixed lowercase hex. `Principal::ZERO` is
/// the null identity and is never accepted as a collaborator reference.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(pub [u8; 20]);

impl Principal {
    pub const ZERO: Principal = Principal([0u8; 20]);

    /// Principal whose bytes are all `byte`. Handy for fixtures.
    pub const fn from_byte(byte: u8) -> Self {
        Principal([byte; 20])
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Returns `Err(FxError::ZeroAddress)` for the null identity.
    pub fn non_zero(self) -> Result<Self, FxError> {
        if self.is_zero() {
            Err(FxError::ZeroAddress)
        } else {
            Ok(self)
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({})", self)
    }
}

impl FromStr for Principal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|e| format!("invalid principal {}: {}", s, e))?;
        let array: [u8; 20] = bytes
            .try_into()
            .map_err(|_| format!("invalid principal {}: expected 20 bytes", s))?;
        Ok(Principal(array))
    }
}

impl TryFrom<String> for Principal {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Principal> for String {
    fn from(value: Principal) -> Self {
        value.to_string()
    }
}
