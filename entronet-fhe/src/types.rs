use std::{fmt, str::FromStr};

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 20-byte account or contract address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Self = Self([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Deterministic address for a human-readable label (deployment fixtures, tests).
    pub fn derive(label: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(b"entronet/address");
        hasher.update(label.as_bytes());
        let mut out = [0u8; 20];
        out.copy_from_slice(&hasher.finalize().as_bytes()[..20]);
        Self(out)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("address must be 20 bytes, got {0}")]
    Length(usize),
    #[error("address is not valid hex: {0}")]
    Hex(String),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|err| AddressParseError::Hex(err.to_string()))?;
        let raw: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressParseError::Length(bytes.len()))?;
        Ok(Self(raw))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_hex()
    }
}

/// Opaque ciphertext handle. Carries no plaintext information.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(pub [u8; 32]);

impl Handle {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}..)", &self.to_hex()[..12])
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Encrypted unsigned 64-bit integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FheUint64 {
    handle: Handle,
}

impl FheUint64 {
    pub const fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }
}

/// Client-side encrypted input together with the proof binding it to a
/// `(sender, contract)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUint64 {
    pub handle: Handle,
    pub proof: [u8; 32],
}
