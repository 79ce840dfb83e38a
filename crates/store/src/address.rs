//! On-chain account address.

use std::{fmt, str::FromStr};

use derive_more::{Display, Error, From};
use serde::{Deserialize, Serialize};

/// Address length, in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Errors that may occur while parsing an [`Address`] from its hex representation.
#[derive(Debug, Display, Error, From)]
pub enum InvalidAddress {
    /// Address contains non-hex characters or has an incorrect length.
    Hex(hex::FromHexError),
}

/// Externally-owned account address bound to a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// All-zero address, which registry contracts return for unbound identifiers.
    pub const ZERO: Address = Address([0; ADDRESS_LEN]);

    pub fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; ADDRESS_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Convert zero address into [`None`].
    pub fn non_zero(self) -> Option<Self> {
        (!self.is_zero()).then_some(self)
    }
}

impl FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        let mut bytes = [0; ADDRESS_LEN];
        hex::decode_to_slice(digits, &mut bytes)?;

        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = InvalidAddress;

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
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::Address;

    #[test]
    fn parse_mixed_case() {
        let address: Address = "0xFaD7C5e93f28257429569B854151A1B8DCD404c2"
            .parse()
            .unwrap();

        assert_eq!(
            address.to_string(),
            "0xfad7c5e93f28257429569b854151a1b8dcd404c2"
        );
        assert!(!address.is_zero());
    }

    #[test]
    fn zero_is_absent() {
        let address: Address = "0x0000000000000000000000000000000000000000"
            .parse()
            .unwrap();

        assert!(address.is_zero());
        assert_eq!(address.non_zero(), None);
    }

    #[test]
    fn invalid_length() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzz00000000000000000000000000000000000000".parse::<Address>().is_err());
    }

    #[test]
    fn json_string() {
        let address = Address::new([0xab; 20]);
        let json = serde_json::to_string(&address).unwrap();

        assert_eq!(json, format!("\"{address}\""));
        assert_eq!(serde_json::from_str::<Address>(&json).unwrap(), address);
    }
}
