use crate::*;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::convert::TryInto;
use std::str::FromStr;

// Fixed-length byte identifiers that travel as 0x-prefixed hex strings.
macro_rules! hex_identifier {
    ($(#[$meta:meta])* $name:ident, $len:expr, $kind:expr) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
                let array: [u8; $len] = bytes.try_into().map_err(|_| Error::BadLength {
                    kind: $kind,
                    expected: $len,
                    found: bytes.len(),
                })?;
                Ok($name(array))
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                let s = s
                    .strip_prefix("0x")
                    .or_else(|| s.strip_prefix("0X"))
                    .unwrap_or(s);
                let bytes = hex::decode(s).map_err(|_| Error::BadHex($kind))?;
                $name::from_slice(&bytes)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                FromStr::from_str(&s).map_err(de::Error::custom)
            }
        }
    };
}

hex_identifier!(
    /// A 20-byte account or contract address
    Address,
    20,
    "address"
);

hex_identifier!(
    /// An opaque reference to a ciphertext held by the encryption runtime
    Handle,
    32,
    "ciphertext handle"
);

hex_identifier!(
    /// A reference to a broadcast transaction
    TxRef,
    32,
    "transaction reference"
);

impl Address {
    /// Address of an ed25519 signing key: the last 20 bytes of SHA-256(public key).
    pub fn from_public_key(public_key: &ed25519_dalek::PublicKey) -> Self {
        let digest = Sha256::digest(public_key.as_bytes());
        let mut address = [0u8; 20];
        address.copy_from_slice(&digest[12..]);
        Address(address)
    }
}

impl TxRef {
    /// Content-derived reference for a serialized transaction.
    pub fn digest(bytes: &[u8]) -> Self {
        let mut reference = [0u8; 32];
        reference.copy_from_slice(&Sha256::digest(bytes));
        TxRef(reference)
    }
}

// a single-purpose module for use in `#[serde(with)]`
pub mod x25519_hex {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::convert::TryInto;
    use x25519_dalek::PublicKey;

    pub fn serialize<S>(public_key: &PublicKey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(public_key.as_bytes()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<PublicKey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(de::Error::custom)?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| de::Error::custom("x25519 public key must be 32 bytes"))?;
        Ok(PublicKey::from(bytes))
    }
}
