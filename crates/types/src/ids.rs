//! Fixed-length identities used as map and set keys

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length in bytes of every hash and public key
pub const HASH_LEN: usize = 32;

/// Hash an arbitrary byte string into a fixed-length digest
pub fn hash(data: &[u8]) -> [u8; HASH_LEN] {
    *blake3::hash(data).as_bytes()
}

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        pub struct $name(pub [u8; HASH_LEN]);

        impl $name {
            pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
                &self.0
            }

            /// Parse from a slice, returning `None` on a length mismatch
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                let arr: [u8; HASH_LEN] = bytes.try_into().ok()?;
                Some(Self(arr))
            }

            /// Parse from a base58 string
            pub fn from_base58(s: &str) -> Option<Self> {
                let bytes = bs58::decode(s).into_vec().ok()?;
                Self::from_slice(&bytes)
            }
        }

        impl From<[u8; HASH_LEN]> for $name {
            fn from(bytes: [u8; HASH_LEN]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", bs58::encode(&self.0).into_string())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

fixed_bytes!(
    /// An account or node public key
    PubKey
);

fixed_bytes!(
    /// Transaction identifier (hash of the transaction contents)
    TxId
);

fixed_bytes!(
    /// Block identifier
    BlockHash
);

/// Peers are identified by their public key
pub type PeerId = PubKey;

/// Identifier of a chain (community). Arbitrary bytes, usually a readable name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub Vec<u8>);

impl ChainId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId({})", self)
    }
}
