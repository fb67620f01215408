#[cfg(test)]
#[path = "tests/name.rs"]
mod tests;

use core::fmt;
use core::str::FromStr;

use libp2p_identity::PublicKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::multicodec::write_uvarint;

/// Namespace every record name lives under.
pub const NAME_SCHEME: &str = "iprs";

/// CID codec tagging an object address as a naming record.
pub const RECORD_CID_CODEC: u64 = 0x0220;

const CID_VERSION: u64 = 1;
const IDENTITY_MULTIHASH: u64 = 0x00;
const SHA2_256_MULTIHASH: u8 = 0x12;
const SHA2_256_LEN: u8 = 32;

/// Stable lookup key of a record: `/iprs/<fingerprint>[/<salt>]`.
///
/// The fingerprint is the base58 sha2-256 multihash of the publisher's
/// protobuf-encoded public key, so two publishers can never produce the same
/// name unless their keys collide.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NameError {
    #[error("name must start with `/{NAME_SCHEME}/`")]
    Scheme,
    #[error("name is missing the key fingerprint")]
    MissingFingerprint,
    #[error("key fingerprint is not valid base58: {0}")]
    Fingerprint(#[from] bs58::decode::Error),
    #[error("name has an empty salt component")]
    EmptySalt,
}

impl Name {
    /// Derives the name a holder of `public_key` may publish under.
    #[must_use]
    pub fn derive(public_key: &PublicKey, salt: &str) -> Self {
        let fingerprint = fingerprint(public_key);

        if salt.is_empty() {
            Self(format!("/{NAME_SCHEME}/{fingerprint}"))
        } else {
            Self(format!("/{NAME_SCHEME}/{fingerprint}/{salt}"))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        self.components().0
    }

    #[must_use]
    pub fn salt(&self) -> Option<&str> {
        self.components().1
    }

    /// Computes the provider-discovery key for this name.
    #[must_use]
    pub fn object_address(&self) -> ObjectAddress {
        ObjectAddress::for_name(self)
    }

    fn components(&self) -> (&str, Option<&str>) {
        let rest = self
            .0
            .get(NAME_SCHEME.len() + 2..)
            .unwrap_or_default();

        match rest.split_once('/') {
            Some((fingerprint, salt)) => (fingerprint, Some(salt)),
            None => (rest, None),
        }
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('/')
            .and_then(|s| s.strip_prefix(NAME_SCHEME))
            .and_then(|s| s.strip_prefix('/'))
            .ok_or(NameError::Scheme)?;

        let (fingerprint, salt) = match rest.split_once('/') {
            Some((fingerprint, salt)) => (fingerprint, Some(salt)),
            None => (rest, None),
        };

        if fingerprint.is_empty() {
            return Err(NameError::MissingFingerprint);
        }

        let _digest = bs58::decode(fingerprint).into_vec()?;

        if salt.is_some_and(str::is_empty) {
            return Err(NameError::EmptySalt);
        }

        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for Name {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Base58 sha2-256 multihash of the protobuf encoding of `public_key`.
#[must_use]
pub fn fingerprint(public_key: &PublicKey) -> String {
    let digest = Sha256::digest(public_key.encode_protobuf());

    let mut multihash = Vec::with_capacity(digest.len() + 2);
    multihash.push(SHA2_256_MULTIHASH);
    multihash.push(SHA2_256_LEN);
    multihash.extend_from_slice(&digest);

    bs58::encode(multihash).into_string()
}

/// CIDv1 identifying "who publishes under a name", never the current value.
///
/// Layout: `uvarint(1) || uvarint(0x0220) || uvarint(0x00) || uvarint(len) || name`,
/// i.e. an identity multihash of the name bytes under the record codec.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ObjectAddress(Vec<u8>);

impl ObjectAddress {
    #[must_use]
    pub fn for_name(name: &Name) -> Self {
        let bytes = name.as_str().as_bytes();

        let mut buf = Vec::with_capacity(bytes.len() + 6);
        write_uvarint(&mut buf, CID_VERSION);
        write_uvarint(&mut buf, RECORD_CID_CODEC);
        write_uvarint(&mut buf, IDENTITY_MULTIHASH);
        write_uvarint(&mut buf, bytes.len() as u64);
        buf.extend_from_slice(bytes);

        Self(buf)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&Name> for ObjectAddress {
    fn from(name: &Name) -> Self {
        Self::for_name(name)
    }
}

impl fmt::Display for ObjectAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&bs58::encode(&self.0).into_string())
    }
}
