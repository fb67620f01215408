#[cfg(test)]
#[path = "tests/record.rs"]
mod tests;

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use libp2p_identity::{DecodingError, Keypair, PublicKey, SigningError};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use thiserror::Error;

use crate::multicodec::strip_header;
use crate::name::Name;

/// Multicodec path of the ordered signed record envelope.
pub const ENVELOPE_CODEC: &str = "/ipfs/record/mildred-ordered-signed-record";

/// Multicodec path of the inner encoding.
pub const JSON_CODEC: &str = "/json";

/// `multicodec::header(ENVELOPE_CODEC)`
pub const ENVELOPE_HEADER: &[u8] = b"\x2b/ipfs/record/mildred-ordered-signed-record\n";

/// `multicodec::header(JSON_CODEC)`
pub const JSON_HEADER: &[u8] = b"\x06/json\n";

/// An ordered pointer from a name to a piece of content.
///
/// The signer's public key is not part of this type: it is embedded by
/// [`Record::encode`] and recovered by [`VerifiedRecord::decode`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub target: String,
    pub order: u64,
    pub salt: String,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to sign record: {0}")]
    Sign(#[from] SigningError),
}

/// The envelope could not be parsed. Never worth retrying.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FormatError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed base64 in `{field}`: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    #[error("malformed public key: {0}")]
    PublicKey(#[from] DecodingError),
}

/// The envelope parsed but cannot be trusted.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthenticityError {
    #[error("signature does not match the embedded public key")]
    InvalidSignature,
    #[error("record is signed for {actual}, expected {expected}")]
    NameMismatch { expected: Name, actual: Name },
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Authenticity(#[from] AuthenticityError),
}

impl RecordError {
    #[must_use]
    pub const fn is_authenticity(&self) -> bool {
        matches!(self, Self::Authenticity(_))
    }
}

#[derive(Deserialize, Serialize)]
struct WireRecord {
    cid: String,
    ord: u64,
    pkey: String,
    #[serde(default)]
    salt: String,
}

#[derive(Deserialize, Serialize)]
struct WireEnvelope<'a> {
    #[serde(borrow)]
    rec: &'a RawValue,
    sig: String,
}

impl Record {
    #[must_use]
    pub fn new(target: impl Into<String>, order: u64) -> Self {
        Self {
            target: target.into(),
            order,
            salt: String::new(),
        }
    }

    #[must_use]
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    /// Name this record is published under when signed by `public_key`.
    #[must_use]
    pub fn name(&self, public_key: &PublicKey) -> Name {
        Name::derive(public_key, &self.salt)
    }

    /// Signs the canonical encoding of this record and wraps it in the
    /// headered envelope. The signer's public key is embedded.
    pub fn encode(&self, keypair: &Keypair) -> Result<Vec<u8>, EncodeError> {
        let wire = WireRecord {
            cid: self.target.clone(),
            ord: self.order,
            pkey: STANDARD_NO_PAD.encode(keypair.public().encode_protobuf()),
            salt: self.salt.clone(),
        };

        let rec = serde_json::to_string(&wire)?;
        let sig = keypair.sign(rec.as_bytes())?;
        let rec = RawValue::from_string(rec)?;

        let envelope = WireEnvelope {
            rec: &rec,
            sig: STANDARD_NO_PAD.encode(sig),
        };

        let mut buf = Vec::with_capacity(ENVELOPE_HEADER.len() + JSON_HEADER.len() + 256);
        buf.extend_from_slice(ENVELOPE_HEADER);
        buf.extend_from_slice(JSON_HEADER);
        serde_json::to_writer(&mut buf, &envelope)?;

        Ok(buf)
    }
}

/// A record whose signature was checked against its embedded public key.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedRecord {
    record: Record,
    public_key: PublicKey,
    name: Name,
}

impl VerifiedRecord {
    /// Strips the headers, parses the envelope and verifies the signature
    /// over the exact bytes of the `rec` field.
    pub fn decode(envelope: &[u8]) -> Result<Self, RecordError> {
        let body = strip_header(envelope, ENVELOPE_HEADER)
            .ok_or(FormatError::MissingHeader(ENVELOPE_CODEC))?;
        let body = strip_header(body, JSON_HEADER).ok_or(FormatError::MissingHeader(JSON_CODEC))?;

        let envelope: WireEnvelope<'_> = serde_json::from_slice(body).map_err(FormatError::Json)?;
        let signed = envelope.rec.get().as_bytes();

        let wire: WireRecord = serde_json::from_slice(signed).map_err(FormatError::Json)?;

        let pkey = STANDARD_NO_PAD
            .decode(&wire.pkey)
            .map_err(|source| FormatError::Base64 {
                field: "pkey",
                source,
            })?;
        let public_key = PublicKey::try_decode_protobuf(&pkey).map_err(FormatError::PublicKey)?;

        let sig = STANDARD_NO_PAD
            .decode(&envelope.sig)
            .map_err(|source| FormatError::Base64 {
                field: "sig",
                source,
            })?;

        if !public_key.verify(signed, &sig) {
            return Err(AuthenticityError::InvalidSignature.into());
        }

        let record = Record {
            target: wire.cid,
            order: wire.ord,
            salt: wire.salt,
        };
        let name = record.name(&public_key);

        Ok(Self {
            record,
            public_key,
            name,
        })
    }

    /// Decodes `envelope` and requires it to be signed for `expected`.
    pub fn decode_for(expected: &Name, envelope: &[u8]) -> Result<Self, RecordError> {
        Ok(Self::decode(envelope)?.expect_name(expected)?)
    }

    /// Rejects the record unless the name derived from its key and salt is
    /// `expected`.
    pub fn expect_name(self, expected: &Name) -> Result<Self, AuthenticityError> {
        if self.name == *expected {
            return Ok(self);
        }

        Err(AuthenticityError::NameMismatch {
            expected: expected.clone(),
            actual: self.name,
        })
    }

    #[must_use]
    pub const fn record(&self) -> &Record {
        &self.record
    }

    #[must_use]
    pub const fn order(&self) -> u64 {
        self.record.order
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.record.target
    }

    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[must_use]
    pub const fn name(&self) -> &Name {
        &self.name
    }
}
