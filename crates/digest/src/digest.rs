//! The [`Digest`] value type and its canonical string form

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Hash algorithm a digest was produced with.
///
/// The declaration order is the sort order used by aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Algorithm {
    /// SHA-256, 32 byte digests
    Sha256,
    /// SHA-384, 48 byte digests (the default)
    Sha384,
}

impl Algorithm {
    /// Algorithm used for every digest computed by cairn
    pub const DEFAULT: Self = Self::Sha384;

    /// Lowercase tag used in the canonical string form
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
        }
    }

    /// Digest length in bytes
    #[must_use]
    pub const fn byte_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
        }
    }

    /// Digest length in hex characters
    #[must_use]
    pub const fn hex_len(self) -> usize {
        self.byte_len() * 2
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            other => Err(Error::UnknownAlgorithm {
                algorithm: other.to_string(),
            }),
        }
    }
}

/// An algorithm-tagged content fingerprint.
///
/// Ordering is by algorithm first, then by the raw digest bytes, which is the
/// order [`aggregate`](crate::aggregate) sorts by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest {
    algorithm: Algorithm,
    bytes: Box<[u8]>,
}

impl Digest {
    /// Build a digest from raw bytes, checking the length matches the algorithm
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLength`] when `bytes` has the wrong size.
    pub fn new(algorithm: Algorithm, bytes: impl Into<Box<[u8]>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() != algorithm.byte_len() {
            return Err(Error::InvalidLength {
                algorithm: algorithm.name().to_string(),
                expected: algorithm.hex_len(),
                actual: bytes.len() * 2,
            });
        }
        Ok(Self { algorithm, bytes })
    }

    /// Only for hasher output whose length is guaranteed by the algorithm
    pub(crate) fn from_hasher_output(algorithm: Algorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            bytes: bytes.into(),
        }
    }

    /// SHA-384 digest of `data`
    #[must_use]
    pub fn sha384(data: impl AsRef<[u8]>) -> Self {
        let mut hasher = crate::Hasher::new(Algorithm::Sha384);
        hasher.update(data.as_ref());
        hasher.finalize()
    }

    /// SHA-256 digest of `data`
    #[must_use]
    pub fn sha256(data: impl AsRef<[u8]>) -> Self {
        let mut hasher = crate::Hasher::new(Algorithm::Sha256);
        hasher.update(data.as_ref());
        hasher.finalize()
    }

    /// Algorithm the digest was computed with
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Raw digest bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex of the raw bytes, without the algorithm prefix
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = Error;

    /// Parse the canonical `<algorithm>:<hex>` form.
    ///
    /// Some SHA-384 digests were historically persisted with the leading
    /// zero nibble dropped (95 hex characters). Those are repaired by
    /// left-padding a `0` before decoding.
    fn from_str(s: &str) -> Result<Self> {
        let (tag, hex_part) = s.split_once(':').ok_or_else(|| Error::MissingSeparator {
            input: s.to_string(),
        })?;
        let algorithm: Algorithm = tag.parse()?;

        let expected = algorithm.hex_len();
        let padded;
        let hex_part = if algorithm == Algorithm::Sha384 && hex_part.len() == expected - 1 {
            tracing::debug!(digest = %s, "Repairing sha384 digest stored one nibble short");
            padded = format!("0{hex_part}");
            padded.as_str()
        } else {
            hex_part
        };

        if hex_part.len() != expected {
            return Err(Error::InvalidLength {
                algorithm: algorithm.name().to_string(),
                expected,
                actual: hex_part.len(),
            });
        }

        let bytes = hex::decode(hex_part).map_err(|e| Error::InvalidHex {
            input: s.to_string(),
            reason: e.to_string(),
        })?;

        Self::new(algorithm, bytes)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
