//! Required-header authentication policy.
//!
//! An [`AuthPolicy`] lists header names and the value each must carry. The
//! values are compared under one shared [`HashAlgo`]:
//!
//! - [`HashAlgo::None`]: the received value must equal the expected value
//!   byte for byte.
//! - [`HashAlgo::Md5`] / [`HashAlgo::Sha256`]: the expected value is the hex
//!   digest of the received value's raw bytes. Hex comparison ignores ASCII
//!   case.
//!
//! Every required header must match. A missing header always fails, even
//! when the expected value is empty.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Digest applied to received header values before comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgo {
    /// Compare raw values.
    #[default]
    None,
    /// Compare against the hex MD5 digest.
    Md5,
    /// Compare against the hex SHA-256 digest.
    Sha256,
}

impl HashAlgo {
    /// Lowercase hex digest of `value`, or `None` for [`HashAlgo::None`].
    pub fn digest_hex(self, value: &[u8]) -> Option<String> {
        match self {
            Self::None => None,
            Self::Md5 => Some(hex::encode(md5::compute(value).0)),
            Self::Sha256 => Some(hex::encode(Sha256::digest(value))),
        }
    }

    /// Whether `received` satisfies `expected` under this algorithm.
    pub fn matches(self, received: &[u8], expected: &str) -> bool {
        match self.digest_hex(received) {
            None => received == expected.as_bytes(),
            Some(digest) => digest.eq_ignore_ascii_case(expected),
        }
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        })
    }
}

impl FromStr for HashAlgo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(format!("unknown hash algorithm: {other}")),
        }
    }
}

/// Why a request failed the policy.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthRejection {
    /// A required header was absent.
    #[error("missing required header `{0}`")]
    MissingHeader(String),
    /// A required header was present with the wrong value or digest.
    #[error("header `{0}` does not match the expected value")]
    Mismatch(String),
}

/// Header names and expected values, evaluated with one hash algorithm.
///
/// Immutable after construction; evaluation never mutates it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicy {
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    hash: HashAlgo,
}

impl AuthPolicy {
    /// Empty policy using `hash`. An empty policy accepts everything.
    pub fn new(hash: HashAlgo) -> Self {
        Self {
            headers: BTreeMap::new(),
            hash,
        }
    }

    /// Policy with a single required header.
    pub fn single(name: impl Into<String>, expected: impl Into<String>, hash: HashAlgo) -> Self {
        Self::new(hash).with_header(name, expected)
    }

    /// Add a required header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, expected: impl Into<String>) -> Self {
        let _ = self.headers.insert(name.into(), expected.into());
        self
    }

    /// Required headers and their expected values.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Hash algorithm applied to received values.
    pub fn hash(&self) -> HashAlgo {
        self.hash
    }

    /// Evaluate the policy. `lookup` returns the raw value of a header by
    /// name, or `None` when the request does not carry it.
    pub fn evaluate<'a, F>(&self, lookup: F) -> Result<(), AuthRejection>
    where
        F: Fn(&str) -> Option<&'a [u8]>,
    {
        for (name, expected) in &self.headers {
            let received =
                lookup(name).ok_or_else(|| AuthRejection::MissingHeader(name.clone()))?;
            if !self.hash.matches(received, expected) {
                return Err(AuthRejection::Mismatch(name.clone()));
            }
        }
        Ok(())
    }
}
