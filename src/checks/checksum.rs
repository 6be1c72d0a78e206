//! Checksum companions (`.md5`, `.sha1`, `.sha256`, `.sha512`)

use std::fmt;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::store::{Artifact, ArtifactStore, StoreError, StoreResult};
use crate::validation::{Check, CheckOutcome};

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    pub fn all() -> [ChecksumAlgorithm; 4] {
        [
            ChecksumAlgorithm::Md5,
            ChecksumAlgorithm::Sha1,
            ChecksumAlgorithm::Sha256,
            ChecksumAlgorithm::Sha512,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of the lowercase hex digest.
    pub fn hex_len(&self) -> usize {
        match self {
            ChecksumAlgorithm::Md5 => 32,
            ChecksumAlgorithm::Sha1 => 40,
            ChecksumAlgorithm::Sha256 => 64,
            ChecksumAlgorithm::Sha512 => 128,
        }
    }

    pub fn digest_hex(&self, data: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Md5 => hex::encode(Md5::digest(data)),
            ChecksumAlgorithm::Sha1 => hex::encode(Sha1::digest(data)),
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            ChecksumAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown checksum algorithm: {}", s))
    }
}

/// Verifies a hex digest companion file.
///
/// The companion may be a bare digest or `sha1sum`-style `digest  filename`;
/// only the first token is compared, case-insensitively.
#[derive(Debug, Clone)]
pub struct ChecksumCheck {
    algorithm: ChecksumAlgorithm,
    description: String,
}

impl ChecksumCheck {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Self {
            algorithm,
            description: format!("{} checksum", algorithm.name().to_uppercase()),
        }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }
}

impl Check for ChecksumCheck {
    fn name(&self) -> &str {
        self.algorithm.name()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn extension(&self) -> &str {
        self.algorithm.name()
    }

    fn verify(&self, content: &[u8], companion: &[u8]) -> CheckOutcome {
        let Ok(text) = std::str::from_utf8(companion) else {
            return CheckOutcome::Unknown;
        };
        let Some(expected) = text.split_whitespace().next() else {
            return CheckOutcome::Invalid;
        };
        if expected.len() != self.algorithm.hex_len()
            || !expected.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return CheckOutcome::Invalid;
        }
        if expected.eq_ignore_ascii_case(&self.algorithm.digest_hex(content)) {
            CheckOutcome::Valid
        } else {
            CheckOutcome::Invalid
        }
    }
}

/// Store checksum companions for an artifact already in the store.
pub fn write_checksums(
    store: &mut ArtifactStore,
    artifact: &Artifact,
    algorithms: &[ChecksumAlgorithm],
) -> StoreResult<()> {
    let content = store.read_all(artifact)?.ok_or_else(|| {
        StoreError::InvalidCoordinate(format!("{} is not in store {}", artifact, store.name()))
    })?;
    for algorithm in algorithms {
        let digest = algorithm.digest_hex(&content);
        store.put_bytes(artifact.companion(algorithm.name()), digest.as_bytes())?;
    }
    Ok(())
}
