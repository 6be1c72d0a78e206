//! Detached signature checks
//!
//! Signatures are produced elsewhere; this module only verifies them.
//! - `ed25519`: `<file>.sig` holds a base64 (or raw 64-byte) Ed25519
//!   signature over the artifact bytes, checked against trusted public keys
//! - `gpg`: `<file>.asc` holds an armored OpenPGP signature; it is
//!   recognised, never verified, so a well-formed one reports UNKNOWN

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::validation::{Check, CheckOutcome};

/// Signature algorithm identifier
pub const SIGNATURE_ALGORITHM: &str = "Ed25519";

const PGP_SIGNATURE_HEADER: &str = "-----BEGIN PGP SIGNATURE-----";

/// Errors from loading trusted keys
#[derive(Debug, Error)]
pub enum SignatureKeyError {
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// SHA-256 fingerprint of a public key, hex-encoded.
pub fn compute_key_fingerprint(key: &VerifyingKey) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Parse a base64-encoded Ed25519 public key.
pub fn parse_verifying_key(encoded: &str) -> Result<VerifyingKey, SignatureKeyError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|b: Vec<u8>| {
        SignatureKeyError::InvalidKey(format!("expected {} bytes, got {}", PUBLIC_KEY_LENGTH, b.len()))
    })?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| SignatureKeyError::InvalidKey(e.to_string()))
}

/// Ed25519 detached signature check.
#[derive(Debug, Clone, Default)]
pub struct Ed25519SignatureCheck {
    trusted: Vec<VerifyingKey>,
}

impl Ed25519SignatureCheck {
    pub fn new(trusted: Vec<VerifyingKey>) -> Self {
        Self { trusted }
    }

    /// Build from base64-encoded public keys.
    pub fn from_encoded_keys<S: AsRef<str>>(keys: &[S]) -> Result<Self, SignatureKeyError> {
        let trusted = keys
            .iter()
            .map(|k| parse_verifying_key(k.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(trusted))
    }

    /// Fingerprints of the trusted keys.
    pub fn fingerprints(&self) -> Vec<String> {
        self.trusted.iter().map(compute_key_fingerprint).collect()
    }

    fn decode_signature(companion: &[u8]) -> Option<Signature> {
        if let Ok(text) = std::str::from_utf8(companion) {
            if let Ok(bytes) = STANDARD.decode(text.trim()) {
                return Signature::from_slice(&bytes).ok();
            }
        }
        if companion.len() == SIGNATURE_LENGTH {
            return Signature::from_slice(companion).ok();
        }
        None
    }
}

impl Check for Ed25519SignatureCheck {
    fn name(&self) -> &str {
        "ed25519"
    }

    fn description(&self) -> &str {
        "Ed25519 detached signature"
    }

    fn extension(&self) -> &str {
        "sig"
    }

    fn verify(&self, content: &[u8], companion: &[u8]) -> CheckOutcome {
        if self.trusted.is_empty() {
            return CheckOutcome::Unknown;
        }
        let Some(signature) = Self::decode_signature(companion) else {
            return CheckOutcome::Invalid;
        };
        if self
            .trusted
            .iter()
            .any(|key| key.verify(content, &signature).is_ok())
        {
            CheckOutcome::Valid
        } else {
            CheckOutcome::Invalid
        }
    }
}

/// OpenPGP armored signature presence check.
#[derive(Debug, Clone, Default)]
pub struct GpgSignatureCheck;

impl Check for GpgSignatureCheck {
    fn name(&self) -> &str {
        "gpg"
    }

    fn description(&self) -> &str {
        "OpenPGP armored signature (presence only)"
    }

    fn extension(&self) -> &str {
        "asc"
    }

    fn verify(&self, _content: &[u8], companion: &[u8]) -> CheckOutcome {
        match std::str::from_utf8(companion) {
            Ok(text) if text.contains(PGP_SIGNATURE_HEADER) => CheckOutcome::Unknown,
            _ => CheckOutcome::Invalid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    #[test]
    fn test_valid_signature() {
        let signing = key(7);
        let check = Ed25519SignatureCheck::new(vec![signing.verifying_key()]);
        let sig = STANDARD.encode(signing.sign(b"payload").to_bytes());

        assert_eq!(check.verify(b"payload", sig.as_bytes()), CheckOutcome::Valid);
        assert_eq!(
            check.verify(b"payload", &signing.sign(b"payload").to_bytes()),
            CheckOutcome::Valid
        );
    }

    #[test]
    fn test_tampered_or_untrusted_is_invalid() {
        let signing = key(7);
        let check = Ed25519SignatureCheck::new(vec![key(9).verifying_key()]);
        let sig = STANDARD.encode(signing.sign(b"payload").to_bytes());
        assert_eq!(check.verify(b"payload", sig.as_bytes()), CheckOutcome::Invalid);

        let trusted = Ed25519SignatureCheck::new(vec![signing.verifying_key()]);
        assert_eq!(trusted.verify(b"tampered", sig.as_bytes()), CheckOutcome::Invalid);
        assert_eq!(trusted.verify(b"payload", b"garbage"), CheckOutcome::Invalid);
    }

    #[test]
    fn test_no_trusted_keys_is_unknown() {
        let check = Ed25519SignatureCheck::default();
        assert_eq!(check.verify(b"payload", b"anything"), CheckOutcome::Unknown);
    }

    #[test]
    fn test_parse_encoded_keys() {
        let signing = key(3);
        let encoded = STANDARD.encode(signing.verifying_key().as_bytes());
        let check = Ed25519SignatureCheck::from_encoded_keys(&[encoded]).unwrap();
        assert_eq!(check.fingerprints(), vec![compute_key_fingerprint(&signing.verifying_key())]);

        assert!(Ed25519SignatureCheck::from_encoded_keys(&["AAAA"]).is_err());
        assert!(Ed25519SignatureCheck::from_encoded_keys(&["***"]).is_err());
    }

    #[test]
    fn test_gpg_presence() {
        let check = GpgSignatureCheck;
        let armored = b"-----BEGIN PGP SIGNATURE-----\n\nabc\n-----END PGP SIGNATURE-----\n";
        assert_eq!(check.verify(b"x", armored), CheckOutcome::Unknown);
        assert_eq!(check.verify(b"x", b"nope"), CheckOutcome::Invalid);
    }
}
