//! Built-in checksum and signature checks
//!
//! Checksums cover md5, sha1, sha256 and sha512 companions. Signatures cover
//! detached Ed25519 signatures (`.sig`) verified against trusted keys, and
//! OpenPGP armored signatures (`.asc`), which are recognised but not
//! verified.

mod checksum;
mod signature;

pub use checksum::{write_checksums, ChecksumAlgorithm, ChecksumCheck};
pub use signature::{
    compute_key_fingerprint, parse_verifying_key, Ed25519SignatureCheck, GpgSignatureCheck,
    SignatureKeyError, SIGNATURE_ALGORITHM,
};
