//! HMAC-SHA256 signatures for locally served URLs.
//!
//! The signed message binds the HTTP method, the object key, the multipart
//! upload id and part number (empty for plain object reads) and the expiry as
//! Unix seconds. Signatures are hex encoded.

use crate::traits::{StorageError, StorageResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// What a signature grants access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignedTarget<'a> {
    UploadPart {
        key: &'a str,
        upload_id: &'a str,
        part_number: i32,
    },
    GetObject {
        key: &'a str,
    },
}

impl SignedTarget<'_> {
    fn message(&self, expires: i64) -> String {
        match self {
            SignedTarget::UploadPart {
                key,
                upload_id,
                part_number,
            } => format!("PUT\n{}\n{}\n{}\n{}", key, upload_id, part_number, expires),
            SignedTarget::GetObject { key } => format!("GET\n{}\n\n\n{}", key, expires),
        }
    }
}

#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, target: &SignedTarget<'_>, expires: i64) -> StorageResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| StorageError::ConfigError(format!("HMAC error: {}", e)))?;
        mac.update(target.message(expires).as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, target: &SignedTarget<'_>, expires: i64) -> StorageResult<String> {
        let mac = self.mac(target, expires)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Checks the signature first, then the expiry against `now` (Unix
    /// seconds). A tampered URL is reported as invalid even when it has also
    /// expired.
    pub fn verify(
        &self,
        target: &SignedTarget<'_>,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> StorageResult<()> {
        let provided = hex::decode(signature).map_err(|_| StorageError::InvalidSignature)?;
        self.mac(target, expires)?
            .verify_slice(&provided)
            .map_err(|_| StorageError::InvalidSignature)?;

        if now > expires {
            return Err(StorageError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PART: SignedTarget<'static> = SignedTarget::UploadPart {
        key: "videos/u/1-abc/clip.mp4",
        upload_id: "up-1",
        part_number: 2,
    };

    #[test]
    fn valid_signature_verifies() {
        let signer = UrlSigner::new("secret");
        let sig = signer.sign(&PART, 2_000).unwrap();
        assert!(signer.verify(&PART, 2_000, &sig, 1_000).is_ok());
    }

    #[test]
    fn expired_signature_is_distinguished() {
        let signer = UrlSigner::new("secret");
        let sig = signer.sign(&PART, 1_000).unwrap();
        let err = signer.verify(&PART, 1_000, &sig, 1_001).unwrap_err();
        assert!(matches!(err, StorageError::Expired));
    }

    #[test]
    fn signature_is_bound_to_part_number() {
        let signer = UrlSigner::new("secret");
        let sig = signer.sign(&PART, 2_000).unwrap();
        let other = SignedTarget::UploadPart {
            key: "videos/u/1-abc/clip.mp4",
            upload_id: "up-1",
            part_number: 3,
        };
        let err = signer.verify(&other, 2_000, &sig, 1_000).unwrap_err();
        assert!(matches!(err, StorageError::InvalidSignature));
    }

    #[test]
    fn tampered_expiry_is_invalid_not_expired() {
        let signer = UrlSigner::new("secret");
        let sig = signer.sign(&PART, 1_000).unwrap();
        let err = signer.verify(&PART, 5_000, &sig, 2_000).unwrap_err();
        assert!(matches!(err, StorageError::InvalidSignature));
    }

    #[test]
    fn different_secrets_disagree() {
        let a = UrlSigner::new("key1");
        let b = UrlSigner::new("key2");
        let target = SignedTarget::GetObject { key: "videos/x" };
        let sig = a.sign(&target, 2_000).unwrap();
        assert!(b.verify(&target, 2_000, &sig, 1_000).is_err());
        assert!(a.verify(&target, 2_000, "not-hex", 1_000).is_err());
    }
}
