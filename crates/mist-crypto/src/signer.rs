use mist_types::Digest;

/// Ed25519 signing key used to sign transaction digests.
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Ed25519 verifying key (public).
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from raw 32-byte secret.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    /// Sign a transaction digest. The signature travels hex-encoded.
    pub fn sign_digest(&self, digest: &Digest) -> String {
        use ed25519_dalek::Signer;
        hex::encode(self.0.sign(digest.as_bytes()).to_bytes())
    }
}

impl VerifyingKey {
    /// Verify a hex-encoded signature over a transaction digest.
    pub fn verify_digest(&self, digest: &Digest, signature: &str) -> Result<(), SignatureError> {
        use ed25519_dalek::Verifier;
        let bytes = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;
        let arr: [u8; 64] = bytes.try_into().map_err(|_| SignatureError::Malformed)?;
        self.0
            .verify(digest.as_bytes(), &ed25519_dalek::Signature::from_bytes(&arr))
            .map_err(|_| SignatureError::InvalidSignature)
    }

    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, SignatureError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self(key))
    }

    /// Lowercase hex of the 32 public key bytes, as accepted by `parse`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl std::str::FromStr for VerifyingKey {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|_| SignatureError::InvalidKey)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| SignatureError::InvalidKey)?;
        Self::from_bytes(bytes)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", self.to_hex())
    }
}

/// Errors from signing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed signature encoding")]
    Malformed,
    #[error("invalid key")]
    InvalidKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::ContentHasher;

    #[test]
    fn sign_and_verify() {
        let key = SigningKey::generate();
        let digest = ContentHasher::hash(b"transaction body");
        let signature = key.sign_digest(&digest);
        assert_eq!(signature.len(), 128);
        key.verifying_key().verify_digest(&digest, &signature).unwrap();
    }

    #[test]
    fn wrong_digest_fails() {
        let key = SigningKey::from_bytes([3; 32]);
        let signature = key.sign_digest(&ContentHasher::hash(b"one"));
        assert_eq!(
            key.verifying_key()
                .verify_digest(&ContentHasher::hash(b"two"), &signature),
            Err(SignatureError::InvalidSignature)
        );
    }

    #[test]
    fn malformed_signature_rejected() {
        let key = SigningKey::generate();
        let digest = ContentHasher::hash(b"x");
        assert_eq!(
            key.verifying_key().verify_digest(&digest, "not-hex"),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn verifying_key_hex_round_trip() {
        let key = SigningKey::from_bytes([5; 32]).verifying_key();
        let text = key.to_hex();
        assert_eq!(text.len(), 64);
        let parsed: VerifyingKey = text.parse().unwrap();
        assert_eq!(parsed, key);
        assert_eq!(VerifyingKey::from_bytes(key.as_bytes()).unwrap(), key);
    }

    #[test]
    fn malformed_verifying_key_rejected() {
        assert_eq!("abcd".parse::<VerifyingKey>(), Err(SignatureError::InvalidKey));
        assert_eq!("zz".repeat(32).parse::<VerifyingKey>(), Err(SignatureError::InvalidKey));
    }

    #[test]
    fn debug_redacts_secret() {
        assert_eq!(format!("{:?}", SigningKey::generate()), "SigningKey(<redacted>)");
    }
}
