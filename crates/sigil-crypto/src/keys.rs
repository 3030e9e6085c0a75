//! secp256k1 keypairs with x-only public keys.
//!
//! Nostr identities are BIP-340 x-only keys. This module wraps `k256`
//! with sigil-specific types; secret bytes are zeroized on drop.

use k256::schnorr::{SigningKey, VerifyingKey};
use zeroize::Zeroize;

use sigil_types::encoding;

use crate::{CryptoError, Result};

/// A secp256k1 secret key.
pub struct SecretKey {
    bytes: [u8; 32],
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl Clone for SecretKey {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

/// An x-only secp256k1 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PublicKey {
    bytes: [u8; 32],
}

/// A keypair for signing operations.
pub struct Keypair {
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        use k256::elliptic_curve::rand_core::OsRng;
        let signing_key = SigningKey::random(&mut OsRng);
        let bytes: [u8; 32] = signing_key.to_bytes().into();
        Self { bytes }
    }

    /// Create a secret key from raw bytes, rejecting out-of-range scalars.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        SigningKey::from_bytes(bytes)
            .map_err(|_| CryptoError::InvalidInput("secret key out of range".to_string()))?;
        Ok(Self { bytes: *bytes })
    }

    /// Parse a secret key from 64-char hex or an `nsec1…` string.
    pub fn parse(s: &str) -> Result<Self> {
        let mut bytes = encoding::secret_from_str(s)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// The corresponding x-only public key.
    pub fn public_key(&self) -> PublicKey {
        // from_bytes validated at construction, so this cannot fail.
        let signing_key = SigningKey::from_bytes(&self.bytes)
            .unwrap_or_else(|_| unreachable!("secret key validated at construction"));
        let bytes: [u8; 32] = signing_key.verifying_key().to_bytes().into();
        PublicKey { bytes }
    }

    /// Encode as `nsec1…`.
    pub fn to_nsec(&self) -> Result<String> {
        encoding::nsec_encode(&self.bytes).map_err(|e| CryptoError::InvalidInput(e.to_string()))
    }

    pub(crate) fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.bytes)
            .unwrap_or_else(|_| unreachable!("secret key validated at construction"))
    }
}

impl PublicKey {
    /// Create a public key from raw x-only bytes, validating the point.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        VerifyingKey::from_bytes(bytes)
            .map_err(|_| CryptoError::InvalidInput("not a valid x-only point".to_string()))?;
        Ok(Self { bytes: *bytes })
    }

    /// Parse from 64-char hex or an `npub1…` string.
    pub fn parse(s: &str) -> Result<Self> {
        let bytes =
            encoding::pubkey_from_str(s).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Raw x-only bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Encode as `npub1…`.
    pub fn to_npub(&self) -> Result<String> {
        encoding::npub_encode(&self.bytes).map_err(|e| CryptoError::InvalidInput(e.to_string()))
    }

    /// Display fingerprint: first 8 hex chars.
    pub fn fingerprint(&self) -> String {
        encoding::fingerprint(&self.bytes)
    }

    pub(crate) fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.bytes).map_err(|_| CryptoError::SignatureVerification)
    }
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let secret = SecretKey::generate();
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Build a keypair from an existing secret.
    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("public", &self.public_key().to_hex())
            .finish()
    }
}
