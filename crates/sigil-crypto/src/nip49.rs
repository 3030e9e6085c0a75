//! NIP-49 passphrase-encrypted secret-key backup.
//!
//! Wire format (bech32 HRP `ncryptsec`):
//! `version(0x02) || log_n(1) || salt(16) || nonce(24) || key_security(1)
//! || ciphertext(48)`. The symmetric key is scrypt with `N = 2^log_n,
//! r = 8, p = 1`; the cipher is XChaCha20-Poly1305 with the
//! key-security byte as associated data.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroize;

use sigil_types::encoding;

use crate::keys::SecretKey;
use crate::{CryptoError, Result};

const VERSION: u8 = 0x02;
const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 24;
/// 32-byte secret + 16-byte Poly1305 tag.
const CIPHERTEXT_SIZE: usize = 48;
const PAYLOAD_SIZE: usize = 2 + SALT_SIZE + NONCE_SIZE + 1 + CIPHERTEXT_SIZE;

/// Default scrypt difficulty (N = 2^16).
pub const DEFAULT_LOG_N: u8 = 16;

/// Whether the key was handled securely before encryption. Carried on
/// the wire and authenticated, not interpreted locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySecurity {
    /// The key has touched an insecure medium.
    Weak,
    /// The key has only ever lived in secure storage.
    Secure,
    /// Provenance unknown.
    Unknown,
}

impl KeySecurity {
    fn to_byte(self) -> u8 {
        match self {
            Self::Weak => 0x00,
            Self::Secure => 0x01,
            Self::Unknown => 0x02,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0x00 => Ok(Self::Weak),
            0x01 => Ok(Self::Secure),
            0x02 => Ok(Self::Unknown),
            other => Err(CryptoError::MalformedPayload(format!(
                "unknown key security byte {other:#04x}"
            ))),
        }
    }
}

/// Encrypt a secret key under a passphrase, returning `ncryptsec1…`.
pub fn encrypt_secret(
    secret: &SecretKey,
    passphrase: &str,
    log_n: u8,
    security: KeySecurity,
) -> Result<String> {
    if passphrase.is_empty() {
        return Err(CryptoError::InvalidInput("empty passphrase".to_string()));
    }

    let mut salt = [0u8; SALT_SIZE];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut salt);
    let mut nonce = [0u8; NONCE_SIZE];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce);

    let mut key = derive_key(passphrase, &salt, log_n)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    let security_byte = [security.to_byte()];
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: secret.as_bytes(),
                aad: &security_byte,
            },
        )
        .map_err(|_| CryptoError::Authentication)?;
    key.zeroize();

    let mut payload = Vec::with_capacity(PAYLOAD_SIZE);
    payload.push(VERSION);
    payload.push(log_n);
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(&nonce);
    payload.push(security.to_byte());
    payload.extend_from_slice(&ciphertext);

    encoding::encode_bech32(encoding::HRP_NCRYPTSEC, &payload)
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))
}

/// Decrypt an `ncryptsec1…` backup. A wrong passphrase fails the AEAD
/// tag and surfaces as [`CryptoError::Authentication`].
pub fn decrypt_secret(ncryptsec: &str, passphrase: &str) -> Result<(SecretKey, KeySecurity)> {
    if passphrase.is_empty() {
        return Err(CryptoError::InvalidInput("empty passphrase".to_string()));
    }

    let (hrp, payload) = encoding::decode_bech32(ncryptsec)
        .map_err(|e| CryptoError::MalformedPayload(e.to_string()))?;
    if hrp != encoding::HRP_NCRYPTSEC {
        return Err(CryptoError::MalformedPayload(format!(
            "expected ncryptsec, got {hrp}"
        )));
    }
    if payload.len() != PAYLOAD_SIZE {
        return Err(CryptoError::MalformedPayload(format!(
            "payload length {}",
            payload.len()
        )));
    }
    if payload[0] != VERSION {
        return Err(CryptoError::MalformedPayload(format!(
            "unknown version {}",
            payload[0]
        )));
    }

    let log_n = payload[1];
    let salt = &payload[2..2 + SALT_SIZE];
    let nonce = &payload[2 + SALT_SIZE..2 + SALT_SIZE + NONCE_SIZE];
    let security_byte = payload[2 + SALT_SIZE + NONCE_SIZE];
    let ciphertext = &payload[2 + SALT_SIZE + NONCE_SIZE + 1..];
    let security = KeySecurity::from_byte(security_byte)?;

    let mut key = derive_key(passphrase, salt, log_n)?;
    let cipher = XChaCha20Poly1305::new(Key::from_slice(&key));
    let mut plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &[security_byte],
            },
        )
        .map_err(|_| CryptoError::Authentication)?;
    key.zeroize();

    let bytes: [u8; 32] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::MalformedPayload("bad secret length".to_string()))?;
    let secret = SecretKey::from_bytes(&bytes);
    plaintext.zeroize();
    Ok((secret?, security))
}

fn derive_key(passphrase: &str, salt: &[u8], log_n: u8) -> Result<[u8; 32]> {
    let params = scrypt::Params::new(log_n, 8, 1, 32)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let mut key = [0u8; 32];
    scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}
