//! NIP-44 v2 encrypted payloads.
//!
//! Conversation keys are HKDF-SHA256 over the raw ECDH x-coordinate
//! with salt `nip44-v2`. Payloads are
//! `version(1) || nonce(32) || chacha20(padded) || hmac(32)`, base64.
//! The HMAC covers `nonce || ciphertext` and is verified before any
//! decryption work.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::keys::{PublicKey, SecretKey};
use crate::{CryptoError, Result};

const VERSION: u8 = 2;
const NONCE_SIZE: usize = 32;
const MAC_SIZE: usize = 32;
const MIN_PLAINTEXT: usize = 1;
const MAX_PLAINTEXT: usize = 65535;
/// chacha key (32) + chacha nonce (12) + hmac key (32).
const MESSAGE_KEYS_SIZE: usize = 76;

/// The 32-byte symmetric key shared by a peer pair.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ConversationKey([u8; 32]);

impl std::fmt::Debug for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConversationKey(<sensitive>)")
    }
}

impl ConversationKey {
    /// Derive the conversation key for `(my_secret, their_pubkey)`.
    ///
    /// Symmetric: both directions of a conversation derive the same key.
    pub fn derive(my_secret: &SecretKey, their_pubkey: &PublicKey) -> Result<Self> {
        let mut shared_x = shared_point_x(my_secret, their_pubkey)?;
        let (prk, _) = Hkdf::<Sha256>::extract(Some(b"nip44-v2"), &shared_x);
        shared_x.zeroize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&prk);
        Ok(Self(key))
    }

    /// Wrap raw key bytes (for keys transported out of band).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Per-message keys expanded from the conversation key and nonce.
struct MessageKeys {
    chacha_key: [u8; 32],
    chacha_nonce: [u8; 12],
    hmac_key: [u8; 32],
}

impl MessageKeys {
    fn derive(conversation_key: &ConversationKey, nonce: &[u8; NONCE_SIZE]) -> Result<Self> {
        let hk = Hkdf::<Sha256>::from_prk(conversation_key.as_bytes())
            .map_err(|_| CryptoError::KeyDerivation("bad PRK length".to_string()))?;
        let mut okm = [0u8; MESSAGE_KEYS_SIZE];
        hk.expand(nonce, &mut okm)
            .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".to_string()))?;

        let mut keys = Self {
            chacha_key: [0u8; 32],
            chacha_nonce: [0u8; 12],
            hmac_key: [0u8; 32],
        };
        keys.chacha_key.copy_from_slice(&okm[..32]);
        keys.chacha_nonce.copy_from_slice(&okm[32..44]);
        keys.hmac_key.copy_from_slice(&okm[44..]);
        okm.zeroize();
        Ok(keys)
    }
}

impl Drop for MessageKeys {
    fn drop(&mut self) {
        self.chacha_key.zeroize();
        self.hmac_key.zeroize();
    }
}

/// Encrypt a plaintext, returning the base64 payload.
pub fn encrypt(conversation_key: &ConversationKey, plaintext: &str) -> Result<String> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce);
    let payload = encrypt_with_nonce(conversation_key, plaintext.as_bytes(), &nonce)?;
    Ok(BASE64.encode(payload))
}

/// Decrypt a base64 payload.
pub fn decrypt(conversation_key: &ConversationKey, payload_b64: &str) -> Result<String> {
    // '#' marks a future incompatible version per the NIP.
    if payload_b64.starts_with('#') {
        return Err(CryptoError::MalformedPayload(
            "unsupported version flag".to_string(),
        ));
    }
    let payload = BASE64
        .decode(payload_b64)
        .map_err(|e| CryptoError::MalformedPayload(e.to_string()))?;
    let plaintext = decrypt_payload(conversation_key, &payload)?;
    String::from_utf8(plaintext).map_err(|e| CryptoError::MalformedPayload(e.to_string()))
}

fn encrypt_with_nonce(
    conversation_key: &ConversationKey,
    plaintext: &[u8],
    nonce: &[u8; NONCE_SIZE],
) -> Result<Vec<u8>> {
    let mut buffer = pad(plaintext)?;
    let keys = MessageKeys::derive(conversation_key, nonce)?;

    let mut cipher = ChaCha20::new(&keys.chacha_key.into(), &keys.chacha_nonce.into());
    cipher.apply_keystream(&mut buffer);

    let mut mac = Hmac::<Sha256>::new_from_slice(&keys.hmac_key)
        .map_err(|_| CryptoError::KeyDerivation("HMAC init failed".to_string()))?;
    mac.update(nonce);
    mac.update(&buffer);
    let tag = mac.finalize().into_bytes();

    let mut payload = Vec::with_capacity(1 + NONCE_SIZE + buffer.len() + MAC_SIZE);
    payload.push(VERSION);
    payload.extend_from_slice(nonce);
    payload.extend_from_slice(&buffer);
    payload.extend_from_slice(&tag);
    Ok(payload)
}

fn decrypt_payload(conversation_key: &ConversationKey, payload: &[u8]) -> Result<Vec<u8>> {
    // version + nonce + mac + at least one 34-byte ciphertext block.
    if payload.len() < 1 + NONCE_SIZE + MAC_SIZE + 34 {
        return Err(CryptoError::MalformedPayload("payload too short".to_string()));
    }
    if payload[0] != VERSION {
        return Err(CryptoError::MalformedPayload(format!(
            "unknown version {}",
            payload[0]
        )));
    }

    let nonce: [u8; NONCE_SIZE] = payload[1..1 + NONCE_SIZE]
        .try_into()
        .map_err(|_| CryptoError::MalformedPayload("bad nonce".to_string()))?;
    let ciphertext = &payload[1 + NONCE_SIZE..payload.len() - MAC_SIZE];
    let tag = &payload[payload.len() - MAC_SIZE..];

    let keys = MessageKeys::derive(conversation_key, &nonce)?;

    // Authenticate before decrypting; verify_slice is constant-time.
    let mut mac = Hmac::<Sha256>::new_from_slice(&keys.hmac_key)
        .map_err(|_| CryptoError::KeyDerivation("HMAC init failed".to_string()))?;
    mac.update(&nonce);
    mac.update(ciphertext);
    mac.verify_slice(tag).map_err(|_| CryptoError::Authentication)?;

    let mut buffer = ciphertext.to_vec();
    let mut cipher = ChaCha20::new(&keys.chacha_key.into(), &keys.chacha_nonce.into());
    cipher.apply_keystream(&mut buffer);

    unpad(&buffer)
}

/// ECDH x-coordinate, unhashed, with even/odd y recovery for the
/// x-only peer key. Shared with the legacy NIP-04 cipher.
pub(crate) fn shared_point_x(secret: &SecretKey, public: &PublicKey) -> Result<[u8; 32]> {
    use k256::{ecdh::diffie_hellman, PublicKey as K256PublicKey, SecretKey as K256SecretKey};

    let k256_secret = K256SecretKey::from_slice(secret.as_bytes())
        .map_err(|_| CryptoError::InvalidInput("secret key out of range".to_string()))?;

    let mut compressed = [0u8; 33];
    compressed[0] = 0x02;
    compressed[1..].copy_from_slice(public.as_bytes());
    let k256_public = K256PublicKey::from_sec1_bytes(&compressed)
        .or_else(|_| {
            compressed[0] = 0x03;
            K256PublicKey::from_sec1_bytes(&compressed)
        })
        .map_err(|_| CryptoError::InvalidInput("not a valid x-only point".to_string()))?;

    let shared = diffie_hellman(k256_secret.to_nonzero_scalar(), k256_public.as_affine());
    let mut x = [0u8; 32];
    x.copy_from_slice(shared.raw_secret_bytes());
    Ok(x)
}

/// Padded length schedule: 32-byte floor, then chunks of
/// `max(32, next_power_of_two / 8)`.
fn calc_padded_len(unpadded_len: usize) -> usize {
    if unpadded_len <= 32 {
        return 32;
    }
    let next_power = 1usize << ((unpadded_len - 1).ilog2() + 1);
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * ((unpadded_len - 1) / chunk + 1)
}

fn pad(plaintext: &[u8]) -> Result<Vec<u8>> {
    let len = plaintext.len();
    if !(MIN_PLAINTEXT..=MAX_PLAINTEXT).contains(&len) {
        return Err(CryptoError::PlaintextSize(len));
    }
    let mut padded = Vec::with_capacity(2 + calc_padded_len(len));
    padded.extend_from_slice(&(len as u16).to_be_bytes());
    padded.extend_from_slice(plaintext);
    padded.resize(2 + calc_padded_len(len), 0);
    Ok(padded)
}

fn unpad(padded: &[u8]) -> Result<Vec<u8>> {
    if padded.len() < 2 {
        return Err(CryptoError::MalformedPayload("padding too short".to_string()));
    }
    let unpadded_len = u16::from_be_bytes([padded[0], padded[1]]) as usize;
    if unpadded_len < MIN_PLAINTEXT
        || padded.len() < 2 + unpadded_len
        || padded.len() != 2 + calc_padded_len(unpadded_len)
    {
        return Err(CryptoError::MalformedPayload("invalid padding".to_string()));
    }
    Ok(padded[2..2 + unpadded_len].to_vec())
}
