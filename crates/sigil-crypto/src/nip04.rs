//! NIP-04 legacy direct-message decryption.
//!
//! Kept for reading old kind-4 messages only; new traffic uses NIP-44.
//! No encrypt function is offered.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::keys::{PublicKey, SecretKey};
use crate::{CryptoError, Result};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Decrypt a legacy `<ciphertext_b64>?iv=<iv_b64>` payload.
///
/// The key is the raw ECDH x-coordinate, unhashed, per the original
/// NIP-04 convention.
pub fn decrypt(my_secret: &SecretKey, their_pubkey: &PublicKey, payload: &str) -> Result<String> {
    let (ciphertext_b64, iv_b64) = payload
        .split_once("?iv=")
        .ok_or_else(|| CryptoError::MalformedPayload("missing iv separator".to_string()))?;

    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| CryptoError::MalformedPayload(e.to_string()))?;
    let iv = BASE64
        .decode(iv_b64)
        .map_err(|e| CryptoError::MalformedPayload(e.to_string()))?;
    if iv.len() != 16 {
        return Err(CryptoError::MalformedPayload("bad iv length".to_string()));
    }

    let key = crate::nip44::shared_point_x(my_secret, their_pubkey)?;
    let plaintext = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|_| CryptoError::KeyDerivation("cipher init failed".to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CryptoError::Authentication)?;

    String::from_utf8(plaintext).map_err(|e| CryptoError::MalformedPayload(e.to_string()))
}
