//! Bech32 entity encoding (NIP-19) and id formatting helpers.

use bech32::{Bech32, Hrp};

use crate::{Result, TypesError};

/// Human-readable prefix for public keys.
pub const HRP_NPUB: &str = "npub";
/// Human-readable prefix for secret keys.
pub const HRP_NSEC: &str = "nsec";
/// Human-readable prefix for passphrase-encrypted secret keys (NIP-49).
pub const HRP_NCRYPTSEC: &str = "ncryptsec";

/// Encode 32 bytes under the given human-readable prefix.
pub fn encode_bech32(hrp: &str, data: &[u8]) -> Result<String> {
    let hrp = Hrp::parse(hrp).map_err(|e| TypesError::InvalidBech32(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, data).map_err(|e| TypesError::InvalidBech32(e.to_string()))
}

/// Decode a bech32 string, returning the prefix and payload bytes.
pub fn decode_bech32(s: &str) -> Result<(String, Vec<u8>)> {
    let (hrp, data) = bech32::decode(s).map_err(|e| TypesError::InvalidBech32(e.to_string()))?;
    Ok((hrp.to_string(), data))
}

/// Encode an x-only public key as `npub1…`.
pub fn npub_encode(pubkey: &[u8; 32]) -> Result<String> {
    encode_bech32(HRP_NPUB, pubkey)
}

/// Decode an `npub1…` string into the raw public key.
pub fn npub_decode(npub: &str) -> Result<[u8; 32]> {
    let (hrp, data) = decode_bech32(npub)?;
    if hrp != HRP_NPUB {
        return Err(TypesError::InvalidBech32(format!("expected npub, got {hrp}")));
    }
    to_array32(&data)
}

/// Encode a secret key as `nsec1…`.
pub fn nsec_encode(secret: &[u8; 32]) -> Result<String> {
    encode_bech32(HRP_NSEC, secret)
}

/// Decode an `nsec1…` string into the raw secret key.
pub fn nsec_decode(nsec: &str) -> Result<[u8; 32]> {
    let (hrp, data) = decode_bech32(nsec)?;
    if hrp != HRP_NSEC {
        return Err(TypesError::InvalidBech32(format!("expected nsec, got {hrp}")));
    }
    to_array32(&data)
}

/// Parse 64 lowercase hex chars into 32 bytes.
pub fn hex32(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|e| TypesError::InvalidHex(e.to_string()))?;
    to_array32(&bytes)
}

/// Accept either a 64-char hex string or an `npub1…` and return raw bytes.
pub fn pubkey_from_str(s: &str) -> Result<[u8; 32]> {
    if s.starts_with(HRP_NPUB) {
        npub_decode(s)
    } else {
        hex32(s)
    }
}

/// Accept either a 64-char hex string or an `nsec1…` and return raw bytes.
pub fn secret_from_str(s: &str) -> Result<[u8; 32]> {
    if s.starts_with(HRP_NSEC) {
        nsec_decode(s)
    } else {
        hex32(s)
    }
}

/// First 8 hex chars of a public key, used as a display fingerprint.
pub fn fingerprint(pubkey: &[u8; 32]) -> String {
    hex::encode(&pubkey[..4])
}

/// Abbreviate a 64-char hex id for logs: `1a2b3c4d…9e8f`.
pub fn short_id(id_hex: &str) -> String {
    if id_hex.len() <= 12 {
        return id_hex.to_string();
    }
    format!("{}…{}", &id_hex[..8], &id_hex[id_hex.len() - 4..])
}

fn to_array32(data: &[u8]) -> Result<[u8; 32]> {
    let arr: [u8; 32] = data.try_into().map_err(|_| TypesError::InvalidLength {
        expected: 32,
        actual: data.len(),
    })?;
    Ok(arr)
}
