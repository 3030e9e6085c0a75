//! NIP-06: key derivation from BIP-39 mnemonic phrases.
//!
//! Derivation path is `m/44'/1237'/<account>'/0/0` (SLIP-44 coin type
//! 1237 is registered for Nostr).

use bip39::{Language, Mnemonic};
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::Network;
use zeroize::Zeroize;

use crate::keys::SecretKey;
use crate::{CryptoError, Result};

/// Check that a phrase is a well-formed BIP-39 English mnemonic:
/// word count in {12, 15, 18, 21, 24}, all words in the list, checksum
/// valid.
pub fn mnemonic_validate(phrase: &str) -> bool {
    Mnemonic::parse_in_normalized(Language::English, phrase).is_ok()
}

/// Generate a fresh 12-word mnemonic.
pub fn mnemonic_generate() -> Result<String> {
    let mut entropy = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut entropy);
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    entropy.zeroize();
    Ok(mnemonic.to_string())
}

/// Derive the account secret key from a mnemonic phrase.
///
/// Pure: the same `(phrase, passphrase, account)` always yields the
/// same key.
pub fn mnemonic_to_secret(phrase: &str, passphrase: &str, account: u32) -> Result<SecretKey> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| CryptoError::InvalidInput(format!("bad mnemonic: {e}")))?;

    let mut seed = mnemonic.to_seed_normalized(passphrase);
    let root = Xpriv::new_master(Network::Bitcoin, &seed)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    seed.zeroize();

    let path = derivation_path(account)?;
    let secp = bitcoin::secp256k1::Secp256k1::new();
    let child = root
        .derive_priv(&secp, &path)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let mut bytes = child.private_key.secret_bytes();
    let secret = SecretKey::from_bytes(&bytes);
    bytes.zeroize();
    secret
}

/// `m/44'/1237'/<account>'/0/0`.
fn derivation_path(account: u32) -> Result<DerivationPath> {
    let hardened = |idx: u32| {
        ChildNumber::from_hardened_idx(idx)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))
    };
    let normal = |idx: u32| {
        ChildNumber::from_normal_idx(idx)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))
    };
    Ok(DerivationPath::from(vec![
        hardened(44)?,
        hardened(1237)?,
        hardened(account)?,
        normal(0)?,
        normal(0)?,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_validate_known_good() {
        assert!(mnemonic_validate(TEST_MNEMONIC));
    }

    #[test]
    fn test_validate_rejects_bad_checksum() {
        let phrase =
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        assert!(!mnemonic_validate(phrase));
    }

    #[test]
    fn test_validate_rejects_bad_word_count() {
        assert!(!mnemonic_validate("abandon abandon about"));
        assert!(!mnemonic_validate(""));
    }

    #[test]
    fn test_validate_rejects_unknown_words() {
        let phrase =
            "zebra1 abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
        assert!(!mnemonic_validate(phrase));
    }

    #[test]
    fn test_derivation_deterministic() {
        let a = mnemonic_to_secret(TEST_MNEMONIC, "", 0).expect("derive");
        let b = mnemonic_to_secret(TEST_MNEMONIC, "", 0).expect("derive");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_accounts_differ() {
        let a = mnemonic_to_secret(TEST_MNEMONIC, "", 0).expect("derive");
        let b = mnemonic_to_secret(TEST_MNEMONIC, "", 1).expect("derive");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_passphrase_changes_key() {
        let a = mnemonic_to_secret(TEST_MNEMONIC, "", 0).expect("derive");
        let b = mnemonic_to_secret(TEST_MNEMONIC, "extra", 0).expect("derive");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_generated_mnemonic_validates() {
        let phrase = mnemonic_generate().expect("generate");
        assert!(mnemonic_validate(&phrase));
        assert_eq!(phrase.split_whitespace().count(), 12);
        mnemonic_to_secret(&phrase, "", 0).expect("derive from generated");
    }
}
