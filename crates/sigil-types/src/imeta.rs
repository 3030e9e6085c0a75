//! The MIP-04 `imeta` tag: out-of-band metadata for encrypted media.
//!
//! Emitted element order is deterministic (url, nonce, epoch, x,
//! encoding); the parser tolerates any order.

use serde::{Deserialize, Serialize};

use crate::{Result, TypesError};

/// Media encoding marker for MLS-encrypted blobs.
pub const ENCODING_MLS: &str = "mls";

/// Parsed `imeta` tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Imeta {
    /// Blob server URL the ciphertext was uploaded to.
    pub url: String,
    /// Base64 encryption nonce.
    pub nonce: String,
    /// Group epoch the media key was derived in.
    pub epoch: u64,
    /// SHA-256 of the ciphertext, lowercase hex.
    pub hash: String,
    /// Encoding discriminator; only `mls` is understood.
    pub encoding: String,
}

impl Imeta {
    /// Emit the tag in canonical element order.
    pub fn to_tag(&self) -> Vec<String> {
        vec![
            "imeta".to_string(),
            format!("url {}", self.url),
            format!("nonce {}", self.nonce),
            format!("epoch {}", self.epoch),
            format!("x {}", self.hash),
            format!("encoding {}", self.encoding),
        ]
    }

    /// Parse an `imeta` tag. Element order is not significant; unknown
    /// elements are ignored, missing required elements are an error.
    pub fn from_tag(tag: &[String]) -> Result<Self> {
        if tag.first().map(String::as_str) != Some("imeta") {
            return Err(TypesError::InvalidFormat("not an imeta tag".to_string()));
        }

        let mut url = None;
        let mut nonce = None;
        let mut epoch = None;
        let mut hash = None;
        let mut encoding = None;

        for element in &tag[1..] {
            let Some((key, value)) = element.split_once(' ') else {
                continue;
            };
            match key {
                "url" => url = Some(value.to_string()),
                "nonce" => nonce = Some(value.to_string()),
                "epoch" => {
                    epoch = Some(value.parse::<u64>().map_err(|_| {
                        TypesError::InvalidFormat(format!("bad epoch: {value}"))
                    })?);
                }
                "x" => hash = Some(value.to_string()),
                "encoding" => encoding = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(Self {
            url: url.ok_or_else(|| TypesError::InvalidFormat("imeta missing url".to_string()))?,
            nonce: nonce
                .ok_or_else(|| TypesError::InvalidFormat("imeta missing nonce".to_string()))?,
            epoch: epoch
                .ok_or_else(|| TypesError::InvalidFormat("imeta missing epoch".to_string()))?,
            hash: hash.ok_or_else(|| TypesError::InvalidFormat("imeta missing x".to_string()))?,
            encoding: encoding
                .ok_or_else(|| TypesError::InvalidFormat("imeta missing encoding".to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Imeta {
        Imeta {
            url: "https://blob.example/abcd".to_string(),
            nonce: "bm9uY2U=".to_string(),
            epoch: 7,
            hash: "ab".repeat(32),
            encoding: ENCODING_MLS.to_string(),
        }
    }

    #[test]
    fn test_tag_roundtrip() {
        let imeta = sample();
        let tag = imeta.to_tag();
        assert_eq!(tag[0], "imeta");
        assert_eq!(Imeta::from_tag(&tag).expect("parse"), imeta);
    }

    #[test]
    fn test_emit_order_deterministic() {
        let tag = sample().to_tag();
        let keys: Vec<&str> = tag[1..]
            .iter()
            .filter_map(|e| e.split_once(' ').map(|(k, _)| k))
            .collect();
        assert_eq!(keys, vec!["url", "nonce", "epoch", "x", "encoding"]);
    }

    #[test]
    fn test_parse_tolerates_reordering() {
        let mut tag = sample().to_tag();
        tag[1..].reverse();
        assert_eq!(Imeta::from_tag(&tag).expect("parse"), sample());
    }

    #[test]
    fn test_parse_ignores_unknown_elements() {
        let mut tag = sample().to_tag();
        tag.push("blurhash L9AS}j^-0e".to_string());
        assert_eq!(Imeta::from_tag(&tag).expect("parse"), sample());
    }

    #[test]
    fn test_missing_field_rejected() {
        let tag: Vec<String> = sample()
            .to_tag()
            .into_iter()
            .filter(|e| !e.starts_with("nonce"))
            .collect();
        assert!(Imeta::from_tag(&tag).is_err());
    }

    #[test]
    fn test_non_imeta_tag_rejected() {
        let tag = vec!["p".to_string(), "ab".repeat(32)];
        assert!(Imeta::from_tag(&tag).is_err());
    }

    #[test]
    fn test_bad_epoch_rejected() {
        let tag = vec![
            "imeta".to_string(),
            "url https://b.example/x".to_string(),
            "nonce bm9uY2U=".to_string(),
            "epoch twelve".to_string(),
            format!("x {}", "ab".repeat(32)),
            "encoding mls".to_string(),
        ];
        assert!(Imeta::from_tag(&tag).is_err());
    }
}
