//! The encrypt→upload and download→decrypt pipelines.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use sigil_mls::GroupEngineAdapter;
use sigil_types::imeta::{Imeta, ENCODING_MLS};

use crate::blob::BlobClient;
use crate::{MediaError, Result};

/// MIP-04 media pipeline over one blob server.
pub struct MediaEngine {
    adapter: Arc<GroupEngineAdapter>,
    blob: BlobClient,
}

impl MediaEngine {
    pub fn new(adapter: Arc<GroupEngineAdapter>, blob: BlobClient) -> Self {
        Self { adapter, blob }
    }

    /// Encrypt a file under the group's epoch secret and upload the
    /// ciphertext. Returns the imeta tag to embed in the message.
    pub async fn upload(
        &self,
        group_id: &str,
        plaintext: &[u8],
        content_type: &str,
        filename: &str,
        cancel: &CancellationToken,
    ) -> Result<Imeta> {
        let media = self
            .adapter
            .encrypt_media(group_id, plaintext, content_type, filename)
            .await?;
        let hash_hex = hex::encode(media.file_hash);

        let url = self
            .blob
            .upload(&media.ciphertext, &hash_hex, cancel)
            .await?;

        tracing::info!(
            group_id = %group_id,
            size = media.ciphertext.len(),
            "media uploaded"
        );
        Ok(Imeta {
            url,
            nonce: BASE64.encode(media.nonce),
            epoch: media.epoch,
            hash: hash_hex,
            encoding: ENCODING_MLS.to_string(),
        })
    }

    /// Download a blob referenced by an imeta tag and decrypt it.
    ///
    /// Unknown `encoding` values fail closed; the ciphertext hash is
    /// verified before any decryption work.
    pub async fn download(
        &self,
        group_id: &str,
        imeta: &Imeta,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        if imeta.encoding != ENCODING_MLS {
            return Err(MediaError::UnknownEncoding(imeta.encoding.clone()));
        }

        let ciphertext = self.blob.download(&imeta.url, cancel).await?;
        verify_hash(&ciphertext, &imeta.hash)?;

        let plaintext = self
            .adapter
            .decrypt_media(group_id, &ciphertext, imeta)
            .await?;
        Ok(plaintext)
    }
}

/// Constant-shape hash check on downloaded ciphertext.
fn verify_hash(ciphertext: &[u8], expected_hex: &str) -> Result<()> {
    let actual: [u8; 32] = Sha256::digest(ciphertext).into();
    let expected = hex::decode(expected_hex)
        .map_err(|e| MediaError::InvalidInput(format!("bad hash hex: {e}")))?;
    if expected.len() != 32 || expected != actual {
        return Err(MediaError::HashMismatch);
    }
    Ok(())
}
