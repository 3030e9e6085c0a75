//! NIP-26 delegation lifecycle: create, validate, revoke.
//!
//! Delegations are persisted one JSON file per delegator identity at
//! `<data_dir>/delegations/<npub>.json`. Revocation is local-only: a
//! revoked record stays in the file with `revoked = true`.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use sigil_crypto::event as event_codec;
use sigil_crypto::keys::{PublicKey, SecretKey};
use sigil_types::delegation::{build_conditions, Delegation};
use sigil_types::encoding;

use crate::{PolicyError, Result};

/// Issues and validates NIP-26 delegations for locally held identities.
pub struct DelegationEngine {
    data_dir: PathBuf,
}

impl DelegationEngine {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Issue a new delegation signed by `delegator_secret`.
    ///
    /// The caller is responsible for having routed the signing request
    /// through the approval pipeline; this engine only produces and
    /// records the token.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        delegator_secret: &SecretKey,
        delegatee_pubkey_hex: &str,
        allowed_kinds: Option<Vec<u16>>,
        valid_from: u64,
        valid_until: u64,
        created_at: u64,
        label: Option<String>,
    ) -> Result<Delegation> {
        let delegatee = encoding::hex32(delegatee_pubkey_hex)
            .map_err(|e| PolicyError::InvalidInput(e.to_string()))?;
        let delegator_npub = delegator_secret
            .public_key()
            .to_npub()
            .map_err(|e| PolicyError::InvalidInput(e.to_string()))?;

        let conditions = build_conditions(allowed_kinds.as_deref(), valid_from, valid_until);
        let token = delegation_token(&delegatee, &conditions);
        let signature = event_codec::sign_id(delegator_secret, &token)?;

        let mut id_bytes = [0u8; 16];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut id_bytes);

        let delegation = Delegation {
            id: hex::encode(id_bytes),
            delegator_npub: delegator_npub.clone(),
            delegatee_pubkey_hex: hex::encode(delegatee),
            allowed_kinds,
            valid_from,
            valid_until,
            conditions,
            signature: hex::encode(signature),
            created_at,
            revoked: false,
            revoked_at: 0,
            label,
        };

        let mut stored = self.load(&delegator_npub)?;
        stored.push(delegation.clone());
        self.save(&delegator_npub, &stored)?;

        tracing::info!(
            delegatee = %encoding::short_id(&delegation.delegatee_pubkey_hex),
            conditions = %delegation.conditions,
            "delegation issued"
        );
        Ok(delegation)
    }

    /// Mark a delegation revoked. Local-only; peers learn nothing.
    pub fn revoke(&self, delegator_npub: &str, id: &str, now: u64) -> Result<()> {
        let mut stored = self.load(delegator_npub)?;
        let record = stored
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or(PolicyError::NotFound)?;
        record.revoked = true;
        record.revoked_at = now;
        self.save(delegator_npub, &stored)?;
        tracing::info!(id, "delegation revoked");
        Ok(())
    }

    /// All delegations issued by an identity, revoked ones included.
    pub fn list(&self, delegator_npub: &str) -> Result<Vec<Delegation>> {
        self.load(delegator_npub)
    }

    /// Look up a delegation by id across every local delegator.
    pub fn find(&self, id: &str) -> Result<Option<Delegation>> {
        let dir = self.data_dir.join("delegations");
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Ok(None);
        };
        for entry in entries.flatten() {
            let Some(npub) = entry
                .path()
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
            else {
                continue;
            };
            if let Some(found) = self.load(&npub)?.into_iter().find(|d| d.id == id) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Validate a delegation for use at `now` with an event of
    /// `event_kind`.
    ///
    /// `event_kind == 0` skips the kind check entirely; this sentinel
    /// is kept for compatibility with existing callers, so kind-0
    /// events always pass the kind gate.
    pub fn is_valid(&self, delegation: &Delegation, event_kind: u16, now: u64) -> bool {
        if delegation.revoked {
            return false;
        }
        if delegation.valid_from != 0 && now < delegation.valid_from {
            return false;
        }
        if delegation.valid_until != 0 && now > delegation.valid_until {
            return false;
        }
        if event_kind != 0 {
            if let Some(kinds) = &delegation.allowed_kinds {
                if !kinds.contains(&event_kind) {
                    return false;
                }
            }
        }
        true
    }

    /// Verify a delegation's signature against its delegator.
    pub fn verify(&self, delegation: &Delegation) -> Result<()> {
        let delegator_pubkey = PublicKey::parse(&delegation.delegator_npub)?;
        let delegatee = encoding::hex32(&delegation.delegatee_pubkey_hex)
            .map_err(|e| PolicyError::InvalidInput(e.to_string()))?;
        let token = delegation_token(&delegatee, &delegation.conditions);
        let sig: [u8; 64] = hex::decode(&delegation.signature)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| PolicyError::InvalidInput("bad signature hex".to_string()))?;
        event_codec::verify_id(&delegator_pubkey, &token, &sig)?;
        Ok(())
    }

    /// The `["delegation", …]` tag for events signed under this
    /// delegation.
    pub fn build_tag(&self, delegation: &Delegation) -> Result<Vec<String>> {
        let delegator_pubkey = PublicKey::parse(&delegation.delegator_npub)?;
        Ok(delegation.to_tag(&delegator_pubkey.to_hex()))
    }

    fn file_path(&self, delegator_npub: &str) -> PathBuf {
        self.data_dir
            .join("delegations")
            .join(format!("{delegator_npub}.json"))
    }

    fn load(&self, delegator_npub: &str) -> Result<Vec<Delegation>> {
        let path = self.file_path(delegator_npub);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data =
            std::fs::read_to_string(&path).map_err(|e| PolicyError::Storage(e.to_string()))?;
        serde_json::from_str(&data).map_err(|e| PolicyError::Storage(e.to_string()))
    }

    fn save(&self, delegator_npub: &str, delegations: &[Delegation]) -> Result<()> {
        let path = self.file_path(delegator_npub);
        write_atomic(&path, delegations)
    }
}

/// Validate a `["delegation", delegator_hex, conditions, sig]` tag on
/// an inbound event: the signature must verify under the delegator,
/// and the event's kind and timestamp must satisfy the conditions.
pub fn verify_delegation_tag(
    tag: &[String],
    delegatee_pubkey_hex: &str,
    event_kind: u16,
    event_created_at: u64,
) -> Result<()> {
    if tag.len() != 4 || tag[0] != "delegation" {
        return Err(PolicyError::InvalidInput("not a delegation tag".to_string()));
    }
    let delegator = PublicKey::parse(&tag[1])?;
    let conditions = sigil_types::delegation::parse_conditions(&tag[2])
        .map_err(|e| PolicyError::InvalidInput(e.to_string()))?;

    let delegatee = encoding::hex32(delegatee_pubkey_hex)
        .map_err(|e| PolicyError::InvalidInput(e.to_string()))?;
    let token = delegation_token(&delegatee, &tag[2]);
    let sig: [u8; 64] = hex::decode(&tag[3])
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or_else(|| PolicyError::InvalidInput("bad signature hex".to_string()))?;
    event_codec::verify_id(&delegator, &token, &sig)?;

    if !conditions.kinds.is_empty() && !conditions.kinds.contains(&event_kind) {
        return Err(PolicyError::InvalidInput(format!(
            "kind {event_kind} not delegated"
        )));
    }
    if conditions.valid_from != 0 && event_created_at < conditions.valid_from {
        return Err(PolicyError::InvalidInput("event before delegation window".to_string()));
    }
    if conditions.valid_until != 0 && event_created_at > conditions.valid_until {
        return Err(PolicyError::InvalidInput("event after delegation window".to_string()));
    }
    Ok(())
}

/// The signed token: `sha256(sha256(delegatee_bytes || conditions))`.
fn delegation_token(delegatee: &[u8; 32], conditions: &str) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(32 + conditions.len());
    preimage.extend_from_slice(delegatee);
    preimage.extend_from_slice(conditions.as_bytes());
    let inner = Sha256::digest(&preimage);
    Sha256::digest(inner).into()
}

fn write_atomic(path: &Path, delegations: &[Delegation]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PolicyError::Storage(e.to_string()))?;
    }
    let data = serde_json::to_string_pretty(delegations)
        .map_err(|e| PolicyError::Storage(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data).map_err(|e| PolicyError::Storage(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| PolicyError::Storage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_crypto::keys::Keypair;

    const NOW: u64 = 1_750_000_000;

    fn engine() -> (DelegationEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        (DelegationEngine::new(dir.path()), dir)
    }

    fn delegatee_hex() -> String {
        Keypair::generate().public.to_hex()
    }

    #[test]
    fn test_create_signs_valid_token() {
        let (engine, _dir) = engine();
        let delegator = Keypair::generate();
        let delegation = engine
            .create(
                &delegator.secret,
                &delegatee_hex(),
                Some(vec![1]),
                0,
                0,
                NOW,
                Some("test app".to_string()),
            )
            .expect("create");

        engine.verify(&delegation).expect("signature verifies");
        assert_eq!(delegation.conditions, "kind=1");
    }

    #[test]
    fn test_kind_restriction() {
        let (engine, _dir) = engine();
        let delegator = Keypair::generate();
        let delegation = engine
            .create(&delegator.secret, &delegatee_hex(), Some(vec![1]), 0, 0, NOW, None)
            .expect("create");

        assert!(engine.is_valid(&delegation, 1, NOW));
        assert!(!engine.is_valid(&delegation, 7, NOW));
        // kind 0 skips the kind check.
        assert!(engine.is_valid(&delegation, 0, NOW));
    }

    #[test]
    fn test_time_bounds() {
        let (engine, _dir) = engine();
        let delegator = Keypair::generate();
        let delegation = engine
            .create(
                &delegator.secret,
                &delegatee_hex(),
                None,
                1_700_000_000,
                1_800_000_000,
                NOW,
                None,
            )
            .expect("create");

        assert!(!engine.is_valid(&delegation, 0, 1_699_999_999));
        assert!(engine.is_valid(&delegation, 0, 1_700_000_000));
        assert!(engine.is_valid(&delegation, 0, 1_750_000_000));
        assert!(engine.is_valid(&delegation, 0, 1_800_000_000));
        assert!(!engine.is_valid(&delegation, 0, 1_800_000_001));
    }

    #[test]
    fn test_unbounded_time() {
        let (engine, _dir) = engine();
        let delegator = Keypair::generate();
        let delegation = engine
            .create(&delegator.secret, &delegatee_hex(), None, 0, 0, NOW, None)
            .expect("create");
        assert!(engine.is_valid(&delegation, 0, 0));
        assert!(engine.is_valid(&delegation, 0, u64::MAX));
    }

    #[test]
    fn test_revoke() {
        let (engine, _dir) = engine();
        let delegator = Keypair::generate();
        let delegation = engine
            .create(&delegator.secret, &delegatee_hex(), None, 0, 0, NOW, None)
            .expect("create");
        let npub = delegation.delegator_npub.clone();

        engine.revoke(&npub, &delegation.id, NOW + 10).expect("revoke");

        let stored = engine.list(&npub).expect("list");
        assert_eq!(stored.len(), 1);
        assert!(stored[0].revoked);
        assert_eq!(stored[0].revoked_at, NOW + 10);
        assert!(!engine.is_valid(&stored[0], 0, NOW));
    }

    #[test]
    fn test_revoke_unknown_id() {
        let (engine, _dir) = engine();
        let delegator = Keypair::generate();
        let delegation = engine
            .create(&delegator.secret, &delegatee_hex(), None, 0, 0, NOW, None)
            .expect("create");
        assert!(matches!(
            engine.revoke(&delegation.delegator_npub, "missing", NOW),
            Err(PolicyError::NotFound)
        ));
    }

    #[test]
    fn test_persistence_across_engines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let delegator = Keypair::generate();
        let npub;
        {
            let engine = DelegationEngine::new(dir.path());
            let d = engine
                .create(&delegator.secret, &delegatee_hex(), Some(vec![1, 7]), 0, 0, NOW, None)
                .expect("create");
            npub = d.delegator_npub;
        }
        let engine = DelegationEngine::new(dir.path());
        let stored = engine.list(&npub).expect("list");
        assert_eq!(stored.len(), 1);
        engine.verify(&stored[0]).expect("still verifies");
    }

    #[test]
    fn test_build_tag_shape() {
        let (engine, _dir) = engine();
        let delegator = Keypair::generate();
        let delegation = engine
            .create(
                &delegator.secret,
                &delegatee_hex(),
                Some(vec![1]),
                1_700_000_000,
                0,
                NOW,
                None,
            )
            .expect("create");

        let tag = engine.build_tag(&delegation).expect("tag");
        assert_eq!(tag.len(), 4);
        assert_eq!(tag[0], "delegation");
        assert_eq!(tag[1], delegator.public.to_hex());
        assert_eq!(tag[2], "kind=1&created_at>1700000000");
        assert_eq!(tag[3], delegation.signature);
    }

    #[test]
    fn test_inbound_tag_validation() {
        let (engine, _dir) = engine();
        let delegator = Keypair::generate();
        let delegatee = Keypair::generate();
        let delegation = engine
            .create(
                &delegator.secret,
                &delegatee.public.to_hex(),
                Some(vec![1]),
                1_700_000_000,
                1_800_000_000,
                NOW,
                None,
            )
            .expect("create");
        let tag = engine.build_tag(&delegation).expect("tag");

        verify_delegation_tag(&tag, &delegatee.public.to_hex(), 1, NOW).expect("valid");
        // Wrong kind, outside window, wrong delegatee, tampered sig.
        assert!(verify_delegation_tag(&tag, &delegatee.public.to_hex(), 7, NOW).is_err());
        assert!(
            verify_delegation_tag(&tag, &delegatee.public.to_hex(), 1, 1_699_999_999).is_err()
        );
        let other = Keypair::generate();
        assert!(verify_delegation_tag(&tag, &other.public.to_hex(), 1, NOW).is_err());
        let mut bad = tag.clone();
        bad[3] = "0".repeat(128);
        assert!(verify_delegation_tag(&bad, &delegatee.public.to_hex(), 1, NOW).is_err());
    }

    #[test]
    fn test_tampered_conditions_fail_verify() {
        let (engine, _dir) = engine();
        let delegator = Keypair::generate();
        let mut delegation = engine
            .create(&delegator.secret, &delegatee_hex(), Some(vec![1]), 0, 0, NOW, None)
            .expect("create");
        delegation.conditions = "kind=1&kind=7".to_string();
        assert!(engine.verify(&delegation).is_err());
    }
}
