//! In-memory store used by the engine tests. Mirrors the Postgres
//! implementation's guarded updates so state-machine tests exercise the
//! same transition rules.

use super::{NewSignature, NewSplit, SplitBundle, SplitStore};
use crate::error::{ApiError, Result};
use crate::models::{SignatureStatus, Split, SplitParticipant, SplitSignature, SupportedToken};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    splits: Vec<Split>,
    participants: Vec<SplitParticipant>,
    signatures: Vec<SplitSignature>,
    tokens: Vec<SupportedToken>,
    next_id: i32,
}

impl Inner {
    fn next(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemStore {
    pub fn split_ids(&self) -> Vec<i32> {
        self.inner.lock().unwrap().splits.iter().map(|s| s.id).collect()
    }

    pub fn add_token(&self, chain_id: i64, address: &str, symbol: &str, enabled: bool) {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next();
        inner.tokens.push(SupportedToken {
            id,
            chain_id,
            address: address.to_owned(),
            symbol: symbol.to_owned(),
            name: symbol.to_owned(),
            decimals: 6,
            enabled,
        });
    }

    /// Force a signature row into a state the engine cannot reach in a
    /// single-threaded test, e.g. USED_ONCHAIN on an unsettled split.
    pub fn force_status(&self, sig_id: i32, status: SignatureStatus) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner.signatures.iter_mut().find(|s| s.id == sig_id) {
            row.status = status;
        }
    }
}

#[async_trait]
impl SplitStore for MemStore {
    async fn insert_split(&self, split: NewSplit) -> Result<i32> {
        let now = Utc::now().naive_utc();
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next();

        inner.splits.push(Split {
            id,
            chain_id: split.chain_id,
            contract: split.contract,
            split_id_onchain: None,
            payer: split.payer,
            token: split.token,
            total_amount: split.total_amount,
            deadline: split.deadline,
            meta_hash: split.meta_hash,
            settled: false,
            created_at: now,
            updated_at: now,
        });

        for leg in split.legs {
            if inner
                .participants
                .iter()
                .any(|p| p.split_id == id && p.participant == leg.participant)
            {
                return Err(ApiError::Conflict("duplicate entry".to_owned()));
            }
            let pid = inner.next();
            inner.participants.push(SplitParticipant {
                id: pid,
                split_id: id,
                participant: leg.participant,
                amount: leg.amount,
                approved_offchain_at: None,
                used_onchain_at: None,
            });
        }

        Ok(id)
    }

    async fn delete_split(&self, id: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.splits.retain(|s| s.id != id);
        inner.participants.retain(|p| p.split_id != id);
        inner.signatures.retain(|s| s.split_id != id);
        Ok(())
    }

    async fn set_onchain_id(&self, id: i32, onchain_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(split) = inner.splits.iter_mut().find(|s| s.id == id) {
            split.split_id_onchain = Some(onchain_id.to_owned());
            split.updated_at = Utc::now().naive_utc();
        }
        Ok(())
    }

    async fn load_split(&self, id: i32) -> Result<Option<SplitBundle>> {
        let inner = self.inner.lock().unwrap();
        let Some(split) = inner.splits.iter().find(|s| s.id == id).cloned() else {
            return Ok(None);
        };

        Ok(Some(SplitBundle {
            split,
            participants: inner
                .participants
                .iter()
                .filter(|p| p.split_id == id)
                .cloned()
                .collect(),
            signatures: inner
                .signatures
                .iter()
                .filter(|s| s.split_id == id)
                .cloned()
                .collect(),
        }))
    }

    async fn insert_signature(&self, sig: NewSignature) -> Result<SplitSignature> {
        let now = Utc::now().naive_utc();
        let mut inner = self.inner.lock().unwrap();

        if inner.signatures.iter().any(|s| {
            s.split_id == sig.split_id && s.participant == sig.participant && s.salt == sig.salt
        }) {
            return Err(ApiError::Conflict("duplicate entry".to_owned()));
        }

        let id = inner.next();
        let row = SplitSignature {
            id,
            split_id: sig.split_id,
            participant: sig.participant,
            amount: sig.amount,
            deadline: sig.deadline,
            salt: sig.salt,
            signature: String::new(),
            status: SignatureStatus::Pending,
            reason: None,
            created_at: now,
            updated_at: now,
        };
        inner.signatures.push(row.clone());
        Ok(row)
    }

    async fn signature_by_salt(
        &self,
        split_id: i32,
        participant: &str,
        salt: &str,
    ) -> Result<Option<SplitSignature>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .signatures
            .iter()
            .find(|s| s.split_id == split_id && s.participant == participant && s.salt == salt)
            .cloned())
    }

    async fn record_approval(
        &self,
        sig_id: i32,
        split_id: i32,
        participant: &str,
        signature: &str,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        let Some(row) = inner
            .signatures
            .iter_mut()
            .find(|s| s.id == sig_id && s.status == SignatureStatus::Pending)
        else {
            return Ok(false);
        };
        row.status = SignatureStatus::Valid;
        row.signature = signature.to_owned();
        row.reason = None;
        row.updated_at = now;

        if let Some(participant) = inner
            .participants
            .iter_mut()
            .find(|p| p.split_id == split_id && p.participant == participant)
        {
            if participant.approved_offchain_at.is_none() {
                participant.approved_offchain_at = Some(now);
            }
        }

        Ok(true)
    }

    async fn mark_expired(&self, sig_id: i32, reason: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(row) = inner
            .signatures
            .iter_mut()
            .find(|s| s.id == sig_id && s.status == SignatureStatus::Pending)
        {
            row.status = SignatureStatus::Expired;
            row.reason = Some(reason.to_owned());
            row.updated_at = Utc::now().naive_utc();
        }
        Ok(())
    }

    async fn mark_settled(&self, split_id: i32, sig_ids: &[i32]) -> Result<()> {
        let now = Utc::now().naive_utc();
        let mut inner = self.inner.lock().unwrap();

        if let Some(split) = inner
            .splits
            .iter_mut()
            .find(|s| s.id == split_id && !s.settled)
        {
            split.settled = true;
            split.updated_at = now;
        }

        let mut settled_participants = Vec::new();
        for row in inner
            .signatures
            .iter_mut()
            .filter(|s| sig_ids.contains(&s.id) && s.status == SignatureStatus::Valid)
        {
            row.status = SignatureStatus::UsedOnchain;
            row.updated_at = now;
            settled_participants.push((row.split_id, row.participant.clone()));
        }

        for (split_id, participant) in settled_participants {
            if let Some(p) = inner
                .participants
                .iter_mut()
                .find(|p| p.split_id == split_id && p.participant == participant)
            {
                p.used_onchain_at = Some(now);
            }
        }

        Ok(())
    }

    async fn list_tokens(&self, chain_id: i64) -> Result<Vec<SupportedToken>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tokens
            .iter()
            .filter(|t| t.chain_id == chain_id && t.enabled)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_signature(split_id: i32) -> NewSignature {
        NewSignature {
            split_id,
            participant: "0x00000000000000000000000000000000000000C0".to_owned(),
            amount: "12500000".to_owned(),
            deadline: None,
            salt: format!("0x{}", "11".repeat(32)),
        }
    }

    fn new_split() -> NewSplit {
        NewSplit {
            chain_id: 534352,
            contract: "0x0000000000000000000000000000000000000001".to_owned(),
            payer: "0x00000000000000000000000000000000000000A0".to_owned(),
            token: "0x00000000000000000000000000000000000000B0".to_owned(),
            total_amount: "12500000".to_owned(),
            deadline: None,
            meta_hash: None,
            legs: vec![super::super::NewLeg {
                participant: "0x00000000000000000000000000000000000000C0".to_owned(),
                amount: "12500000".to_owned(),
            }],
        }
    }

    #[tokio::test]
    async fn salt_reuse_is_a_conflict() {
        let store = MemStore::default();
        let id = store.insert_split(new_split()).await.unwrap();
        store.insert_signature(new_signature(id)).await.unwrap();
        assert!(matches!(
            store.insert_signature(new_signature(id)).await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn approval_only_flips_pending_rows() {
        let store = MemStore::default();
        let id = store.insert_split(new_split()).await.unwrap();
        let row = store.insert_signature(new_signature(id)).await.unwrap();

        store.force_status(row.id, SignatureStatus::Expired);
        let updated = store
            .record_approval(row.id, id, &row.participant, "0xff")
            .await
            .unwrap();
        assert!(!updated);

        let found = store
            .signature_by_salt(id, &row.participant, &row.salt)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, SignatureStatus::Expired);
    }

    #[tokio::test]
    async fn expiry_does_not_touch_valid_rows() {
        let store = MemStore::default();
        let id = store.insert_split(new_split()).await.unwrap();
        let row = store.insert_signature(new_signature(id)).await.unwrap();
        store
            .record_approval(row.id, id, &row.participant, "0xff")
            .await
            .unwrap();

        store.mark_expired(row.id, "too late").await.unwrap();
        let found = store
            .signature_by_salt(id, &row.participant, &row.salt)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, SignatureStatus::Valid);
    }

    #[tokio::test]
    async fn settle_only_consumes_valid_rows() {
        let store = MemStore::default();
        let id = store.insert_split(new_split()).await.unwrap();
        let row = store.insert_signature(new_signature(id)).await.unwrap();

        // still PENDING: the settle commit must not consume it
        store.mark_settled(id, &[row.id]).await.unwrap();
        let found = store
            .signature_by_salt(id, &row.participant, &row.salt)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, SignatureStatus::Pending);
    }
}
