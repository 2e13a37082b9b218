#[cfg(test)]
pub mod mem;
mod pg;

pub use pg::PgStore;

use crate::error::Result;
use crate::models::{Split, SplitParticipant, SplitSignature, SupportedToken};
use async_trait::async_trait;
use chrono::NaiveDateTime;

#[derive(Debug, Clone)]
pub struct NewLeg {
    pub participant: String,
    pub amount: String,
}

#[derive(Debug, Clone)]
pub struct NewSplit {
    pub chain_id: i64,
    pub contract: String,
    pub payer: String,
    pub token: String,
    pub total_amount: String,
    pub deadline: Option<NaiveDateTime>,
    pub meta_hash: Option<String>,
    pub legs: Vec<NewLeg>,
}

#[derive(Debug, Clone)]
pub struct NewSignature {
    pub split_id: i32,
    pub participant: String,
    pub amount: String,
    pub deadline: Option<NaiveDateTime>,
    pub salt: String,
}

/// A split with its participants and signatures, loaded eagerly.
#[derive(Debug, Clone)]
pub struct SplitBundle {
    pub split: Split,
    pub participants: Vec<SplitParticipant>,
    pub signatures: Vec<SplitSignature>,
}

/// Durable store for splits. Multi-row operations are atomic: either every
/// row of the call commits or none does.
#[async_trait]
pub trait SplitStore: Send + Sync {
    /// Insert the split and its legs in one transaction; returns the id.
    async fn insert_split(&self, split: NewSplit) -> Result<i32>;

    /// Compensation for a failed on-chain create. Cascades to children.
    async fn delete_split(&self, id: i32) -> Result<()>;

    async fn set_onchain_id(&self, id: i32, onchain_id: &str) -> Result<()>;

    async fn load_split(&self, id: i32) -> Result<Option<SplitBundle>>;

    async fn insert_signature(&self, sig: NewSignature) -> Result<SplitSignature>;

    async fn signature_by_salt(
        &self,
        split_id: i32,
        participant: &str,
        salt: &str,
    ) -> Result<Option<SplitSignature>>;

    /// PENDING -> VALID plus the participant approval timestamp, in one
    /// transaction. Returns false when the row was no longer PENDING, which
    /// lets a raced duplicate submission read back as idempotent success.
    async fn record_approval(
        &self,
        sig_id: i32,
        split_id: i32,
        participant: &str,
        signature: &str,
    ) -> Result<bool>;

    /// PENDING -> EXPIRED with a reason. A row in any other state is left
    /// untouched.
    async fn mark_expired(&self, sig_id: i32, reason: &str) -> Result<()>;

    /// Settlement commit: split settled, participants `used_onchain_at`,
    /// signatures USED_ONCHAIN, in one transaction. The split row only
    /// flips when still unsettled.
    async fn mark_settled(&self, split_id: i32, sig_ids: &[i32]) -> Result<()>;

    async fn list_tokens(&self, chain_id: i64) -> Result<Vec<SupportedToken>>;
}
