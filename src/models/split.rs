use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

/// A payment-split job. Amounts travel as decimal strings so the full
/// 256-bit range survives the round trip through the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Split {
    pub id: i32,
    pub chain_id: i64,
    pub contract: String,
    pub split_id_onchain: Option<String>,
    pub payer: String,
    pub token: String,
    pub total_amount: String,
    pub deadline: Option<NaiveDateTime>,
    pub meta_hash: Option<String>,
    pub settled: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// One leg of a split. `(split_id, participant)` is unique.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SplitParticipant {
    pub id: i32,
    pub split_id: i32,
    pub participant: String,
    pub amount: String,
    pub approved_offchain_at: Option<NaiveDateTime>,
    pub used_onchain_at: Option<NaiveDateTime>,
}
