use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;

/// Lifecycle of one off-chain approval attempt.
///
/// Allowed transitions: PENDING -> {VALID, EXPIRED, REJECTED} and
/// VALID -> USED_ONCHAIN. Everything else is forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureStatus {
    Pending,
    Valid,
    UsedOnchain,
    Expired,
    Rejected,
}

impl SignatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureStatus::Pending => "PENDING",
            SignatureStatus::Valid => "VALID",
            SignatureStatus::UsedOnchain => "USED_ONCHAIN",
            SignatureStatus::Expired => "EXPIRED",
            SignatureStatus::Rejected => "REJECTED",
        }
    }
}

#[derive(Debug)]
pub struct UnknownStatus(String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown signature status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl TryFrom<String> for SignatureStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "PENDING" => Ok(SignatureStatus::Pending),
            "VALID" => Ok(SignatureStatus::Valid),
            "USED_ONCHAIN" => Ok(SignatureStatus::UsedOnchain),
            "EXPIRED" => Ok(SignatureStatus::Expired),
            "REJECTED" => Ok(SignatureStatus::Rejected),
            _ => Err(UnknownStatus(value)),
        }
    }
}

impl std::fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One off-chain approval attempt. `amount` snapshots the leg amount at
/// intent time; `signature` stays empty until a valid one is recorded.
/// `(split_id, participant, salt)` is unique.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SplitSignature {
    pub id: i32,
    pub split_id: i32,
    pub participant: String,
    pub amount: String,
    pub deadline: Option<NaiveDateTime>,
    pub salt: String,
    pub signature: String,
    #[sqlx(try_from = "String")]
    pub status: SignatureStatus,
    pub reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
