use serde::Serialize;
use sqlx::FromRow;

/// Read-only token catalog row used by the query layer.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SupportedToken {
    pub id: i32,
    pub chain_id: i64,
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: i32,
    pub enabled: bool,
}
