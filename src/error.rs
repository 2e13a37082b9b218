use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub type Result<T> = core::result::Result<T, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// malformed or semantically wrong input: bad hex, amount mismatch,
    /// deadline mismatch, expired signature, signer != participant
    Invalid(String),
    /// unknown split, participant not in split, no intent for a salt
    NotFound(String),
    /// duplicate participant, settled split, signature already used on-chain
    Conflict(String),
    /// RPC error, revert, receipt wait failure; carries the chain message
    Chain(String),
    /// missing executor key or bad boot configuration
    Misconfigured(String),
    Internal,
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        error!("io: {}", e);
        ApiError::Internal
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> ApiError {
        match e {
            sqlx::Error::RowNotFound => ApiError::NotFound("not found".to_owned()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::Conflict("duplicate entry".to_owned())
            }
            other => {
                error!("db: {}", other);
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, error) = match self {
            Self::Invalid(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Chain(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("chain operation failed: {}", msg),
            ),
            Self::Misconfigured(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_owned(),
            ),
        };

        (
            code,
            Json(serde_json::json!({
                "status": "failure",
                "error": error
            })),
        )
            .into_response()
    }
}
