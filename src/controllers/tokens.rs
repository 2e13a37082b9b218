use crate::AppState;
use crate::engine::Allowance;
use crate::error::Result;
use crate::models::SupportedToken;
use axum::extract::{Json, Query, State};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct AllowanceQuery {
    token: String,
    owner: String,
}

/// Pre-flight probe: how much the coordinator may currently pull from
/// `owner` in `token`.
pub async fn check_allowance(
    State(app): State<Arc<AppState>>,
    Query(query): Query<AllowanceQuery>,
) -> Result<Json<Allowance>> {
    let token = super::parse_address(&query.token)?;
    let owner = super::parse_address(&query.owner)?;

    Ok(Json(app.engine.check_allowance(token, owner).await?))
}

pub async fn list_tokens(State(app): State<Arc<AppState>>) -> Result<Json<Vec<SupportedToken>>> {
    Ok(Json(app.engine.list_tokens().await?))
}
