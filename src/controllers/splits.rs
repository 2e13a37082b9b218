use crate::AppState;
use crate::engine::{CreateLeg, CreateSplit, Created, SettleItem, SubmitSignature};
use crate::error::Result;
use crate::models::SignatureStatus;
use crate::store::SplitBundle;
use axum::extract::{Json, Path, State};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct LegBody {
    participant: String,
    amount: String,
}

#[derive(Deserialize)]
pub struct CreateSplitBody {
    payer: String,
    token: String,
    legs: Vec<LegBody>,
    deadline: Option<String>,
    meta_hash: Option<String>,
    #[serde(default)]
    create_onchain: bool,
}

pub async fn create_split(
    State(app): State<Arc<AppState>>,
    Json(body): Json<CreateSplitBody>,
) -> Result<Json<Created>> {
    let payer = super::parse_address(&body.payer)?;
    let token = super::parse_address(&body.token)?;
    let legs = body
        .legs
        .iter()
        .map(|leg| {
            Ok(CreateLeg {
                participant: super::parse_address(&leg.participant)?,
                amount: super::parse_amount(&leg.amount)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let meta_hash = body.meta_hash.as_deref().map(super::parse_hash).transpose()?;

    let created = app
        .engine
        .create_split(CreateSplit {
            payer,
            token,
            legs,
            deadline: body.deadline,
            meta_hash,
            create_onchain: body.create_onchain,
        })
        .await?;

    Ok(Json(created))
}

/// Canonical serialization of a split with its participants and signatures.
#[derive(Serialize)]
pub struct SplitDetail {
    id: i32,
    chain_id: i64,
    contract: String,
    split_id_onchain: Option<String>,
    payer: String,
    token: String,
    total_amount: String,
    deadline: Option<NaiveDateTime>,
    meta_hash: Option<String>,
    settled: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    participants: Vec<ParticipantView>,
    signatures: Vec<SignatureView>,
}

#[derive(Serialize)]
pub struct ParticipantView {
    id: i32,
    participant: String,
    amount: String,
    approved_offchain_at: Option<NaiveDateTime>,
    used_onchain_at: Option<NaiveDateTime>,
}

#[derive(Serialize)]
pub struct SignatureView {
    id: i32,
    participant: String,
    amount: String,
    deadline: Option<NaiveDateTime>,
    salt: String,
    signature: Option<String>,
    status: SignatureStatus,
    reason: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl SplitDetail {
    fn new(bundle: SplitBundle) -> SplitDetail {
        SplitDetail {
            id: bundle.split.id,
            chain_id: bundle.split.chain_id,
            contract: bundle.split.contract,
            split_id_onchain: bundle.split.split_id_onchain,
            payer: bundle.split.payer,
            token: bundle.split.token,
            total_amount: bundle.split.total_amount,
            deadline: bundle.split.deadline,
            meta_hash: bundle.split.meta_hash,
            settled: bundle.split.settled,
            created_at: bundle.split.created_at,
            updated_at: bundle.split.updated_at,
            participants: bundle
                .participants
                .into_iter()
                .map(|p| ParticipantView {
                    id: p.id,
                    participant: p.participant,
                    amount: p.amount,
                    approved_offchain_at: p.approved_offchain_at,
                    used_onchain_at: p.used_onchain_at,
                })
                .collect(),
            signatures: bundle
                .signatures
                .into_iter()
                .map(|s| SignatureView {
                    id: s.id,
                    participant: s.participant,
                    amount: s.amount,
                    deadline: s.deadline,
                    salt: s.salt,
                    signature: if s.signature.is_empty() {
                        None
                    } else {
                        Some(s.signature)
                    },
                    status: s.status,
                    reason: s.reason,
                    created_at: s.created_at,
                    updated_at: s.updated_at,
                })
                .collect(),
        }
    }
}

pub async fn get_split(
    State(app): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<SplitDetail>> {
    let bundle = app.engine.get_split(id).await?;
    Ok(Json(SplitDetail::new(bundle)))
}

#[derive(Deserialize)]
pub struct ApproveIntentBody {
    participant: String,
    deadline: Option<String>,
}

pub async fn approve_intent(
    State(app): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<ApproveIntentBody>,
) -> Result<Json<Value>> {
    let participant = super::parse_address(&body.participant)?;
    let payload = app.engine.approve_intent(id, participant, body.deadline).await?;
    Ok(Json(payload))
}

#[derive(Deserialize)]
pub struct SubmitSignatureBody {
    participant: String,
    amount: String,
    salt: String,
    deadline: Option<String>,
    signature: String,
}

pub async fn submit_signature(
    State(app): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<SubmitSignatureBody>,
) -> Result<Json<Value>> {
    let input = SubmitSignature {
        participant: super::parse_address(&body.participant)?,
        amount: body.amount,
        salt: super::parse_hash(&body.salt)?,
        deadline: body.deadline,
        signature: super::parse_signature_hex(&body.signature)?,
    };

    let status = app.engine.submit_signature(id, input).await?;
    Ok(Json(json!({ "status": status })))
}

#[derive(Deserialize)]
pub struct SettleItemBody {
    participant: String,
    amount: String,
    deadline: Option<String>,
    salt: String,
    signature: String,
}

#[derive(Deserialize)]
pub struct SettleBody {
    items: Option<Vec<SettleItemBody>>,
}

pub async fn settle(
    State(app): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<SettleBody>,
) -> Result<Json<Value>> {
    let items = body
        .items
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    Ok(SettleItem {
                        participant: super::parse_address(&item.participant)?,
                        amount: item.amount.clone(),
                        deadline: item.deadline.clone(),
                        salt: super::parse_hash(&item.salt)?,
                        signature: super::parse_signature_hex(&item.signature)?,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    let tx_hash = app.engine.settle(id, items).await?;
    Ok(Json(json!({ "tx_hash": tx_hash })))
}
