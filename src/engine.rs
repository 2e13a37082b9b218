use crate::{
    chain::{ChainGateway, CreateCall, SettleCall},
    eip712::{self, ApproveSplit, Eip712Domain},
    error::{ApiError, Result},
    models::{SignatureStatus, Split, SplitSignature, SupportedToken},
    store::{NewLeg, NewSignature, NewSplit, SplitBundle, SplitStore},
};
use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chain_id: u64,
    pub contract: Address,
    pub eip712_name: String,
    pub eip712_version: String,
}

#[derive(Debug, Clone)]
pub struct CreateLeg {
    pub participant: Address,
    pub amount: U256,
}

#[derive(Debug, Clone)]
pub struct CreateSplit {
    pub payer: Address,
    pub token: Address,
    pub legs: Vec<CreateLeg>,
    pub deadline: Option<String>,
    pub meta_hash: Option<B256>,
    pub create_onchain: bool,
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub id: i32,
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubmitSignature {
    pub participant: Address,
    pub amount: String,
    pub salt: B256,
    pub deadline: Option<String>,
    pub signature: String,
}

#[derive(Debug, Clone)]
pub struct SettleItem {
    pub participant: Address,
    pub amount: String,
    pub deadline: Option<String>,
    pub salt: B256,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct Allowance {
    pub token: String,
    pub owner: String,
    pub spender: String,
    pub allowance: String,
}

/// Parse a client deadline: `"0"` means no expiry, a digit string is unix
/// seconds, anything else must be ISO-8601.
pub fn parse_deadline(raw: &str) -> Result<Option<NaiveDateTime>> {
    let raw = raw.trim();
    if raw == "0" {
        return Ok(None);
    }

    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        let secs: i64 = raw
            .parse()
            .map_err(|_| ApiError::Invalid("deadline out of range".to_owned()))?;
        let date = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| ApiError::Invalid("deadline out of range".to_owned()))?;
        return Ok(Some(date.naive_utc()));
    }

    let date = DateTime::parse_from_rfc3339(raw)
        .map_err(|_| ApiError::Invalid("deadline must be unix seconds or ISO-8601".to_owned()))?;
    Ok(Some(date.naive_utc()))
}

/// Unix seconds of a deadline; 0 encodes "no expiry" at every layer.
fn unix_seconds(deadline: Option<NaiveDateTime>) -> u64 {
    deadline
        .map(|d| d.and_utc().timestamp().max(0) as u64)
        .unwrap_or(0)
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// The split state machine. All writes to splits, participants and
/// signatures go through here; the HTTP edge only parses and serializes.
pub struct SplitsEngine<S, G> {
    store: S,
    gateway: G,
    config: EngineConfig,
}

impl<S: SplitStore, G: ChainGateway> SplitsEngine<S, G> {
    pub fn new(store: S, gateway: G, config: EngineConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    fn domain(&self) -> Eip712Domain {
        eip712::domain(
            self.config.eip712_name.clone(),
            self.config.eip712_version.clone(),
            self.config.chain_id,
            self.config.contract,
        )
    }

    fn contract_str(&self) -> String {
        self.config.contract.to_checksum(None)
    }

    /// splitId used inside signatures and on-chain calls: the minted
    /// on-chain id when present, the local row id otherwise.
    fn signing_split_id(&self, split: &Split) -> Result<U256> {
        match &split.split_id_onchain {
            Some(raw) => raw.parse::<U256>().map_err(|_| ApiError::Internal),
            None => Ok(U256::from(split.id as u64)),
        }
    }

    async fn load_guarded(&self, id: i32) -> Result<SplitBundle> {
        let bundle = self
            .store
            .load_split(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("split not found".to_owned()))?;

        if bundle.split.chain_id != self.config.chain_id as i64
            || !bundle.split.contract.eq_ignore_ascii_case(&self.contract_str())
        {
            return Err(ApiError::NotFound(
                "split not found on this chain".to_owned(),
            ));
        }

        Ok(bundle)
    }

    pub async fn create_split(&self, input: CreateSplit) -> Result<Created> {
        if input.legs.is_empty() {
            return Err(ApiError::Invalid("split needs at least one leg".to_owned()));
        }

        let mut total = U256::ZERO;
        let mut seen = std::collections::HashSet::new();
        for leg in &input.legs {
            if leg.amount.is_zero() {
                return Err(ApiError::Invalid("leg amount must be positive".to_owned()));
            }
            if !seen.insert(leg.participant) {
                return Err(ApiError::Conflict("duplicate participant".to_owned()));
            }
            total = total
                .checked_add(leg.amount)
                .ok_or_else(|| ApiError::Invalid("total amount overflows uint256".to_owned()))?;
        }

        let deadline = match &input.deadline {
            Some(raw) => parse_deadline(raw)?,
            None => None,
        };

        // 1. durable rows first; the chain call can still fail
        let id = self
            .store
            .insert_split(NewSplit {
                chain_id: self.config.chain_id as i64,
                contract: self.contract_str(),
                payer: input.payer.to_checksum(None),
                token: input.token.to_checksum(None),
                total_amount: total.to_string(),
                deadline,
                meta_hash: input.meta_hash.map(|h| format!("{:?}", h)),
                legs: input
                    .legs
                    .iter()
                    .map(|leg| NewLeg {
                        participant: leg.participant.to_checksum(None),
                        amount: leg.amount.to_string(),
                    })
                    .collect(),
            })
            .await?;

        if !input.create_onchain {
            info!("split {} created off-chain", id);
            return Ok(Created { id, tx_hash: None });
        }

        // 2. mint the on-chain id; compensate the fresh row on failure
        let call = CreateCall {
            payer: input.payer,
            token: input.token,
            legs: input
                .legs
                .iter()
                .map(|leg| (leg.participant, leg.amount))
                .collect(),
            deadline: U256::from(unix_seconds(deadline)),
            meta_hash: input.meta_hash.unwrap_or(B256::ZERO),
        };
        let outcome = match self.gateway.create_split(call).await {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Err(cleanup) = self.store.delete_split(id).await {
                    error!("orphan split {} left behind: {:?}", id, cleanup);
                }
                return Err(err);
            }
        };

        // 3. record the minted id when the event decoded
        match outcome.split_id {
            Some(onchain) => {
                self.store.set_onchain_id(id, &onchain.to_string()).await?;
            }
            None => {
                warn!(
                    "split {}: receipt {:?} carries no SplitCreated event, keeping local id",
                    id, outcome.tx_hash
                );
            }
        }

        info!("split {} created in tx {:?}", id, outcome.tx_hash);
        Ok(Created {
            id,
            tx_hash: Some(format!("{:?}", outcome.tx_hash)),
        })
    }

    pub async fn approve_intent(
        &self,
        split_id: i32,
        participant: Address,
        deadline: Option<String>,
    ) -> Result<Value> {
        let bundle = self.load_guarded(split_id).await?;
        if bundle.split.settled {
            return Err(ApiError::Conflict("split already settled".to_owned()));
        }

        let wanted = participant.to_checksum(None);
        let leg = bundle
            .participants
            .iter()
            .find(|p| p.participant.eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| ApiError::NotFound("participant not in split".to_owned()))?;

        // a requested deadline may tighten the split deadline, never extend it
        let deadline = match deadline {
            Some(raw) => {
                let requested = parse_deadline(&raw)?;
                if let Some(cap) = bundle.split.deadline {
                    match requested {
                        Some(r) if r <= cap => {}
                        _ => {
                            return Err(ApiError::Invalid(
                                "deadline exceeds split deadline".to_owned(),
                            ));
                        }
                    }
                }
                requested
            }
            None => bundle.split.deadline,
        };

        let salt = B256::from(rand::thread_rng().r#gen::<[u8; 32]>());
        let row = self
            .store
            .insert_signature(NewSignature {
                split_id,
                participant: leg.participant.clone(),
                amount: leg.amount.clone(),
                deadline,
                salt: format!("{:?}", salt),
            })
            .await?;

        let amount: U256 = row.amount.parse().map_err(|_| ApiError::Internal)?;
        let signing_id = self.signing_split_id(&bundle.split)?;

        Ok(json!({
            "domain": {
                "name": self.config.eip712_name.as_str(),
                "version": self.config.eip712_version.as_str(),
                "chainId": self.config.chain_id.to_string(),
                "verifyingContract": self.contract_str(),
            },
            "types": {
                "ApproveSplit": [
                    { "name": "participant", "type": "address" },
                    { "name": "splitId", "type": "uint256" },
                    { "name": "token", "type": "address" },
                    { "name": "payer", "type": "address" },
                    { "name": "amount", "type": "uint256" },
                    { "name": "deadline", "type": "uint256" },
                    { "name": "salt", "type": "bytes32" },
                ],
            },
            "primaryType": "ApproveSplit",
            "message": {
                "participant": leg.participant.as_str(),
                "splitId": signing_id.to_string(),
                "token": bundle.split.token.as_str(),
                "payer": bundle.split.payer.as_str(),
                "amount": amount.to_string(),
                "deadline": unix_seconds(row.deadline).to_string(),
                "salt": format!("{:?}", salt),
            },
        }))
    }

    pub async fn submit_signature(
        &self,
        split_id: i32,
        input: SubmitSignature,
    ) -> Result<SignatureStatus> {
        // 1. split present on this chain and still open
        let bundle = self.load_guarded(split_id).await?;
        if bundle.split.settled {
            return Err(ApiError::Conflict("split already settled".to_owned()));
        }

        // 2. the leg and its exact amount (string equality on decimals)
        let wanted = input.participant.to_checksum(None);
        let leg = bundle
            .participants
            .iter()
            .find(|p| p.participant.eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| ApiError::NotFound("participant not in split".to_owned()))?;
        if leg.amount != input.amount {
            return Err(ApiError::Invalid("amount mismatch".to_owned()));
        }

        // 3. the intent row for this salt
        let salt_hex = format!("{:?}", input.salt);
        let row = self
            .store
            .signature_by_salt(split_id, &leg.participant, &salt_hex)
            .await?
            .ok_or_else(|| ApiError::NotFound("no intent for this salt".to_owned()))?;
        match row.status {
            SignatureStatus::Pending => {}
            // an identical resubmission of an accepted signature succeeds
            SignatureStatus::Valid => return Ok(SignatureStatus::Valid),
            SignatureStatus::UsedOnchain => {
                return Err(ApiError::Conflict(
                    "signature already used on-chain".to_owned(),
                ));
            }
            SignatureStatus::Expired | SignatureStatus::Rejected => {
                return Err(ApiError::Invalid(format!("intent is {}", row.status)));
            }
        }

        // at most one approved signature per participant; accepting a second
        // re-issued intent would leave the split unsettleable
        if bundle.signatures.iter().any(|s| {
            s.id != row.id
                && s.participant == leg.participant
                && matches!(
                    s.status,
                    SignatureStatus::Valid | SignatureStatus::UsedOnchain
                )
        }) {
            return Err(ApiError::Conflict(
                "participant already has an approved signature".to_owned(),
            ));
        }

        // 4. a client-supplied deadline must match the stored intent
        if let Some(raw) = &input.deadline {
            let client = parse_deadline(raw)?;
            if unix_seconds(client) != unix_seconds(row.deadline) {
                return Err(ApiError::Invalid("deadline mismatch".to_owned()));
            }
        }

        // 5. rebuild the digest from stored fields only, never client input
        let amount: U256 = row.amount.parse().map_err(|_| ApiError::Internal)?;
        let message = ApproveSplit {
            participant: input.participant,
            splitId: self.signing_split_id(&bundle.split)?,
            token: bundle.split.token.parse().map_err(|_| ApiError::Internal)?,
            payer: bundle.split.payer.parse().map_err(|_| ApiError::Internal)?,
            amount,
            deadline: U256::from(unix_seconds(row.deadline)),
            salt: input.salt,
        };
        let signer = eip712::verify(&self.domain(), &message, &input.signature)?;
        if signer != input.participant {
            return Err(ApiError::Invalid(
                "signer differs from participant".to_owned(),
            ));
        }

        // 6. expiry last, so a stale intent is marked rather than retried
        let deadline_unix = unix_seconds(row.deadline);
        if deadline_unix != 0 && unix_seconds(Some(now())) > deadline_unix {
            self.store
                .mark_expired(row.id, "expired before validation")
                .await?;
            return Err(ApiError::Invalid("expired".to_owned()));
        }

        let updated = self
            .store
            .record_approval(
                row.id,
                split_id,
                &leg.participant,
                &input.signature.to_lowercase(),
            )
            .await?;
        if !updated {
            // lost the race to an identical submission; the row is VALID now
            return Ok(SignatureStatus::Valid);
        }

        info!("split {}: signature accepted for {}", split_id, leg.participant);
        Ok(SignatureStatus::Valid)
    }

    pub async fn settle(&self, split_id: i32, items: Option<Vec<SettleItem>>) -> Result<String> {
        let bundle = self.load_guarded(split_id).await?;
        if bundle.split.settled {
            return Err(ApiError::Conflict("split already settled".to_owned()));
        }

        // 1. assemble signature rows in enumeration order
        let assembled: Vec<SplitSignature> = match items {
            Some(items) => {
                let mut rows = Vec::with_capacity(items.len());
                for item in items {
                    let wanted = item.participant.to_checksum(None);
                    let leg = bundle
                        .participants
                        .iter()
                        .find(|p| p.participant.eq_ignore_ascii_case(&wanted))
                        .ok_or_else(|| {
                            ApiError::NotFound("participant not in split".to_owned())
                        })?;
                    if leg.amount != item.amount {
                        return Err(ApiError::Invalid("amount mismatch".to_owned()));
                    }

                    let salt_hex = format!("{:?}", item.salt);
                    let row = self
                        .store
                        .signature_by_salt(split_id, &leg.participant, &salt_hex)
                        .await?
                        .ok_or_else(|| {
                            ApiError::NotFound("no signature for this salt".to_owned())
                        })?;
                    if row.status != SignatureStatus::Valid {
                        return Err(ApiError::Invalid("signature is not valid".to_owned()));
                    }

                    let client_deadline = match &item.deadline {
                        Some(raw) => parse_deadline(raw)?,
                        None => None,
                    };
                    if unix_seconds(client_deadline) != unix_seconds(row.deadline) {
                        return Err(ApiError::Invalid("deadline mismatch".to_owned()));
                    }
                    // stored bytes are authoritative; divergence is an attack
                    if item.signature.to_lowercase() != row.signature {
                        return Err(ApiError::Invalid("signature mismatch".to_owned()));
                    }

                    rows.push(row);
                }
                rows
            }
            None => bundle
                .signatures
                .iter()
                .filter(|s| s.status == SignatureStatus::Valid)
                .cloned()
                .collect(),
        };

        if assembled.len() != bundle.participants.len() {
            return Err(ApiError::Invalid("signature count mismatch".to_owned()));
        }

        // 2. parallel arrays, one index per assembled item
        let mut call = SettleCall {
            split_id: self.signing_split_id(&bundle.split)?,
            participants: Vec::with_capacity(assembled.len()),
            amounts: Vec::with_capacity(assembled.len()),
            deadlines: Vec::with_capacity(assembled.len()),
            salts: Vec::with_capacity(assembled.len()),
            vs: Vec::with_capacity(assembled.len()),
            rs: Vec::with_capacity(assembled.len()),
            ss: Vec::with_capacity(assembled.len()),
        };
        for row in &assembled {
            let leg = bundle
                .participants
                .iter()
                .find(|p| p.participant == row.participant)
                .ok_or(ApiError::Internal)?;

            let participant: Address = row.participant.parse().map_err(|_| ApiError::Internal)?;
            let amount: U256 = leg.amount.parse().map_err(|_| ApiError::Internal)?;
            let salt: B256 = row.salt.parse().map_err(|_| ApiError::Internal)?;
            let sig = eip712::parse_signature(&row.signature)?;

            call.participants.push(participant);
            call.amounts.push(amount);
            call.deadlines.push(U256::from(unix_seconds(row.deadline)));
            call.salts.push(salt);
            call.vs.push(if sig.v() { 28 } else { 27 });
            call.rs.push(sig.r().into());
            call.ss.push(sig.s().into());
        }

        // 3. submit and wait for the receipt; state is untouched on failure
        let tx_hash = self.gateway.settle_split(call).await?;

        // 4. post-state commits together only after the receipt
        let sig_ids: Vec<i32> = assembled.iter().map(|row| row.id).collect();
        self.store.mark_settled(split_id, &sig_ids).await?;

        info!("split {} settled in tx {:?}", split_id, tx_hash);
        Ok(format!("{:?}", tx_hash))
    }

    pub async fn check_allowance(&self, token: Address, owner: Address) -> Result<Allowance> {
        let allowance = self.gateway.erc20_allowance(token, owner).await?;

        Ok(Allowance {
            token: token.to_checksum(None),
            owner: owner.to_checksum(None),
            spender: self.contract_str(),
            allowance: allowance.to_string(),
        })
    }

    pub async fn get_split(&self, id: i32) -> Result<SplitBundle> {
        self.load_guarded(id).await
    }

    pub async fn list_tokens(&self) -> Result<Vec<SupportedToken>> {
        self.store.list_tokens(self.config.chain_id as i64).await
    }
}
