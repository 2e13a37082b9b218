use super::{NewSignature, NewSplit, SplitBundle, SplitStore};
use crate::error::Result;
use crate::models::{SignatureStatus, Split, SplitParticipant, SplitSignature, SupportedToken};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SplitStore for PgStore {
    async fn insert_split(&self, split: NewSplit) -> Result<i32> {
        let now = Utc::now().naive_utc();
        let mut tx = self.pool.begin().await?;

        let id: i32 = sqlx::query_scalar(
            "INSERT INTO splits(chain_id,contract,payer,token,total_amount,deadline,meta_hash,settled,created_at,updated_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,FALSE,$8,$8) RETURNING id",
        )
        .bind(split.chain_id)
        .bind(&split.contract)
        .bind(&split.payer)
        .bind(&split.token)
        .bind(&split.total_amount)
        .bind(split.deadline)
        .bind(&split.meta_hash)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for leg in &split.legs {
            sqlx::query(
                "INSERT INTO split_participants(split_id,participant,amount) VALUES ($1,$2,$3)",
            )
            .bind(id)
            .bind(&leg.participant)
            .bind(&leg.amount)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    async fn delete_split(&self, id: i32) -> Result<()> {
        let _ = sqlx::query("DELETE FROM splits WHERE id=$1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_onchain_id(&self, id: i32, onchain_id: &str) -> Result<()> {
        let now = Utc::now().naive_utc();
        let _ = sqlx::query("UPDATE splits SET split_id_onchain=$1, updated_at=$2 WHERE id=$3")
            .bind(onchain_id)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn load_split(&self, id: i32) -> Result<Option<SplitBundle>> {
        let split = sqlx::query_as::<_, Split>("SELECT * FROM splits WHERE id=$1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(split) = split else {
            return Ok(None);
        };

        let participants = sqlx::query_as::<_, SplitParticipant>(
            "SELECT * FROM split_participants WHERE split_id=$1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let signatures = sqlx::query_as::<_, SplitSignature>(
            "SELECT * FROM split_signatures WHERE split_id=$1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(SplitBundle {
            split,
            participants,
            signatures,
        }))
    }

    async fn insert_signature(&self, sig: NewSignature) -> Result<SplitSignature> {
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, SplitSignature>(
            "INSERT INTO split_signatures(split_id,participant,amount,deadline,salt,signature,status,created_at,updated_at) \
             VALUES ($1,$2,$3,$4,$5,'',$6,$7,$7) RETURNING *",
        )
        .bind(sig.split_id)
        .bind(&sig.participant)
        .bind(&sig.amount)
        .bind(sig.deadline)
        .bind(&sig.salt)
        .bind(SignatureStatus::Pending.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn signature_by_salt(
        &self,
        split_id: i32,
        participant: &str,
        salt: &str,
    ) -> Result<Option<SplitSignature>> {
        let row = sqlx::query_as::<_, SplitSignature>(
            "SELECT * FROM split_signatures WHERE split_id=$1 AND participant=$2 AND salt=$3",
        )
        .bind(split_id)
        .bind(participant)
        .bind(salt)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn record_approval(
        &self,
        sig_id: i32,
        split_id: i32,
        participant: &str,
        signature: &str,
    ) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE split_signatures SET status=$1, signature=$2, reason=NULL, updated_at=$3 \
             WHERE id=$4 AND status=$5",
        )
        .bind(SignatureStatus::Valid.as_str())
        .bind(signature)
        .bind(now)
        .bind(sig_id)
        .bind(SignatureStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE split_participants SET approved_offchain_at=$1 \
             WHERE split_id=$2 AND participant=$3 AND approved_offchain_at IS NULL",
        )
        .bind(now)
        .bind(split_id)
        .bind(participant)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn mark_expired(&self, sig_id: i32, reason: &str) -> Result<()> {
        let now = Utc::now().naive_utc();
        let _ = sqlx::query(
            "UPDATE split_signatures SET status=$1, reason=$2, updated_at=$3 \
             WHERE id=$4 AND status=$5",
        )
        .bind(SignatureStatus::Expired.as_str())
        .bind(reason)
        .bind(now)
        .bind(sig_id)
        .bind(SignatureStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_settled(&self, split_id: i32, sig_ids: &[i32]) -> Result<()> {
        let now = Utc::now().naive_utc();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE splits SET settled=TRUE, updated_at=$1 WHERE id=$2 AND settled=FALSE")
            .bind(now)
            .bind(split_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE split_signatures SET status=$1, updated_at=$2 WHERE id = ANY($3) AND status=$4",
        )
        .bind(SignatureStatus::UsedOnchain.as_str())
        .bind(now)
        .bind(sig_ids.to_vec())
        .bind(SignatureStatus::Valid.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE split_participants p SET used_onchain_at=$1 FROM split_signatures s \
             WHERE s.id = ANY($2) AND p.split_id = s.split_id AND p.participant = s.participant",
        )
        .bind(now)
        .bind(sig_ids.to_vec())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_tokens(&self, chain_id: i64) -> Result<Vec<SupportedToken>> {
        let rows = sqlx::query_as::<_, SupportedToken>(
            "SELECT * FROM supported_tokens WHERE chain_id=$1 AND enabled=TRUE ORDER BY id",
        )
        .bind(chain_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
