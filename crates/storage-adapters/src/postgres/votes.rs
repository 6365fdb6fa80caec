use async_trait::async_trait;
use domains::{DomainError, DomainResult, VoteRepository, VoteTarget, VoteValue};
use uuid::Uuid;

use super::PgStore;

/// (table, target column) of a vote target. Both come from a closed set.
fn ledger(target: VoteTarget) -> (&'static str, &'static str) {
    match target {
        VoteTarget::Post(_) => ("post_votes", "post_id"),
        VoteTarget::Comment(_) => ("comment_votes", "comment_id"),
    }
}

#[async_trait]
impl VoteRepository for PgStore {
    async fn upsert(&self, voter: Uuid, target: VoteTarget, value: VoteValue) -> DomainResult<()> {
        let (table, column) = ledger(target);
        let sql = format!(
            "INSERT INTO {table} (user_id, {column}, value) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, {column}) DO UPDATE SET value = EXCLUDED.value"
        );
        self.run(
            "votes.upsert",
            sqlx::query(&sql)
                .bind(voter)
                .bind(target.id())
                .bind(value.get())
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn aggregate(&self, target: VoteTarget) -> DomainResult<i64> {
        let (table, column) = ledger(target);
        let sql = format!("SELECT COALESCE(SUM(value), 0)::BIGINT FROM {table} WHERE {column} = $1");
        self.run(
            "votes.aggregate",
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(target.id())
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn viewer_vote(&self, voter: Uuid, target: VoteTarget) -> DomainResult<VoteValue> {
        let (table, column) = ledger(target);
        let sql = format!("SELECT value FROM {table} WHERE user_id = $1 AND {column} = $2");
        let stored = self
            .run(
                "votes.viewer_vote",
                sqlx::query_scalar::<_, i16>(&sql)
                    .bind(voter)
                    .bind(target.id())
                    .fetch_optional(&self.pool),
            )
            .await?;

        match stored {
            Some(value) => VoteValue::try_from(i64::from(value))
                .map_err(|_| DomainError::Internal(format!("stored vote {value} out of range"))),
            None => Ok(VoteValue::NEUTRAL),
        }
    }
}
