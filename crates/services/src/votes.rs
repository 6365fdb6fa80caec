//! # Vote Ledger
//!
//! One row per (voter, target). Casting a vote replaces the previous
//! value; casting zero retracts it. Scores are always the sum of the
//! current values, never a running counter.

use std::sync::Arc;

use domains::{DomainResult, VoteRepository, VoteTarget, VoteValue};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Score of a target as seen by one voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub score: i64,
    pub viewer_vote: i16,
}

#[derive(Clone)]
pub struct VoteLedger {
    repo: Arc<dyn VoteRepository>,
}

impl VoteLedger {
    pub fn new(repo: Arc<dyn VoteRepository>) -> Self {
        Self { repo }
    }

    /// Records `value` as the voter's current vote on `target`.
    /// Repeating the same vote leaves the score unchanged.
    pub async fn cast_vote(
        &self,
        voter: Uuid,
        target: VoteTarget,
        value: VoteValue,
    ) -> DomainResult<()> {
        self.repo.upsert(voter, target, value).await?;
        info!(%voter, ?target, value = value.get(), "vote recorded");
        Ok(())
    }

    pub async fn aggregate_score(&self, target: VoteTarget) -> DomainResult<i64> {
        self.repo.aggregate(target).await
    }

    pub async fn viewer_vote(&self, voter: Uuid, target: VoteTarget) -> DomainResult<VoteValue> {
        self.repo.viewer_vote(voter, target).await
    }

    pub async fn tally(&self, voter: Uuid, target: VoteTarget) -> DomainResult<VoteTally> {
        Ok(VoteTally {
            score: self.aggregate_score(target).await?,
            viewer_vote: self.viewer_vote(voter, target).await?.get(),
        })
    }
}
