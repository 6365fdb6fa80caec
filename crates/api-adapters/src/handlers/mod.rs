//! # Handlers
//!
//! Each handler parses its input, calls one service operation and maps
//! the outcome to a status code. Authorization decisions live in the
//! services; handlers only translate them.

pub mod accounts;
pub mod comments;
pub mod communities;
pub mod posts;
pub mod system;

use domains::{VoteTarget, VoteValue};
use serde::Deserialize;
use services::VoteTally;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

/// `{ "value": -1 | 0 | 1 }`
#[derive(Debug, Deserialize)]
pub struct VoteBody {
    pub value: VoteValue,
}

/// Shared tail of the post and comment vote endpoints.
async fn cast_vote(state: &AppState, voter: Uuid, target: VoteTarget, value: VoteValue) -> ApiResult<VoteTally> {
    let votes = &state.services.votes;
    votes.cast_vote(voter, target, value).await?;
    state.metrics.record_event("vote_cast");
    Ok(votes.tally(voter, target).await?)
}
