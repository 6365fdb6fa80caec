//! Feed plan evaluation over the in-memory maps.
//!
//! Matching and ordering follow the SQL rendering in `postgres::feed`:
//! text search is a literal, case-insensitive substring of title or content,
//! and ties fall back to `created_at` then `id` in the plan's direction.

use std::cmp::Ordering;

use domains::{FeedOrder, Post, PostPredicate, PostSummary, RankKey, SortDirection};
use uuid::Uuid;

use super::MemoryStore;

pub(super) fn matches(store: &MemoryStore, post: &Post, predicate: &PostPredicate, viewer: Uuid) -> bool {
    match predicate {
        PostPredicate::TextMatch(text) => {
            let needle = text.to_lowercase();
            post.title.to_lowercase().contains(&needle) || post.content.to_lowercase().contains(&needle)
        }
        PostPredicate::CreatedSince(cutoff) => post.created_at >= *cutoff,
        PostPredicate::InCommunity(id) => post.community_id == *id,
        PostPredicate::ViewerIsMember => store.is_member(post.community_id, viewer),
    }
}

pub(super) fn compare(a: &PostSummary, b: &PostSummary, order: FeedOrder) -> Ordering {
    let primary = match order.key {
        RankKey::CreatedAt => Ordering::Equal,
        RankKey::Score => a.stats.score.cmp(&b.stats.score),
        RankKey::CommentCount => a.stats.num_comments.cmp(&b.stats.num_comments),
    };
    let ascending = primary
        .then_with(|| a.post.created_at.cmp(&b.post.created_at))
        .then_with(|| a.post.id.cmp(&b.post.id));

    match order.direction {
        SortDirection::Asc => ascending,
        SortDirection::Desc => ascending.reverse(),
    }
}
