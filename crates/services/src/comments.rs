//! # Comment Tree Assembler
//!
//! Comments are stored flat with an optional parent reference. The tree is
//! built in memory with an index over the flat list:
//!
//! - every sibling list keeps the order of the input, which the stores
//!   return oldest first;
//! - a comment whose parent is missing (deleted, or in another post) is
//!   promoted to the top level;
//! - a parent chain that loops back on itself is cut at its earliest
//!   comment, which becomes a top-level comment;
//! - a comment nested deeper than [`MAX_REPLY_DEPTH`] is attached to its
//!   deepest ancestor within the limit.
//!
//! [`CommentNode`] serializes and drops recursively, so the depth bound is
//! what keeps a long reply chain from overflowing the stack. New replies
//! past the bound are rejected in [`CommentService::create`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use domains::{
    role_names, Comment, CommentContext, CommentNode, CommentRepository, CommentView,
    DomainError, DomainResult, PostDetails, User,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::authorization::{Authorizer, Resource};
use crate::validate;

/// Levels a reply may sit below its top-level comment.
pub const MAX_REPLY_DEPTH: usize = 32;

/// Assembles a flat comment list into a forest.
pub fn build_tree(flat: Vec<CommentView>) -> Vec<CommentNode> {
    let index: HashMap<Uuid, usize> = flat
        .iter()
        .enumerate()
        .map(|(i, view)| (view.comment.id, i))
        .collect();

    let mut parent: Vec<Option<usize>> = flat
        .iter()
        .enumerate()
        .map(|(i, view)| {
            view.comment
                .parent_id
                .and_then(|id| index.get(&id).copied())
                .filter(|&p| p != i)
        })
        .collect();

    break_cycles(&mut parent);
    cap_depth(&mut parent);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); flat.len()];
    let mut roots = Vec::new();
    for (i, p) in parent.iter().enumerate() {
        match p {
            Some(p) => children[*p].push(i),
            None => roots.push(i),
        }
    }

    // Post-order over the forest: a node is built once all its replies are.
    let mut slots: Vec<Option<CommentView>> = flat.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = (0..slots.len()).map(|_| None).collect();
    let mut stack: Vec<(usize, bool)> = roots.iter().rev().map(|&r| (r, false)).collect();

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            let replies = children[node]
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
            if let Some(view) = slots[node].take() {
                built[node] = Some(CommentNode { view, replies });
            }
        } else {
            stack.push((node, true));
            stack.extend(children[node].iter().rev().map(|&child| (child, false)));
        }
    }

    roots.into_iter().filter_map(|r| built[r].take()).collect()
}

/// Detaches the earliest member of every parent cycle.
fn break_cycles(parent: &mut [Option<usize>]) {
    const UNSEEN: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let mut state = vec![UNSEEN; parent.len()];
    let mut path = Vec::new();

    for start in 0..parent.len() {
        path.clear();
        let mut cursor = Some(start);

        while let Some(node) = cursor {
            match state[node] {
                UNSEEN => {
                    state[node] = ON_PATH;
                    path.push(node);
                    cursor = parent[node];
                }
                ON_PATH => {
                    if let Some(pos) = path.iter().position(|&n| n == node) {
                        if let Some(&earliest) = path[pos..].iter().min() {
                            parent[earliest] = None;
                        }
                    }
                    break;
                }
                _ => break,
            }
        }

        for &node in &path {
            state[node] = DONE;
        }
    }
}

/// Re-parents every comment below [`MAX_REPLY_DEPTH`] onto the ancestor
/// sitting one level above the limit. Expects an acyclic parent list.
fn cap_depth(parent: &mut [Option<usize>]) {
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); parent.len()];
    let mut stack = Vec::new();
    for (i, p) in parent.iter().enumerate() {
        match p {
            Some(p) => children[*p].push(i),
            None => stack.push((i, 0usize)),
        }
    }

    while let Some((node, depth)) = stack.pop() {
        for &child in &children[node] {
            if depth == MAX_REPLY_DEPTH {
                parent[child] = parent[node];
                stack.push((child, depth));
            } else {
                stack.push((child, depth + 1));
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewCommentInput {
    #[validate(length(min = 8, max = 1000, message = "content must be 8 to 1000 characters"))]
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CommentChanges {
    #[validate(length(min = 8, max = 1000, message = "content must be 8 to 1000 characters"))]
    pub content: String,
}

#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    authorizer: Arc<Authorizer>,
}

impl CommentService {
    pub fn new(comments: Arc<dyn CommentRepository>, authorizer: Arc<Authorizer>) -> Self {
        Self {
            comments,
            authorizer,
        }
    }

    pub async fn create(
        &self,
        author: &User,
        post: &PostDetails,
        input: NewCommentInput,
    ) -> DomainResult<Comment> {
        // 1. Gate: only members may comment
        self.authorizer
            .require_membership(&post.community.viewer_role)
            .await?;
        validate(&input)?;

        // 2. Threading: a reply must stay inside its post and within the depth limit
        if let Some(parent_id) = input.parent_id {
            let parent = self
                .comments
                .find_by_id(parent_id, author.id)
                .await?
                .ok_or(DomainError::NotFound("parent comment"))?;
            if parent.comment.post_id != post.post.id {
                return Err(DomainError::validation(
                    "parent comment belongs to a different post",
                ));
            }
            self.check_reply_depth(&parent.comment, author.id).await?;
        }

        // 3. Persistence
        let comment = Comment {
            id: Uuid::now_v7(),
            post_id: post.post.id,
            parent_id: input.parent_id,
            content: input.content,
            author_id: author.id,
            created_at: Utc::now(),
        };
        self.comments.create(&comment).await?;

        info!(comment = %comment.id, post = %comment.post_id, author = %author.id, "comment created");
        Ok(comment)
    }

    /// Walks up from `parent`; a missing ancestor ends the chain the same
    /// way it does in [`build_tree`].
    async fn check_reply_depth(&self, parent: &Comment, viewer: Uuid) -> DomainResult<()> {
        let mut depth = 1;
        let mut cursor = parent.parent_id;
        while let Some(id) = cursor {
            depth += 1;
            if depth > MAX_REPLY_DEPTH {
                return Err(DomainError::validation(format!(
                    "replies cannot nest more than {MAX_REPLY_DEPTH} levels deep"
                )));
            }
            cursor = self
                .comments
                .find_by_id(id, viewer)
                .await?
                .and_then(|context| context.comment.parent_id);
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid, viewer: Uuid) -> DomainResult<CommentContext> {
        self.comments
            .find_by_id(id, viewer)
            .await?
            .ok_or(DomainError::NotFound("comment"))
    }

    /// The post's comments as a forest, annotated for `viewer`.
    pub async fn tree_for_post(&self, post_id: Uuid, viewer: Uuid) -> DomainResult<Vec<CommentNode>> {
        let flat = self.comments.list_for_post(post_id, viewer).await?;
        Ok(build_tree(flat))
    }

    pub async fn update(
        &self,
        viewer: &User,
        context: CommentContext,
        changes: CommentChanges,
    ) -> DomainResult<Comment> {
        self.authorizer
            .authorize(viewer, Resource::Comment(&context), role_names::ADMIN)
            .await?;
        validate(&changes)?;

        let comment = Comment {
            content: changes.content,
            ..context.comment
        };
        self.comments.update(&comment).await?;
        Ok(comment)
    }

    pub async fn delete(&self, viewer: &User, context: CommentContext) -> DomainResult<()> {
        self.authorizer
            .authorize(viewer, Resource::Comment(&context), role_names::MODERATOR)
            .await?;
        self.comments.delete(context.comment.id).await?;

        warn!(comment = %context.comment.id, by = %viewer.id, "comment deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone};
    use domains::UserOverview;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn view(id: u128, parent: Option<u128>, minute: i64) -> CommentView {
        let author = UserOverview {
            id: Uuid::from_u128(999),
            name: "Grace Hopper".into(),
            username: "grace".into(),
            avatar_id: None,
        };
        CommentView {
            comment: Comment {
                id: Uuid::from_u128(id),
                post_id: Uuid::from_u128(500),
                parent_id: parent.map(Uuid::from_u128),
                content: format!("comment number {id}"),
                author_id: author.id,
                created_at: at(minute),
            },
            author,
            score: 0,
            viewer_vote: 0,
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<u128> {
        nodes.iter().map(|n| n.view.comment.id.as_u128()).collect()
    }

    #[test]
    fn nests_replies_under_their_parents() {
        // 1
        // ├── 2
        // │   └── 4
        // └── 3
        // 5
        let tree = build_tree(vec![
            view(1, None, 0),
            view(2, Some(1), 1),
            view(3, Some(1), 2),
            view(4, Some(2), 3),
            view(5, None, 4),
        ]);

        assert_eq!(ids(&tree), [1, 5]);
        assert_eq!(ids(&tree[0].replies), [2, 3]);
        assert_eq!(ids(&tree[0].replies[0].replies), [4]);
        assert!(tree[1].replies.is_empty());
    }

    #[test]
    fn sibling_order_follows_the_input() {
        let tree = build_tree(vec![
            view(3, None, 0),
            view(2, None, 0),
            view(1, None, 0),
            view(6, Some(3), 1),
            view(5, Some(3), 1),
        ]);

        assert_eq!(ids(&tree), [3, 2, 1]);
        assert_eq!(ids(&tree[0].replies), [6, 5]);
    }

    #[test]
    fn orphans_become_top_level() {
        let tree = build_tree(vec![view(1, None, 0), view(2, Some(42), 1)]);
        assert_eq!(ids(&tree), [1, 2]);
    }

    #[test]
    fn cycles_are_cut_at_the_earliest_comment() {
        // 1 -> 3 -> 2 -> 1 is a loop; 4 replies to 2.
        let tree = build_tree(vec![
            view(1, Some(3), 0),
            view(2, Some(1), 1),
            view(3, Some(2), 2),
            view(4, Some(2), 3),
        ]);

        assert_eq!(ids(&tree), [1]);
        assert_eq!(ids(&tree[0].replies), [2]);
        assert_eq!(ids(&tree[0].replies[0].replies), [3, 4]);
    }

    #[test]
    fn self_parent_is_top_level() {
        let tree = build_tree(vec![view(7, Some(7), 0)]);
        assert_eq!(ids(&tree), [7]);
    }

    fn chain(len: u128) -> Vec<CommentView> {
        (1..=len)
            .map(|i| view(i, (i > 1).then(|| i - 1), i as i64))
            .collect()
    }

    fn depth_of(tree: &[CommentNode]) -> usize {
        let mut deepest = 0;
        let mut stack: Vec<(&CommentNode, usize)> = tree.iter().map(|n| (n, 0)).collect();
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.replies.iter().map(|r| (r, depth + 1)));
        }
        deepest
    }

    #[test]
    fn chains_within_the_limit_keep_their_shape() {
        let len = MAX_REPLY_DEPTH as u128 + 1;
        let tree = build_tree(chain(len));
        assert_eq!(depth_of(&tree), MAX_REPLY_DEPTH);

        let mut level = &tree;
        let mut expected = 1;
        while let Some(node) = level.first() {
            assert_eq!(level.len(), 1);
            assert_eq!(node.view.comment.id.as_u128(), expected);
            expected += 1;
            level = &node.replies;
        }
        assert_eq!(expected, len + 1);
    }

    #[test]
    fn deep_chains_are_flattened_at_the_limit() {
        let len = 20_000u128;
        let tree = build_tree(chain(len));
        assert_eq!(depth_of(&tree), MAX_REPLY_DEPTH);

        let mut level = &tree;
        for _ in 0..MAX_REPLY_DEPTH {
            assert_eq!(level.len(), 1);
            level = &level[0].replies;
        }
        let tail = ids(level);
        let expected: Vec<u128> = (MAX_REPLY_DEPTH as u128 + 1..=len).collect();
        assert_eq!(tail, expected);

        let json = serde_json::to_string(&tree).unwrap();
        assert!(json.contains("comment number 20000"));
        drop(tree);
    }

    #[test]
    fn every_comment_appears_exactly_once() {
        let flat = vec![
            view(1, None, 0),
            view(2, Some(1), 1),
            view(3, Some(9), 2),
            view(4, Some(5), 3),
            view(5, Some(4), 4),
        ];
        let tree = build_tree(flat);

        let mut count = 0;
        let mut stack: Vec<&CommentNode> = tree.iter().collect();
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.replies.iter());
        }
        assert_eq!(count, 5);
    }
}
