//! Row → domain mapping. Column names follow the aliases used in the queries.

use domains::{
    Comment, Community, CommunityOverview, Post, PostStats, Role, User, UserOverview,
};
use sqlx::postgres::PgRow;
use sqlx::Row;

type RowResult<T> = Result<T, sqlx::Error>;

fn col(prefix: &str, name: &str) -> String {
    format!("{prefix}_{name}")
}

/// A role that must exist (global roles).
pub(super) fn role(row: &PgRow, prefix: &str) -> RowResult<Role> {
    Ok(Role {
        id: row.try_get(col(prefix, "id").as_str())?,
        name: row.try_get(col(prefix, "name").as_str())?,
        level: row.try_get(col(prefix, "level").as_str())?,
    })
}

/// A membership role from a LEFT JOIN; no row means visitor.
pub(super) fn viewer_role(row: &PgRow) -> RowResult<Role> {
    let id: Option<i64> = row.try_get("viewer_role_id")?;
    match id {
        Some(id) => Ok(Role {
            id,
            name: row.try_get("viewer_role_name")?,
            level: row.try_get("viewer_role_level")?,
        }),
        None => Ok(Role::visitor()),
    }
}

pub(super) fn user(row: &PgRow) -> RowResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        bio: row.try_get("bio")?,
        avatar_id: row.try_get("avatar_id")?,
        role: role(row, "role")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(super) fn user_overview(row: &PgRow, prefix: &str) -> RowResult<UserOverview> {
    Ok(UserOverview {
        id: row.try_get(col(prefix, "id").as_str())?,
        name: row.try_get(col(prefix, "name").as_str())?,
        username: row.try_get(col(prefix, "username").as_str())?,
        avatar_id: row.try_get(col(prefix, "avatar_id").as_str())?,
    })
}

pub(super) fn community(row: &PgRow) -> RowResult<Community> {
    Ok(Community {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        thumbnail_id: row.try_get("thumbnail_id")?,
        creator_id: row.try_get("creator_id")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(super) fn community_overview(row: &PgRow, prefix: &str) -> RowResult<CommunityOverview> {
    Ok(CommunityOverview {
        id: row.try_get(col(prefix, "id").as_str())?,
        name: row.try_get(col(prefix, "name").as_str())?,
        slug: row.try_get(col(prefix, "slug").as_str())?,
        thumbnail_id: row.try_get(col(prefix, "thumbnail_id").as_str())?,
    })
}

pub(super) fn post(row: &PgRow) -> RowResult<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        slug: row.try_get("slug")?,
        tags: row.try_get("tags")?,
        community_id: row.try_get("community_id")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(super) fn post_stats(row: &PgRow) -> RowResult<PostStats> {
    Ok(PostStats {
        score: row.try_get("score")?,
        viewer_vote: row.try_get("viewer_vote")?,
        num_comments: row.try_get("num_comments")?,
    })
}

pub(super) fn comment(row: &PgRow) -> RowResult<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        parent_id: row.try_get("parent_id")?,
        content: row.try_get("content")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
    })
}
