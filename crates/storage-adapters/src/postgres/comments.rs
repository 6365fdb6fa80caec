use async_trait::async_trait;
use domains::{
    Comment, CommentContext, CommentRepository, CommentView, DomainResult,
};
use sqlx::Row;
use uuid::Uuid;

use super::{ensure_affected, map_sqlx, rows, PgStore};

#[async_trait]
impl CommentRepository for PgStore {
    async fn create(&self, comment: &Comment) -> DomainResult<()> {
        self.run(
            "comments.create",
            sqlx::query(
                "INSERT INTO comments (id, post_id, parent_id, content, author_id, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(comment.id)
            .bind(comment.post_id)
            .bind(comment.parent_id)
            .bind(&comment.content)
            .bind(comment.author_id)
            .bind(comment.created_at)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid, viewer: Uuid) -> DomainResult<Option<CommentContext>> {
        let row = self
            .run(
                "comments.find_by_id",
                sqlx::query(
                    "SELECT cm.id, cm.post_id, cm.parent_id, cm.content, cm.author_id, cm.created_at, \
                     p.community_id, \
                     r.id AS viewer_role_id, r.name AS viewer_role_name, r.level AS viewer_role_level \
                     FROM comments cm \
                     JOIN posts p ON p.id = cm.post_id \
                     LEFT JOIN user_communities vm ON vm.community_id = p.community_id AND vm.user_id = $2 \
                     LEFT JOIN roles r ON r.id = vm.role_id \
                     WHERE cm.id = $1",
                )
                .bind(id)
                .bind(viewer)
                .fetch_optional(&self.pool),
            )
            .await?;

        row.map(|row| -> Result<CommentContext, sqlx::Error> {
            Ok(CommentContext {
                comment: rows::comment(&row)?,
                community_id: row.try_get("community_id")?,
                viewer_role: rows::viewer_role(&row)?,
            })
        })
        .transpose()
        .map_err(|e| map_sqlx("comments.find_by_id", e))
    }

    async fn list_for_post(&self, post_id: Uuid, viewer: Uuid) -> DomainResult<Vec<CommentView>> {
        let found = self
            .run(
                "comments.list_for_post",
                sqlx::query(
                    "SELECT cm.id, cm.post_id, cm.parent_id, cm.content, cm.author_id, cm.created_at, \
                     u.name AS author_name, u.username AS author_username, u.avatar_id AS author_avatar_id, \
                     COALESCE(score.total, 0)::BIGINT AS score, \
                     COALESCE(mine.value, 0)::SMALLINT AS viewer_vote \
                     FROM comments cm \
                     JOIN users u ON u.id = cm.author_id \
                     LEFT JOIN (SELECT comment_id, SUM(value) AS total FROM comment_votes GROUP BY comment_id) score \
                         ON score.comment_id = cm.id \
                     LEFT JOIN comment_votes mine ON mine.comment_id = cm.id AND mine.user_id = $2 \
                     WHERE cm.post_id = $1 \
                     ORDER BY cm.created_at ASC, cm.id ASC",
                )
                .bind(post_id)
                .bind(viewer)
                .fetch_all(&self.pool),
            )
            .await?;

        found
            .iter()
            .map(|row| -> Result<CommentView, sqlx::Error> {
                Ok(CommentView {
                    comment: rows::comment(row)?,
                    author: rows::user_overview(row, "author")?,
                    score: row.try_get("score")?,
                    viewer_vote: row.try_get("viewer_vote")?,
                })
            })
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx("comments.list_for_post", e))
    }

    async fn update(&self, comment: &Comment) -> DomainResult<()> {
        let result = self
            .run(
                "comments.update",
                sqlx::query("UPDATE comments SET content = $2 WHERE id = $1")
                    .bind(comment.id)
                    .bind(&comment.content)
                    .execute(&self.pool),
            )
            .await?;
        ensure_affected(result.rows_affected(), "comment")
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = self
            .run(
                "comments.delete",
                sqlx::query("DELETE FROM comments WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        ensure_affected(result.rows_affected(), "comment")
    }
}
