//! Feed plan → SQL.
//!
//! Both the page query and the count query render the same predicate list,
//! so the total always describes the filtered set the page was cut from.
//! They run in one REPEATABLE READ snapshot.

use async_trait::async_trait;
use domains::{
    DomainResult, FeedPlan, Post, PostDetails, PostPredicate, PostRepository, PostSummary,
    RankKey, SortDirection,
};
use sqlx::postgres::{PgRow, Postgres};
use sqlx::QueryBuilder;
use tracing::debug;
use uuid::Uuid;

use super::{contains_pattern, ensure_affected, map_sqlx, rows, with_slug, PgStore};

/// Columns of one post with its community, author and aggregates.
const POST_COLUMNS: &str = "SELECT p.id, p.title, p.content, p.slug, p.tags, p.community_id, \
     p.author_id, p.created_at, \
     c.name AS community_name, c.slug AS community_slug, \
     c.thumbnail_id AS community_thumbnail_id, \
     u.name AS author_name, u.username AS author_username, \
     u.avatar_id AS author_avatar_id, \
     COALESCE(score.total, 0)::BIGINT AS score, \
     COALESCE(mine.value, 0)::SMALLINT AS viewer_vote, \
     COALESCE(replies.total, 0)::BIGINT AS num_comments";

const SCORE_EXPR: &str = "COALESCE(score.total, 0)";
const COMMENTS_EXPR: &str = "COALESCE(replies.total, 0)";

/// Joins for [`POST_COLUMNS`]; binds the viewer once.
fn push_post_from(qb: &mut QueryBuilder<'_, Postgres>, viewer: Uuid) {
    qb.push(
        " FROM posts p \
         JOIN communities c ON c.id = p.community_id \
         JOIN users u ON u.id = p.author_id \
         LEFT JOIN (SELECT post_id, SUM(value) AS total FROM post_votes GROUP BY post_id) score \
             ON score.post_id = p.id \
         LEFT JOIN (SELECT post_id, COUNT(*) AS total FROM comments GROUP BY post_id) replies \
             ON replies.post_id = p.id \
         LEFT JOIN post_votes mine ON mine.post_id = p.id AND mine.user_id = ",
    );
    qb.push_bind(viewer);
}

fn push_predicates(qb: &mut QueryBuilder<'_, Postgres>, plan: &FeedPlan) {
    qb.push(" WHERE TRUE");
    for predicate in &plan.predicates {
        match predicate {
            PostPredicate::TextMatch(text) => {
                let pattern = contains_pattern(text);
                qb.push(" AND (p.title ILIKE ");
                qb.push_bind(pattern.clone());
                qb.push(" ESCAPE '\\' OR p.content ILIKE ");
                qb.push_bind(pattern);
                qb.push(" ESCAPE '\\')");
            }
            PostPredicate::CreatedSince(cutoff) => {
                qb.push(" AND p.created_at >= ");
                qb.push_bind(*cutoff);
            }
            PostPredicate::InCommunity(id) => {
                qb.push(" AND p.community_id = ");
                qb.push_bind(*id);
            }
            PostPredicate::ViewerIsMember => {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM user_communities m \
                     WHERE m.community_id = p.community_id AND m.user_id = ",
                );
                qb.push_bind(plan.viewer);
                qb.push(")");
            }
        }
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, plan: &FeedPlan) {
    let dir = match plan.order.direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    };
    let key = match plan.order.key {
        RankKey::CreatedAt => "p.created_at",
        RankKey::Score => SCORE_EXPR,
        RankKey::CommentCount => COMMENTS_EXPR,
    };
    qb.push(format!(" ORDER BY {key} {dir}"));
    if plan.order.key != RankKey::CreatedAt {
        qb.push(format!(", p.created_at {dir}"));
    }
    qb.push(format!(", p.id {dir}"));
}

/// The page of a feed plan.
pub fn page_query(plan: &FeedPlan) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(POST_COLUMNS);
    push_post_from(&mut qb, plan.viewer);
    push_predicates(&mut qb, plan);
    push_order(&mut qb, plan);
    qb.push(" LIMIT ");
    qb.push_bind(i64::from(plan.page.limit()));
    qb.push(" OFFSET ");
    qb.push_bind(i64::from(plan.page.offset()));
    qb
}

/// The total number of posts matching a feed plan, ignoring the page.
pub fn count_query(plan: &FeedPlan) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p");
    push_predicates(&mut qb, plan);
    qb
}

fn summary(row: &PgRow) -> Result<PostSummary, sqlx::Error> {
    Ok(PostSummary {
        post: rows::post(row)?,
        community: rows::community_overview(row, "community")?,
        author: rows::user_overview(row, "author")?,
        stats: rows::post_stats(row)?,
    })
}

#[async_trait]
impl PostRepository for PgStore {
    async fn create(&self, post: &Post) -> DomainResult<()> {
        self.run(
            "posts.create",
            sqlx::query(
                "INSERT INTO posts (id, title, content, slug, tags, community_id, author_id, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(post.id)
            .bind(&post.title)
            .bind(&post.content)
            .bind(&post.slug)
            .bind(&post.tags)
            .bind(post.community_id)
            .bind(post.author_id)
            .bind(post.created_at)
            .execute(&self.pool),
        )
        .await
        .map_err(with_slug(&post.slug))?;
        Ok(())
    }

    async fn find_by_slug(&self, slug: &str, viewer: Uuid) -> DomainResult<Option<PostDetails>> {
        let mut qb = QueryBuilder::new(POST_COLUMNS);
        qb.push(
            ", r.id AS viewer_role_id, r.name AS viewer_role_name, r.level AS viewer_role_level, \
             (SELECT COUNT(*) FROM user_communities WHERE community_id = p.community_id) AS num_members",
        );
        push_post_from(&mut qb, viewer);
        qb.push(" LEFT JOIN user_communities vm ON vm.community_id = p.community_id AND vm.user_id = ");
        qb.push_bind(viewer);
        qb.push(" LEFT JOIN roles r ON r.id = vm.role_id WHERE p.slug = ");
        qb.push_bind(slug);

        let row = self
            .run("posts.find_by_slug", qb.build().fetch_optional(&self.pool))
            .await?;

        row.map(|row| -> Result<PostDetails, sqlx::Error> {
            let base = summary(&row)?;
            Ok(PostDetails {
                post: base.post,
                community: domains::PostCommunity {
                    overview: base.community,
                    viewer_role: rows::viewer_role(&row)?,
                    num_members: sqlx::Row::try_get(&row, "num_members")?,
                },
                author: base.author,
                stats: base.stats,
            })
        })
        .transpose()
        .map_err(|e| map_sqlx("posts.find_by_slug", e))
    }

    async fn update(&self, post: &Post) -> DomainResult<()> {
        let result = self
            .run(
                "posts.update",
                sqlx::query("UPDATE posts SET title = $2, content = $3, slug = $4, tags = $5 WHERE id = $1")
                    .bind(post.id)
                    .bind(&post.title)
                    .bind(&post.content)
                    .bind(&post.slug)
                    .bind(&post.tags)
                    .execute(&self.pool),
            )
            .await
            .map_err(with_slug(&post.slug))?;
        ensure_affected(result.rows_affected(), "post")
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = self
            .run(
                "posts.delete",
                sqlx::query("DELETE FROM posts WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        ensure_affected(result.rows_affected(), "post")
    }

    async fn fetch_feed(&self, plan: &FeedPlan) -> DomainResult<(Vec<PostSummary>, u64)> {
        let mut count = count_query(plan);
        let mut page = page_query(plan);
        debug!(sql = page.sql(), "feed query");

        let (total, rows) = self
            .run("posts.fetch_feed", async {
                let mut tx = self.pool.begin().await?;
                sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
                    .execute(&mut *tx)
                    .await?;
                let total = count.build_query_scalar::<i64>().fetch_one(&mut *tx).await?;
                let rows = page.build().fetch_all(&mut *tx).await?;
                tx.commit().await?;
                Ok::<_, sqlx::Error>((total, rows))
            })
            .await?;

        let items = rows
            .iter()
            .map(summary)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx("posts.fetch_feed", e))?;

        Ok((items, u64::try_from(total).unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use domains::{FeedFilters, FeedQuery, FeedScope, Page, RankingView, TimeWindow};

    fn plan(scope: FeedScope, search: Option<&str>, view: RankingView, sort: SortDirection) -> FeedPlan {
        let filters = FeedFilters::new(search.map(str::to_string), TimeWindow::Week, view, sort).unwrap();
        FeedPlan::build(
            Uuid::nil(),
            &FeedQuery {
                scope,
                filters,
                page: Page::new(10, 20).unwrap(),
            },
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn page_query_binds_every_value() {
        let plan = plan(FeedScope::Joined, Some("50% off"), RankingView::Top, SortDirection::Asc);
        let sql = page_query(&plan).into_sql();

        assert!(!sql.contains("50%"), "search text must be bound, not inlined");
        assert!(sql.contains("p.title ILIKE $2 ESCAPE '\\' OR p.content ILIKE $3"));
        assert!(sql.contains("p.created_at >= $4"));
        assert!(sql.contains("m.user_id = $5"));
        assert!(sql.ends_with(
            "ORDER BY COALESCE(score.total, 0) ASC, p.created_at ASC, p.id ASC LIMIT $6 OFFSET $7"
        ));
    }

    #[test]
    fn newest_orders_by_creation_then_id() {
        let plan = plan(FeedScope::Global, None, RankingView::Newest, SortDirection::Desc);
        let sql = page_query(&plan).into_sql();
        assert!(sql.contains("ORDER BY p.created_at DESC, p.id DESC"));
        assert!(!sql.contains("EXISTS"));
    }

    #[test]
    fn count_query_shares_predicates_without_paging() {
        let community = Uuid::from_u128(7);
        let plan = plan(FeedScope::Community(community), None, RankingView::Discussed, SortDirection::Desc);
        let sql = count_query(&plan).into_sql();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM posts p WHERE TRUE AND p.created_at >= $1 AND p.community_id = $2"
        );
    }
}
