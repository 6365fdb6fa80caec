use async_trait::async_trait;
use domains::{
    Community, CommunityDetails, CommunityOverview, CommunityRepository, CommunitySummary,
    DomainResult, Page,
};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{contains_pattern, ensure_affected, map_sqlx, rows, with_slug, PgStore};

/// Community columns plus the viewer's membership role and member count.
/// Binds: `$1` = viewer.
const COMMUNITY_FOR_VIEWER: &str = "SELECT c.id, c.name, c.slug, c.description, c.thumbnail_id, \
     c.creator_id, c.created_at, \
     r.id AS viewer_role_id, r.name AS viewer_role_name, r.level AS viewer_role_level, \
     (SELECT COUNT(*) FROM user_communities WHERE community_id = c.id) AS num_members";

const VIEWER_JOINS: &str = " LEFT JOIN user_communities vm ON vm.community_id = c.id AND vm.user_id = $1 \
     LEFT JOIN roles r ON r.id = vm.role_id";

fn summary(row: &PgRow) -> Result<CommunitySummary, sqlx::Error> {
    Ok(CommunitySummary {
        community: rows::community(row)?,
        viewer_role: rows::viewer_role(row)?,
        num_members: row.try_get("num_members")?,
    })
}

#[async_trait]
impl CommunityRepository for PgStore {
    async fn create_with_owner(&self, community: &Community, owner_role: &str) -> DomainResult<()> {
        self.run("communities.create", async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                "INSERT INTO communities (id, name, slug, description, thumbnail_id, creator_id, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(community.id)
            .bind(&community.name)
            .bind(&community.slug)
            .bind(&community.description)
            .bind(&community.thumbnail_id)
            .bind(community.creator_id)
            .bind(community.created_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO user_communities (user_id, community_id, role_id, joined_at) \
                 SELECT $1, $2, id, $4 FROM roles WHERE name = $3",
            )
            .bind(community.creator_id)
            .bind(community.id)
            .bind(owner_role)
            .bind(community.created_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await
        })
        .await
        .map_err(with_slug(&community.slug))
    }

    async fn find_by_slug(&self, slug: &str, viewer: Uuid) -> DomainResult<Option<CommunityDetails>> {
        let sql = format!(
            "{COMMUNITY_FOR_VIEWER}, \
             u.name AS creator_name, u.username AS creator_username, u.avatar_id AS creator_avatar_id, \
             (SELECT COUNT(*) FROM posts WHERE community_id = c.id) AS num_posts \
             FROM communities c JOIN users u ON u.id = c.creator_id{VIEWER_JOINS} \
             WHERE c.slug = $2"
        );
        let row = self
            .run(
                "communities.find_by_slug",
                sqlx::query(&sql)
                    .bind(viewer)
                    .bind(slug)
                    .fetch_optional(&self.pool),
            )
            .await?;

        row.map(|row| -> Result<CommunityDetails, sqlx::Error> {
            let base = summary(&row)?;
            Ok(CommunityDetails {
                creator: domains::UserOverview {
                    id: base.community.creator_id,
                    name: row.try_get("creator_name")?,
                    username: row.try_get("creator_username")?,
                    avatar_id: row.try_get("creator_avatar_id")?,
                },
                community: base.community,
                viewer_role: base.viewer_role,
                num_members: base.num_members,
                num_posts: row.try_get("num_posts")?,
            })
        })
        .transpose()
        .map_err(|e| map_sqlx("communities.find_by_slug", e))
    }

    async fn list(
        &self,
        viewer: Uuid,
        search: Option<String>,
        page: Page,
    ) -> DomainResult<Vec<CommunitySummary>> {
        let sql = format!(
            "{COMMUNITY_FOR_VIEWER} FROM communities c{VIEWER_JOINS} \
             WHERE ($2::text IS NULL OR c.name ILIKE $2 ESCAPE '\\') \
             ORDER BY num_members DESC, c.created_at DESC, c.id DESC \
             LIMIT $3 OFFSET $4"
        );
        let pattern = search.as_deref().map(contains_pattern);
        let found = self
            .run(
                "communities.list",
                sqlx::query(&sql)
                    .bind(viewer)
                    .bind(pattern)
                    .bind(i64::from(page.limit()))
                    .bind(i64::from(page.offset()))
                    .fetch_all(&self.pool),
            )
            .await?;

        found
            .iter()
            .map(summary)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx("communities.list", e))
    }

    async fn list_joined(&self, viewer: Uuid, page: Page) -> DomainResult<Vec<CommunityOverview>> {
        let found = self
            .run(
                "communities.list_joined",
                sqlx::query(
                    "SELECT c.id AS community_id, c.name AS community_name, c.slug AS community_slug, \
                     c.thumbnail_id AS community_thumbnail_id \
                     FROM communities c JOIN user_communities m ON m.community_id = c.id \
                     WHERE m.user_id = $1 \
                     ORDER BY m.joined_at DESC, c.id DESC \
                     LIMIT $2 OFFSET $3",
                )
                .bind(viewer)
                .bind(i64::from(page.limit()))
                .bind(i64::from(page.offset()))
                .fetch_all(&self.pool),
            )
            .await?;

        found
            .iter()
            .map(|row| rows::community_overview(row, "community"))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx("communities.list_joined", e))
    }

    async fn update(&self, community: &Community) -> DomainResult<()> {
        let result = self
            .run(
                "communities.update",
                sqlx::query(
                    "UPDATE communities SET name = $2, slug = $3, description = $4, thumbnail_id = $5 \
                     WHERE id = $1",
                )
                .bind(community.id)
                .bind(&community.name)
                .bind(&community.slug)
                .bind(&community.description)
                .bind(&community.thumbnail_id)
                .execute(&self.pool),
            )
            .await
            .map_err(with_slug(&community.slug))?;
        ensure_affected(result.rows_affected(), "community")
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = self
            .run(
                "communities.delete",
                sqlx::query("DELETE FROM communities WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;
        ensure_affected(result.rows_affected(), "community")
    }

    async fn join(&self, community_id: Uuid, user_id: Uuid, role: &str) -> DomainResult<()> {
        self.run(
            "communities.join",
            sqlx::query(
                "INSERT INTO user_communities (user_id, community_id, role_id) \
                 SELECT $1, $2, id FROM roles WHERE name = $3 \
                 ON CONFLICT (user_id, community_id) DO NOTHING",
            )
            .bind(user_id)
            .bind(community_id)
            .bind(role)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn leave(&self, community_id: Uuid, user_id: Uuid) -> DomainResult<()> {
        self.run(
            "communities.leave",
            sqlx::query("DELETE FROM user_communities WHERE user_id = $1 AND community_id = $2")
                .bind(user_id)
                .bind(community_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
