//! # PostgreSQL Adapter
//!
//! Implements every repository port over one `PgPool`. Queries are plain
//! runtime `sqlx::query` calls mapped by hand; the feed and post lookups
//! are assembled with `QueryBuilder` so every user value is a bind
//! parameter.
//!
//! Every storage call runs under the configured query timeout and maps to
//! `DomainError::Timeout` when it expires.

mod comments;
mod communities;
mod feed;
mod rows;
mod users;
mod votes;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use domains::{DomainError, DomainResult, Role, RoleRepository, SlugCollection, SlugRepository};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{error, info, warn};
use uuid::Uuid;

pub use feed::{count_query, page_query};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Connection settings for [`PgStore::connect`].
#[derive(Debug, Clone)]
pub struct PgOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for PgOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgStore {
    pub async fn connect(url: &str, options: &PgOptions) -> DomainResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| {
                error!(error = %e, "could not connect to postgres");
                DomainError::internal(e)
            })?;

        info!(max_connections = options.max_connections, "postgres pool ready");
        Ok(Self::from_pool(pool, options.query_timeout))
    }

    pub fn from_pool(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Applies pending migrations from `migrations/`.
    pub async fn migrate(&self) -> DomainResult<()> {
        MIGRATOR.run(&self.pool).await.map_err(DomainError::internal)?;
        info!("database migrations applied");
        Ok(())
    }

    /// Round-trips a trivial query, for health checks.
    pub async fn ping(&self) -> DomainResult<()> {
        self.run("ping", async {
            sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
        })
        .await
    }

    /// Runs one storage call under the query timeout and maps its error.
    async fn run<T, F>(&self, op: &'static str, fut: F) -> DomainResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(|e| map_sqlx(op, e)),
            Err(_) => {
                warn!(op, timeout_ms = self.query_timeout.as_millis() as u64, "storage call timed out");
                Err(DomainError::Timeout)
            }
        }
    }
}

/// Translates driver errors at the boundary. Constraint violations that a
/// caller can act on get their own variant; everything else is internal.
fn map_sqlx(op: &'static str, err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some(c) if c.ends_with("_slug_key") => DomainError::SlugTaken(String::new()),
                Some(c) if c.starts_with("users_") => {
                    DomainError::Conflict("email or username already in use".to_string())
                }
                _ => DomainError::Conflict("resource already exists".to_string()),
            };
        }
        if db.is_foreign_key_violation() {
            return DomainError::NotFound("referenced resource");
        }
    }
    error!(op, error = %err, "storage call failed");
    DomainError::internal(err)
}

/// Fills in the slug on a `SlugTaken` raised by a constraint.
fn with_slug(slug: &str) -> impl FnOnce(DomainError) -> DomainError + '_ {
    move |err| match err {
        DomainError::SlugTaken(_) => DomainError::SlugTaken(slug.to_string()),
        other => other,
    }
}

/// `%text%` with LIKE wildcards in `text` escaped, for use with `ESCAPE '\'`.
pub(crate) fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn ensure_affected(rows: u64, what: &'static str) -> DomainResult<()> {
    if rows == 0 {
        Err(DomainError::NotFound(what))
    } else {
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for PgStore {
    async fn find_by_name(&self, name: &str) -> DomainResult<Option<Role>> {
        let row = self
            .run(
                "roles.find_by_name",
                sqlx::query("SELECT id, name, level FROM roles WHERE name = $1")
                    .bind(name)
                    .fetch_optional(&self.pool),
            )
            .await?;

        row.map(|row| -> Result<Role, sqlx::Error> {
            Ok(Role {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                level: row.try_get("level")?,
            })
        })
        .transpose()
        .map_err(|e| map_sqlx("roles.find_by_name", e))
    }
}

#[async_trait]
impl SlugRepository for PgStore {
    async fn slug_exists(
        &self,
        collection: SlugCollection,
        slug: &str,
        except: Option<Uuid>,
    ) -> DomainResult<bool> {
        // The table name comes from a closed enum, never from input.
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE slug = $1 AND ($2::uuid IS NULL OR id <> $2))",
            collection.table()
        );
        self.run(
            "slugs.exists",
            sqlx::query_scalar::<_, bool>(&sql)
                .bind(slug)
                .bind(except)
                .fetch_one(&self.pool),
        )
        .await
    }
}
