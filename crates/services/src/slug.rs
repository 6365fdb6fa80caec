//! Collision-resistant slugs shared by communities and posts.
//!
//! A slug is claimed in two steps: probe the collection for a free
//! candidate (`base`, `base-1`, `base-2`, …), then insert. The probe and
//! the insert are not atomic, so the storage layer keeps a uniqueness
//! constraint and [`SlugGenerator::claim`] re-probes whenever an insert
//! reports [`DomainError::SlugTaken`].

use std::future::Future;
use std::sync::Arc;

use domains::{DomainError, DomainResult, SlugCollection, SlugRepository};
use tracing::{debug, warn};
use uuid::Uuid;

/// Base used when the input holds no ASCII alphanumerics at all.
pub const FALLBACK_SLUG: &str = "untitled";

/// Insert attempts before a lost race is reported as an internal error.
pub const MAX_CLAIM_ATTEMPTS: usize = 5;

/// Lowercase, hyphenated, ASCII-only form of `raw`.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            out.push(c);
            pending_dash = false;
        } else if c.is_whitespace() || c.is_ascii_punctuation() {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        out
    }
}

#[derive(Clone)]
pub struct SlugGenerator {
    repo: Arc<dyn SlugRepository>,
}

impl SlugGenerator {
    pub fn new(repo: Arc<dyn SlugRepository>) -> Self {
        Self { repo }
    }

    /// First free candidate among `base`, `base-1`, `base-2`, …
    pub async fn generate_unique_slug(
        &self,
        raw: &str,
        collection: SlugCollection,
    ) -> DomainResult<String> {
        self.generate(raw, collection, None).await
    }

    /// Like [`generate_unique_slug`](Self::generate_unique_slug) but ignores the
    /// current slug of the resource `except`, so a rename never collides with itself.
    pub async fn generate(
        &self,
        raw: &str,
        collection: SlugCollection,
        except: Option<Uuid>,
    ) -> DomainResult<String> {
        let base = slugify(raw);
        let mut candidate = base.clone();
        let mut suffix: u32 = 1;

        while self.repo.slug_exists(collection, &candidate, except).await? {
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }

        debug!(collection = collection.table(), slug = %candidate, "slug generated");
        Ok(candidate)
    }

    /// Generates a slug and hands it to `insert`, regenerating while the
    /// insert loses the uniqueness race.
    pub async fn claim<T, F, Fut>(
        &self,
        raw: &str,
        collection: SlugCollection,
        except: Option<Uuid>,
        mut insert: F,
    ) -> DomainResult<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        for attempt in 1..=MAX_CLAIM_ATTEMPTS {
            let slug = self.generate(raw, collection, except).await?;
            match insert(slug).await {
                Err(DomainError::SlugTaken(slug)) => {
                    warn!(collection = collection.table(), %slug, attempt, "slug claimed concurrently, retrying");
                }
                other => return other,
            }
        }

        Err(DomainError::Internal(format!(
            "could not claim a unique slug in {} after {MAX_CLAIM_ATTEMPTS} attempts",
            collection.table()
        )))
    }
}
