//! # Feed Query Engine
//!
//! Turns raw query parameters into a validated [`FeedQuery`], builds the
//! [`FeedPlan`] at the current instant and wraps the result with page
//! metadata. All three scopes go through the same path.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use domains::{
    DomainError, DomainResult, FeedFilters, FeedPlan, FeedQuery, FeedScope, Page, PageMeta,
    Paginated, PostRepository, PostSummary, DEFAULT_PAGE_LIMIT,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

/// Feed parameters exactly as they arrive on the query string.
/// Kept as strings so that bad values are reported as validation errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedParams {
    pub search: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub time: Option<String>,
    pub view: Option<String>,
    pub sort: Option<String>,
}

impl FeedParams {
    pub fn into_query(self, scope: FeedScope) -> DomainResult<FeedQuery> {
        let page = parse_page(self.limit.as_deref(), self.offset.as_deref())?;
        let filters = FeedFilters::new(
            self.search,
            parse_token(self.time.as_deref())?,
            parse_token(self.view.as_deref())?,
            parse_token(self.sort.as_deref())?,
        )?;
        Ok(FeedQuery {
            scope,
            filters,
            page,
        })
    }
}

/// Search and paging for plain listings such as the community directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ListParams {
    pub fn into_parts(self) -> DomainResult<(Option<String>, Page)> {
        let page = parse_page(self.limit.as_deref(), self.offset.as_deref())?;
        // Same length rule as feed search.
        let filters = FeedFilters::new(
            self.search,
            Default::default(),
            Default::default(),
            Default::default(),
        )?;
        Ok((filters.search().map(str::to_string), page))
    }
}

fn parse_page(limit: Option<&str>, offset: Option<&str>) -> DomainResult<Page> {
    let limit = match limit {
        Some(raw) => parse_number("limit", raw)?,
        None => DEFAULT_PAGE_LIMIT,
    };
    let offset = match offset {
        Some(raw) => parse_number("offset", raw)?,
        None => 0,
    };
    Page::new(limit, offset)
}

fn parse_number(field: &str, raw: &str) -> DomainResult<u32> {
    raw.trim().parse::<u32>().map_err(|_| {
        DomainError::validation(format!("{field} must be a non-negative integer; got `{raw}`"))
    })
}

fn parse_token<T>(raw: Option<&str>) -> DomainResult<T>
where
    T: FromStr<Err = DomainError> + Default,
{
    raw.map_or_else(|| Ok(T::default()), |s| s.parse())
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostRepository>,
}

impl FeedService {
    pub fn new(posts: Arc<dyn PostRepository>) -> Self {
        Self { posts }
    }

    pub async fn fetch_posts(
        &self,
        viewer: Uuid,
        query: &FeedQuery,
    ) -> DomainResult<Paginated<PostSummary>> {
        self.fetch_posts_at(viewer, query, Utc::now()).await
    }

    /// Same as [`fetch_posts`](Self::fetch_posts) with an explicit clock.
    pub async fn fetch_posts_at(
        &self,
        viewer: Uuid,
        query: &FeedQuery,
        now: DateTime<Utc>,
    ) -> DomainResult<Paginated<PostSummary>> {
        let plan = FeedPlan::build(viewer, query, now);
        debug!(scope = ?query.scope, predicates = plan.predicates.len(), order = ?plan.order, "executing feed plan");

        let (items, total) = self.posts.fetch_feed(&plan).await?;
        Ok(Paginated {
            items,
            meta: PageMeta::new(total, plan.page),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use domains::{MockPostRepository, PostPredicate, RankKey, RankingView, SortDirection, TimeWindow};

    fn params(pairs: &[(&str, &str)]) -> FeedParams {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }

    #[test]
    fn missing_params_use_defaults() {
        let query = FeedParams::default().into_query(FeedScope::Global).unwrap();
        assert_eq!(query.page, Page::default());
        assert_eq!(query.filters.window, TimeWindow::AllTime);
        assert_eq!(query.filters.view, RankingView::Newest);
        assert_eq!(query.filters.sort, SortDirection::Desc);
    }

    #[test]
    fn malformed_params_are_validation_errors() {
        for bad in [
            params(&[("limit", "0")]),
            params(&[("limit", "21")]),
            params(&[("limit", "ten")]),
            params(&[("offset", "-1")]),
            params(&[("view", "hot")]),
            params(&[("time", "decade")]),
            params(&[("sort", "sideways")]),
        ] {
            let err = bad.into_query(FeedScope::Global).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{err:?}");
        }
    }

    #[test]
    fn list_params_share_search_bounds() {
        let long = "y".repeat(101);
        let list = ListParams {
            search: Some(long),
            ..Default::default()
        };
        assert!(list.into_parts().is_err());
    }

    #[tokio::test]
    async fn page_metadata_survives_offset_past_the_end() {
        let viewer = Uuid::now_v7();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let mut repo = MockPostRepository::new();
        repo.expect_fetch_feed()
            .withf(move |plan| {
                plan.viewer == viewer
                    && plan.order.key == RankKey::Score
                    && plan.predicates.contains(&PostPredicate::ViewerIsMember)
                    && plan.page.offset() == 100
            })
            .returning(|_| Ok((Vec::new(), 25)));

        let service = FeedService::new(Arc::new(repo));
        let query = params(&[("view", "top"), ("offset", "100"), ("limit", "10")])
            .into_query(FeedScope::Joined)
            .unwrap();

        let page = service.fetch_posts_at(viewer, &query, now).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.meta.total_count, 25);
        assert_eq!(page.meta.total_pages, 3);
        assert_eq!(page.meta.current_page, 11);
    }
}
