//! # Feed Plans
//!
//! A feed request is reduced to a [`FeedPlan`]: a flat list of
//! [`PostPredicate`]s, one [`FeedOrder`] and a [`Page`]. Every scope,
//! filter and view combination is expressed with the same fragments, so
//! storage adapters only need to know how to render each fragment once.
//!
//! ```text
//! FeedQuery { scope, filters, page }
//!     └── FeedPlan::build(viewer, now)
//!             ├── predicates: [TextMatch?, CreatedSince?, InCommunity? | ViewerIsMember?]
//!             ├── order:      (RankKey, SortDirection)
//!             └── page:       (limit, offset)
//! ```

use std::str::FromStr;

use chrono::{DateTime, Days, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 20;
pub const MAX_SEARCH_LEN: usize = 100;

// ── Pagination ──────────────────────────────────────────────────────────────

/// A validated page window: `1 <= limit <= 20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    limit: u32,
    offset: u32,
}

impl Page {
    pub fn new(limit: u32, offset: u32) -> DomainResult<Self> {
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(DomainError::validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        Ok(Self { limit, offset })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub total_count: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub offset: u32,
    pub limit: u32,
}

impl PageMeta {
    pub fn new(total_count: u64, page: Page) -> Self {
        let limit = u64::from(page.limit);
        Self {
            total_count,
            total_pages: total_count.div_ceil(limit),
            current_page: u64::from(page.offset) / limit + 1,
            offset: page.offset,
            limit: page.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

// ── Scope & filters ─────────────────────────────────────────────────────────

/// Which subset of posts a feed targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedScope {
    Community(Uuid),
    Global,
    /// Only communities the viewer has joined.
    Joined,
}

impl FeedScope {
    /// The single extra predicate a scope contributes.
    pub fn predicate(&self) -> Option<PostPredicate> {
        match self {
            Self::Community(id) => Some(PostPredicate::InCommunity(*id)),
            Self::Global => None,
            Self::Joined => Some(PostPredicate::ViewerIsMember),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeWindow {
    Today,
    Week,
    Month,
    Year,
    #[default]
    AllTime,
}

impl TimeWindow {
    /// Earliest admitted `created_at`, or `None` for all-time.
    pub fn cutoff(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Today => now.checked_sub_days(Days::new(1)),
            Self::Week => now.checked_sub_days(Days::new(7)),
            Self::Month => now.checked_sub_months(Months::new(1)),
            Self::Year => now.checked_sub_months(Months::new(12)),
            Self::AllTime => None,
        }
    }
}

impl FromStr for TimeWindow {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Self::Today),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "all-time" => Ok(Self::AllTime),
            other => Err(DomainError::validation(format!(
                "time must be one of today, week, month, year, all-time; got `{other}`"
            ))),
        }
    }
}

/// The ranking dimension of a feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankingView {
    #[default]
    Newest,
    Top,
    Discussed,
}

impl RankingView {
    pub fn key(self) -> RankKey {
        match self {
            Self::Newest => RankKey::CreatedAt,
            Self::Top => RankKey::Score,
            Self::Discussed => RankKey::CommentCount,
        }
    }
}

impl FromStr for RankingView {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(Self::Newest),
            "top" => Ok(Self::Top),
            "discussed" => Ok(Self::Discussed),
            other => Err(DomainError::validation(format!(
                "view must be one of newest, top, discussed; got `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(DomainError::validation(format!(
                "sort must be asc or desc; got `{other}`"
            ))),
        }
    }
}

/// Filters shared by every scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedFilters {
    search: Option<String>,
    pub window: TimeWindow,
    pub view: RankingView,
    pub sort: SortDirection,
}

impl FeedFilters {
    pub fn new(
        search: Option<String>,
        window: TimeWindow,
        view: RankingView,
        sort: SortDirection,
    ) -> DomainResult<Self> {
        let search = search.filter(|s| !s.is_empty());
        if let Some(text) = &search {
            if text.chars().count() > MAX_SEARCH_LEN {
                return Err(DomainError::validation(format!(
                    "search must be at most {MAX_SEARCH_LEN} characters"
                )));
            }
        }
        Ok(Self {
            search,
            window,
            view,
            sort,
        })
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub scope: FeedScope,
    pub filters: FeedFilters,
    pub page: Page,
}

// ── Plan fragments ──────────────────────────────────────────────────────────

/// One composable filter over posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostPredicate {
    /// Case-insensitive substring of title or content. The text is literal.
    TextMatch(String),
    /// `created_at >= cutoff`
    CreatedSince(DateTime<Utc>),
    InCommunity(Uuid),
    /// The plan's viewer holds any membership in the post's community.
    ViewerIsMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankKey {
    CreatedAt,
    Score,
    CommentCount,
}

/// Primary ordering. Ties are broken by `created_at`, then `id`, in the same direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedOrder {
    pub key: RankKey,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPlan {
    pub viewer: Uuid,
    pub predicates: Vec<PostPredicate>,
    pub order: FeedOrder,
    pub page: Page,
}

impl FeedPlan {
    pub fn build(viewer: Uuid, query: &FeedQuery, now: DateTime<Utc>) -> Self {
        let filters = &query.filters;
        let predicates = filters
            .search()
            .map(|text| PostPredicate::TextMatch(text.to_string()))
            .into_iter()
            .chain(filters.window.cutoff(now).map(PostPredicate::CreatedSince))
            .chain(query.scope.predicate())
            .collect();

        Self {
            viewer,
            predicates,
            order: FeedOrder {
                key: filters.view.key(),
                direction: filters.sort,
            },
            page: query.page,
        }
    }
}
