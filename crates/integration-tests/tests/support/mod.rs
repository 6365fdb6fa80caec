//! Shared fixtures: a full service stack over the in-memory store.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use domains::{
    CommunityDetails, DomainError, DomainResult, FeedFilters, FeedQuery, FeedScope, Mailer, Page,
    PasswordHasher, PostDetails, RankingView, SortDirection, TimeWindow, TokenIssuer, User,
};
use fake::faker::lorem::en::Paragraph;
use fake::faker::name::en::Name;
use fake::Fake;
use services::accounts::RegisterInput;
use services::communities::NewCommunityInput;
use services::posts::NewPostInput;
use services::{AccountSettings, Ports, Services};
use storage_adapters::MemoryStore;
use uuid::Uuid;

#[derive(Default)]
pub struct CapturingMailer {
    links: Mutex<Vec<String>>,
}

impl CapturingMailer {
    pub fn last_token(&self) -> Option<String> {
        let links = self.links.lock().unwrap();
        links
            .last()
            .and_then(|link| link.rsplit('/').next())
            .map(str::to_string)
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send_invitation(&self, _user: &User, activation_url: &str) -> DomainResult<()> {
        self.links.lock().unwrap().push(activation_url.to_string());
        Ok(())
    }

    async fn send_password_reset(&self, _user: &User, reset_url: &str) -> DomainResult<()> {
        self.links.lock().unwrap().push(reset_url.to_string());
        Ok(())
    }
}

pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> DomainResult<String> {
        Ok(format!("plain:{password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        hash.strip_prefix("plain:") == Some(password)
    }
}

/// Tokens are the user id itself.
pub struct IdTokens;

impl TokenIssuer for IdTokens {
    fn issue(&self, user_id: Uuid) -> DomainResult<String> {
        Ok(user_id.to_string())
    }

    fn verify(&self, token: &str) -> DomainResult<Uuid> {
        token
            .parse()
            .map_err(|_| DomainError::Unauthorized("bad token".to_string()))
    }
}

pub struct World {
    pub services: Services,
    pub store: Arc<MemoryStore>,
    pub mail: Arc<CapturingMailer>,
    seq: AtomicUsize,
}

impl World {
    pub fn new() -> Self {
        let mail = Arc::new(CapturingMailer::default());
        Self::build(mail.clone(), mail)
    }

    /// Same stack with a caller-supplied mailer.
    pub fn with_mailer(mailer: Arc<dyn Mailer>) -> Self {
        Self::build(mailer, Arc::new(CapturingMailer::default()))
    }

    fn build(mailer: Arc<dyn Mailer>, mail: Arc<CapturingMailer>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let ports = Ports {
            roles: store.clone(),
            slugs: store.clone(),
            users: store.clone(),
            communities: store.clone(),
            posts: store.clone(),
            comments: store.clone(),
            votes: store.clone(),
            hasher: Arc::new(PlainHasher),
            tokens: Arc::new(IdTokens),
            mailer,
        };
        Self {
            services: Services::new(ports, AccountSettings::default()),
            store,
            mail,
            seq: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> usize {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn registration(&self) -> RegisterInput {
        let n = self.next();
        RegisterInput {
            name: Name().fake(),
            username: format!("reader{n}"),
            email: format!("reader{n}@example.com"),
            password: "correct horse".to_string(),
        }
    }

    /// An activated account.
    pub async fn user(&self) -> User {
        let accounts = &self.services.accounts;
        let user = accounts.register(self.registration()).await.unwrap();
        let token = self.mail.last_token().unwrap();
        accounts.activate(&token).await.unwrap();
        accounts.profile(user.id).await.unwrap()
    }

    /// Creates a community and returns it as seen by its creator.
    pub async fn community(&self, owner: &User, name: &str) -> CommunityDetails {
        let communities = &self.services.communities;
        let community = communities
            .create(
                owner,
                NewCommunityInput {
                    name: name.to_string(),
                    description: "A community for integration tests to live in.".to_string(),
                    thumbnail_id: None,
                },
            )
            .await
            .unwrap();
        communities.get(&community.slug, owner.id).await.unwrap()
    }

    /// Reloads a community from `viewer`'s perspective.
    pub async fn community_as(&self, slug: &str, viewer: &User) -> CommunityDetails {
        self.services.communities.get(slug, viewer.id).await.unwrap()
    }

    pub async fn join(&self, user: &User, slug: &str) -> CommunityDetails {
        let details = self.community_as(slug, user).await;
        self.services.communities.join(user, &details).await.unwrap();
        self.community_as(slug, user).await
    }

    pub async fn post(&self, author: &User, community: &CommunityDetails, title: &str) -> PostDetails {
        self.post_with(author, community, title, body_text()).await
    }

    pub async fn post_with(
        &self,
        author: &User,
        community: &CommunityDetails,
        title: &str,
        content: String,
    ) -> PostDetails {
        let posts = &self.services.posts;
        let post = posts
            .create(
                author,
                community,
                NewPostInput {
                    title: title.to_string(),
                    content,
                    tags: Vec::new(),
                },
            )
            .await
            .unwrap();
        posts.get(&post.slug, author.id).await.unwrap()
    }
}

/// Lorem text inside the accepted post length.
pub fn body_text() -> String {
    let mut text: String = Paragraph(3..6).fake();
    while text.len() < 120 {
        text.push_str(" Lorem ipsum dolor sit amet.");
    }
    text.truncate(900);
    text
}

pub fn feed_query(scope: FeedScope, view: RankingView, limit: u32, offset: u32) -> FeedQuery {
    FeedQuery {
        scope,
        filters: FeedFilters::new(None, TimeWindow::AllTime, view, SortDirection::Desc).unwrap(),
        page: Page::new(limit, offset).unwrap(),
    }
}

/// First page of `scope` with an explicit window and direction.
pub fn filtered_query(
    scope: FeedScope,
    time: TimeWindow,
    view: RankingView,
    sort: SortDirection,
) -> FeedQuery {
    FeedQuery {
        scope,
        filters: FeedFilters::new(None, time, view, sort).unwrap(),
        page: Page::new(20, 0).unwrap(),
    }
}

pub fn search_query(scope: FeedScope, search: &str) -> FeedQuery {
    FeedQuery {
        scope,
        filters: FeedFilters::new(
            Some(search.to_string()),
            TimeWindow::AllTime,
            RankingView::Newest,
            SortDirection::Desc,
        )
        .unwrap(),
        page: Page::default(),
    }
}
