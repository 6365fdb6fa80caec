//! # services
//!
//! Business rules of Communiverse, written against the `domains` ports
//! only. Adapters are injected through [`Ports`].

pub mod accounts;
pub mod authorization;
pub mod comments;
pub mod communities;
pub mod feed;
pub mod posts;
pub mod roles;
pub mod slug;
pub mod votes;

use std::sync::Arc;

use domains::{
    CommentRepository, CommunityRepository, DomainError, DomainResult, Mailer, PasswordHasher,
    PostRepository, RoleRepository, SlugRepository, TokenIssuer, UserRepository, VoteRepository,
};
use validator::Validate;

pub use accounts::{AccountService, AccountSettings};
pub use authorization::{Authorizer, Grant, Resource, ResourceKind};
pub use comments::{build_tree, CommentService};
pub use communities::CommunityService;
pub use feed::{FeedParams, FeedService, ListParams};
pub use posts::{PostPage, PostService};
pub use roles::RoleCatalog;
pub use slug::{slugify, SlugGenerator};
pub use votes::{VoteLedger, VoteTally};

/// Runs derive-based payload validation and maps failures into the domain.
pub(crate) fn validate<T: Validate>(input: &T) -> DomainResult<()> {
    input
        .validate()
        .map_err(|errors| DomainError::validation(errors.to_string()))
}

/// Every adapter the services need.
#[derive(Clone)]
pub struct Ports {
    pub roles: Arc<dyn RoleRepository>,
    pub slugs: Arc<dyn SlugRepository>,
    pub users: Arc<dyn UserRepository>,
    pub communities: Arc<dyn CommunityRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub votes: Arc<dyn VoteRepository>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub tokens: Arc<dyn TokenIssuer>,
    pub mailer: Arc<dyn Mailer>,
}

/// The wired service graph shared by every request.
#[derive(Clone)]
pub struct Services {
    pub accounts: AccountService,
    pub communities: CommunityService,
    pub posts: PostService,
    pub comments: CommentService,
    pub votes: VoteLedger,
    pub feed: FeedService,
    pub authorizer: Arc<Authorizer>,
}

impl Services {
    pub fn new(ports: Ports, settings: AccountSettings) -> Self {
        let roles = Arc::new(RoleCatalog::new(ports.roles));
        let authorizer = Arc::new(Authorizer::new(Arc::clone(&roles)));
        let slugs = SlugGenerator::new(ports.slugs);

        Self {
            accounts: AccountService::new(
                ports.users,
                roles,
                ports.hasher,
                ports.tokens,
                ports.mailer,
                settings,
            ),
            communities: CommunityService::new(
                ports.communities,
                slugs.clone(),
                Arc::clone(&authorizer),
            ),
            posts: PostService::new(Arc::clone(&ports.posts), slugs, Arc::clone(&authorizer)),
            comments: CommentService::new(ports.comments, Arc::clone(&authorizer)),
            votes: VoteLedger::new(ports.votes),
            feed: FeedService::new(ports.posts),
            authorizer,
        }
    }
}
