//! # Communiverse Binary
//!
//! The entry point that assembles the application from configuration and
//! compile-time features, then serves the `/v1` API until SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use api_adapters::{router, AppState};
use auth_adapters::{Argon2PasswordHasher, JwtSettings, JwtTokenIssuer, LogMailer};
use chrono::TimeDelta;
use configs::{LoggingSettings, Settings, StorageBackend};
use domains::{
    CommentRepository, CommunityRepository, PostRepository, RoleRepository, SlugRepository,
    UserRepository, VoteRepository,
};
use secrecy::ExposeSecret;
use services::{AccountSettings, Ports, Services};
use storage_adapters::MemoryStore;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(feature = "db-postgres")]
use configs::DatabaseSettings;
#[cfg(feature = "db-postgres")]
use storage_adapters::{PgOptions, PgStore};

#[cfg(not(all(feature = "web-axum", feature = "auth-jwt")))]
compile_error!("the communiverse binary needs the `web-axum` and `auth-jwt` features");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load layered configuration
    let settings = Settings::load().context("loading configuration")?;

    // 2. Initialize logging
    init_tracing(&settings.logging);

    // 3. Initialize storage and the remaining adapters
    let ports = match settings.database.backend {
        StorageBackend::Memory => {
            warn!("using in-memory storage, data is lost on shutdown");
            assemble_ports(Arc::new(MemoryStore::new()), &settings)
        }
        #[cfg(feature = "db-postgres")]
        StorageBackend::Postgres => {
            let store = connect_postgres(&settings.database).await?;
            assemble_ports(Arc::new(store), &settings)
        }
        #[cfg(not(feature = "db-postgres"))]
        StorageBackend::Postgres => {
            anyhow::bail!("postgres backend requested but built without the `db-postgres` feature")
        }
    };

    // 4. Wire services
    let accounts = AccountSettings {
        invitation_ttl: TimeDelta::hours(settings.auth.invitation_ttl_hours),
        reset_ttl: TimeDelta::minutes(settings.auth.reset_ttl_minutes),
        frontend_url: settings.app.frontend_url.clone(),
    };
    let state = AppState::new(Services::new(ports, accounts));

    // 5. Serve
    let app = router(
        state,
        &settings.server.cors_origin,
        settings.server.request_timeout(),
    );
    let addr = settings.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(%addr, environment = %settings.app.environment, "communiverse listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    info!("communiverse stopped");
    Ok(())
}

/// `RUST_LOG` wins over `logging.filter` when set.
fn init_tracing(logging: &LoggingSettings) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Uses one store for every repository port.
fn assemble_ports<S>(store: Arc<S>, settings: &Settings) -> Ports
where
    S: RoleRepository
        + SlugRepository
        + UserRepository
        + CommunityRepository
        + PostRepository
        + CommentRepository
        + VoteRepository
        + 'static,
{
    let tokens = JwtTokenIssuer::new(JwtSettings {
        secret: settings.auth.token_secret.expose_secret().as_bytes().to_vec(),
        issuer: settings.auth.issuer.clone(),
        audience: settings.auth.audience.clone(),
        ttl: TimeDelta::hours(settings.auth.token_ttl_hours),
    });

    Ports {
        roles: store.clone(),
        slugs: store.clone(),
        users: store.clone(),
        communities: store.clone(),
        posts: store.clone(),
        comments: store.clone(),
        votes: store,
        hasher: Arc::new(Argon2PasswordHasher::default()),
        tokens: Arc::new(tokens),
        mailer: Arc::new(LogMailer),
    }
}

#[cfg(feature = "db-postgres")]
async fn connect_postgres(database: &DatabaseSettings) -> anyhow::Result<PgStore> {
    let options = PgOptions {
        max_connections: database.max_connections,
        acquire_timeout: database.acquire_timeout(),
        query_timeout: database.query_timeout(),
    };
    let store = PgStore::connect(database.url.expose_secret(), &options)
        .await
        .context("connecting to postgres")?;

    if database.run_migrations {
        store.migrate().await.context("running migrations")?;
    }
    store.ping().await.context("database health check")?;

    info!(max_connections = options.max_connections, "postgres ready");
    Ok(store)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "could not install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "could not install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
