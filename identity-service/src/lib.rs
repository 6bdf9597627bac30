pub mod claims;
pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::claims::ClaimMapper;
use crate::config::IdentityConfig;
use crate::middleware::{authentication_middleware, Authenticator};
use crate::services::{
    IdentityProvider, IdentityService, InMemoryDirectory, JwksVerifier, KeycloakClient,
    PgDirectory, ProfileService, TokenVerifier, UserDirectory,
};

#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityService>,
    pub profiles: Arc<ProfileService>,
    pub authenticator: Arc<Authenticator>,
    /// Pool behind the directory, when it is PostgreSQL.
    pub database: Option<PgPool>,
}

impl AppState {
    /// Wire the services around the given collaborators.
    pub fn new(
        config: &IdentityConfig,
        provider: Arc<dyn IdentityProvider>,
        directory: Arc<dyn UserDirectory>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self {
        let identity = IdentityService::new(provider, directory.clone(), config.registration.clone());
        let profiles = ProfileService::new(directory);
        let authenticator = Authenticator::new(verifier, ClaimMapper::new(&config.claims));

        Self {
            identity: Arc::new(identity),
            profiles: Arc::new(profiles),
            authenticator: Arc::new(authenticator),
            database: None,
        }
    }

    /// Report this pool's liveness on `/health`.
    #[must_use]
    pub fn with_database(mut self, pool: PgPool) -> Self {
        self.database = Some(pool);
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/profile", get(handlers::auth::profile))
        .route("/auth/profile/:user_id", get(handlers::auth::profile_by_id))
        .route_layer(from_fn_with_state(
            state.authenticator.clone(),
            authentication_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .merge(protected)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .with_state(state)
}

pub struct Application {
    port: u16,
    router: Router,
}

impl Application {
    pub async fn build(config: IdentityConfig) -> anyhow::Result<Self> {
        let provider = KeycloakClient::new(config.provider.clone())?;
        tracing::info!(
            base_url = %config.provider.base_url,
            realm = %config.provider.realm,
            "Keycloak client initialized"
        );

        let verifier = JwksVerifier::new(&config)?;

        let pool = match config.database.as_ref() {
            Some(database) => Some(db::connect(database).await?),
            None => {
                tracing::warn!("No database configured - using in-memory user directory");
                None
            }
        };

        let directory: Arc<dyn UserDirectory> = match pool.clone() {
            Some(pool) => Arc::new(PgDirectory::new(pool)),
            None => Arc::new(InMemoryDirectory::new()),
        };

        let mut state = AppState::new(&config, Arc::new(provider), directory, Arc::new(verifier));
        if let Some(pool) = pool {
            state = state.with_database(pool);
        }

        Ok(Self {
            port: config.server.port,
            router: build_router(state),
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
