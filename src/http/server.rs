//! Service assembly and the HTTP serve loop.
//!
//! # Responsibilities
//! - Build the identity graph (user store, sessions, schemes, email sender)
//!   on top of the shared store connection
//! - Compose account and application endpoints, plus the migrations
//!   endpoint in development
//! - Serve static assets from `wwwroot` next to the executable
//! - Install the environment's error pipeline and security headers
//! - Bind the listener on the resolved address and the fixed port
//!
//! # Design Decisions
//! - The environment is read once here; handlers never inspect it to decide
//!   which pipeline applies
//! - Binding happens during assembly so that a taken port fails startup
//!   before the store is touched
//! - `run()` serves until the shutdown channel fires

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{middleware, Router};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{AssetsConfig, HostConfig, HostEnvironment};
use crate::http::error::{developer_panic_page, exception_handler, panic_page};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::{account, diagnostics, pages};
use crate::identity::{
    AuthenticationSchemes, EmailSender, IdentityService, IdentityUserAccessor, NoOpEmailSender,
    RedirectManager,
};
use crate::platform::error_log::{ErrorLog, TracingErrorLog};
use crate::platform::HostNetworkAddress;
use crate::security::headers::{hsts_layer, nosniff_layer, DEFAULT_HSTS_MAX_AGE};
use crate::store::{DataStoreConnection, SchemaMigrator, SqliteUserStore};

/// Directory name of the static assets, next to the executable.
pub const ASSET_DIR: &str = "wwwroot";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityService>,
    pub accessor: IdentityUserAccessor,
    pub redirects: RedirectManager,
    pub connection: DataStoreConnection,
    pub migrator: Arc<SchemaMigrator>,
    pub environment: HostEnvironment,
    pub error_log: Arc<dyn ErrorLog>,
    pub require_confirmed_account: bool,
}

/// Error type for service assembly.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("failed to bind listener on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read bound listener address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Builds the runnable service from configuration and collaborators.
pub struct ServiceAssembler {
    config: HostConfig,
    email: Arc<dyn EmailSender>,
    migrator: Arc<SchemaMigrator>,
    error_log: Arc<dyn ErrorLog>,
}

impl ServiceAssembler {
    pub fn new(config: &HostConfig) -> Self {
        Self {
            config: config.clone(),
            email: Arc::new(NoOpEmailSender),
            migrator: Arc::new(
                SchemaMigrator::identity().with_ensure_created(config.store.ensure_created),
            ),
            error_log: Arc::new(TracingErrorLog),
        }
    }

    pub fn with_email_sender(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = email;
        self
    }

    pub fn with_migrator(mut self, migrator: SchemaMigrator) -> Self {
        self.migrator = Arc::new(migrator);
        self
    }

    pub fn with_error_log(mut self, error_log: Arc<dyn ErrorLog>) -> Self {
        self.error_log = error_log;
        self
    }

    pub fn migrator(&self) -> &SchemaMigrator {
        &self.migrator
    }

    pub fn environment(&self) -> HostEnvironment {
        self.config.environment
    }

    /// Wire the identity services onto `connection`.
    pub fn state(&self, connection: DataStoreConnection) -> AppState {
        let users = Arc::new(SqliteUserStore::new(connection.clone()));
        let identity = Arc::new(IdentityService::new(
            users,
            self.email.clone(),
            self.config.identity.clone(),
            AuthenticationSchemes::default(),
        ));
        let redirects = RedirectManager;

        AppState {
            accessor: IdentityUserAccessor::new(identity.clone(), redirects),
            identity,
            redirects,
            connection,
            migrator: self.migrator.clone(),
            environment: self.config.environment,
            error_log: self.error_log.clone(),
            require_confirmed_account: self.config.identity.require_confirmed_account,
        }
    }

    /// Build the router with every middleware layer for the environment.
    pub fn router(&self, state: AppState) -> Router {
        let environment = self.config.environment;

        let mut routes = Router::new().merge(pages::routes()).merge(account::routes());
        if environment.is_development() {
            routes = routes.merge(diagnostics::routes());
        }
        let mut router = routes.with_state(state);

        if let Some(root) = asset_root(&self.config.assets) {
            tracing::debug!(root = %root.display(), "Serving static assets");
            router = router.fallback_service(ServeDir::new(root));
        }

        router = match environment {
            HostEnvironment::Development => router.layer(CatchPanicLayer::custom(developer_panic_page)),
            HostEnvironment::Production => router
                .layer(middleware::from_fn(exception_handler))
                .layer(CatchPanicLayer::custom(panic_page))
                .layer(hsts_layer(DEFAULT_HSTS_MAX_AGE)),
        };

        router
            .layer(nosniff_layer())
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Build the service and bind its listener on `address` and the
    /// configured port.
    pub async fn assemble(
        &self,
        address: HostNetworkAddress,
        connection: DataStoreConnection,
    ) -> Result<ServiceInstance, AssemblyError> {
        let bind_addr = address.socket_addr(self.config.listener.port);
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| AssemblyError::Bind {
                address: bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(AssemblyError::LocalAddr)?;

        let state = self.state(connection);
        let router = self.router(state.clone());

        tracing::info!(
            address = %local_addr,
            environment = self.config.environment.as_str(),
            store = %state.connection.path(),
            "Service assembled"
        );

        Ok(ServiceInstance {
            listener,
            local_addr,
            router,
            state,
        })
    }
}

/// The wired application and its bound listener.
pub struct ServiceInstance {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
    state: AppState,
}

impl ServiceInstance {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        tracing::info!(address = %self.local_addr, "HTTP server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Asset directory: the configured root, or `wwwroot` next to the
/// executable. `None` when the directory does not exist.
pub fn asset_root(config: &AssetsConfig) -> Option<PathBuf> {
    let root = match &config.root {
        Some(root) => root.clone(),
        None => std::env::current_exe().ok()?.parent()?.join(ASSET_DIR),
    };
    if root.is_dir() {
        Some(root)
    } else {
        tracing::debug!(root = %root.display(), "No static asset directory");
        None
    }
}
