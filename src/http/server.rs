//! HTTP server setup.
//!
//! # Responsibilities
//! - Assemble the Axum router: routes, per-route policies, pipeline layers
//! - Own the shared application state handed to handlers
//! - Serve with graceful shutdown and spawn the limiter's sweeper
//!
//! Middleware order, outermost first: request accounting → panic containment
//! → CORS → request timeout → trace → rate limit → authenticate → per-route
//! policy → handler.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::handler::Handler;
use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, CorsConfig};
use crate::data::Stores;
use crate::http::errors::ApiError;
use crate::http::handlers;
use crate::mail::Mailer;
use crate::observability::metrics::track_requests;
use crate::pipeline::authenticate::authenticate_middleware;
use crate::pipeline::authorize::{enforce, Policy};
use crate::pipeline::rate_limit::{rate_limit_middleware, RateLimiter};

/// Application state injected into handlers and pipeline stages.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub stores: Stores,
    pub limiter: Arc<RateLimiter>,
    pub mailer: Arc<dyn Mailer>,
}

/// The API server.
pub struct ApiServer {
    router: Router,
    limiter: Arc<RateLimiter>,
}

impl ApiServer {
    pub fn new(config: AppConfig, stores: Stores, mailer: Arc<dyn Mailer>) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.limiter.clone()));
        let state = AppState {
            config: Arc::new(config),
            stores,
            limiter: limiter.clone(),
            mailer,
        };

        let router = Self::build_router(state);
        Self { router, limiter }
    }

    /// Build the router. Each protected route names its policy inline, so
    /// this table doubles as the authorization audit surface.
    fn build_router(state: AppState) -> Router {
        let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);

        Router::new()
            .route(
                "/v1/healthcheck",
                get(handlers::healthcheck::status
                    .layer(middleware::from_fn_with_state(Policy::activated(), enforce))),
            )
            .route(
                "/v1/movies",
                get(handlers::movies::list.layer(middleware::from_fn_with_state(
                    Policy::permission("movies:read"),
                    enforce,
                )))
                .post(handlers::movies::create.layer(middleware::from_fn_with_state(
                    Policy::permission("movies:write"),
                    enforce,
                ))),
            )
            .route(
                "/v1/movies/{id}",
                get(handlers::movies::show.layer(middleware::from_fn_with_state(
                    Policy::permission("movies:read"),
                    enforce,
                )))
                .patch(handlers::movies::update.layer(middleware::from_fn_with_state(
                    Policy::permission("movies:write"),
                    enforce,
                )))
                .delete(handlers::movies::delete.layer(middleware::from_fn_with_state(
                    Policy::permission("movies:write"),
                    enforce,
                ))),
            )
            .route("/v1/users", post(handlers::users::register))
            .route("/v1/users/activated", put(handlers::users::activate))
            .route("/v1/users/password", put(handlers::users::reset_password))
            .route(
                "/v1/tokens/authentication",
                post(handlers::tokens::create_authentication_token),
            )
            .route(
                "/v1/tokens/activation",
                post(handlers::tokens::create_activation_token),
            )
            .route(
                "/v1/tokens/password-reset",
                post(handlers::tokens::create_password_reset_token),
            )
            .fallback(|| async { ApiError::NotFound })
            .with_state(state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn(track_requests))
                    .layer(CatchPanicLayer::custom(handle_panic))
                    .layer(TraceLayer::new_for_http())
                    .layer(cors_layer(&state.config.cors))
                    .layer(TimeoutLayer::new(request_timeout))
                    .layer(middleware::from_fn_with_state(
                        state.clone(),
                        rate_limit_middleware,
                    ))
                    .layer(middleware::from_fn_with_state(
                        state,
                        authenticate_middleware,
                    )),
            )
    }

    /// Run the server, accepting connections on the given listener, until
    /// the shutdown signal arrives. In-flight requests drain before return.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "API server starting");

        tokio::spawn(self.limiter.clone().run_sweeper(shutdown.resubscribe()));

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        let mut shutdown = shutdown;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

/// Cross-origin policy from the configured trusted origins, matched exactly.
/// With no trusted origins nothing is ever allowed; the layer still answers
/// preflights and sets the `Vary` headers so caches stay correct.
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .trusted_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::OPTIONS, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Convert a handler panic into a contained 500 for that request only.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!(detail, "Recovered from panic while serving a request");
    ApiError::Infrastructure.into_response()
}
