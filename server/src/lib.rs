//! JSON over HTTP surface for the cartlock [`Coordinator`].
//!
//! | route | method |
//! |---|---|
//! | `/session/open` | POST |
//! | `/session/heartbeat` | POST |
//! | `/session/stop` | POST |
//! | `/job/eligibility?sessionId=` | GET |
//! | `/job/request` | POST |
//! | `/job/claim` | POST |
//! | `/healthz` | GET, never behind auth |

mod auth;
mod error;
mod routes;

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tokio::net::TcpListener;

use cartlock_core::Coordinator;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    coordinator: Arc<Coordinator>,
    api_token: Option<Arc<str>>,
}

impl AppState {
    /// `api_token` of `None` disables bearer auth.
    #[must_use]
    pub fn new(coordinator: Arc<Coordinator>, api_token: Option<String>) -> Self {
        Self {
            coordinator,
            api_token: api_token.map(Arc::from),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/session/open", post(routes::open_session))
        .route("/session/heartbeat", post(routes::heartbeat))
        .route("/session/stop", post(routes::stop_session))
        .route("/job/eligibility", get(routes::eligibility))
        .route("/job/request", post(routes::request_job))
        .route("/job/claim", post(routes::claim))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .route("/healthz", get(routes::healthz))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(addr = %addr, auth = state.api_token.is_some(), "cartlock listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
