use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod errors;
pub mod fetch;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod stdio;
pub mod transport;

#[cfg(test)]
mod test_support;

use config::{Config, Environment};
use transport::TransportPool;

#[derive(Clone)]
pub struct AppState {
    pub process_env: Arc<Environment>,
    pub transports: Arc<TransportPool>,
}

impl AppState {
    pub fn new(config: Config, client: reqwest::Client) -> Self {
        let process_env = Arc::new(config.environment.clone());
        Self {
            process_env,
            transports: Arc::new(TransportPool::new(Arc::new(config), client)),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .route(
            "/mcp",
            post(http::handlers::mcp_endpoint)
                .get(http::handlers::mcp_get)
                .delete(http::handlers::mcp_delete),
        )
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
