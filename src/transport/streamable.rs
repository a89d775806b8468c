//! Transport state machine and lifecycle policies.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use axum::http::StatusCode;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};
use uuid::Uuid;

use super::{InternalRequest, InternalResponse};
use crate::config::{Config, Environment, Lifecycle};
use crate::errors::{AppError, INVALID_REQUEST_CODE, SERVER_ERROR_CODE, SESSION_NOT_FOUND_CODE};
use crate::mcp::server::{create_server, McpServer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Stateless,
    /// A random UUID is issued on `initialize` and required on every later request.
    Uuid,
}

/// `new → connect → handle_request* → close`. Connecting twice, or handling while
/// unconnected or closed, is an error.
pub struct StreamableHttpTransport {
    session_mode: SessionMode,
    server: OnceCell<McpServer>,
    session_id: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl StreamableHttpTransport {
    pub fn new(session_mode: SessionMode) -> Self {
        Self {
            session_mode,
            server: OnceCell::new(),
            session_id: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn connect(&self, server: McpServer) -> Result<(), AppError> {
        self.server
            .set(server)
            .map_err(|_| AppError::internal("transport is already connected"))
    }

    pub fn is_connected(&self) -> bool {
        self.server.initialized()
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("transport closed");
        }
    }

    pub async fn handle_request(
        &self,
        request: InternalRequest,
    ) -> Result<InternalResponse, AppError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::internal("transport is closed"));
        }
        let server = self
            .server
            .get()
            .ok_or_else(|| AppError::internal("transport is not connected"))?;

        let session_id = match self.session_mode {
            SessionMode::Stateless => None,
            SessionMode::Uuid => Some(self.check_session(&request).await?),
        };

        let stream = request.accepts_sse && !request.accepts_json;
        let message = server.handle_payload(request.payload).await;

        Ok(InternalResponse {
            status: if message.is_some() {
                StatusCode::OK
            } else {
                StatusCode::ACCEPTED
            },
            session_id,
            message,
            stream,
        })
    }

    async fn check_session(&self, request: &InternalRequest) -> Result<String, AppError> {
        let mut current = self.session_id.lock().await;

        if request.is_initialize() {
            if current.is_some() {
                return Err(AppError::transport(
                    StatusCode::BAD_REQUEST,
                    INVALID_REQUEST_CODE,
                    "Invalid Request: Server already initialized",
                ));
            }
            let issued = Uuid::new_v4().to_string();
            info!(session_id = %issued, "mcp session started");
            *current = Some(issued.clone());
            return Ok(issued);
        }

        let Some(expected) = current.as_deref() else {
            return Err(AppError::transport(
                StatusCode::BAD_REQUEST,
                SERVER_ERROR_CODE,
                "Bad Request: Server not initialized",
            ));
        };
        let Some(offered) = request.session_id.as_deref() else {
            return Err(AppError::transport(
                StatusCode::BAD_REQUEST,
                SERVER_ERROR_CODE,
                "Bad Request: Mcp-Session-Id header is required",
            ));
        };
        if offered != expected {
            return Err(AppError::transport(
                StatusCode::NOT_FOUND,
                SESSION_NOT_FOUND_CODE,
                "Session not found",
            ));
        }

        Ok(expected.to_string())
    }
}

/// Hands out transports according to the configured lifecycle.
pub struct TransportPool {
    config: Arc<Config>,
    client: reqwest::Client,
    shared: OnceCell<Arc<StreamableHttpTransport>>,
}

impl TransportPool {
    pub fn new(config: Arc<Config>, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            shared: OnceCell::new(),
        }
    }

    pub async fn handle(
        &self,
        env: &Environment,
        request: InternalRequest,
    ) -> Result<InternalResponse, AppError> {
        match self.config.lifecycle {
            Lifecycle::PerRequest => {
                let transport = StreamableHttpTransport::new(SessionMode::Stateless);
                transport.connect(create_server(&self.config, env, self.client.clone()))?;
                let result = transport.handle_request(request).await;
                transport.close();
                result
            }
            Lifecycle::Singleton => self.shared(env).await?.handle_request(request).await,
        }
    }

    /// The process-wide transport. Concurrent first callers wait on a single
    /// initialization; the environment of that first caller configures the server.
    pub async fn shared(&self, env: &Environment) -> Result<Arc<StreamableHttpTransport>, AppError> {
        self.shared
            .get_or_try_init(|| async {
                let session_mode = if self.config.sessions {
                    SessionMode::Uuid
                } else {
                    SessionMode::Stateless
                };
                let transport = StreamableHttpTransport::new(session_mode);
                transport.connect(create_server(&self.config, env, self.client.clone()))?;
                info!(
                    strategy = self.config.strategy.as_str(),
                    sessions = self.config.sessions,
                    "shared mcp transport connected"
                );
                Ok::<_, AppError>(Arc::new(transport))
            })
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::Config;

    fn config(vars: &[(&str, &str)]) -> Arc<Config> {
        let vars: std::collections::HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Arc::new(Config::from_lookup(|name| vars.get(name).cloned()).expect("valid config"))
    }

    fn server() -> McpServer {
        create_server(
            &config(&[]),
            &Environment::default(),
            reqwest::Client::new(),
        )
    }

    fn initialize() -> InternalRequest {
        InternalRequest::json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "clientInfo": { "name": "test-client", "version": "1.0.0" },
                "capabilities": {}
            }
        }))
    }

    fn ping(session_id: Option<&str>) -> InternalRequest {
        let mut request = InternalRequest::json(json!({"jsonrpc":"2.0","id":2,"method":"ping"}));
        request.session_id = session_id.map(str::to_string);
        request
    }

    #[tokio::test]
    async fn handling_before_connect_fails() {
        let transport = StreamableHttpTransport::new(SessionMode::Stateless);
        assert!(!transport.is_connected());
        assert!(transport.handle_request(ping(None)).await.is_err());
    }

    #[tokio::test]
    async fn connecting_twice_fails() {
        let transport = StreamableHttpTransport::new(SessionMode::Stateless);
        transport.connect(server()).expect("first connect");
        assert!(transport.connect(server()).is_err());
    }

    #[tokio::test]
    async fn closed_transport_rejects_requests() {
        let transport = StreamableHttpTransport::new(SessionMode::Stateless);
        transport.connect(server()).expect("connect");
        transport.handle_request(ping(None)).await.expect("open transport answers");

        transport.close();
        assert!(transport.handle_request(ping(None)).await.is_err());
    }

    #[tokio::test]
    async fn stateless_transport_issues_no_session() {
        let transport = StreamableHttpTransport::new(SessionMode::Stateless);
        transport.connect(server()).expect("connect");

        let response = transport.handle_request(initialize()).await.expect("response");
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.session_id.is_none());
    }

    #[tokio::test]
    async fn session_mode_issues_and_enforces_uuid() {
        let transport = StreamableHttpTransport::new(SessionMode::Uuid);
        transport.connect(server()).expect("connect");

        let missing = transport.handle_request(ping(None)).await.expect_err("not initialized");
        assert!(matches!(
            missing,
            AppError::Transport { status, .. } if status == StatusCode::BAD_REQUEST
        ));

        let response = transport.handle_request(initialize()).await.expect("initialize");
        let session_id = response.session_id.expect("session issued");
        assert!(Uuid::parse_str(&session_id).is_ok());

        let ok = transport
            .handle_request(ping(Some(&session_id)))
            .await
            .expect("matching session");
        assert_eq!(ok.session_id.as_deref(), Some(session_id.as_str()));

        let no_header = transport.handle_request(ping(None)).await.expect_err("header required");
        assert!(matches!(
            no_header,
            AppError::Transport { code: SERVER_ERROR_CODE, .. }
        ));

        let wrong = transport
            .handle_request(ping(Some("other")))
            .await
            .expect_err("unknown session");
        assert!(matches!(
            wrong,
            AppError::Transport { status, .. } if status == StatusCode::NOT_FOUND
        ));

        let again = transport.handle_request(initialize()).await.expect_err("re-initialize");
        assert!(matches!(
            again,
            AppError::Transport { code: INVALID_REQUEST_CODE, .. }
        ));
    }

    #[tokio::test]
    async fn singleton_initializes_once_under_concurrency() {
        let pool = TransportPool::new(
            config(&[("MCP_LIFECYCLE", "singleton")]),
            reqwest::Client::new(),
        );
        let env = Environment::default();

        let (first, second) = tokio::join!(pool.shared(&env), pool.shared(&env));
        let first = first.expect("first transport");
        let second = second.expect("second transport");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.is_connected());
    }

    #[tokio::test]
    async fn per_request_lifecycle_answers_each_call() {
        let pool = TransportPool::new(config(&[]), reqwest::Client::new());
        let env = Environment::default();

        for _ in 0..2 {
            let response = pool.handle(&env, ping(None)).await.expect("response");
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(response.message.expect("message")["result"], json!({}));
        }
        assert!(pool.shared.get().is_none());
    }
}
