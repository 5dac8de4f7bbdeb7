//! HTTP/WebSocket server
//!
//! Serves the static listening page, a JSON status endpoint and the
//! `/ws` audio stream. The listener is bound with a bounded retry and
//! exponential backoff so an occupied port is a clean startup failure
//! instead of an indefinite hang.

use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::audio::queue::SharedSampleQueue;
use crate::config::ServerConfig;
use crate::error::NetworkError;
use crate::net::websocket::{handle_socket, WsBroadcaster};
use crate::stream::{NetworkSink, StreamStats};

/// Shared state for the request handlers
pub struct AppState {
    pub broadcaster: Arc<WsBroadcaster>,
    pub queue: SharedSampleQueue,
    pub stream_stats: Arc<Mutex<StreamStats>>,
    pub sample_rate: u32,
    pub chunk_samples: usize,
    pub started_at: DateTime<Utc>,
}

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// System status
#[derive(serde::Serialize)]
pub struct SystemStatus {
    pub clients: usize,
    pub queued_samples: usize,
    pub queue_capacity: usize,
    pub overflow_count: usize,
    pub chunks_sent: u64,
    pub samples_sent: u64,
    pub sample_rate: u32,
    pub chunk_samples: usize,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
}

/// Get system status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let stats = state.stream_stats.lock().clone();
    let status = SystemStatus {
        clients: state.broadcaster.client_count(),
        queued_samples: state.queue.len(),
        queue_capacity: state.queue.capacity(),
        overflow_count: state.queue.overflow_count(),
        chunks_sent: stats.chunks_sent,
        samples_sent: stats.samples_sent,
        sample_rate: state.sample_rate,
        chunk_samples: state.chunk_samples,
        started_at: state.started_at,
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
    };

    Json(ApiResponse::ok(status))
}

/// Upgrade to the audio WebSocket
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let broadcaster = state.broadcaster.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

/// Build the application router
pub fn router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/status", get(get_status))
        .fallback_service(ServeDir::new(&config.static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the listener, retrying with exponential backoff.
///
/// Exhausting the attempts is a startup failure, not a hang.
pub async fn bind_with_backoff(config: &ServerConfig) -> Result<TcpListener, NetworkError> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.http_port)
        .parse()
        .map_err(|_| {
            NetworkError::InvalidAddress(format!("{}:{}", config.bind_address, config.http_port))
        })?;

    let mut backoff = config.bind_backoff();
    let mut last_error = String::new();

    for attempt in 1..=config.bind_attempts {
        match try_bind(addr) {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                last_error = e.to_string();
                tracing::warn!(
                    attempt,
                    max_attempts = config.bind_attempts,
                    error = %last_error,
                    "listener bind failed"
                );
                if attempt < config.bind_attempts {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    Err(NetworkError::BindFailed {
        attempts: config.bind_attempts,
        reason: last_error,
    })
}

fn try_bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}

/// HTTP/WebSocket server front
pub struct WebServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Bind and serve until the process ends
    pub async fn serve(self) -> crate::Result<()> {
        let listener = bind_with_backoff(&self.config).await?;
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "web server listening");

        let app = router(self.state, &self.config);
        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Serve on a background task
    pub fn start_background(self) -> tokio::task::JoinHandle<crate::Result<()>> {
        tokio::spawn(self.serve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::{create_shared_queue, OverflowPolicy};

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            broadcaster: Arc::new(WsBroadcaster::new()),
            queue: create_shared_queue(4096, OverflowPolicy::DropOldest),
            stream_stats: Arc::new(Mutex::new(StreamStats::default())),
            sample_rate: 16_000,
            chunk_samples: 1536,
            started_at: Utc::now(),
        })
    }

    #[test]
    fn api_response_skips_empty_fields() {
        let ok = serde_json::to_string(&ApiResponse::ok(42)).unwrap();
        assert_eq!(ok, r#"{"success":true,"data":42}"#);

        let err = serde_json::to_string(&ApiResponse::<u32>::error("nope")).unwrap();
        assert_eq!(err, r#"{"success":false,"error":"nope"}"#);
    }

    #[tokio::test]
    async fn status_reflects_queue_state() {
        let state = test_state();
        for i in 0..100 {
            state.queue.push(i);
        }
        state.stream_stats.lock().chunks_sent = 7;

        let Json(response) = get_status(State(state)).await;
        let status = response.data.unwrap();
        assert_eq!(status.queued_samples, 100);
        assert_eq!(status.queue_capacity, 4096);
        assert_eq!(status.chunks_sent, 7);
        assert_eq!(status.clients, 0);
    }

    #[tokio::test]
    async fn bind_succeeds_on_free_port() {
        let config = ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            http_port: 0,
            ..Default::default()
        };
        let listener = bind_with_backoff(&config).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn bind_gives_up_after_bounded_attempts() {
        // Occupy a port, then ask for it with a tight retry budget
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let config = ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            http_port: port,
            bind_attempts: 2,
            bind_backoff_ms: 1,
            ..Default::default()
        };

        match bind_with_backoff(&config).await {
            Err(NetworkError::BindFailed { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected BindFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn rejects_garbage_address() {
        let config = ServerConfig {
            bind_address: "not-an-address".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            bind_with_backoff(&config).await,
            Err(NetworkError::InvalidAddress(_))
        ));
    }
}
