//! Companion bridge for the Life-Log wearable.
//!
//! The device logs events and sends each one to the companion as a record.
//! This crate keeps those records in a durable FIFO queue and uploads them,
//! one at a time and in order, to a user-configured HTTP endpoint:
//! - Records survive restarts until the endpoint acknowledges them
//! - Only the queue head is ever in flight
//! - Uploads can be signed with an HMAC over the record line
//! - Event list settings are pushed back to the device when changed
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check (no auth required)
//! - `GET /api/status` - Queue, configuration and upload statistics
//! - `GET /api/queue` - Pending records, head first
//! - `POST /api/flush` - Try to upload the queue head now
//! - `POST /api/device/message` - Inbound device message (JSON)
//! - `POST /api/config` - Configuration UI result
//! - `GET /api/config/url` - Configuration UI URL with current values
//! - `WS /api/device/ws` - Device link
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/lifelog/bridge.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8484"
//!
//! [storage]
//! path = "~/.local/share/lifelog/bridge.db"
//!
//! [upload]
//! timeout_secs = 30
//!
//! [security]
//! api_key_enabled = true
//! api_key = "your-secure-random-key-at-least-16-chars"
//! ```
//!
//! Upload settings (endpoint, data field, extra fields, signing) are not
//! part of this file; they are stored in the database and edited through
//! the configuration UI.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod encoding;
pub mod middleware;
pub mod mock;
pub mod session;
pub mod settings;
pub mod signer;
pub mod state;
pub mod transport;
pub mod ws;

pub use config::{
    Config, ConfigError, ConfigUiConfig, LoggingConfig, SecurityConfig, ServerConfig,
    StorageConfig, UploadConfig,
};
pub use dispatcher::{Completion, DispatchError, UploadDispatcher};
pub use session::{Event, Session, SessionHandle, SessionStatus};
pub use settings::{ConfigStore, ConfigUpdate, Setting, SettingsError};
pub use state::AppState;
pub use transport::{HttpTransport, Transport, TransportError, UploadRequest};

/// Build the full HTTP application: API, device link, authentication,
/// request tracing and CORS.
pub fn app(state: Arc<AppState>) -> Router {
    let security = Arc::clone(&state.security);
    Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(axum::middleware::from_fn_with_state(
            security,
            middleware::api_key_auth,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
