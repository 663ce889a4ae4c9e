//! Application state shared across handlers.
//!
//! Handlers never touch the queue or the settings directly; they talk to the
//! session task through its [`SessionHandle`].
//!
//! # Device channel
//!
//! Outbound device messages are published on a broadcast channel with a
//! capacity of `server.broadcast_buffer`. A device link that falls behind
//! loses the oldest messages; only the latest settings message matters to
//! the device, so this is harmless.

use std::sync::Arc;

use lifelog_types::DeviceMessage;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::config::{Config, SecurityConfig};
use crate::session::SessionHandle;

/// Shared application state.
pub struct AppState {
    /// Handle to the session task.
    pub session: SessionHandle,
    /// Outbound device messages.
    pub device_tx: broadcast::Sender<DeviceMessage>,
    /// Access control settings.
    pub security: Arc<SecurityConfig>,
    /// When the service started.
    pub started_at: OffsetDateTime,
}

impl AppState {
    pub fn new(
        session: SessionHandle,
        device_tx: broadcast::Sender<DeviceMessage>,
        config: &Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            device_tx,
            security: Arc::new(config.security.clone()),
            started_at: OffsetDateTime::now_utc(),
        })
    }
}

/// Create the outbound device channel sized from the config.
pub fn device_channel(config: &Config) -> broadcast::Sender<DeviceMessage> {
    let (device_tx, _) = broadcast::channel(config.server.broadcast_buffer.max(1));
    device_tx
}
