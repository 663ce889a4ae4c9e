//! The bridge session: one task that owns all mutable state.
//!
//! Everything that changes the queue, the settings or the dispatcher goes
//! through [`Event`]s consumed one at a time by [`Session::run`], so no
//! locks guard the queue or the configuration. Uploads run in spawned tasks
//! and report back with [`Event::UploadCompleted`].
//!
//! After every append, delivery and flush the session tries to start an
//! upload. Starting is a no-op while an attempt is in flight, so a failed
//! record is retried on the next trigger without a dedicated retry timer.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use lifelog_store::{PersistentQueue, Store};
use lifelog_types::{DeviceMessage, QueueRecord};

use crate::bridge;
use crate::dispatcher::{Completion, DispatchError, UploadDispatcher};
use crate::settings::{ConfigStore, ConfigUpdate, SettingsError};
use crate::transport::{Transport, TransportError, UploadRequest};

/// Inputs to the session.
#[derive(Debug)]
pub enum Event {
    /// A message received from the device.
    DeviceMessage(DeviceMessage),
    /// The configuration UI was closed with a result.
    ConfigSubmitted {
        response: String,
        reply: Option<oneshot::Sender<Result<ConfigUpdate, SettingsError>>>,
    },
    /// An upload task finished.
    UploadCompleted {
        seq: u64,
        outcome: Result<(), TransportError>,
    },
    /// Manual upload trigger.
    Flush,
    Status(oneshot::Sender<SessionStatus>),
    ConfigUrl(oneshot::Sender<String>),
    Pending(oneshot::Sender<Vec<QueueRecord>>),
}

/// Upload counters for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadStats {
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_failure_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
}

/// Snapshot of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Number of records waiting for upload.
    pub pending: usize,
    /// Key of the queue head.
    pub head_key: Option<String>,
    /// Key of the last record confirmed by the endpoint.
    pub last_sent_key: Option<String>,
    /// When that confirmation was persisted.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sent_at: Option<OffsetDateTime>,
    /// Whether both the endpoint and the data field are set.
    pub configured: bool,
    /// Whether uploads are signed.
    pub signing: bool,
    /// Whether an upload is in flight.
    pub sending: bool,
    pub uploads: UploadStats,
}

/// The session is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Bridge session has stopped")]
pub struct SessionClosed;

/// Errors returned through a [`SessionHandle`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Closed(#[from] SessionClosed),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Owns the store, queue, settings and dispatcher.
pub struct Session {
    store: Store,
    queue: PersistentQueue,
    settings: ConfigStore,
    dispatcher: UploadDispatcher,
    transport: Arc<dyn Transport>,
    config_ui_base: String,
    stats: UploadStats,
    events_tx: Option<mpsc::UnboundedSender<Event>>,
    events_weak: mpsc::WeakUnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    device_tx: broadcast::Sender<DeviceMessage>,
}

impl Session {
    /// Restore the queue and settings from `store`.
    ///
    /// Outbound device messages are published on `device_tx`.
    pub fn load(
        store: Store,
        transport: Arc<dyn Transport>,
        device_tx: broadcast::Sender<DeviceMessage>,
        config_ui_base: impl Into<String>,
    ) -> lifelog_store::Result<Self> {
        let queue = PersistentQueue::load(&store)?;
        let settings = ConfigStore::load(&store)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        info!(
            "Session restored with {} pending record(s), configured: {}",
            queue.len(),
            settings.configuration().is_configured()
        );

        Ok(Self {
            store,
            queue,
            settings,
            dispatcher: UploadDispatcher::new(),
            transport,
            config_ui_base: config_ui_base.into(),
            stats: UploadStats::default(),
            events_weak: events_tx.downgrade(),
            events_tx: Some(events_tx),
            events_rx,
            device_tx,
        })
    }

    /// A handle for submitting events.
    pub fn handle(&self) -> SessionHandle {
        // Only `run` clears the sender, and it consumes the session
        let tx = match &self.events_tx {
            Some(tx) => tx.clone(),
            None => mpsc::unbounded_channel().0,
        };
        SessionHandle { tx }
    }

    /// Process events until every [`SessionHandle`] is dropped and no
    /// upload is in flight.
    ///
    /// Pending records are offered to the dispatcher once on startup.
    pub async fn run(mut self) {
        self.kick();
        self.events_tx = None;
        while let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
        }
        debug!("Session event loop finished");
    }

    /// Wait for the next queued event without handling it.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events_rx.recv().await
    }

    /// Handle a single event.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::DeviceMessage(msg) => self.on_device_message(&msg),
            Event::ConfigSubmitted { response, reply } => {
                let result = self.on_config_submitted(&response);
                if let Err(e) = &result {
                    warn!("Rejected configuration update: {}", e);
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Event::UploadCompleted { seq, outcome } => self.on_upload_completed(seq, outcome),
            Event::Flush => {
                debug!("Manual flush requested");
                self.kick();
            }
            Event::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Event::ConfigUrl(reply) => {
                let _ = reply.send(self.settings.configuration_url(&self.config_ui_base));
            }
            Event::Pending(reply) => {
                let _ = reply.send(self.queue.iter().cloned().collect());
            }
        }
    }

    /// Current state snapshot.
    pub fn status(&self) -> SessionStatus {
        let last_sent_key = PersistentQueue::last_sent_key(&self.store).unwrap_or_else(|e| {
            warn!("Failed to read last sent key: {}", e);
            None
        });
        let last_sent_at = PersistentQueue::last_sent_at(&self.store).unwrap_or_else(|e| {
            warn!("Failed to read last sent time: {}", e);
            None
        });
        let configuration = self.settings.configuration();

        SessionStatus {
            pending: self.queue.len(),
            head_key: self.queue.peek_head().map(|r| r.key.clone()),
            last_sent_key,
            last_sent_at,
            configured: configuration.is_configured(),
            signing: configuration.signing.is_some(),
            sending: self.dispatcher.is_sending(),
            uploads: self.stats.clone(),
        }
    }

    pub fn queue(&self) -> &PersistentQueue {
        &self.queue
    }

    pub fn dispatcher(&self) -> &UploadDispatcher {
        &self.dispatcher
    }

    fn on_device_message(&mut self, msg: &DeviceMessage) {
        let record = match bridge::parse_inbound(msg) {
            Ok(record) => record,
            Err(e) => {
                warn!("Dropping malformed device message: {}", e);
                return;
            }
        };

        let key = record.key.clone();
        match self.queue.append(&self.store, record) {
            Ok(_) => {
                info!("Queued record {}, {} pending", key, self.queue.len());
                self.kick();
            }
            Err(e) => error!("Failed to persist record {}: {}", key, e),
        }
    }

    fn on_config_submitted(&mut self, response: &str) -> Result<ConfigUpdate, SettingsError> {
        let update = self.settings.apply_update(&self.store, response)?;

        if update.event_list_touched {
            let msg = bridge::settings_message(&self.settings.event_list_settings());
            match self.device_tx.send(msg) {
                Ok(receivers) => debug!("Sent settings to {} device link(s)", receivers),
                Err(_) => debug!("No device link connected, settings not sent"),
            }
        }

        Ok(update)
    }

    fn on_upload_completed(&mut self, seq: u64, outcome: Result<(), TransportError>) {
        match self
            .dispatcher
            .complete(seq, outcome, &mut self.queue, &self.store)
        {
            Ok(Completion::Delivered(_)) => {
                self.stats.success_count += 1;
                self.stats.last_success_at = Some(OffsetDateTime::now_utc());
                self.kick();
            }
            Ok(Completion::Failed { error, .. }) => {
                self.stats.failure_count += 1;
                self.stats.last_failure_at = Some(OffsetDateTime::now_utc());
                self.stats.last_error = Some(error.to_string());
            }
            Ok(Completion::Stale { .. }) => {}
            Err(e) => error!("Failed to settle upload {}: {}", seq, e),
        }
    }

    /// Offer the queue head to the dispatcher.
    fn kick(&mut self) {
        let configuration = self.settings.configuration();
        match self.dispatcher.start(&self.queue, &configuration) {
            Ok(Some(request)) => self.submit(request),
            Ok(None) => {}
            Err(DispatchError::NotConfigured) => {
                debug!("Upload not configured, {} record(s) waiting", self.queue.len());
            }
            Err(e) => error!("Failed to start upload: {}", e),
        }
    }

    fn submit(&self, request: UploadRequest) {
        let Some(events_tx) = self.events_weak.upgrade() else {
            warn!("Session is shutting down, not uploading record {}", request.key);
            return;
        };
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let outcome = transport.post(&request).await;
            let _ = events_tx.send(Event::UploadCompleted {
                seq: request.seq,
                outcome,
            });
        });
    }
}

/// Cloneable handle for talking to a running [`Session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl SessionHandle {
    /// Submit a raw event.
    pub fn send(&self, event: Event) -> Result<(), SessionClosed> {
        self.tx.send(event).map_err(|_| SessionClosed)
    }

    pub fn device_message(&self, msg: DeviceMessage) -> Result<(), SessionClosed> {
        self.send(Event::DeviceMessage(msg))
    }

    pub fn flush(&self) -> Result<(), SessionClosed> {
        self.send(Event::Flush)
    }

    /// Apply a configuration UI result and wait for the outcome.
    pub async fn submit_config(&self, response: String) -> Result<ConfigUpdate, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::ConfigSubmitted {
            response,
            reply: Some(reply),
        })?;
        Ok(rx.await.map_err(|_| SessionClosed)??)
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::Status(reply))?;
        rx.await.map_err(|_| SessionClosed)
    }

    pub async fn config_url(&self) -> Result<String, SessionClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::ConfigUrl(reply))?;
        rx.await.map_err(|_| SessionClosed)
    }

    /// Pending records, head first.
    pub async fn pending(&self) -> Result<Vec<QueueRecord>, SessionClosed> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::Pending(reply))?;
        rx.await.map_err(|_| SessionClosed)
    }
}
