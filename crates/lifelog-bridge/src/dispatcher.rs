//! Single-flight upload state machine.
//!
//! At most one record is in flight at any time, and it is always the queue
//! head. The head leaves the queue only after the endpoint confirms it, so
//! records are delivered at least once and in order.
//!
//! ```text
//!            start() with a configured endpoint and a non-empty queue
//!   Idle ───────────────────────────────────────────────────────▶ Sending{seq}
//!    ▲                                                                 │
//!    └──────────── complete(seq) with the matching seq ────────────────┘
//! ```
//!
//! Every attempt gets a fresh sequence number. A completion carrying any
//! other number belongs to an attempt that was already settled and is
//! reported as [`Completion::Stale`] without touching the queue.

use lifelog_store::{PersistentQueue, Store};
use lifelog_types::{Configuration, QueueRecord};
use tracing::{debug, info, warn};

use crate::signer::{self, SignError};
use crate::transport::{TransportError, UploadRequest};

/// Errors that keep an upload from starting or settling.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Upload endpoint or data field is not configured")]
    NotConfigured,
    #[error("Failed to sign record {key}: {source}")]
    Signing {
        key: String,
        #[source]
        source: SignError,
    },
    #[error("Failed to update queue: {0}")]
    Store(#[from] lifelog_store::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DispatchState {
    Idle,
    Sending { seq: u64, key: String },
}

/// Result of settling an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The head was confirmed and removed from the queue.
    Delivered(QueueRecord),
    /// The attempt failed; the head stays queued for a later attempt.
    Failed { key: String, error: TransportError },
    /// The completion does not match the attempt in flight.
    Stale { seq: u64 },
}

/// Drives uploads of the queue head.
#[derive(Debug)]
pub struct UploadDispatcher {
    state: DispatchState,
    next_seq: u64,
}

impl Default for UploadDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadDispatcher {
    pub fn new() -> Self {
        Self {
            state: DispatchState::Idle,
            next_seq: 1,
        }
    }

    pub fn is_sending(&self) -> bool {
        matches!(self.state, DispatchState::Sending { .. })
    }

    /// Sequence number of the attempt in flight.
    pub fn in_flight_seq(&self) -> Option<u64> {
        match self.state {
            DispatchState::Sending { seq, .. } => Some(seq),
            DispatchState::Idle => None,
        }
    }

    /// Try to start uploading the queue head.
    ///
    /// Returns the request to hand to the transport, or `None` when an
    /// attempt is already in flight or the queue is empty. On error the
    /// dispatcher stays idle and the queue is untouched.
    pub fn start(
        &mut self,
        queue: &PersistentQueue,
        config: &Configuration,
    ) -> Result<Option<UploadRequest>, DispatchError> {
        if self.is_sending() {
            debug!("Upload already in flight, not starting another");
            return Ok(None);
        }

        let Some(head) = queue.peek_head() else {
            return Ok(None);
        };

        let (Some(url), Some(_)) = (config.endpoint.as_deref(), config.data_field.as_deref())
        else {
            return Err(DispatchError::NotConfigured);
        };

        let fields = build_fields(head, config).map_err(|source| DispatchError::Signing {
            key: head.key.clone(),
            source,
        })?;

        let seq = self.next_seq;
        self.next_seq += 1;
        self.state = DispatchState::Sending {
            seq,
            key: head.key.clone(),
        };

        debug!("Starting upload {} of record {}", seq, head.key);
        Ok(Some(UploadRequest {
            seq,
            key: head.key.clone(),
            url: url.to_string(),
            fields,
        }))
    }

    /// Settle the attempt identified by `seq`.
    ///
    /// On success the head is popped and the last-sent key persisted before
    /// returning. If persisting fails the head stays queued, the dispatcher
    /// goes idle, and the record will be sent again.
    pub fn complete(
        &mut self,
        seq: u64,
        outcome: Result<(), TransportError>,
        queue: &mut PersistentQueue,
        store: &Store,
    ) -> Result<Completion, DispatchError> {
        let key = match &self.state {
            DispatchState::Sending {
                seq: in_flight,
                key,
            } if *in_flight == seq => key.clone(),
            _ => {
                debug!("Ignoring stale completion {}", seq);
                return Ok(Completion::Stale { seq });
            }
        };

        self.state = DispatchState::Idle;

        match outcome {
            Ok(()) => {
                match queue.peek_head() {
                    Some(head) if head.key == key => {}
                    other => warn!(
                        "Queue head changed during upload of {} (now {:?})",
                        key,
                        other.map(|r| &r.key)
                    ),
                }
                match queue.pop_head(store)? {
                    Some(record) => {
                        info!("Delivered record {}, {} pending", record.key, queue.len());
                        Ok(Completion::Delivered(record))
                    }
                    None => Ok(Completion::Stale { seq }),
                }
            }
            Err(error) => {
                warn!("Upload of record {} failed: {}", key, error);
                Ok(Completion::Failed { key, error })
            }
        }
    }
}

/// Multipart fields for `record`: the data field, then the signature when
/// signing is configured, then the extra fields in order.
pub fn build_fields(
    record: &QueueRecord,
    config: &Configuration,
) -> Result<Vec<(String, String)>, SignError> {
    let mut fields = Vec::with_capacity(2 + config.extra_fields.len());

    if let Some(data_field) = &config.data_field {
        fields.push((data_field.clone(), record.line.clone()));
    }

    if let Some(signing) = &config.signing {
        let signature = signer::sign(signing, &record.line)?;
        fields.push((signing.field_name.clone(), signature));
    }

    fields.extend(
        config
            .extra_fields
            .iter()
            .map(|f| (f.name.clone(), f.value.clone())),
    );

    Ok(fields)
}
