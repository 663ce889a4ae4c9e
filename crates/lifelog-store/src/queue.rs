//! Durable FIFO of records pending upload.
//!
//! The whole queue is persisted as one JSON blob under
//! [`setting_keys::QUEUE`](crate::setting_keys::QUEUE) after every mutation.
//! JSON escaping keeps keys and lines free to contain any character,
//! including the `;` and `|` separators of older blob formats.
//!
//! The in-memory copy is authoritative only for reads; every mutation is
//! written through to the [`Store`] before it returns, so a restart resumes
//! with exactly the sequence that was last acknowledged.

use std::collections::VecDeque;

use lifelog_types::QueueRecord;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::setting_keys;
use crate::store::Store;

/// Ordered list of records waiting to be uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistentQueue {
    records: VecDeque<QueueRecord>,
}

impl PersistentQueue {
    /// Load the queue from the store. A missing blob is an empty queue.
    pub fn load(store: &Store) -> Result<Self> {
        let queue = match store.get_setting(setting_keys::QUEUE)? {
            Some(blob) => Self::decode(&blob)?,
            None => Self::default(),
        };
        debug!("Loaded queue with {} pending record(s)", queue.len());
        Ok(queue)
    }

    /// Decode a persisted blob.
    pub fn decode(blob: &str) -> Result<Self> {
        if blob.is_empty() {
            return Ok(Self::default());
        }
        let records: VecDeque<QueueRecord> =
            serde_json::from_str(blob).map_err(Error::CorruptQueue)?;
        Ok(Self { records })
    }

    /// Encode the queue into its persisted blob form.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.records)?)
    }

    /// Append a record at the tail and persist the queue.
    ///
    /// Returns `true` when the queue was empty before the append.
    pub fn append(&mut self, store: &Store, record: QueueRecord) -> Result<bool> {
        let was_empty = self.records.is_empty();
        self.records.push_back(record);

        if let Err(e) = self.persist(store) {
            // Keep memory consistent with what is on disk
            self.records.pop_back();
            return Err(e);
        }

        debug!(
            "Queued record, {} pending (was empty: {})",
            self.records.len(),
            was_empty
        );
        Ok(was_empty)
    }

    /// The record currently at the head, if any.
    pub fn peek_head(&self) -> Option<&QueueRecord> {
        self.records.front()
    }

    /// Remove the head, persisting the new queue and the popped key as the
    /// last successfully sent record in one transaction.
    ///
    /// Calling this on an empty queue is a caller bug; it is logged and
    /// treated as a no-op.
    pub fn pop_head(&mut self, store: &Store) -> Result<Option<QueueRecord>> {
        let Some(head) = self.records.pop_front() else {
            warn!("pop_head called on an empty queue");
            return Ok(None);
        };

        let blob = match self.encode() {
            Ok(blob) => blob,
            Err(e) => {
                self.records.push_front(head);
                return Err(e);
            }
        };

        if let Err(e) = store.set_settings(&[
            (setting_keys::QUEUE, blob.as_str()),
            (setting_keys::LAST_SENT_KEY, head.key.as_str()),
        ]) {
            self.records.push_front(head);
            return Err(e);
        }

        debug!("Popped record {}, {} pending", head.key, self.records.len());
        Ok(Some(head))
    }

    /// Key of the last record confirmed by the endpoint.
    pub fn last_sent_key(store: &Store) -> Result<Option<String>> {
        store.get_setting(setting_keys::LAST_SENT_KEY)
    }

    /// When the endpoint last confirmed a record.
    pub fn last_sent_at(store: &Store) -> Result<Option<OffsetDateTime>> {
        store.setting_updated_at(setting_keys::LAST_SENT_KEY)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over pending records, head first.
    pub fn iter(&self) -> impl Iterator<Item = &QueueRecord> {
        self.records.iter()
    }

    fn persist(&self, store: &Store) -> Result<()> {
        store.set_setting(setting_keys::QUEUE, &self.encode()?)
    }
}
