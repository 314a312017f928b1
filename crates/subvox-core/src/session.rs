//! Session state and the process-wide registry.
//!
//! One `Session` per in-flight (or completed) pipeline run. The pipeline
//! worker is the sole writer of `subtitles`, the queue, and the lifecycle
//! flags; delivery and status queries only read (and drain the queue).
//! The queue carries finished records plus a single completion sentinel,
//! so a consumer never has to poll the subtitle list for liveness.

use crate::error::{PipelineError, PipelineResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Opaque session identifier, serialized as the uuid string.
pub type SessionId = Uuid;

/// One delivered subtitle unit: translated text, source timing, and a
/// reference to its synthesized audio. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleRecord {
    /// 1-based, strictly increasing, gapless per session.
    pub index: u64,
    pub start: f64,
    pub end: f64,
    /// Translated text; the failure marker when `translated` is false.
    pub text: String,
    /// False when translation fell back to the failure marker.
    pub translated: bool,
    /// Opaque handle to the synthesized audio (a URL path under the media dir).
    pub audio_ref: String,
}

/// What travels through a session queue.
#[derive(Debug, Clone)]
pub enum QueueItem {
    Subtitle(SubtitleRecord),
    /// Enqueued exactly once, after the last record.
    Complete,
}

/// State of one pipeline run. Created by the registry, mutated only by the
/// owning worker.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    active: AtomicBool,
    processing_complete: AtomicBool,
    subtitles: RwLock<Vec<SubtitleRecord>>,
    queue_tx: mpsc::UnboundedSender<QueueItem>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<QueueItem>>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            id,
            created_at: Utc::now(),
            active: AtomicBool::new(true),
            processing_complete: AtomicBool::new(false),
            subtitles: RwLock::new(Vec::new()),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
        }
    }

    /// Worker still allowed to process input.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Ask the worker to stop at its next loop iteration. It will still
    /// drain and flush before completing.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// True once the completion sentinel has been enqueued.
    pub fn is_complete(&self) -> bool {
        self.processing_complete.load(Ordering::Acquire)
    }

    /// Append a finished record and hand it to the live queue. Worker only.
    pub async fn publish(&self, record: SubtitleRecord) -> PipelineResult<()> {
        self.subtitles.write().await.push(record.clone());
        self.queue_tx
            .send(QueueItem::Subtitle(record))
            .map_err(|e| PipelineError::Channel(e.to_string()))
    }

    /// Terminate the stream: sentinel first, then the completion flag, so a
    /// consumer that sees the flag can rely on the sentinel being queued.
    pub fn finish(&self) {
        let _ = self.queue_tx.send(QueueItem::Complete);
        self.active.store(false, Ordering::Release);
        self.processing_complete.store(true, Ordering::Release);
        debug!("Session {} complete", self.id);
    }

    /// Bounded wait for the next queue item. `None` on timeout.
    /// One consumer at a time; concurrent delivery calls serialize here.
    pub async fn recv_timeout(&self, wait: Duration) -> Option<QueueItem> {
        let mut rx = self.queue_rx.lock().await;
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(Some(item)) => Some(item),
            // Sender closed: only happens when the session is being torn
            // down, treat like completion.
            Ok(None) => Some(QueueItem::Complete),
            Err(_) => None,
        }
    }

    /// Point-in-time view for the status query: records so far + completion.
    pub async fn snapshot(&self) -> (Vec<SubtitleRecord>, bool) {
        let subtitles = self.subtitles.read().await.clone();
        (subtitles, self.is_complete())
    }
}

/// Process-wide table of sessions, keyed by opaque id. Entries are added on
/// stream start and, by default, never removed; `evict_completed` is the
/// opt-in expiry hook.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh session and return it.
    pub fn create(&self) -> Arc<Session> {
        let id = Uuid::new_v4();
        let session = Arc::new(Session::new(id));
        self.sessions.insert(id, Arc::clone(&session));
        info!("Session {} created", id);
        session
    }

    /// Look up a session. Unknown ids are a structured error, never a panic.
    pub fn get(&self, id: &SessionId) -> PipelineResult<Arc<Session>> {
        self.sessions
            .get(id)
            .map(|s| Arc::clone(&s))
            .ok_or_else(|| PipelineError::SessionNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop completed sessions older than `ttl`. Returns the evicted count.
    /// Active sessions are never touched.
    pub fn evict_completed(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| !(s.is_complete() && s.created_at < cutoff));
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!("Evicted {} completed session(s)", evicted);
        }
        evicted
    }
}
