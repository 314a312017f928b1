//! Live delivery of a session's subtitle queue.
//!
//! Two phases: a short warm-up that buffers a few records before the client
//! starts rendering, then a live drain with bounded per-item waits. The
//! warm-up absorbs jitter from slow synthesis calls so the client does not
//! receive one record and then stall. Whatever happens, the stream ends with
//! exactly one terminal event.

use crate::config::PipelineConfig;
use crate::session::{QueueItem, Session, SubtitleRecord};
use async_stream::stream;
use futures_util::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Pacing knobs for one delivery invocation.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Records to accumulate before switching to the live phase (default 3).
    pub warmup_count: usize,
    /// Overall wait budget for the warm-up phase (default 10s).
    pub warmup_wait: Duration,
    /// Poll tick inside the warm-up budget (default 200ms).
    pub poll_interval: Duration,
    /// Per-item wait in the live phase (default 1s).
    pub live_wait: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            warmup_count: 3,
            warmup_wait: Duration::from_secs(10),
            poll_interval: Duration::from_millis(200),
            live_wait: Duration::from_secs(1),
        }
    }
}

impl DeliveryConfig {
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            warmup_count: config.warmup_count,
            warmup_wait: config.warmup_wait,
            poll_interval: config.poll_interval,
            live_wait: config.live_wait,
        }
    }
}

/// One event of the delivered sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent {
    Subtitle(SubtitleRecord),
    /// Terminal event; emitted exactly once per invocation.
    Complete,
}

/// Drain `session`'s queue as an ordered, at-most-once event stream.
///
/// Warm-up: up to `warmup_count` records within the `warmup_wait` budget,
/// each emitted as it arrives. Live: bounded waits until the sentinel shows
/// up, or a wait times out after the session is already complete (a late
/// subscriber whose sentinel was consumed by an earlier invocation).
pub fn subtitle_events(
    session: Arc<Session>,
    config: DeliveryConfig,
) -> impl Stream<Item = DeliveryEvent> {
    stream! {
        let deadline = Instant::now() + config.warmup_wait;
        let mut warmed = 0usize;
        while warmed < config.warmup_count && Instant::now() < deadline {
            match session.recv_timeout(config.poll_interval).await {
                Some(QueueItem::Subtitle(record)) => {
                    warmed += 1;
                    yield DeliveryEvent::Subtitle(record);
                }
                Some(QueueItem::Complete) => {
                    debug!("Session {}: completed during warm-up", session.id);
                    yield DeliveryEvent::Complete;
                    return;
                }
                None => continue,
            }
        }

        loop {
            match session.recv_timeout(config.live_wait).await {
                Some(QueueItem::Subtitle(record)) => yield DeliveryEvent::Subtitle(record),
                Some(QueueItem::Complete) => {
                    yield DeliveryEvent::Complete;
                    return;
                }
                None if session.is_complete() => {
                    // Sentinel already drained by a previous subscriber.
                    yield DeliveryEvent::Complete;
                    return;
                }
                None => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionRegistry;
    use futures_util::{pin_mut, StreamExt};

    fn record(index: u64) -> SubtitleRecord {
        SubtitleRecord {
            index,
            start: index as f64,
            end: index as f64 + 1.0,
            text: format!("line {index}"),
            translated: true,
            audio_ref: format!("/media/s/{index}.mp3"),
        }
    }

    fn fast_config() -> DeliveryConfig {
        DeliveryConfig {
            warmup_count: 3,
            warmup_wait: Duration::from_millis(500),
            poll_interval: Duration::from_millis(20),
            live_wait: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_terminates_once() {
        let registry = SessionRegistry::new();
        let session = registry.create();
        for i in 1..=4 {
            session.publish(record(i)).await.unwrap();
        }
        session.finish();

        let events: Vec<_> =
            subtitle_events(Arc::clone(&session), fast_config()).collect().await;
        assert_eq!(events.len(), 5);
        for (i, event) in events.iter().take(4).enumerate() {
            match event {
                DeliveryEvent::Subtitle(r) => assert_eq!(r.index, i as u64 + 1),
                other => panic!("expected subtitle, got {other:?}"),
            }
        }
        assert_eq!(events[4], DeliveryEvent::Complete);
    }

    #[tokio::test]
    async fn empty_session_yields_exactly_one_completion() {
        let registry = SessionRegistry::new();
        let session = registry.create();
        session.finish();

        let events: Vec<_> =
            subtitle_events(Arc::clone(&session), fast_config()).collect().await;
        assert_eq!(events, vec![DeliveryEvent::Complete]);
    }

    #[tokio::test]
    async fn records_arriving_mid_stream_are_delivered_live() {
        let registry = SessionRegistry::new();
        let session = registry.create();
        session.publish(record(1)).await.unwrap();

        let producer = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                session.publish(record(2)).await.unwrap();
                session.finish();
            })
        };

        let events: Vec<_> =
            subtitle_events(Arc::clone(&session), fast_config()).collect().await;
        producer.await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], DeliveryEvent::Complete);
    }

    #[tokio::test]
    async fn late_subscriber_terminates_after_sentinel_was_consumed() {
        let registry = SessionRegistry::new();
        let session = registry.create();
        session.publish(record(1)).await.unwrap();
        session.finish();

        let first: Vec<_> =
            subtitle_events(Arc::clone(&session), fast_config()).collect().await;
        assert_eq!(first.len(), 2);

        // The queue is now empty and the sentinel gone; the completion flag
        // still terminates the second invocation within a bounded wait.
        let second: Vec<_> =
            subtitle_events(Arc::clone(&session), fast_config()).collect().await;
        assert_eq!(second, vec![DeliveryEvent::Complete]);
    }

    #[tokio::test]
    async fn warmup_does_not_wait_out_the_budget_once_count_is_reached() {
        let registry = SessionRegistry::new();
        let session = registry.create();
        for i in 1..=3 {
            session.publish(record(i)).await.unwrap();
        }
        session.finish();

        let config = DeliveryConfig {
            warmup_wait: Duration::from_secs(30),
            ..fast_config()
        };
        let started = std::time::Instant::now();
        let stream = subtitle_events(Arc::clone(&session), config);
        pin_mut!(stream);
        let mut count = 0;
        while let Some(event) = stream.next().await {
            if event == DeliveryEvent::Complete {
                break;
            }
            count += 1;
        }
        assert_eq!(count, 3);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
