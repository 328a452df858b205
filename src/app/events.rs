use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::app::model::{FailedItem, JobResult};

pub const NOT_FOUND_MESSAGE: &str = "Task not found or already finished";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusUpdate {
    pub message: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_urls: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    /// Items reconciled so far in the database phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed: Option<usize>,
}

impl StatusUpdate {
    pub fn new(message: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: status.into(),
            mode: None,
            total_urls: None,
            concurrency: None,
            processed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub json_file: Option<String>,
    pub message: String,
    pub failed_items: Vec<FailedItem>,
}

impl Summary {
    pub fn from_result(result: &JobResult, message: impl Into<String>) -> Self {
        Self {
            total: result.total,
            success: result.success,
            failed: result.failed,
            skipped: result.skipped,
            json_file: result.json_file.clone(),
            message: message.into(),
            failed_items: result.failed_items.clone(),
        }
    }
}

/// Wire form: `{"type": "<name>", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobEvent {
    Connected { message: String },
    Status(StatusUpdate),
    Progress(Progress),
    Final(Summary),
    Complete(Summary),
    Error { message: String },
    Heartbeat {},
}

impl JobEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Status(_) => "status",
            Self::Progress(_) => "progress",
            Self::Final(_) => "final",
            Self::Complete(_) => "complete",
            Self::Error { .. } => "error",
            Self::Heartbeat {} => "heartbeat",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final(_) | Self::Complete(_) | Self::Error { .. })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Bounded, replayable per-job event log.
pub struct EventLog {
    capacity: usize,
    inner: Mutex<LogInner>,
    notify: watch::Sender<u64>,
}

struct LogInner {
    next_seq: u64,
    events: VecDeque<(u64, JobEvent)>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (notify, _) = watch::channel(0);
        Arc::new(Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LogInner {
                next_seq: 0,
                events: VecDeque::new(),
            }),
            notify,
        })
    }

    pub fn push(&self, event: JobEvent) {
        let seq = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let seq = inner.next_seq;
            inner.next_seq += 1;
            if inner.events.len() == self.capacity {
                inner.events.pop_front();
            }
            inner.events.push_back((seq, event));
            seq
        };
        self.notify.send_replace(seq + 1);
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .events
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_from(&self, cursor: u64) -> (Vec<JobEvent>, u64, u64) {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let oldest = inner.events.front().map_or(inner.next_seq, |(seq, _)| *seq);
        let events = inner
            .events
            .iter()
            .filter(|(seq, _)| *seq >= cursor)
            .map(|(_, event)| event.clone())
            .collect();
        (events, oldest, inner.next_seq)
    }

    fn watch(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    pub grace: Duration,
    pub heartbeat: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(2),
            heartbeat: Duration::from_secs(30),
        }
    }
}

/// Follows `log` from its oldest retained event.
pub fn follow<F>(
    log: Arc<EventLog>,
    config: StreamConfig,
    is_finished: F,
) -> impl Stream<Item = JobEvent> + Send + 'static
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    async_stream::stream! {
        yield JobEvent::Connected {
            message: "connected".to_string(),
        };

        let mut changes = log.watch();
        let mut cursor = 0u64;
        let mut closing_at: Option<tokio::time::Instant> = None;

        loop {
            changes.borrow_and_update();
            let (batch, oldest, next) = log.read_from(cursor);
            if oldest > cursor && cursor > 0 {
                tracing::warn!(missed = oldest - cursor, "subscriber lagged; events evicted");
            }
            cursor = next;
            for event in batch {
                if event.is_terminal() && closing_at.is_none() {
                    closing_at = Some(tokio::time::Instant::now() + config.grace);
                }
                yield event;
            }

            match closing_at {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, changes.changed()).await {
                        Ok(Ok(())) => continue,
                        _ => break,
                    }
                }
                None => match tokio::time::timeout(config.heartbeat, changes.changed()).await {
                    Ok(Ok(())) => continue,
                    Ok(Err(_)) => break,
                    Err(_) => {
                        yield JobEvent::Heartbeat {};
                        if is_finished() {
                            break;
                        }
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt as _;

    use super::*;

    fn progress(current: usize) -> JobEvent {
        JobEvent::Progress(Progress {
            current,
            total: 3,
            success: current,
            failed: 0,
            url: None,
            message: format!("crawling {current}/3"),
        })
    }

    fn summary() -> Summary {
        Summary {
            total: 1,
            success: 1,
            failed: 0,
            skipped: 0,
            json_file: None,
            message: "done".to_string(),
            failed_items: Vec::new(),
        }
    }

    fn fast() -> StreamConfig {
        StreamConfig {
            grace: Duration::from_millis(20),
            heartbeat: Duration::from_secs(30),
        }
    }

    #[test]
    fn wire_shape_is_type_and_data() {
        let value = serde_json::to_value(progress(2)).unwrap();
        assert_eq!(value["type"], "progress");
        assert_eq!(value["data"]["current"], 2);
        assert!(value["data"].get("url").is_none());

        let value = serde_json::to_value(JobEvent::Heartbeat {}).unwrap();
        assert_eq!(value, serde_json::json!({"type": "heartbeat", "data": {}}));

        let value = serde_json::to_value(JobEvent::error("boom")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "error", "data": {"message": "boom"}})
        );
    }

    #[test]
    fn full_log_evicts_oldest() {
        let log = EventLog::new(2);
        log.push(progress(1));
        log.push(progress(2));
        log.push(progress(3));
        assert_eq!(log.len(), 2);
        let (events, oldest, next) = log.read_from(0);
        assert_eq!(events, vec![progress(2), progress(3)]);
        assert_eq!((oldest, next), (1, 3));
    }

    #[tokio::test]
    async fn late_subscriber_replays_then_closes_after_terminal() {
        let log = EventLog::new(16);
        log.push(progress(1));
        log.push(JobEvent::Final(summary()));
        log.push(JobEvent::Complete(summary()));

        let events: Vec<_> = follow(Arc::clone(&log), fast(), || true).collect().await;
        let names: Vec<_> = events.iter().map(JobEvent::name).collect();
        assert_eq!(names, vec!["connected", "progress", "final", "complete"]);
    }

    #[tokio::test]
    async fn concurrent_subscribers_each_see_every_event() {
        let log = EventLog::new(16);
        let first = tokio::spawn(follow(Arc::clone(&log), fast(), || false).collect::<Vec<_>>());
        let second = tokio::spawn(follow(Arc::clone(&log), fast(), || false).collect::<Vec<_>>());
        tokio::task::yield_now().await;

        for i in 1..=3 {
            log.push(progress(i));
            tokio::task::yield_now().await;
        }
        log.push(JobEvent::Complete(summary()));

        for handle in [first, second] {
            let events = handle.await.unwrap();
            assert_eq!(events.len(), 5, "{events:?}");
            assert_eq!(events[1..4], [progress(1), progress(2), progress(3)]);
            assert_eq!(events[4].name(), "complete");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_subscriber_gets_heartbeat_and_closes_once_finished() {
        let log = EventLog::new(4);
        let config = StreamConfig {
            grace: Duration::from_secs(2),
            heartbeat: Duration::from_secs(30),
        };
        let mut stream = Box::pin(follow(log, config, || true));
        assert_eq!(stream.next().await.unwrap().name(), "connected");
        assert_eq!(stream.next().await.unwrap(), JobEvent::Heartbeat {});
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn events_during_grace_are_still_delivered() {
        let log = EventLog::new(8);
        let config = StreamConfig {
            grace: Duration::from_secs(2),
            heartbeat: Duration::from_secs(30),
        };
        log.push(JobEvent::Final(summary()));
        let mut stream = Box::pin(follow(Arc::clone(&log), config, || true));
        assert_eq!(stream.next().await.unwrap().name(), "connected");
        assert_eq!(stream.next().await.unwrap().name(), "final");

        let pusher = {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                log.push(JobEvent::Complete(summary()));
            })
        };
        assert_eq!(stream.next().await.unwrap().name(), "complete");
        assert!(stream.next().await.is_none());
        pusher.await.unwrap();
    }
}
