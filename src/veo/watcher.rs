//! PollWatcher - re-polls an operation until it settles.
//!
//! Polls on a fixed interval and stops on the first terminal status. Unlike a
//! bare timer loop it is bounded by attempt count and/or elapsed time, which
//! surface as `TaskStatus::Timeout`, and it can be cancelled at any point.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::client::VeoClient;
use super::status::{PollReport, TaskStatus};
use super::store::TaskStore;

/// Default polling interval for status checks (3 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default ceiling on how long to wait for a video (10 minutes).
pub const DEFAULT_MAX_ELAPSED: Duration = Duration::from_secs(600);

/// Anything that can report the status of an operation.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn poll(&self, handle: &str) -> PollReport;
}

#[async_trait]
impl StatusSource for VeoClient {
    async fn poll(&self, handle: &str) -> PollReport {
        VeoClient::poll(self, handle).await
    }
}

/// Bounds and cadence of a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub max_elapsed: Option<Duration>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            max_elapsed: Some(DEFAULT_MAX_ELAPSED),
        }
    }
}

/// How a watch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    /// A terminal status was reached (completed, error or timeout).
    Finished(TaskStatus),
    /// The cancellation token fired; carries the last status seen.
    Cancelled(TaskStatus),
}

impl WatchOutcome {
    pub fn status(&self) -> &TaskStatus {
        match self {
            WatchOutcome::Finished(status) | WatchOutcome::Cancelled(status) => status,
        }
    }

    pub fn into_status(self) -> TaskStatus {
        match self {
            WatchOutcome::Finished(status) | WatchOutcome::Cancelled(status) => status,
        }
    }
}

pub struct PollWatcher<'a> {
    source: &'a dyn StatusSource,
    options: WatchOptions,
    store: Option<&'a dyn TaskStore>,
    cancel: CancellationToken,
}

impl<'a> PollWatcher<'a> {
    pub fn new(source: &'a dyn StatusSource, options: WatchOptions) -> Self {
        Self {
            source,
            options,
            store: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Record every observed status in `store`.
    pub fn with_store(mut self, store: &'a dyn TaskStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// Poll `handle` until it reaches a terminal status, a bound is hit, or
    /// the watch is cancelled. `on_update` sees every polled status.
    pub async fn watch<F>(&self, handle: &str, mut on_update: F) -> WatchOutcome
    where
        F: FnMut(&TaskStatus),
    {
        let start = Instant::now();
        let mut attempts: u32 = 0;
        let mut last = TaskStatus::Pending;

        loop {
            if let Some(max_elapsed) = self.options.max_elapsed {
                if start.elapsed() >= max_elapsed {
                    return self.timed_out(handle, attempts, start, &mut on_update);
                }
            }

            let report = tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::info!("Stopped watching {} after {} polls", handle, attempts);
                    return WatchOutcome::Cancelled(last);
                }
                report = self.source.poll(handle) => report,
            };

            attempts += 1;
            last = report.status;
            self.record(handle, &last);
            on_update(&last);

            if last.is_terminal() {
                return WatchOutcome::Finished(last);
            }

            if let Some(max_attempts) = self.options.max_attempts {
                if attempts >= max_attempts {
                    return self.timed_out(handle, attempts, start, &mut on_update);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::info!("Stopped watching {} after {} polls", handle, attempts);
                    return WatchOutcome::Cancelled(last);
                }
                _ = tokio::time::sleep(self.options.interval) => {}
            }
        }
    }

    fn timed_out<F>(
        &self,
        handle: &str,
        attempts: u32,
        start: Instant,
        on_update: &mut F,
    ) -> WatchOutcome
    where
        F: FnMut(&TaskStatus),
    {
        let elapsed_secs = start.elapsed().as_secs();
        log::warn!(
            "Gave up on {} after {} polls ({}s)",
            handle,
            attempts,
            elapsed_secs
        );
        let status = TaskStatus::Timeout {
            error: format!(
                "operation did not finish after {} polls ({}s)",
                attempts, elapsed_secs
            ),
            attempts,
            elapsed_secs,
        };
        self.record(handle, &status);
        on_update(&status);
        WatchOutcome::Finished(status)
    }

    fn record(&self, handle: &str, status: &TaskStatus) {
        if let Some(store) = self.store {
            if let Err(e) = store.update_status(handle, status) {
                log::warn!("Failed to record status for {}: {}", handle, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::veo::status::{MediaSource, COMPLETED_PROGRESS};
    use crate::veo::store::MemoryTaskStore;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a fixed sequence of reports, repeating the last one.
    struct Scripted {
        reports: Mutex<VecDeque<PollReport>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(statuses: Vec<TaskStatus>) -> Self {
            Self {
                reports: Mutex::new(statuses.into_iter().map(PollReport::ok).collect()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for Scripted {
        async fn poll(&self, _handle: &str) -> PollReport {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut reports = self.reports.lock().unwrap();
            if reports.len() > 1 {
                reports.pop_front().unwrap()
            } else {
                reports.front().cloned().unwrap()
            }
        }
    }

    fn fast(max_attempts: Option<u32>) -> WatchOptions {
        WatchOptions {
            interval: Duration::from_millis(1),
            max_attempts,
            max_elapsed: None,
        }
    }

    fn completed() -> TaskStatus {
        TaskStatus::Completed {
            progress: COMPLETED_PROGRESS,
            video_url: "https://storage.googleapis.com/b/v.mp4".to_string(),
            raw_reference: Some("gs://b/v.mp4".to_string()),
            source: MediaSource::Gcs,
        }
    }

    #[tokio::test]
    async fn test_watch_stops_on_completed() {
        let source = Scripted::new(vec![
            TaskStatus::processing(),
            TaskStatus::processing(),
            completed(),
        ]);
        let watcher = PollWatcher::new(&source, fast(None));

        let mut seen = Vec::new();
        let outcome = watcher.watch("op/1", |s| seen.push(s.label())).await;

        assert_eq!(outcome, WatchOutcome::Finished(completed()));
        assert_eq!(seen, vec!["processing", "processing", "completed"]);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_watch_stops_on_error() {
        let source = Scripted::new(vec![TaskStatus::processing(), TaskStatus::error("quota")]);
        let watcher = PollWatcher::new(&source, fast(None));

        let outcome = watcher.watch("op/1", |_| {}).await;
        assert_eq!(outcome.status(), &TaskStatus::error("quota"));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_watch_times_out_after_max_attempts() {
        let source = Scripted::new(vec![TaskStatus::processing()]);
        let watcher = PollWatcher::new(&source, fast(Some(4)));

        let outcome = watcher.watch("op/1", |_| {}).await;
        match outcome {
            WatchOutcome::Finished(TaskStatus::Timeout { attempts, .. }) => {
                assert_eq!(attempts, 4);
            }
            other => panic!("Expected timeout, got {:?}", other),
        }
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_watch_times_out_after_max_elapsed() {
        let source = Scripted::new(vec![TaskStatus::processing()]);
        let options = WatchOptions {
            interval: Duration::from_millis(5),
            max_attempts: None,
            max_elapsed: Some(Duration::from_millis(30)),
        };
        let watcher = PollWatcher::new(&source, options);

        let outcome = watcher.watch("op/1", |_| {}).await;
        assert!(matches!(
            outcome,
            WatchOutcome::Finished(TaskStatus::Timeout { .. })
        ));
        assert!(source.calls() >= 1);
    }

    #[tokio::test]
    async fn test_cancelled_watch_returns_last_status() {
        let source = Scripted::new(vec![TaskStatus::processing()]);
        let options = WatchOptions {
            interval: Duration::from_secs(60),
            max_attempts: None,
            max_elapsed: None,
        };
        let watcher = PollWatcher::new(&source, options);
        let token = watcher.cancellation_token();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let outcome = watcher.watch("op/1", |_| {}).await;
        handle.await.unwrap();

        assert_eq!(outcome, WatchOutcome::Cancelled(TaskStatus::processing()));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_pre_cancelled_watch_never_polls() {
        let source = Scripted::new(vec![TaskStatus::processing()]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let watcher = PollWatcher::new(&source, fast(None)).with_cancellation(cancel);

        let outcome = watcher.watch("op/1", |_| {}).await;
        assert_eq!(outcome, WatchOutcome::Cancelled(TaskStatus::Pending));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_watch_records_statuses_in_store() {
        let source = Scripted::new(vec![TaskStatus::processing(), completed()]);
        let store = MemoryTaskStore::new();
        let watcher = PollWatcher::new(&source, fast(None)).with_store(&store);

        watcher.watch("op/1", |_| {}).await;

        let record = store.get("op/1").unwrap().unwrap();
        assert_eq!(record.status, completed());
    }

    #[test]
    fn test_default_options() {
        let options = WatchOptions::default();
        assert_eq!(options.interval, Duration::from_secs(3));
        assert_eq!(options.max_attempts, None);
        assert_eq!(options.max_elapsed, Some(Duration::from_secs(600)));
    }
}
