// Bounded loader: runs fetch jobs with a fixed number of concurrency slots and
// hands each fetched body to a completion handler.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::DownloadError;
use crate::config::DEFAULT_MAX_PARALLEL;
use crate::hls::fetcher::Fetcher;
use crate::hls::processor::SegmentHandler;

#[derive(Debug, Clone)]
pub struct FetchJob {
    /// Position of the segment in its playlist.
    pub index: usize,
    pub url: String,
    pub headers: HeaderMap,
    /// Request deadline, zero for none.
    pub timeout: Duration,
}

/// Result of one job's full completion chain.
#[derive(Debug)]
pub struct TaskOutcome<T> {
    pub index: usize,
    pub url: String,
    pub result: Result<T, DownloadError>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoaderStats {
    pub success_count: usize,
    pub failure_count: usize,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl LoaderStats {
    /// Time from the first submission to the last completion.
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    fn record(&mut self, success: bool) {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.finished_at = Some(Instant::now());
    }
}

pub struct BoundedLoader<H: SegmentHandler> {
    fetcher: Arc<dyn Fetcher>,
    handler: Arc<H>,
    slots: Arc<Semaphore>,
    max_parallel: usize,
    stats: Arc<Mutex<LoaderStats>>,
    pending: Arc<AtomicUsize>,
    tasks: JoinSet<TaskOutcome<H::Output>>,
}

impl<H: SegmentHandler> BoundedLoader<H> {
    /// Creates a loader allowing `max_parallel` fetches in flight (0 = default).
    pub fn new(fetcher: Arc<dyn Fetcher>, handler: Arc<H>, max_parallel: usize) -> Self {
        let max_parallel = if max_parallel == 0 {
            DEFAULT_MAX_PARALLEL
        } else {
            max_parallel
        };
        Self {
            fetcher,
            handler,
            slots: Arc::new(Semaphore::new(max_parallel)),
            max_parallel,
            stats: Arc::new(Mutex::new(LoaderStats::default())),
            pending: Arc::new(AtomicUsize::new(0)),
            tasks: JoinSet::new(),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Jobs whose completion chain has not finished yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Queues a job. Waits for a free slot, never for the job itself.
    pub async fn submit(&mut self, job: FetchJob) -> Result<(), DownloadError> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|e| DownloadError::Task(e.to_string()))?;

        self.pending.fetch_add(1, Ordering::AcqRel);
        {
            let mut stats = self.stats.lock();
            stats.started_at.get_or_insert_with(Instant::now);
        }

        let fetcher = Arc::clone(&self.fetcher);
        let handler = Arc::clone(&self.handler);
        let stats = Arc::clone(&self.stats);
        let pending = Arc::clone(&self.pending);

        self.tasks.spawn(async move {
            let chain = fetch_and_handle(fetcher.as_ref(), handler.as_ref(), &job, permit);
            let result = match AssertUnwindSafe(chain).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(&*panic);
                    error!(url = %job.url, index = job.index, panic = %message, "Segment task panicked");
                    Err(DownloadError::Task(message))
                }
            };

            if let Err(e) = &result {
                handler.on_failure(&job, e);
            } else {
                debug!(url = %job.url, index = job.index, "Segment completed");
            }

            stats.lock().record(result.is_ok());
            pending.fetch_sub(1, Ordering::AcqRel);

            TaskOutcome {
                index: job.index,
                url: job.url,
                result,
            }
        });

        Ok(())
    }

    /// Waits for every submitted job and returns their outcomes in completion order.
    pub async fn await_all(&mut self) -> Vec<TaskOutcome<H::Output>> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                // Panics are caught inside the task, only cancellation lands here.
                Err(e) => {
                    error!(error = %e, "Segment task aborted");
                    self.stats.lock().record(false);
                    self.pending.fetch_sub(1, Ordering::AcqRel);
                }
            }
        }
        outcomes
    }

    pub fn stats(&self) -> LoaderStats {
        *self.stats.lock()
    }

    /// Clears counters and timings. Only meaningful between runs.
    pub fn reset_stats(&mut self) {
        if self.pending() > 0 {
            warn!(pending = self.pending(), "Resetting loader stats with tasks in flight");
        }
        *self.stats.lock() = LoaderStats::default();
    }
}

/// Fetches one job and runs the handler on its body.
async fn fetch_and_handle<H: SegmentHandler>(
    fetcher: &dyn Fetcher,
    handler: &H,
    job: &FetchJob,
    permit: OwnedSemaphorePermit,
) -> Result<H::Output, DownloadError> {
    let fetched = fetcher.fetch(&job.url, &job.headers, job.timeout).await;
    // The slot only covers the network fetch.
    drop(permit);

    match fetched {
        Ok(data) => {
            let result = handler.handle(job, data).await;
            if let Err(e) = &result {
                warn!(url = %job.url, index = job.index, error = %e, "Segment processing failed");
            }
            result
        }
        Err(e) => {
            warn!(
                url = %job.url,
                index = job.index,
                network = e.is_network(),
                error = %e,
                "Segment download failed"
            );
            Err(e)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::sync::Notify;

    struct SlowFetcher {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        second_fetch: Notify,
    }

    impl SlowFetcher {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                second_fetch: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl Fetcher for SlowFetcher {
        async fn fetch(
            &self,
            url: &str,
            _headers: &HeaderMap,
            _timeout: Duration,
        ) -> Result<Bytes, DownloadError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if url.ends_with("/1") {
                self.second_fetch.notify_one();
            }
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if url.contains("missing") {
                return Err(DownloadError::StatusCode {
                    status: reqwest::StatusCode::NOT_FOUND,
                    url: url.to_string(),
                });
            }
            Ok(Bytes::from(url.to_string()))
        }
    }

    struct LengthHandler {
        failures: AtomicUsize,
    }

    #[async_trait]
    impl SegmentHandler for LengthHandler {
        type Output = usize;

        async fn handle(&self, job: &FetchJob, data: Bytes) -> Result<usize, DownloadError> {
            if job.url.contains("reject") {
                return Err(DownloadError::playlist("rejected"));
            }
            if job.url.contains("panic") {
                panic!("handler blew up on {}", job.url);
            }
            Ok(data.len())
        }

        fn on_failure(&self, _job: &FetchJob, _error: &DownloadError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Handler for job 0 only finishes once job 1 has started fetching.
    struct WaitForSecondFetch {
        fetcher: Arc<SlowFetcher>,
    }

    #[async_trait]
    impl SegmentHandler for WaitForSecondFetch {
        type Output = ();

        async fn handle(&self, job: &FetchJob, _data: Bytes) -> Result<(), DownloadError> {
            if job.index == 0 {
                self.fetcher.second_fetch.notified().await;
            }
            Ok(())
        }
    }

    fn job(index: usize, url: &str) -> FetchJob {
        FetchJob {
            index,
            url: url.to_string(),
            headers: HeaderMap::new(),
            timeout: Duration::ZERO,
        }
    }

    fn length_handler() -> Arc<LengthHandler> {
        Arc::new(LengthHandler {
            failures: AtomicUsize::new(0),
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_fetches_are_bounded() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(20)));
        let mut loader = BoundedLoader::new(fetcher.clone(), length_handler(), 3);

        for i in 0..12 {
            loader.submit(job(i, &format!("http://h/seg/{i}"))).await.unwrap();
            assert!(fetcher.in_flight.load(Ordering::SeqCst) <= 3);
        }
        let outcomes = loader.await_all().await;

        assert_eq!(outcomes.len(), 12);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(loader.pending(), 0);

        let stats = loader.stats();
        assert_eq!(stats.success_count, 12);
        assert_eq!(stats.failure_count, 0);
        assert!(stats.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slot_is_released_before_handler_runs() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(1)));
        let handler = Arc::new(WaitForSecondFetch {
            fetcher: fetcher.clone(),
        });
        let mut loader = BoundedLoader::new(fetcher.clone(), handler, 1);

        let run = async {
            loader.submit(job(0, "http://h/0")).await.unwrap();
            loader.submit(job(1, "http://h/1")).await.unwrap();
            loader.await_all().await
        };
        let outcomes = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("handler held the only slot");

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_counted() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(1)));
        let handler = length_handler();
        let mut loader = BoundedLoader::new(fetcher, handler.clone(), 2);

        loader.submit(job(0, "http://h/ok")).await.unwrap();
        loader.submit(job(1, "http://h/missing")).await.unwrap();
        loader.submit(job(2, "http://h/reject")).await.unwrap();
        loader.submit(job(3, "http://h/fine")).await.unwrap();

        let mut outcomes = loader.await_all().await;
        outcomes.sort_by_key(|o| o.index);

        assert!(matches!(outcomes[0].result, Ok(11)));
        assert!(matches!(
            outcomes[1].result,
            Err(DownloadError::StatusCode { .. })
        ));
        assert!(matches!(outcomes[2].result, Err(DownloadError::Playlist(_))));
        assert!(outcomes[3].result.is_ok());

        let stats = loader.stats();
        assert_eq!((stats.success_count, stats.failure_count), (2, 2));
        assert_eq!(handler.failures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_reported_as_failure() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(1)));
        let handler = length_handler();
        let mut loader = BoundedLoader::new(fetcher, handler.clone(), 2);

        loader.submit(job(0, "http://h/panic")).await.unwrap();
        loader.submit(job(1, "http://h/ok")).await.unwrap();

        let mut outcomes = loader.await_all().await;
        outcomes.sort_by_key(|o| o.index);

        assert_eq!(outcomes.len(), 2);
        match &outcomes[0].result {
            Err(DownloadError::Task(message)) => assert!(message.contains("handler blew up")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(outcomes[1].result.is_ok());

        let stats = loader.stats();
        assert_eq!((stats.success_count, stats.failure_count), (1, 1));
        assert_eq!(handler.failures.load(Ordering::SeqCst), 1);
        assert_eq!(loader.pending(), 0);
    }

    #[tokio::test]
    async fn test_zero_parallelism_and_reset() {
        let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(1)));
        let mut loader = BoundedLoader::new(fetcher, length_handler(), 0);
        assert_eq!(loader.max_parallel(), DEFAULT_MAX_PARALLEL);

        loader.submit(job(0, "http://h/a")).await.unwrap();
        loader.await_all().await;
        assert_eq!(loader.stats().success_count, 1);

        loader.reset_stats();
        let stats = loader.stats();
        assert_eq!((stats.success_count, stats.failure_count), (0, 0));
        assert!(stats.started_at.is_none());
        assert_eq!(stats.elapsed(), Duration::ZERO);
    }
}
