//! DispatchEngine - lifecycle, admission and bounded shutdown
//!
//! Producers call [`DispatchEngine::append`] from any task or thread; a fixed
//! [`WorkerPool`] drains the queue into the sink. [`DispatchEngine::stop`]
//! waits for the drain up to a deadline and accounts for everything it had to
//! abandon.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use contracts::{
    format_guarded, EngineConfig, EventFormatter, ResolvedEngineConfig, RetryPolicy, StreamSink,
    DEFAULT_SHUTDOWN_DEADLINE_SECS,
};

use crate::error::{EngineError, RejectReason};
use crate::pool::WorkerPool;
use crate::queue::{BackpressurePolicy, BoundedTaskQueue};
use crate::report::{ErrorReporter, TracingReporter};
use crate::state::{EngineState, StateCell};
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::task::PublishTask;

/// Outcome of a completed `stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Records the sink accepted over the engine's lifetime
    pub delivered: u64,
    /// Records the sink gave up on
    pub failed: u64,
    /// Records workers took off the queue
    pub dequeued: u64,
    /// Records still queued when the deadline elapsed
    pub residual: usize,
    /// Sink calls cancelled at the deadline
    pub in_flight: usize,
    /// Whether workers had to be cancelled
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// Records that will never reach the sink
    pub fn lost(&self) -> usize {
        self.residual + self.in_flight
    }

    pub fn is_complete(&self) -> bool {
        self.lost() == 0
    }
}

/// Immutable per-run state, set once by a successful `start`
struct Active<E> {
    config: ResolvedEngineConfig,
    formatter: Box<dyn EventFormatter<E>>,
    queue: BoundedTaskQueue,
    policy: BackpressurePolicy,
}

/// Drains a pool in the background once its engine is gone
type DetachFn = Box<dyn FnOnce(WorkerPool) + Send>;

/// Owned by `stop`, or handed to `detach` when the engine is dropped running
struct Workers<S> {
    pool: WorkerPool,
    sink: Arc<S>,
    detach: DetachFn,
}

/// Backpressured dispatcher from producers to one [`StreamSink`]
///
/// All operations take `&self`; wrap the engine in an `Arc` to share it.
pub struct DispatchEngine<E, S> {
    name: String,
    state: StateCell,
    reporter: Arc<dyn ErrorReporter>,
    stats: Arc<StatsCollector>,
    active: OnceLock<Active<E>>,
    workers: Mutex<Option<Workers<S>>>,
}

impl<E, S> DispatchEngine<E, S>
where
    E: 'static,
    S: StreamSink + Sync + 'static,
{
    /// New engine reporting errors through tracing
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: StateCell::new(),
            reporter: Arc::new(TracingReporter),
            stats: Arc::new(StatsCollector::new()),
            active: OnceLock::new(),
            workers: Mutex::new(None),
        }
    }

    /// Replace the host error channel
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> EngineState {
        self.state.load()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Tasks waiting in the queue
    pub fn pending(&self) -> usize {
        self.active.get().map(|a| a.queue.len()).unwrap_or(0)
    }

    /// Configuration in effect, once started
    pub fn config(&self) -> Option<&ResolvedEngineConfig> {
        self.active.get().map(|a| &a.config)
    }

    /// Validate `config`, health-check `sink` and spawn the workers.
    ///
    /// On failure the engine is `Failed` for good and the sink is released.
    #[instrument(name = "engine_start", skip_all, fields(engine = %self.name))]
    pub async fn start<F>(
        &self,
        config: &EngineConfig,
        mut sink: S,
        formatter: F,
    ) -> Result<(), EngineError>
    where
        F: EventFormatter<E> + 'static,
    {
        if let Err(state) = self
            .state
            .transition(EngineState::Uninitialized, EngineState::Starting)
        {
            return Err(self.report(EngineError::state(&self.name, "start", state)));
        }

        let resolved = match config.resolve() {
            Ok(resolved) => resolved,
            Err(source) => {
                let err = EngineError::Config {
                    engine: self.name.clone(),
                    source,
                };
                return Err(self.fail(err, &sink).await);
            }
        };

        sink.set_retry_policy(RetryPolicy::with_max_retries(resolved.max_retries));

        let status = sink.health_check(&resolved.stream_id).await;
        if !status.is_writable() {
            let err = EngineError::HealthCheck {
                engine: self.name.clone(),
                stream_id: resolved.stream_id.clone(),
                status,
            };
            return Err(self.fail(err, &sink).await);
        }
        debug!(stream = %resolved.stream_id, status = %status, "Stream is writable");

        let sink = Arc::new(sink);
        let queue = BoundedTaskQueue::new(resolved.queue_capacity);
        let pool = WorkerPool::spawn(
            &self.name,
            &resolved.stream_id,
            resolved.worker_count,
            queue.receiver(),
            Arc::clone(&sink),
            Arc::clone(&self.stats),
            Arc::clone(&self.reporter),
        );

        info!(
            stream = %resolved.stream_id,
            region = %resolved.region,
            encoding = resolved.charset.name(),
            sink = sink.name(),
            queue_capacity = resolved.queue_capacity,
            worker_count = resolved.worker_count,
            backpressure = ?resolved.backpressure,
            "Engine started"
        );

        // Uninitialized -> Starting happens once, so the cell is still empty
        let _ = self.active.set(Active {
            policy: resolved.backpressure.into(),
            config: resolved,
            formatter: Box::new(formatter),
            queue,
        });
        let detach: DetachFn = {
            let engine = self.name.clone();
            let sink = Arc::clone(&sink);
            Box::new(move |pool| drain_detached(engine, pool, sink))
        };
        *self.workers.lock().await = Some(Workers { pool, sink, detach });
        self.state.set(EngineState::Running);
        Ok(())
    }

    /// Format `event` and queue it for delivery.
    ///
    /// Returns once the record is queued, not delivered. Under
    /// `BlockUntilSpace` this waits for a free slot. A formatter failure is
    /// reported and the record skipped; only state and rejection errors are
    /// returned.
    pub async fn append(&self, event: &E) -> Result<(), EngineError> {
        let active = self.admit("append")?;
        let Some(task) = self.prepare(active, event) else {
            return Ok(());
        };
        match active.queue.submit(task, active.policy).await {
            Ok(()) => {
                self.accepted(active);
                Ok(())
            }
            Err(reason) => Err(self.reject(reason)),
        }
    }

    /// [`append`](Self::append) for plain OS threads.
    ///
    /// Parks the calling thread while waiting for space; do not call it from
    /// inside an async task.
    pub fn append_blocking(&self, event: &E) -> Result<(), EngineError> {
        let active = self.admit("append")?;
        let Some(task) = self.prepare(active, event) else {
            return Ok(());
        };
        match active.queue.submit_blocking(task, active.policy) {
            Ok(()) => {
                self.accepted(active);
                Ok(())
            }
            Err(reason) => Err(self.reject(reason)),
        }
    }

    /// Stop accepting records and drain for at most `deadline`.
    ///
    /// Records still queued when the deadline elapses are dropped unexecuted
    /// and stuck sink calls are cancelled; both are counted in the report and
    /// surfaced once as `ShutdownIncomplete`. The sink is always released.
    #[instrument(name = "engine_stop", skip(self), fields(engine = %self.name))]
    pub async fn stop(&self, deadline: Duration) -> Result<ShutdownReport, EngineError> {
        if let Err(state) = self
            .state
            .transition(EngineState::Running, EngineState::Draining)
        {
            return Err(self.report(EngineError::state(&self.name, "stop", state)));
        }
        let started = Instant::now();

        let Some(active) = self.active.get() else {
            self.state.set(EngineState::Stopped);
            return Err(self.report(EngineError::state(
                &self.name,
                "stop",
                EngineState::Draining,
            )));
        };
        let stream = active.config.stream_id.as_str();

        active.queue.close();
        info!(
            stream = %stream,
            queued = active.queue.len(),
            deadline_ms = deadline.as_millis() as u64,
            "Draining"
        );

        let mut report = ShutdownReport {
            delivered: 0,
            failed: 0,
            dequeued: 0,
            residual: 0,
            in_flight: 0,
            timed_out: false,
            elapsed: Duration::ZERO,
        };

        let workers = self.workers.lock().await.take();
        let sink = match workers {
            Some(Workers { mut pool, sink, .. }) => {
                if !pool.join(deadline).await {
                    report.timed_out = true;
                    pool.abort().await;
                    report.in_flight = pool.in_flight();
                }
                report.dequeued = pool.dequeued();
                Some(sink)
            }
            None => None,
        };
        report.residual = active.queue.drain_residual();

        let stats = self.stats.snapshot();
        report.delivered = stats.success_count;
        report.failed = stats.failure_count;

        observability::record_shutdown(stream, report.residual, report.in_flight);
        observability::record_queue_depth(stream, 0);
        if !report.is_complete() {
            self.report(EngineError::ShutdownIncomplete {
                engine: self.name.clone(),
                deadline,
                residual: report.residual,
                in_flight: report.in_flight,
            });
        }

        if let Some(sink) = sink {
            if let Err(source) = sink.release().await {
                self.report(EngineError::Release {
                    engine: self.name.clone(),
                    source,
                });
            }
        }

        report.elapsed = started.elapsed();
        self.state.set(EngineState::Stopped);
        info!(
            stream = %stream,
            delivered = report.delivered,
            failed = report.failed,
            residual = report.residual,
            in_flight = report.in_flight,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Engine stopped"
        );
        Ok(report)
    }

    /// [`stop`](Self::stop) with the configured shutdown deadline
    pub async fn shutdown(&self) -> Result<ShutdownReport, EngineError> {
        let deadline = self
            .active
            .get()
            .map(|a| a.config.shutdown_deadline)
            .unwrap_or(Duration::from_secs(DEFAULT_SHUTDOWN_DEADLINE_SECS));
        self.stop(deadline).await
    }

    fn report(&self, err: EngineError) -> EngineError {
        self.reporter.report(&err);
        err
    }

    async fn fail(&self, err: EngineError, sink: &S) -> EngineError {
        self.state.set(EngineState::Failed);
        let err = self.report(err);
        if let Err(source) = sink.release().await {
            self.report(EngineError::Release {
                engine: self.name.clone(),
                source,
            });
        }
        err
    }

    fn admit(&self, operation: &'static str) -> Result<&Active<E>, EngineError> {
        match self.state.load() {
            EngineState::Running => {}
            EngineState::Draining | EngineState::Stopped => {
                return Err(self.reject(RejectReason::ShuttingDown));
            }
            state => return Err(self.report(EngineError::state(&self.name, operation, state))),
        }
        self.active
            .get()
            .ok_or_else(|| self.report(EngineError::state(&self.name, operation, self.state())))
    }

    fn prepare(&self, active: &Active<E>, event: &E) -> Option<PublishTask> {
        match format_guarded(active.formatter.as_ref(), event) {
            Ok(text) => Some(PublishTask::new(active.config.charset.encode(&text))),
            Err(source) => {
                observability::record_format_error(&active.config.stream_id);
                self.report(EngineError::Format {
                    stream_id: active.config.stream_id.clone(),
                    source,
                });
                None
            }
        }
    }

    fn accepted(&self, active: &Active<E>) {
        observability::record_appended(&active.config.stream_id);
        observability::record_queue_depth(&active.config.stream_id, active.queue.len());
    }

    fn reject(&self, reason: RejectReason) -> EngineError {
        let stream = self
            .active
            .get()
            .map(|a| a.config.stream_id.as_str())
            .unwrap_or(self.name.as_str());
        observability::record_rejected(stream, reason.as_str());
        self.report(EngineError::rejected(&self.name, reason))
    }
}

/// Let `pool` finish the closed queue, then release `sink`.
///
/// Without a runtime the workers are left to end with it and the sink is
/// never released.
fn drain_detached<S>(engine: String, mut pool: WorkerPool, sink: Arc<S>)
where
    S: StreamSink + Sync + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                pool.join_all().await;
                if let Err(e) = sink.release().await {
                    warn!(engine = %engine, error = %e, "Sink release failed after detached drain");
                }
                debug!(engine = %engine, delivered = pool.dequeued(), "Detached drain finished");
            });
        }
        Err(_) => {
            warn!(
                engine = %engine,
                in_flight = pool.in_flight(),
                "No runtime to finish detached drain, sink not released"
            );
            pool.detach();
        }
    }
}

impl<E, S> Drop for DispatchEngine<E, S> {
    fn drop(&mut self) {
        if self.state.load() != EngineState::Running {
            return;
        }
        let Some(active) = self.active.get() else {
            return;
        };
        active.queue.close();

        let Some(Workers { pool, detach, .. }) = self.workers.get_mut().take() else {
            return;
        };
        warn!(
            engine = %self.name,
            pending = active.queue.len(),
            in_flight = pool.in_flight(),
            "Engine dropped while running, draining in the background"
        );
        detach(pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::report::CollectingReporter;
    use crate::sinks::{MemorySink, MemoryStream};
    use contracts::{BackpressureMode, ContractError, RawFormatter, StreamStatus};

    type Engine = DispatchEngine<String, MemorySink>;

    fn config(capacity: usize, workers: usize) -> EngineConfig {
        EngineConfig::new("app-logs", "ap-northeast-2")
            .with_queue_capacity(capacity)
            .with_worker_count(workers)
            .with_max_retries(1)
    }

    fn engine() -> (Engine, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::new());
        let engine = Engine::new("shipper").with_reporter(reporter.clone());
        (engine, reporter)
    }

    async fn started(
        capacity: usize,
        workers: usize,
    ) -> (Arc<Engine>, Arc<MemoryStream>, Arc<CollectingReporter>) {
        let (engine, reporter) = engine();
        let sink = MemorySink::new("mem");
        let stream = sink.stream();
        engine
            .start(&config(capacity, workers), sink, RawFormatter)
            .await
            .unwrap();
        (Arc::new(engine), stream, reporter)
    }

    #[tokio::test]
    async fn test_dropped_running_engine_drains_and_releases() {
        let (engine, reporter) = engine();
        let sink = MemorySink::new("mem");
        let stream = sink.stream();
        stream.set_latency(Duration::from_millis(20));
        engine
            .start(&config(8, 1), sink, RawFormatter)
            .await
            .unwrap();
        for i in 0..5 {
            engine.append(&format!("line {i}")).await.unwrap();
        }

        drop(engine);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(stream.records().len(), 5);
        assert_eq!(stream.release_count(), 1);
        assert!(reporter.is_empty());
    }

    #[tokio::test]
    async fn test_start_then_stop_zero_with_empty_queue_is_clean() {
        let (engine, stream, reporter) = started(8, 2).await;
        assert_eq!(engine.state(), EngineState::Running);

        let report = engine.stop(Duration::ZERO).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(reporter.count(ErrorKind::ShutdownIncomplete), 0);
        assert_eq!(stream.release_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_zero_with_queued_records_reports_residual() {
        let (engine, stream, reporter) = started(8, 1).await;
        stream.pause();
        for i in 0..5 {
            engine.append(&format!("line {i}")).await.unwrap();
        }

        let report = engine.stop(Duration::ZERO).await.unwrap();

        assert_eq!(report.lost(), 5);
        assert!(report.timed_out);
        assert_eq!(reporter.count(ErrorKind::ShutdownIncomplete), 1);
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(stream.records().is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_suspends_producer_until_slot_frees() {
        let (engine, stream, reporter) = started(2, 1).await;
        stream.pause();

        // First record is taken by the worker and held; two more fill the queue
        engine.append(&"a".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.append(&"b".to_string()).await.unwrap();
        engine.append(&"c".to_string()).await.unwrap();
        assert_eq!(engine.pending(), 2);

        let producer = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.append(&"d".to_string()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        stream.resume();
        producer.await.unwrap().unwrap();

        let report = engine.stop(Duration::from_secs(5)).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(stream.payload_texts(), vec!["a", "b", "c", "d"]);
        assert!(reporter.is_empty());
    }

    #[tokio::test]
    async fn test_counts_match_dequeued_after_drain() {
        let (engine, stream, _reporter) = started(16, 4).await;

        let mut producers = Vec::new();
        for p in 0..4 {
            let engine = Arc::clone(&engine);
            producers.push(tokio::spawn(async move {
                for i in 0..25 {
                    engine.append(&format!("{p}-{i}")).await.unwrap();
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }

        let report = engine.stop(Duration::from_secs(10)).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.dequeued, 100);
        assert_eq!(report.delivered + report.failed, report.dequeued);
        assert_eq!(stream.records().len(), 100);
    }

    #[tokio::test]
    async fn test_unwritable_stream_fails_start() {
        for status in [StreamStatus::Missing, StreamStatus::Error("timeout".into())] {
            let (engine, reporter) = engine();
            let sink = MemorySink::new("mem");
            let stream = sink.stream();
            stream.set_status(status);

            let err = engine
                .start(&config(4, 1), sink, RawFormatter)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::HealthCheck);
            assert_eq!(engine.state(), EngineState::Failed);
            assert_eq!(stream.release_count(), 1);

            let err = engine.append(&"x".to_string()).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::State);
            assert_eq!(engine.pending(), 0);
            assert_eq!(stream.attempts(), 0);
            assert_eq!(reporter.count(ErrorKind::HealthCheck), 1);
        }
    }

    #[tokio::test]
    async fn test_active_and_updating_streams_start() {
        for status in [StreamStatus::Active, StreamStatus::Updating] {
            let (engine, _reporter) = engine();
            let sink = MemorySink::new("mem");
            sink.stream().set_status(status);

            engine.start(&config(4, 1), sink, RawFormatter).await.unwrap();
            assert_eq!(engine.state(), EngineState::Running);
            engine.stop(Duration::from_secs(1)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_stuck_sink_stops_within_deadline() {
        let (engine, stream, reporter) = started(8, 2).await;
        stream.pause();
        for i in 0..6 {
            engine.append(&format!("line {i}")).await.unwrap();
        }

        let began = Instant::now();
        let report = engine.stop(Duration::from_secs(2)).await.unwrap();
        let elapsed = began.elapsed();

        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
        assert!(report.residual > 0);
        assert_eq!(report.in_flight, 2);
        assert_eq!(report.lost(), 6);
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(stream.release_count(), 1);
        assert_eq!(reporter.count(ErrorKind::ShutdownIncomplete), 1);
    }

    #[tokio::test]
    async fn test_always_failing_sink_counts_failures() {
        let (engine, stream, reporter) = started(1, 1).await;
        stream.set_failing(true);

        for i in 0..3 {
            engine.append(&format!("line {i}")).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let report = engine.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.failed, 3);
        assert_eq!(report.delivered, 0);
        assert_eq!(engine.stats().failure_count, 3);
        assert_eq!(reporter.count(ErrorKind::Publish), 3);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_start() {
        let (engine, reporter) = engine();
        let sink = MemorySink::new("mem");
        let stream = sink.stream();
        let config = EngineConfig::new("  ", "mars-central-1").with_worker_count(0);

        let err = engine.start(&config, sink, RawFormatter).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.is_fatal());
        assert_eq!(engine.state(), EngineState::Failed);
        assert_eq!(reporter.count(ErrorKind::Config), 1);
        assert_eq!(stream.release_count(), 1);
    }

    #[tokio::test]
    async fn test_second_start_is_state_error() {
        let (engine, _stream, _reporter) = started(4, 1).await;
        let err = engine
            .start(&config(4, 1), MemorySink::new("other"), RawFormatter)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::State {
                state: EngineState::Running,
                ..
            }
        ));
        engine.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle_misuse() {
        let (engine, reporter) = engine();
        assert_eq!(
            engine.append(&"x".to_string()).await.unwrap_err().kind(),
            ErrorKind::State
        );
        assert_eq!(
            engine.stop(Duration::ZERO).await.unwrap_err().kind(),
            ErrorKind::State
        );
        assert_eq!(reporter.count(ErrorKind::State), 2);
    }

    #[tokio::test]
    async fn test_append_after_stop_is_rejected() {
        let (engine, stream, _reporter) = started(4, 1).await;
        engine.stop(Duration::from_secs(1)).await.unwrap();

        let err = engine.append(&"late".to_string()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Rejected {
                reason: RejectReason::ShuttingDown,
                ..
            }
        ));
        assert!(stream.records().is_empty());

        let err = engine.stop(Duration::ZERO).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        assert_eq!(stream.release_count(), 1);
    }

    #[tokio::test]
    async fn test_blocked_producer_rejected_when_draining_starts() {
        let (engine, stream, _reporter) = started(1, 1).await;
        stream.pause();
        engine.append(&"a".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.append(&"b".to_string()).await.unwrap();

        let producer = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.append(&"c".to_string()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        let report = engine.stop(Duration::from_millis(100)).await.unwrap();
        let err = producer.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
        assert_eq!(report.lost(), 2);
    }

    #[tokio::test]
    async fn test_fail_fast_rejects_on_full_queue() {
        let (engine, reporter) = engine();
        let sink = MemorySink::new("mem");
        let stream = sink.stream();
        stream.pause();
        let config = config(1, 1).with_backpressure(BackpressureMode::FailFast);
        engine.start(&config, sink, RawFormatter).await.unwrap();

        engine.append(&"a".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.append(&"b".to_string()).await.unwrap();

        let err = engine.append(&"c".to_string()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Rejected {
                reason: RejectReason::QueueFull,
                ..
            }
        ));
        assert_eq!(reporter.count(ErrorKind::Rejected), 1);

        stream.resume();
        let report = engine.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.delivered, 2);
    }

    #[tokio::test]
    async fn test_format_error_is_reported_not_queued() {
        let (engine, reporter) = engine();
        let sink = MemorySink::new("mem");
        let stream = sink.stream();
        let formatter = |event: &String| -> Result<String, ContractError> {
            if event.is_empty() {
                Err(ContractError::format("empty event"))
            } else {
                Ok(event.clone())
            }
        };
        engine.start(&config(4, 1), sink, formatter).await.unwrap();

        engine.append(&String::new()).await.unwrap();
        engine.append(&"ok".to_string()).await.unwrap();

        let report = engine.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.dequeued, 1);
        assert_eq!(stream.payload_texts(), vec!["ok"]);
        assert_eq!(reporter.count(ErrorKind::Format), 1);
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_panicking_formatter_keeps_engine_running() {
        let (engine, reporter) = engine();
        let formatter = |event: &String| -> Result<String, ContractError> {
            if event == "boom" {
                panic!("layout exploded");
            }
            Ok(event.clone())
        };
        engine
            .start(&config(4, 1), MemorySink::new("mem"), formatter)
            .await
            .unwrap();

        engine.append(&"boom".to_string()).await.unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        engine.append(&"fine".to_string()).await.unwrap();

        let report = engine.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(reporter.count(ErrorKind::Format), 1);
    }

    #[tokio::test]
    async fn test_payload_uses_configured_charset() {
        let (engine, _reporter) = engine();
        let sink = MemorySink::new("mem");
        let stream = sink.stream();
        let config = config(4, 1).with_encoding("UTF-16LE");
        engine.start(&config, sink, RawFormatter).await.unwrap();

        engine.append(&"hi".to_string()).await.unwrap();
        engine.stop(Duration::from_secs(5)).await.unwrap();

        let records = stream.records();
        assert_eq!(&records[0].payload[..], &[b'h', 0, b'i', 0]);
        assert_eq!(records[0].partition_key.len(), 36);
    }

    #[tokio::test]
    async fn test_max_retries_forwarded_to_sink() {
        let (engine, reporter) = engine();
        let sink = MemorySink::new("mem");
        let stream = sink.stream();
        stream.fail_next(1);

        // max_retries = 1 absorbs exactly one transient failure
        engine.start(&config(4, 1), sink, RawFormatter).await.unwrap();
        engine.append(&"retry me".to_string()).await.unwrap();

        let report = engine.stop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(stream.attempts(), 2);
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_append_blocking_from_plain_threads() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (engine, stream, _reporter) = runtime.block_on(started(2, 2));

        let producers: Vec<_> = (0..4)
            .map(|t| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    for i in 0..10 {
                        engine.append_blocking(&format!("{t}-{i}")).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let report = runtime
            .block_on(engine.stop(Duration::from_secs(10)))
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(stream.records().len(), 40);
    }
}
