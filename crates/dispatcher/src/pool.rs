//! WorkerPool - fixed set of tasks draining the queue into a sink

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, trace, Instrument};

use contracts::StreamSink;

use crate::error::EngineError;
use crate::report::ErrorReporter;
use crate::stats::StatsCollector;
use crate::task::PublishTask;

/// Counters shared between the pool and its workers
#[derive(Debug, Default)]
struct PoolCounters {
    /// Tasks taken off the queue
    dequeued: AtomicU64,
    /// Tasks taken off the queue whose sink call has not returned
    in_flight: AtomicUsize,
}

/// Everything a worker needs, cloned once per worker
struct WorkerContext<S> {
    stream_id: Arc<str>,
    rx: Receiver<PublishTask>,
    sink: Arc<S>,
    stats: Arc<StatsCollector>,
    reporter: Arc<dyn ErrorReporter>,
    counters: Arc<PoolCounters>,
}

impl<S> Clone for WorkerContext<S> {
    fn clone(&self) -> Self {
        Self {
            stream_id: Arc::clone(&self.stream_id),
            rx: self.rx.clone(),
            sink: Arc::clone(&self.sink),
            stats: Arc::clone(&self.stats),
            reporter: Arc::clone(&self.reporter),
            counters: Arc::clone(&self.counters),
        }
    }
}

/// Handle to the running workers of one engine
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    counters: Arc<PoolCounters>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawn `worker_count` workers, each named `<engine>[<stream>]-<n>`
    pub fn spawn<S>(
        engine_name: &str,
        stream_id: &str,
        worker_count: usize,
        rx: Receiver<PublishTask>,
        sink: Arc<S>,
        stats: Arc<StatsCollector>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self
    where
        S: StreamSink + Sync + 'static,
    {
        let counters = Arc::new(PoolCounters::default());
        let ctx = WorkerContext {
            stream_id: Arc::from(stream_id),
            rx,
            sink,
            stats,
            reporter,
            counters: Arc::clone(&counters),
        };

        let handles = (1..=worker_count)
            .map(|n| {
                let worker = format!("{engine_name}[{stream_id}]-{n}");
                let span = info_span!("publish_worker", worker = %worker);
                tokio::spawn(publish_worker(ctx.clone()).instrument(span))
            })
            .collect();

        debug!(engine = %engine_name, stream = %stream_id, worker_count, "Worker pool started");

        Self {
            handles,
            counters,
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Tasks currently inside a sink call
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Tasks taken off the queue so far
    pub fn dequeued(&self) -> u64 {
        self.counters.dequeued.load(Ordering::Acquire)
    }

    /// Wait up to `deadline` for every worker to exit.
    ///
    /// Workers exit once the queue is closed and empty. Returns false if the
    /// deadline elapsed first; unfinished workers are left running.
    pub async fn join(&mut self, deadline: Duration) -> bool {
        tokio::time::timeout(deadline, self.join_all()).await.is_ok()
    }

    /// Wait for every worker to exit, however long the drain takes.
    pub async fn join_all(&mut self) {
        while let Some(handle) = self.handles.last_mut() {
            if let Err(e) = handle.await {
                error!(error = ?e, "Publish worker panicked");
            }
            self.handles.pop();
        }
    }

    /// Forget the workers without cancelling them.
    ///
    /// They keep draining until the queue is empty or the runtime shuts down.
    pub fn detach(&mut self) {
        self.handles.clear();
    }

    /// Cancel remaining workers and wait until they are gone.
    ///
    /// Cancelled sink calls stay counted in [`in_flight`](Self::in_flight).
    pub async fn abort(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        for handle in self.handles.drain(..) {
            match handle.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => error!(error = ?e, "Publish worker panicked"),
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Worker loop: one task at a time until the queue is closed and drained
async fn publish_worker<S>(ctx: WorkerContext<S>)
where
    S: StreamSink + Sync + 'static,
{
    debug!("Publish worker started");

    while let Ok(task) = ctx.rx.recv().await {
        ctx.counters.dequeued.fetch_add(1, Ordering::AcqRel);
        ctx.counters.in_flight.fetch_add(1, Ordering::AcqRel);

        let started = Instant::now();
        let PublishTask {
            partition_key,
            payload,
        } = task;
        let result = ctx.sink.put(&partition_key, payload).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        observability::record_published(&ctx.stream_id, result.is_ok(), latency_ms);

        match result {
            Ok(receipt) => {
                ctx.stats.record_success();
                trace!(
                    partition_key = %partition_key,
                    sequence_number = %receipt.sequence_number,
                    attempts = receipt.attempts,
                    "Record published"
                );
            }
            Err(e) => {
                ctx.stats.record_failure();
                ctx.reporter.report(&EngineError::Publish {
                    stream_id: ctx.stream_id.to_string(),
                    partition_key,
                    source: e,
                });
            }
        }
        ctx.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    debug!("Publish worker stopped");
}
