//! Bounded MPMC task queue and the admission policies in front of it

use async_channel::{Receiver, Sender, TryRecvError, TrySendError};

use contracts::BackpressureMode;

use crate::error::RejectReason;
use crate::task::PublishTask;

/// What a producer does when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressurePolicy {
    /// Suspend the producer until a slot frees up or the queue closes
    #[default]
    BlockUntilSpace,
    /// Refuse immediately with [`RejectReason::QueueFull`]
    FailFast,
}

impl From<BackpressureMode> for BackpressurePolicy {
    fn from(mode: BackpressureMode) -> Self {
        match mode {
            BackpressureMode::BlockUntilSpace => Self::BlockUntilSpace,
            BackpressureMode::FailFast => Self::FailFast,
        }
    }
}

/// Bounded FIFO shared by producers and workers
///
/// Closing the queue wakes every blocked producer with
/// [`RejectReason::ShuttingDown`]; workers keep receiving until it is empty.
#[derive(Debug, Clone)]
pub struct BoundedTaskQueue {
    tx: Sender<PublishTask>,
    rx: Receiver<PublishTask>,
    capacity: usize,
}

impl BoundedTaskQueue {
    /// `capacity` must be > 0; config validation guarantees it
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = async_channel::bounded(capacity);
        Self { tx, rx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Receiving half for a worker
    pub fn receiver(&self) -> Receiver<PublishTask> {
        self.rx.clone()
    }

    /// Submit a task according to `policy`
    pub async fn submit(
        &self,
        task: PublishTask,
        policy: BackpressurePolicy,
    ) -> Result<(), RejectReason> {
        match policy {
            BackpressurePolicy::BlockUntilSpace => self
                .tx
                .send(task)
                .await
                .map_err(|_| RejectReason::ShuttingDown),
            BackpressurePolicy::FailFast => self.try_submit(task),
        }
    }

    /// Same as [`submit`](Self::submit) but parks the calling OS thread.
    ///
    /// Must not be called from inside an async task.
    pub fn submit_blocking(
        &self,
        task: PublishTask,
        policy: BackpressurePolicy,
    ) -> Result<(), RejectReason> {
        match policy {
            BackpressurePolicy::BlockUntilSpace => self
                .tx
                .send_blocking(task)
                .map_err(|_| RejectReason::ShuttingDown),
            BackpressurePolicy::FailFast => self.try_submit(task),
        }
    }

    fn try_submit(&self, task: PublishTask) -> Result<(), RejectReason> {
        match self.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(RejectReason::QueueFull),
            Err(TrySendError::Closed(_)) => Err(RejectReason::ShuttingDown),
        }
    }

    /// Stop accepting tasks. Returns false if already closed.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    /// Discard whatever is still queued and return how many tasks that was
    pub fn drain_residual(&self) -> usize {
        let mut residual = 0;
        loop {
            match self.rx.try_recv() {
                Ok(_) => residual += 1,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        residual
    }
}
