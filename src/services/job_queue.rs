//! Queue seam between the upload pipeline and the thumbnail worker.
//!
//! Delivery is at-least-once from the worker's point of view: a redelivered
//! job redoes the resize work and overwrites the same variant paths.

use async_trait::async_trait;
#[cfg(test)]
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A request to generate thumbnail derivatives for one uploaded image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThumbnailJob {
    pub owner_id: Uuid,
    pub file_id: Uuid,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job queue is closed")]
    Closed,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: ThumbnailJob) -> Result<(), QueueError>;
}

/// Production queue backed by an unbounded in-process channel, drained by
/// the worker loop spawned at startup.
pub struct ChannelQueue {
    tx: mpsc::UnboundedSender<ThumbnailJob>,
}

impl ChannelQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ThumbnailJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl JobQueue for ChannelQueue {
    async fn enqueue(&self, job: ThumbnailJob) -> Result<(), QueueError> {
        self.tx.send(job).map_err(|_| QueueError::Closed)
    }
}

/// Test double that records enqueued jobs instead of delivering them.
#[cfg(test)]
#[derive(Default, Clone)]
pub struct RecordingQueue {
    jobs: Arc<Mutex<Vec<ThumbnailJob>>>,
}

#[cfg(test)]
impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<ThumbnailJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, job: ThumbnailJob) -> Result<(), QueueError> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

/// Test double that rejects every job, as a closed channel would.
#[cfg(test)]
pub struct FailingQueue;

#[cfg(test)]
#[async_trait]
impl JobQueue for FailingQueue {
    async fn enqueue(&self, _job: ThumbnailJob) -> Result<(), QueueError> {
        Err(QueueError::Closed)
    }
}
