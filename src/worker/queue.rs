//! `JobQueue`: the producer/consumer boundary between the Control API and
//! the Worker Runtime (§4.2, §6 job message schema). No direct teacher
//! counterpart; the generic enqueue/consume shape is modeled after
//! `other_examples/641d6e7e_meilisearch-meilisearch__...scheduler-mod.rs.rs`'s
//! task queue.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use super::Job;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,
    #[error("queue backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError>;

    /// Blocks until a job is available, the queue closes (`Ok(None)`), or an
    /// error occurs.
    async fn consume(&self) -> Result<Option<Job>, QueueError>;
}

/// Single-process queue backed by an `mpsc` channel (§4.2's default
/// deployment: one Control API process feeding N local worker loops).
pub struct InProcessQueue {
    sender: tokio::sync::mpsc::Sender<Job>,
    receiver: Mutex<tokio::sync::mpsc::Receiver<Job>>,
}

impl InProcessQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }
}

#[async_trait]
impl JobQueue for InProcessQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        self.sender.send(job).await.map_err(|_| QueueError::Closed)
    }

    async fn consume(&self) -> Result<Option<Job>, QueueError> {
        Ok(self.receiver.lock().await.recv().await)
    }
}

#[cfg(feature = "redis-backend")]
pub mod redis_backend {
    //! Distributed queue backed by a Redis list, grounded on
    //! `rate_limit::redis`'s `ConnectionManager`-based access pattern.

    use async_trait::async_trait;
    use redis::aio::ConnectionManager;
    use redis::AsyncCommands;

    use super::{Job, JobQueue, QueueError};

    const QUEUE_KEY: &str = "dataforge:jobs";
    const BLOCK_TIMEOUT_SECS: f64 = 5.0;

    pub struct RedisQueue {
        conn: ConnectionManager,
    }

    impl RedisQueue {
        pub async fn new(redis_url: &str) -> Result<Self, QueueError> {
            let client = redis::Client::open(redis_url).map_err(|e| QueueError::Backend(e.to_string()))?;
            let conn = ConnectionManager::new(client)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            Ok(Self { conn })
        }
    }

    #[async_trait]
    impl JobQueue for RedisQueue {
        async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
            let mut conn = self.conn.clone();
            let payload = serde_json::to_string(&job).map_err(|e| QueueError::Backend(e.to_string()))?;
            conn.lpush::<_, _, ()>(QUEUE_KEY, payload)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))
        }

        /// `Ok(None)` from the trait means "the queue is closed" (`run_worker_loop`
        /// exits its loop on that signal); a bare BLPOP timeout is neither a job
        /// nor a closed queue, so it loops internally rather than surfacing one.
        async fn consume(&self) -> Result<Option<Job>, QueueError> {
            loop {
                let mut conn = self.conn.clone();
                let result: Option<(String, String)> = conn
                    .blpop(QUEUE_KEY, BLOCK_TIMEOUT_SECS)
                    .await
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                match result {
                    Some((_key, payload)) => {
                        let job = serde_json::from_str(&payload).map_err(|e| QueueError::Backend(e.to_string()))?;
                        return Ok(Some(job));
                    }
                    None => continue,
                }
            }
        }
    }
}
