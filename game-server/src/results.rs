//! Hand-off of finished games to the result sink.
//!
//! Every finished game yields exactly two [`ResultRecord`]s, black first. The
//! [`ResultDispatcher`] delivers them off the game's execution context; a failed delivery is
//! logged and dropped, retrying is the sink's business.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinSet;

/// The outcome of one player in one finished game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(rename = "PlayerName")]
    pub player_name: String,
    #[serde(rename = "ScoreDiff")]
    pub rating_delta: i32,
    #[serde(rename = "WinDiff")]
    pub win_delta: u32,
    #[serde(rename = "LoseDiff")]
    pub lose_delta: u32,
}

/// Both records of one game, black first.
pub type ResultBatch = [ResultRecord; 2];

/// Failure of a sink to take a batch.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write result: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination of finished game results. Called on a blocking thread.
pub trait ResultSink: Send + Sync + 'static {
    fn deliver(&self, batch: &ResultBatch) -> Result<(), SinkError>;
}

/// Appends each record as one JSON line. Both lines go out in a single write.
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonLinesSink { path: path.into() }
    }
}

impl ResultSink for JsonLinesSink {
    fn deliver(&self, batch: &ResultBatch) -> Result<(), SinkError> {
        let mut lines = Vec::new();
        for record in batch {
            serde_json::to_writer(&mut lines, record)?;
            lines.push(b'\n');
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&lines)?;
        Ok(())
    }
}

/// Used when no results destination is configured, the records only show up in the log.
pub struct LogSink;

impl ResultSink for LogSink {
    fn deliver(&self, batch: &ResultBatch) -> Result<(), SinkError> {
        for record in batch {
            let line = serde_json::to_string(record)?;
            tracing::info!(record = %line, "Game result (no sink configured).");
        }
        Ok(())
    }
}

/// Hands result batches to the configured sink without blocking the caller.
#[derive(Clone)]
pub struct ResultDispatcher {
    sink: Arc<dyn ResultSink>,
    /// Deliveries not yet awaited by [`ResultDispatcher::flush`].
    pending: Arc<Mutex<JoinSet<()>>>,
}

impl ResultDispatcher {
    /// Creates a dispatcher delivering to `sink`.
    pub fn new(sink: Arc<dyn ResultSink>) -> Self {
        ResultDispatcher {
            sink,
            pending: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the delivery and returns immediately. Must be called within a tokio runtime.
    pub fn dispatch(&self, batch: ResultBatch) {
        let sink = self.sink.clone();
        self.lock_pending().spawn_blocking(move || match sink.deliver(&batch) {
            Ok(()) => tracing::info!(
                black = %batch[0].player_name,
                white = %batch[1].player_name,
                "Game result delivered."
            ),
            Err(error) => tracing::error!(?error, "Failed to deliver game result."),
        });
    }

    /// Waits until every delivery started so far has finished. Called before the process exits.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.lock_pending());
        while let Some(result) = pending.join_next().await {
            if let Err(error) = result {
                tracing::error!(?error, "Result delivery task failed.");
            }
        }
    }
}
