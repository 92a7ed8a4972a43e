use crate::core::traits::{BatchEntry, MessageQueue, QueueError};
use tracing::{error, info, warn};

/// Largest batch a queue accepts in one request.
pub const MAX_BATCH_SIZE: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("There are no messages passed through")]
    NoMessages,
    #[error("Too many messages in one batch: {count} (maximum {MAX_BATCH_SIZE})")]
    TooManyMessages { count: usize },
    #[error("Invalid response received from queue client")]
    InvalidResponse,
    #[error("Some messages were lost in the batch send request: sent {sent}, reported {reported}")]
    LostMessage { sent: usize, reported: usize },
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Entry ids the queue accepted and rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl BatchOutcome {
    pub fn success_count(&self) -> u64 {
        self.succeeded.len() as u64
    }

    pub fn failure_count(&self) -> u64 {
        self.failed.len() as u64
    }
}

/// Sends bounded batches of serialized messages to one queue destination.
pub struct BatchSender<Q> {
    queue: Q,
    destination: String,
}

impl<Q: MessageQueue> BatchSender<Q> {
    pub fn new(queue: Q, destination: impl Into<String>) -> Self {
        Self {
            queue,
            destination: destination.into(),
        }
    }

    pub fn into_inner(self) -> Q {
        self.queue
    }

    /// Sends 1 to [`MAX_BATCH_SIZE`] messages in a single queue request.
    ///
    /// Entries are labelled `Batch_Entry_{index}`. The queue must account
    /// for every entry as either successful or failed.
    pub fn send_batch(&mut self, messages: Vec<String>) -> Result<BatchOutcome, BatchError> {
        if messages.is_empty() {
            return Err(BatchError::NoMessages);
        }
        if messages.len() > MAX_BATCH_SIZE {
            return Err(BatchError::TooManyMessages {
                count: messages.len(),
            });
        }

        let entries: Vec<BatchEntry> = messages
            .into_iter()
            .enumerate()
            .map(|(index, body)| BatchEntry {
                id: format!("Batch_Entry_{index}"),
                body,
            })
            .collect();

        let response = self.queue.send_batch(&entries, &self.destination)?;
        if response.successful.is_none() && response.failed.is_none() {
            return Err(BatchError::InvalidResponse);
        }
        let outcome = BatchOutcome {
            succeeded: response.successful.unwrap_or_default(),
            failed: response.failed.unwrap_or_default(),
        };
        let reported = outcome.succeeded.len() + outcome.failed.len();
        if reported != entries.len() {
            return Err(BatchError::LostMessage {
                sent: entries.len(),
                reported,
            });
        }

        log_outcome(&self.destination, &outcome);
        Ok(outcome)
    }
}

fn log_outcome(destination: &str, outcome: &BatchOutcome) {
    let succeeded = &outcome.succeeded;
    let failed = &outcome.failed;
    if failed.is_empty() {
        info!(destination, ?succeeded, ?failed, "SET batch generation successful");
    } else if succeeded.is_empty() {
        error!(destination, ?succeeded, ?failed, "SET batch generation failed");
    } else {
        warn!(destination, ?succeeded, ?failed, "SET batch generation partially successful");
    }
}
