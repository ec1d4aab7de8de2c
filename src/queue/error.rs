//! Error types for queue operations

use std::fmt;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// More entries than the transport accepts in one submission
    BatchTooLarge { size: usize, max: usize },

    /// Submission without entries
    EmptyBatch,

    /// Receipt does not belong to an in-flight delivery (already acked,
    /// expired and redelivered, or never issued)
    UnknownReceipt(String),

    /// Transport could not be reached
    Unavailable(String),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::BatchTooLarge { size, max } => {
                write!(f, "batch of {size} entries exceeds the maximum of {max}")
            }
            QueueError::EmptyBatch => write!(f, "batch contains no entries"),
            QueueError::UnknownReceipt(receipt) => {
                write!(f, "unknown or expired receipt: {receipt}")
            }
            QueueError::Unavailable(msg) => write!(f, "queue unavailable: {msg}"),
        }
    }
}

impl std::error::Error for QueueError {}
