// Roel Kluin, 2023, GPL v3

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

/// Failure reported by an event handler. Handlers are expected to be total, so any fault is
/// fatal to the mutation that triggered it.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerFault(pub String);

#[derive(Debug, Error)]
pub enum GraphError {
    /// No free slot left in `[bias, bias + capacity)`. Recoverable by growing the range.
    #[error("no free id in [{bias}, {bias} + {capacity})")]
    Exhausted { bias: u64, capacity: usize },
    #[error("{kind} {id} is not live")]
    Stale { kind: &'static str, id: u64 },
    #[error("precondition violated: {0}")]
    PreconditionViolated(String),
    #[error("invariant broken: {what} (ids: {ids:?})")]
    InvariantBroken { what: String, ids: Vec<u64> },
    #[error("handler {handler} failed: {fault}")]
    HandlerFault {
        handler: String,
        #[source]
        fault: HandlerFault,
    },
    #[error("invalid sequence: {0}")]
    InvalidSequence(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl GraphError {
    pub fn invariant(what: impl Into<String>, ids: Vec<u64>) -> Self {
        GraphError::InvariantBroken {
            what: what.into(),
            ids,
        }
    }
    pub fn is_exhausted(&self) -> bool {
        matches!(self, GraphError::Exhausted { .. })
    }
}

/// `ensure!` for mutator preconditions: bails out with `PreconditionViolated`.
macro_rules! precondition {
    ($cond:expr, $($arg:tt)+) => {
        if !($cond) {
            return Err($crate::error::GraphError::PreconditionViolated(format!($($arg)+)));
        }
    };
}
