//! Errors returned by the mock connection.

use thiserror::Error;

/// Failure of a mock connection operation.
///
/// Every variant is terminal for the call that produced it and leaves the
/// connection usable for subsequent calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MockError {
    /// No exact or generic registration matches the command.
    #[error("command {0} is not registered")]
    CommandNotRegistered(String),

    /// The matched registration has no responses left.
    #[error("no more responses registered for {0}")]
    ResponsesExhausted(String),

    /// `receive` was called without a pending `send`.
    #[error("nothing to receive: no pending calls")]
    NothingToReceive,

    /// A canned error, returned verbatim.
    #[error("{0}")]
    Simulated(String),

    /// Registered commands left uncalled or with unconsumed responses.
    #[error("unmet expectations: {0}")]
    UnmetExpectations(String),
}

impl MockError {
    /// Build a simulated error carrying `message`.
    pub fn simulated(message: impl Into<String>) -> Self {
        MockError::Simulated(message.into())
    }
}
