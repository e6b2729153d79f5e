//! Canned responses and the per-command queue that hands them out.

use crate::error::MockError;
use crate::reply::Reply;
use std::collections::VecDeque;

/// One canned outcome for a registered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Successful reply
    Value(Reply),
    /// Error returned verbatim as the call's failure
    Error(String),
}

impl Response {
    /// Turn this entry into the outcome of the call consuming it.
    pub fn into_result(self) -> Result<Reply, MockError> {
        match self {
            Response::Value(reply) => Ok(reply),
            Response::Error(message) => Err(MockError::Simulated(message)),
        }
    }
}

/// FIFO of responses; each entry is consumed at most once.
#[derive(Debug, Default)]
pub struct ResponseQueue {
    entries: VecDeque<Response>,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response at the tail.
    pub fn append(&mut self, response: Response) {
        self.entries.push_back(response);
    }

    /// Remove the head response, or `None` once drained.
    pub fn pop_next(&mut self) -> Option<Response> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
