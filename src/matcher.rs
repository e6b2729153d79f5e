//! Command registry and matching logic.
//!
//! Matches issued commands against registered signatures. Exact signatures
//! always win over generic ones sharing the same name, regardless of the
//! order they were registered in.

use crate::command::{Cmd, Signature};
use crate::response::{Response, ResponseQueue};

/// Position of a record inside a registry generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId {
    generation: u64,
    index: usize,
}

/// A registered signature together with its canned responses.
#[derive(Debug)]
pub struct CommandRecord {
    pub signature: Signature,
    pub responses: ResponseQueue,
    /// Number of commands matched to this record
    pub calls: u64,
}

/// Registered command records, in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    /// Bumped on every reset so ids from before the reset stop resolving
    generation: u64,
    records: Vec<CommandRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `signature`, or return the existing record with an identical one.
    pub fn register(&mut self, signature: Signature) -> RecordId {
        if let Some(index) = self.records.iter().position(|r| r.signature == signature) {
            return self.id(index);
        }

        self.records.push(CommandRecord {
            signature,
            responses: ResponseQueue::new(),
            calls: 0,
        });
        self.id(self.records.len() - 1)
    }

    /// Find the record a command resolves to.
    ///
    /// Exact signatures are scanned first, then generic ones. Among equal
    /// candidates the earliest registration wins.
    pub fn find_match(&self, cmd: &Cmd) -> Option<RecordId> {
        let exact = self.records.iter().position(|r| match &r.signature {
            Signature::Exact(registered) => registered == cmd,
            Signature::Generic(_) => false,
        });

        let found = exact.or_else(|| {
            self.records
                .iter()
                .position(|r| r.signature.is_generic() && r.signature.name() == cmd.name())
        });

        found.map(|index| self.id(index))
    }

    pub fn get(&self, id: RecordId) -> Option<&CommandRecord> {
        if id.generation != self.generation {
            return None;
        }
        self.records.get(id.index)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut CommandRecord> {
        if id.generation != self.generation {
            return None;
        }
        self.records.get_mut(id.index)
    }

    /// Append a response to a record's queue. Returns false for a stale id.
    pub fn append(&mut self, id: RecordId, response: Response) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.responses.append(response);
                true
            }
            None => false,
        }
    }

    /// Drop every record.
    pub fn reset(&mut self) {
        self.records.clear();
        self.generation += 1;
    }

    pub fn records(&self) -> impl Iterator<Item = &CommandRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn id(&self, index: usize) -> RecordId {
        RecordId {
            generation: self.generation,
            index,
        }
    }
}
