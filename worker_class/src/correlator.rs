use std::collections::HashMap;

use ractor::RpcReplyPort;
use serde_json::Value;

use crate::{
    envelope::{CallId, Response},
    error::RemoteError,
};

// -------------------------------------------------------------------------------------------------------

pub type CallOutcome = Result<Value, RemoteError>;

/// What happened to a response handed to the correlator.
#[derive(Debug, PartialEq, Eq)]
pub enum Settled {
    /// the waiting caller received the outcome
    Delivered,
    /// the entry existed, but its caller had already given up (timeout or dropped future)
    Abandoned,
    /// no entry for this call-id: already settled, or never issued
    Unknown,
}

/// The pending callback table of one instance: call-id to the port of the caller waiting for it.
///
/// Owned by the instance's bridge actor and only touched from its message handler.
pub struct PendingCalls {
    open: HashMap<CallId, RpcReplyPort<CallOutcome>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self {
            open: HashMap::new(),
        }
    }

    /// Registers a caller. Entries whose caller already went away are purged first.
    pub fn insert(&mut self, id: CallId, reply: RpcReplyPort<CallOutcome>) {
        self.open.retain(|_, port| !port.is_closed());

        if let Some(previous) = self.open.insert(id.clone(), reply) {
            // nonces are unique, so this only happens if a generator was shared incorrectly
            log::error!("call id {} was registered twice, dropping the older caller", id);
            drop(previous);
        }
    }

    /// Removes the entry for the response's call-id and completes it. Each entry completes at most once.
    pub fn settle(&mut self, response: Response) -> Settled {
        let id = response.call_id();
        let Some(port) = self.open.remove(&id) else {
            return Settled::Unknown;
        };

        match port.send(response.into_outcome()) {
            Ok(()) => Settled::Delivered,
            Err(_) => Settled::Abandoned,
        }
    }

    pub fn contains(&self, id: &CallId) -> bool {
        self.open.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Drops every entry. Their callers observe a closed channel.
    pub fn reject_all(&mut self) -> usize {
        let count = self.open.len();
        self.open.clear();
        count
    }
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
