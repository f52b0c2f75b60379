use std::{cell::Cell, fmt::Display, sync::OnceLock};

use serde::{Deserialize, Serialize};

// -------------------------------------------------------------------------------------------------------

/// One of the two execution contexts an instance lives in.
///
/// On the wire this is the `methodType` of a request or response: the context the method is declared
/// to run in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    /// the side that created the instance and owns the channel to the worker
    Coordinator,
    /// the spawned side that mirrors the instance
    Worker,
}

impl Context {
    /// The context of the code that is currently running.
    ///
    /// This is `Worker` inside a spawned worker thread or worker process and `Coordinator` everywhere
    /// else. It is fixed when the context starts and never changes afterwards.
    pub fn current() -> Context {
        if let Some(context) = THREAD_CONTEXT.with(|c| c.get()) {
            return context;
        }
        PROCESS_CONTEXT
            .get()
            .copied()
            .unwrap_or(Context::Coordinator)
    }

    /// the other side of the channel
    pub fn peer(self) -> Context {
        match self {
            Context::Coordinator => Context::Worker,
            Context::Worker => Context::Coordinator,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Context::Coordinator => "coordinator",
            Context::Worker => "worker",
        }
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn is_coordinator() -> bool {
    Context::current() == Context::Coordinator
}

pub fn is_worker() -> bool {
    Context::current() == Context::Worker
}

// -------------------------------------------------------------------------------------------------------

thread_local! {
    static THREAD_CONTEXT: Cell<Option<Context>> = const { Cell::new(None) };
}

static PROCESS_CONTEXT: OnceLock<Context> = OnceLock::new();

/// Marks the calling thread as a worker context. Called once, first thing on a worker thread.
pub(crate) fn enter_worker_thread() {
    THREAD_CONTEXT.with(|c| c.set(Some(Context::Worker)));
}

/// Marks the whole process as a worker context. Called once, first thing in a worker process.
pub(crate) fn enter_worker_process() {
    if PROCESS_CONTEXT.set(Context::Worker).is_err() {
        log::warn!("process context was already set, ignoring");
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
