pub mod args;
mod ask;
pub mod bridge;
pub mod conduit;
pub mod context;
pub mod correlator;
pub mod envelope;
pub mod error;
pub mod lifecycle;
pub mod link;
pub mod method;
pub mod nexus;
pub mod nonce;
pub mod spawn;

extern crate self as worker_class;

pub use context::{Context, is_coordinator, is_worker};
pub use error::{CallError, DefinitionError, RemoteError};
pub use lifecycle::{WorkerClass, spawn, spawn_with, terminate};
pub use link::Link;
pub use method::{MethodTable, MethodTableBuilder, Routed};
pub use nexus::Nexus;

#[cfg(feature = "derive")]
pub use worker_class_derive::methods;

/// items the `#[methods]` expansion refers to
#[doc(hidden)]
pub mod __private {
    pub use anyhow;
    pub use std::sync::Arc;
}
