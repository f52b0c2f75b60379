//! Starting the remote context of an instance.

pub mod process;
mod thread;

pub use thread::ThreadSpawner;
pub use process::ProcessSpawner;

use crate::{bridge::BridgeConfig, conduit::ConduitEnd, lifecycle::WorkerClass};

// -------------------------------------------------------------------------------------------------------

/// Forcibly ends a worker context.
pub trait Terminate: Send {
    fn terminate(self: Box<Self>);
}

/// A freshly started worker: the coordinator's end of its channel, and the means to stop it.
pub struct SpawnedWorker {
    pub end: ConduitEnd,
    pub terminator: Box<dyn Terminate>,
}

pub trait Spawner {
    /// Starts a worker context that will construct its own `T` from `args`. Returns without waiting
    /// for the worker to be ready.
    fn spawn<T: WorkerClass>(
        &self,
        name: &str,
        args: &T::Args,
        config: &BridgeConfig,
    ) -> anyhow::Result<SpawnedWorker>;
}
