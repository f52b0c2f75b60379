//! Workers as child processes, talking framed envelopes over the child's stdin and stdout.
//!
//! The child is usually the same executable. Its `main` checks [`worker_role`] first and, when set, hands
//! over to [`serve`] instead of running as a coordinator. A worker process must not write to stdout;
//! `env_logger` writes to stderr, which the child inherits.

use std::{ffi::OsString, path::PathBuf, process::Stdio};

use anyhow::{Context as _, anyhow, bail};
use log::{info, warn};

use super::{SpawnedWorker, Spawner, Terminate};
use crate::{
    bridge::BridgeConfig,
    conduit::{ConduitEnd, framed},
    context::enter_worker_process,
    lifecycle::{WorkerClass, host},
    nexus::Nexus,
};

// -------------------------------------------------------------------------------------------------------

pub const ROLE_ENV: &str = "WORKER_CLASS_ROLE";
pub const NAME_ENV: &str = "WORKER_CLASS_NAME";
pub const INSTANCE_ENV: &str = "WORKER_CLASS_INSTANCE";
pub const ARGS_ENV: &str = "WORKER_CLASS_ARGS";

const ROLE_WORKER: &str = "worker";

/// The class this process was started to serve, if it was started as a worker.
pub fn worker_role() -> Option<String> {
    match std::env::var(ROLE_ENV) {
        Ok(role) if role == ROLE_WORKER => std::env::var(NAME_ENV).ok(),
        _ => None,
    }
}

/// Runs this process as the worker side of a `T` instance until the coordinator goes away.
pub async fn serve<T: WorkerClass>() -> anyhow::Result<()> {
    enter_worker_process();

    let class = worker_role().ok_or_else(|| anyhow!("{} is not set to worker", ROLE_ENV))?;
    if class != T::NAME {
        bail!("started to serve {}, but asked to serve {}", class, T::NAME);
    }

    let name = std::env::var(INSTANCE_ENV).unwrap_or_else(|_| format!("{}#worker", T::NAME));
    let raw_args = std::env::var(ARGS_ENV).with_context(|| format!("{} is not set", ARGS_ENV))?;
    let args: T::Args = serde_json::from_str(&raw_args)
        .with_context(|| format!("invalid constructor arguments for {}", T::NAME))?;

    let end = ConduitEnd {
        sink: framed::sink(tokio::io::stdout()),
        source: framed::source(tokio::io::stdin()),
    };

    let nexus = Nexus::start(&format!("{}/process", name)).await?;
    let instance = host::<T>(&nexus, name.clone(), args, end, BridgeConfig::default()).await?;
    info!("Worker process serving {}", name);

    instance.link().closed().await;
    info!("Worker process for {} done", name);

    nexus.shutdown().await;
    Ok(())
}

// -------------------------------------------------------------------------------------------------------

/// Starts the worker as a child process. The child is killed when its instance is terminated, and at the
/// latest when the coordinator drops it.
#[derive(Clone, Debug, Default)]
pub struct ProcessSpawner {
    program: Option<PathBuf>,
    args: Vec<OsString>,
}

impl ProcessSpawner {
    /// re-executes the running binary
    pub fn current_exe() -> Self {
        Self::default()
    }

    pub fn program(path: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(path.into()),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl Spawner for ProcessSpawner {
    fn spawn<T: WorkerClass>(
        &self,
        name: &str,
        args: &T::Args,
        _config: &BridgeConfig,
    ) -> anyhow::Result<SpawnedWorker> {
        let program = match &self.program {
            Some(program) => program.clone(),
            None => std::env::current_exe().context("failed to locate the current executable")?,
        };

        let mut command = tokio::process::Command::new(&program);
        command
            .args(&self.args)
            .env(ROLE_ENV, ROLE_WORKER)
            .env(NAME_ENV, T::NAME)
            .env(INSTANCE_ENV, name)
            .env(ARGS_ENV, serde_json::to_string(args)?)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to start worker process {}", program.display()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("worker process has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("worker process has no stdout"))?;

        info!("Started worker process {:?} for {}", child.id(), name);

        Ok(SpawnedWorker {
            end: ConduitEnd {
                sink: framed::sink(stdin),
                source: framed::source(stdout),
            },
            terminator: Box::new(ProcessTerminator { child }),
        })
    }
}

struct ProcessTerminator {
    child: tokio::process::Child,
}

impl Terminate for ProcessTerminator {
    fn terminate(mut self: Box<Self>) {
        if let Err(err) = self.child.start_kill() {
            // already exited
            warn!("Failed to kill worker process {:?}: {}", self.child.id(), err);
        }
    }
}
