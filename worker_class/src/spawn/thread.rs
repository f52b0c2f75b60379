use log::{error, info};
use tokio::sync::oneshot;

use super::{SpawnedWorker, Spawner, Terminate};
use crate::{
    bridge::BridgeConfig,
    conduit::{ConduitEnd, duplex},
    context::enter_worker_thread,
    lifecycle::{WorkerClass, host},
    nexus::Nexus,
};

// -------------------------------------------------------------------------------------------------------

/// Runs the worker on its own OS thread, with its own single-threaded runtime and nexus.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn<T: WorkerClass>(
        &self,
        name: &str,
        args: &T::Args,
        config: &BridgeConfig,
    ) -> anyhow::Result<SpawnedWorker> {
        let (coordinator_end, worker_end) = duplex(config.channel_capacity);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let name = name.to_string();
        let args = args.clone();
        let config = config.clone();

        let handle = std::thread::Builder::new()
            .name(format!("worker-class:{}", T::NAME))
            .spawn(move || {
                enter_worker_thread();

                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        error!("Worker {}: failed to build runtime: {}", name, err);
                        return;
                    }
                };

                let label = name.clone();
                if let Err(err) =
                    runtime.block_on(serve_until_stopped::<T>(name, args, worker_end, config, stop_rx))
                {
                    error!("Worker {} failed: {:#}", label, err);
                }
            })?;

        Ok(SpawnedWorker {
            end: coordinator_end,
            terminator: Box::new(ThreadTerminator {
                stop: Some(stop_tx),
                handle,
            }),
        })
    }
}

async fn serve_until_stopped<T: WorkerClass>(
    name: String,
    args: T::Args,
    end: ConduitEnd,
    config: BridgeConfig,
    stop: oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let nexus = Nexus::start(&format!("{}/worker", name)).await?;
    let instance = host::<T>(&nexus, name.clone(), args, end, config).await?;

    // a dropped sender counts as a stop request too
    tokio::select! {
        _ = stop => info!("Worker {} received stop signal", name),
        _ = instance.link().closed() => info!("Worker {} channel closed", name),
    }

    nexus.shutdown().await;
    Ok(())
}

struct ThreadTerminator {
    stop: Option<oneshot::Sender<()>>,
    handle: std::thread::JoinHandle<()>,
}

impl Terminate for ThreadTerminator {
    fn terminate(mut self: Box<Self>) {
        if let Some(stop) = self.stop.take() {
            // the worker may have exited on its own already
            let _ = stop.send(());
        }
        // not joined: the thread winds down on its own, joining would block the caller's runtime
        info!(
            "Stop signal sent to worker thread {:?}",
            self.handle.thread().name().unwrap_or("<unnamed>")
        );
    }
}
