use std::sync::Arc;

use log::info;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    bridge::{BridgeArgs, BridgeConfig, Dispatcher},
    conduit::{ConduitEnd, receive_loop},
    context::Context,
    link::Link,
    method::Routed,
    nexus::Nexus,
    spawn::{Spawner, Terminate, ThreadSpawner},
};

// -------------------------------------------------------------------------------------------------------

/// A type whose annotated methods are split between a coordinator and a worker context.
///
/// Both sides build their own instance from the same constructor arguments and keep their own state
/// from then on; only the method calls cross the channel.
pub trait WorkerClass: Routed {
    type Args: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// identifies the class across the channel, e.g. when a worker process picks what to serve
    const NAME: &'static str;

    fn construct(args: Self::Args, link: Link) -> anyhow::Result<Self>;

    fn link(&self) -> &Link;
}

/// Creates an instance on this side and starts its worker on a dedicated thread. Does not wait for the
/// worker; calls made before it is ready are held back until it is.
pub async fn spawn<T: WorkerClass>(nexus: &Nexus, args: T::Args) -> anyhow::Result<Arc<T>> {
    spawn_with::<T, _>(nexus, &ThreadSpawner, args, BridgeConfig::default()).await
}

pub async fn spawn_with<T, S>(
    nexus: &Nexus,
    spawner: &S,
    args: T::Args,
    config: BridgeConfig,
) -> anyhow::Result<Arc<T>>
where
    T: WorkerClass,
    S: Spawner,
{
    let name = instance_name::<T>();
    let worker = spawner.spawn::<T>(&name, &args, &config)?;
    info!("Spawned worker for {}", name);

    attach::<T>(
        nexus,
        Context::Coordinator,
        name,
        args,
        worker.end,
        Some(worker.terminator),
        config,
    )
    .await
}

/// The worker half: builds the mirror instance and answers the coordinator over `end`.
pub async fn host<T: WorkerClass>(
    nexus: &Nexus,
    name: String,
    args: T::Args,
    end: ConduitEnd,
    config: BridgeConfig,
) -> anyhow::Result<Arc<T>> {
    attach::<T>(nexus, Context::Worker, name, args, end, None, config).await
}

/// Ends the instance's channel and, on the coordinator, its worker.
pub async fn terminate<T: WorkerClass>(instance: &T) {
    instance.link().terminate().await;
}

/// Wires one side of an instance: method table, link, the object itself, then its bridge.
pub async fn attach<T: WorkerClass>(
    nexus: &Nexus,
    side: Context,
    name: String,
    args: T::Args,
    end: ConduitEnd,
    terminator: Option<Box<dyn Terminate>>,
    config: BridgeConfig,
) -> anyhow::Result<Arc<T>> {
    // definition errors surface before anything is sent
    let table = T::method_table()?;

    let (link, closed) = Link::new(name.clone(), side, nexus.nonces(), config);
    let target = Arc::new(T::construct(args, link.clone())?);
    let dispatch = Arc::new(Dispatcher::new(target.clone(), table, side));

    let bridge = nexus
        .open(BridgeArgs {
            name: name.clone(),
            side,
            sender: end.sink,
            dispatch,
            terminator,
            closed,
        })
        .await?;
    link.attach(bridge.clone());

    tokio::spawn(receive_loop(end.source, name, bridge));

    Ok(target)
}

fn instance_name<T: WorkerClass>() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}#{}", T::NAME, &id[..8])
}
