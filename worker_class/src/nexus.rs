use log::{debug, info, warn};
use ractor::{
    Actor, ActorId, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent, async_trait,
    concurrency::{Duration, JoinHandle},
};
use std::{collections::HashMap, sync::Arc};

use crate::{
    ask::AskExt,
    bridge::{BridgeActor, BridgeArgs, BridgeMessage},
    context::Context,
    nonce::NonceGenerator,
};

// -------------------------------------------------------------------------------------------------------

// Nexus
// -------------------------------------------------------------------------------------------------------

/// how long `shutdown` waits for a single bridge to stop
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct LiveInstance {
    pub name: String,
    pub side: Context,
    pub bridge: ActorRef<BridgeMessage>,
}

// Messages for the nexus actor
pub enum NexusActorMessage {
    Open(BridgeArgs, RpcReplyPort<ActorRef<BridgeMessage>>),
    GetAll(RpcReplyPort<Vec<LiveInstance>>),
    /// stops every open bridge; replies with how many were asked to stop
    TerminateAll(Option<RpcReplyPort<usize>>),
}

// Nexus actor state
pub struct NexusActor;
pub struct NexusActorState {
    name: String,
    bridges: HashMap<ActorId, (LiveInstance, JoinHandle<()>)>,
}

pub struct NexusActorArgs {
    pub name: String,
}

// Nexus actor implementation
#[async_trait]
impl Actor for NexusActor {
    type Msg = NexusActorMessage;
    type State = NexusActorState;
    type Arguments = NexusActorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!("Nexus {} started on the {} side", args.name, Context::current());
        Ok(NexusActorState {
            name: args.name,
            bridges: HashMap::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            NexusActorMessage::Open(args, reply) => {
                let name = args.name.clone();
                let side = args.side;
                debug!("Nexus {} opening bridge {}", state.name, name);

                let (actor_ref, handle) =
                    BridgeActor::spawn_linked(None, BridgeActor, args, myself.get_cell()).await?;

                state.bridges.insert(
                    actor_ref.get_id(),
                    (
                        LiveInstance {
                            name,
                            side,
                            bridge: actor_ref.clone(),
                        },
                        handle,
                    ),
                );

                reply.send(actor_ref)?;
            }

            NexusActorMessage::GetAll(reply) => {
                let instances: Vec<_> = state.bridges.values().map(|v| &v.0).cloned().collect();
                reply.send(instances)?;
            }

            NexusActorMessage::TerminateAll(reply) => {
                let count = state.bridges.len();
                if count > 0 {
                    info!("Nexus {} terminating {} instance(s)", state.name, count);
                }
                for (instance, _) in state.bridges.values() {
                    instance.bridge.stop(Some("terminate all".to_string()));
                }
                if let Some(reply) = reply {
                    reply.send(count)?;
                }
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        event: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match &event {
            SupervisionEvent::ActorTerminated(actor, _last_state, reason) => {
                if let Some((instance, _)) = state.bridges.remove(&actor.get_id()) {
                    info!("Bridge {} terminated: {:?}", instance.name, reason);
                }
            }
            SupervisionEvent::ActorFailed(actor, err) => {
                if let Some((instance, _)) = state.bridges.remove(&actor.get_id()) {
                    warn!("Bridge {} terminated because it failed: {:?}", instance.name, err);
                }
            }
            _ => (),
        }

        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------------

/// The per-context registry: owns the nonce generator and supervises every bridge opened in this context.
#[derive(Clone)]
pub struct Nexus {
    actor: ActorRef<NexusActorMessage>,
    nonces: Arc<NonceGenerator>,
}

impl Nexus {
    pub async fn start(name: &str) -> anyhow::Result<Self> {
        Self::start_with_nonces(name, Arc::new(NonceGenerator::new())).await
    }

    /// starts a nexus whose instances draw their nonces from `nonces`
    pub async fn start_with_nonces(name: &str, nonces: Arc<NonceGenerator>) -> anyhow::Result<Self> {
        let (actor, _handle) = NexusActor::spawn(
            None,
            NexusActor,
            NexusActorArgs {
                name: name.to_string(),
            },
        )
        .await
        .map_err(|err| anyhow::anyhow!("failed to start nexus {}: {}", name, err))?;

        Ok(Self { actor, nonces })
    }

    pub fn nonces(&self) -> Arc<NonceGenerator> {
        self.nonces.clone()
    }

    pub(crate) async fn open(&self, args: BridgeArgs) -> anyhow::Result<ActorRef<BridgeMessage>> {
        let bridge = self
            .actor
            .ask(|reply| NexusActorMessage::Open(args, reply), None)
            .await?;
        Ok(bridge)
    }

    /// the instances whose bridge is still open
    pub async fn live_instances(&self) -> anyhow::Result<Vec<LiveInstance>> {
        Ok(self.actor.ask(NexusActorMessage::GetAll, None).await?)
    }

    /// Stops every live bridge without waiting for them to finish.
    pub async fn terminate_all(&self) -> anyhow::Result<usize> {
        Ok(self
            .actor
            .ask(|reply| NexusActorMessage::TerminateAll(Some(reply)), None)
            .await?)
    }

    /// Stops every live bridge, waits until each is down, then stops the nexus itself.
    pub async fn shutdown(&self) {
        let instances = self.live_instances().await.unwrap_or_default();
        for instance in instances {
            if let Err(err) = instance
                .bridge
                .stop_and_wait(Some("shutdown".to_string()), Some(SHUTDOWN_GRACE))
                .await
            {
                warn!("Bridge {} did not stop cleanly: {}", instance.name, err);
            }
        }

        if let Err(err) = self.actor.stop_and_wait(None, Some(SHUTDOWN_GRACE)).await {
            warn!("Nexus did not stop cleanly: {}", err);
        }
    }

    /// A guard that terminates every live instance of this nexus when it is dropped, typically at the end
    /// of `main`. Each worker is ended even if its instance was never terminated explicitly.
    ///
    /// Holding one is not needed to avoid leaking workers. Without it they still end with the process:
    /// child processes are spawned with `kill_on_drop`, and a thread worker stops once its stop sender
    /// is dropped or its channel closes. The guard makes that shutdown orderly, so pending calls are
    /// rejected and the peer gets a close frame first.
    pub fn exit_guard(&self) -> ExitGuard {
        ExitGuard {
            actor: self.actor.clone(),
        }
    }
}

pub struct ExitGuard {
    actor: ActorRef<NexusActorMessage>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        // nothing to do if the nexus is already gone
        let _ = self.actor.cast(NexusActorMessage::TerminateAll(None));
    }
}
