use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::{FutureExt, SinkExt};
use log::{debug, info, warn};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort, async_trait};
use serde_json::Value;
use tokio::sync::watch;

use crate::{
    conduit::{ConduitMessage, ConduitSink},
    context::Context,
    correlator::{CallOutcome, PendingCalls, Settled},
    envelope::{CallId, Envelope, Header, Request, Response},
    error::RemoteError,
    method::MethodTable,
    spawn::Terminate,
};

// -------------------------------------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// deadline for a cross-context call; `None` waits for as long as the channel is open
    pub call_timeout: Option<Duration>,
    /// buffer size of the in-memory channel used by thread workers
    pub channel_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout: None,
            channel_capacity: 64,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub requests_served: u64,
    pub responses_sent: u64,
    /// calls waiting for their response
    pub pending: usize,
    /// whether the worker's init has been observed (always true on the worker side)
    pub ready: bool,
    /// reserved, never incremented
    pub generation: u64,
}

// -------------------------------------------------------------------------------------------------------

/// The receiving end of an instance: runs the request named in an envelope against the local object.
#[async_trait::async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, request: Request) -> Response;
}

/// Dispatches requests to the annotated methods of one object, through its method table.
pub struct Dispatcher<T> {
    target: Arc<T>,
    table: MethodTable<T>,
    side: Context,
}

impl<T: Send + Sync + 'static> Dispatcher<T> {
    pub fn new(target: Arc<T>, table: MethodTable<T>, side: Context) -> Self {
        Self {
            target,
            table,
            side,
        }
    }
}

#[async_trait::async_trait]
impl<T: Send + Sync + 'static> Dispatch for Dispatcher<T> {
    async fn dispatch(&self, mut request: Request) -> Response {
        let Some(entry) = self.table.get(&request.method) else {
            warn!(
                "Request for unknown method {} (nonce {}), the peers' method sets have diverged",
                request.method, request.nonce
            );
            return request.respond(Err(RemoteError::unknown_method(&request.method)));
        };

        if entry.home != self.side || request.method_type != self.side {
            warn!(
                "Request for {} arrived on the {} side, but it runs on the {} side",
                request.method, self.side, entry.home
            );
            return request.respond(Err(RemoteError::new(
                "WrongContext",
                format!(
                    "method {} runs on the {} side, not on the {} side",
                    request.method, entry.home, self.side
                ),
            )));
        }

        // the undecorated method runs here, it never goes back through the router
        let data = std::mem::take(&mut request.data);
        let invocation = std::panic::catch_unwind(AssertUnwindSafe(|| {
            (entry.handler)(self.target.clone(), data)
        }));

        let outcome = match invocation {
            Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(RemoteError::from_anyhow(&err)),
                Err(panic) => Err(RemoteError::panicked(&request.method, &*panic)),
            },
            Err(panic) => Err(RemoteError::panicked(&request.method, &*panic)),
        };

        request.respond(outcome)
    }
}

// -------------------------------------------------------------------------------------------------------

/// A call on its way to the other side.
pub struct OutboundCall {
    pub id: CallId,
    pub args: Vec<Value>,
    pub reply: RpcReplyPort<CallOutcome>,
}

// Messages for the bridge actor
pub enum BridgeMessage {
    /// an envelope received from the channel, still json encoded
    Inbound(String),
    /// the channel reached its end
    Close,

    Call(OutboundCall),
    /// send an envelope produced off the actor (a response to a dispatched request)
    Transmit(Envelope),

    Stats(RpcReplyPort<BridgeStats>),
}

pub struct BridgeArgs {
    pub name: String,
    pub side: Context,
    pub sender: ConduitSink,
    pub dispatch: Arc<dyn Dispatch>,
    /// present on the side that started the remote context
    pub terminator: Option<Box<dyn Terminate>>,
    pub closed: watch::Sender<bool>,
}

enum Readiness {
    /// the worker has not announced itself, requests wait here in send order
    Waiting { queued: Vec<Request> },
    Ready,
}

pub struct BridgeState {
    args: BridgeArgs,
    readiness: Readiness,
    pending: PendingCalls,
    stats: BridgeStats,
}

// Bridge actor
pub struct BridgeActor;

impl BridgeState {
    async fn transmit(&mut self, envelope: &Envelope) -> Result<(), ActorProcessingErr> {
        let text = envelope.encode()?;
        self.args.sender.send(ConduitMessage::Text(text)).await?;
        self.args.sender.flush().await?;

        match envelope {
            Envelope::Request(request) => {
                debug!("{} -> req {}", self.args.name, request.call_id());
                self.stats.requests_sent += 1;
            }
            Envelope::Response(response) => {
                debug!("{} -> res {}", self.args.name, response.call_id());
                self.stats.responses_sent += 1;
            }
            Envelope::Init => debug!("{} -> init", self.args.name),
        }
        Ok(())
    }

    async fn on_init(&mut self) -> Result<(), ActorProcessingErr> {
        if self.args.side == Context::Worker {
            warn!("{} received init on the worker side, ignoring", self.args.name);
            return Ok(());
        }

        match std::mem::replace(&mut self.readiness, Readiness::Ready) {
            Readiness::Waiting { queued } => {
                info!(
                    "{} worker is ready, sending {} queued request(s)",
                    self.args.name,
                    queued.len()
                );
                self.stats.ready = true;
                for request in queued {
                    self.transmit(&Envelope::Request(request)).await?;
                }
            }
            Readiness::Ready => {
                debug!("{} received a second init, ignoring", self.args.name);
            }
        }
        Ok(())
    }

    fn on_response(&mut self, response: Response) {
        let id = response.call_id();
        debug!("{} <- res {}", self.args.name, id);
        self.stats.responses_received += 1;

        match self.pending.settle(response) {
            Settled::Delivered => {}
            Settled::Abandoned => {
                debug!("{} caller of {} is gone, dropping response", self.args.name, id)
            }
            Settled::Unknown => {
                warn!("{} received response for unknown call {}", self.args.name, id)
            }
        }
    }

    fn on_request(&mut self, myself: &ActorRef<BridgeMessage>, request: Request) {
        debug!("{} <- req {}", self.args.name, request.call_id());
        self.stats.requests_served += 1;

        // the method may call back across the channel, so it must not hold up the message pump
        let dispatch = self.args.dispatch.clone();
        let myself = myself.clone();
        let name = self.args.name.clone();
        tokio::spawn(async move {
            let response = dispatch.dispatch(request).await;
            if let Err(err) = myself.cast(BridgeMessage::Transmit(Envelope::Response(response))) {
                tracing::error!("{}: failed to hand response to bridge: {}", name, err);
            }
        });
    }

    /// A call whose routing fields are still readable is answered or settled with a decode failure,
    /// so neither side waits on it. Anything else is dropped.
    async fn on_undecodable(
        &mut self,
        text: &str,
        err: &serde_json::Error,
    ) -> Result<(), ActorProcessingErr> {
        let header = match Header::peek(text) {
            Some(header) if header.kind == "req" || header.kind == "res" => header,
            _ => {
                warn!("{} dropping undecodable envelope ({}): {}", self.args.name, err, text);
                return Ok(());
            }
        };

        warn!(
            "{} undecodable {} {} ({}), failing the call",
            self.args.name,
            header.kind,
            header.call_id(),
            err
        );
        let failed = header.fail(RemoteError::undecodable(err));
        if header.kind == "res" {
            self.on_response(failed);
        } else {
            self.stats.requests_served += 1;
            self.transmit(&Envelope::Response(failed)).await?;
        }
        Ok(())
    }

    async fn process(
        &mut self,
        myself: &ActorRef<BridgeMessage>,
        message: BridgeMessage,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            BridgeMessage::Inbound(text) => {
                let envelope = match Envelope::decode(&text) {
                    Ok(envelope) => envelope,
                    Err(err) => return self.on_undecodable(&text, &err).await,
                };

                match envelope {
                    Envelope::Init => self.on_init().await?,
                    Envelope::Request(request) => self.on_request(myself, request),
                    Envelope::Response(response) => self.on_response(response),
                }
            }

            BridgeMessage::Close => {
                info!("Closing bridge {}", self.args.name);
                myself.stop(Some("Channel closed".into()));
            }

            BridgeMessage::Call(call) => {
                let request = Request::new(&call.id, call.args);
                self.pending.insert(call.id, call.reply);

                match self.readiness {
                    Readiness::Waiting { ref mut queued } => {
                        debug!(
                            "{} queueing req {} until the worker is ready",
                            self.args.name,
                            request.call_id()
                        );
                        queued.push(request);
                    }
                    Readiness::Ready => self.transmit(&Envelope::Request(request)).await?,
                }
            }

            BridgeMessage::Transmit(envelope) => {
                self.transmit(&envelope).await?;
            }

            BridgeMessage::Stats(reply) => {
                let stats = BridgeStats {
                    pending: self.pending.len(),
                    ..self.stats
                };
                if reply.send(stats).is_err() {
                    debug!("{} stats requester went away", self.args.name);
                }
            }
        }
        Ok(())
    }
}

// Bridge actor implementation
#[async_trait]
impl Actor for BridgeActor {
    type Msg = BridgeMessage;
    type State = BridgeState;
    type Arguments = BridgeArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let readiness = match args.side {
            Context::Coordinator => Readiness::Waiting { queued: Vec::new() },
            Context::Worker => Readiness::Ready,
        };

        let mut state = BridgeState {
            stats: BridgeStats {
                ready: matches!(readiness, Readiness::Ready),
                ..BridgeStats::default()
            },
            args,
            readiness,
            pending: PendingCalls::new(),
        };

        info!("Bridge {} opened on the {} side", state.args.name, state.args.side);

        // the worker is listening as soon as its bridge exists
        if state.args.side == Context::Worker {
            state.transmit(&Envelope::Init).await?;
        }

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // a broken channel ends the bridge through a regular stop, so post_stop always runs
        if let Err(err) = state.process(&myself, message).await {
            warn!("Bridge {} failed, closing it: {}", state.args.name, err);
            myself.stop(Some(format!("Bridge failed: {}", err)));
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let abandoned = state.pending.reject_all();
        if abandoned > 0 {
            info!(
                "Bridge {} stopped with {} call(s) in flight, they fail with a closed channel",
                state.args.name, abandoned
            );
        }

        if let Some(terminator) = state.args.terminator.take() {
            info!("Terminating the worker of {}", state.args.name);
            // best effort, the peer may already be gone
            let _ = state
                .args
                .sender
                .send(ConduitMessage::Close(Some("terminated".to_string())))
                .await;
            terminator.terminate();
        }

        if state.args.closed.send(true).is_err() {
            debug!("Bridge {} stopped, nobody was watching", state.args.name);
        }
        info!("Bridge {} closed", state.args.name);
        Ok(())
    }
}

