use std::{
    future::Future,
    sync::{Arc, OnceLock},
};

use log::info;
use ractor::ActorRef;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::{
    args::Args,
    ask::AskExt,
    bridge::{BridgeConfig, BridgeMessage, BridgeStats, OutboundCall},
    context::Context,
    envelope::CallId,
    error::CallError,
    nonce::NonceGenerator,
};

// -------------------------------------------------------------------------------------------------------

/// An instance's handle on its channel. Decides, per call, whether a method runs here or on the other side.
///
/// Cheap to clone; all clones talk to the same bridge.
#[derive(Clone)]
pub struct Link {
    inner: Arc<LinkInner>,
}

struct LinkInner {
    name: String,
    side: Context,
    nonces: Arc<NonceGenerator>,
    config: BridgeConfig,
    bridge: OnceLock<ActorRef<BridgeMessage>>,
    closed: watch::Receiver<bool>,
}

static_assertions::assert_impl_all!(Link: Send, Sync, Clone);

impl Link {
    /// A link that is not yet attached to a bridge. The returned sender is handed to the bridge, which
    /// flips it when it stops.
    pub(crate) fn new(
        name: String,
        side: Context,
        nonces: Arc<NonceGenerator>,
        config: BridgeConfig,
    ) -> (Self, watch::Sender<bool>) {
        let (closed_tx, closed_rx) = watch::channel(false);
        let link = Link {
            inner: Arc::new(LinkInner {
                name,
                side,
                nonces,
                config,
                bridge: OnceLock::new(),
                closed: closed_rx,
            }),
        };
        (link, closed_tx)
    }

    pub(crate) fn attach(&self, bridge: ActorRef<BridgeMessage>) {
        if self.inner.bridge.set(bridge).is_err() {
            log::warn!("link {} was attached twice, keeping the first bridge", self.inner.name);
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// the side this instance lives on
    pub fn side(&self) -> Context {
        self.inner.side
    }

    pub fn is_home(&self, home: Context) -> bool {
        self.inner.side == home
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Runs `local` if this side is the method's home, otherwise sends the arguments across and waits for
    /// the other side's answer.
    pub async fn route<A, R, F, Fut>(
        &self,
        home: Context,
        method: &'static str,
        args: A,
        local: F,
    ) -> anyhow::Result<R>
    where
        A: Args,
        R: DeserializeOwned,
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        if self.is_home(home) {
            return local(args).await;
        }

        let data = args.into_values()?;
        let value = self.call_remote(home, method, data).await?;
        Ok(serde_json::from_value(value).map_err(CallError::Decode)?)
    }

    /// Sends one request to the other side and waits for its response, untyped.
    pub async fn call_remote(
        &self,
        home: Context,
        method: &str,
        data: Vec<Value>,
    ) -> anyhow::Result<Value> {
        let bridge = self.inner.bridge.get().ok_or(CallError::NotConnected)?;
        if *self.inner.closed.borrow() {
            return Err(CallError::ChannelClosed.into());
        }

        let id = CallId {
            method: method.to_string(),
            home,
            nonce: self.inner.nonces.next(),
        };

        let outcome = bridge
            .ask(
                |reply| {
                    BridgeMessage::Call(OutboundCall {
                        id,
                        args: data,
                        reply,
                    })
                },
                self.inner.config.call_timeout,
            )
            .await?;

        outcome.map_err(anyhow::Error::new)
    }

    /// Traffic counters of this instance's bridge.
    pub async fn stats(&self) -> Result<BridgeStats, CallError> {
        let bridge = self.inner.bridge.get().ok_or(CallError::NotConnected)?;
        bridge.ask(BridgeMessage::Stats, None).await
    }

    /// whether the worker has announced itself; always true on the worker side
    pub async fn is_ready(&self) -> bool {
        self.stats().await.map(|s| s.ready).unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Resolves once the bridge has stopped, for whatever reason.
    pub async fn closed(&self) {
        let mut closed = self.inner.closed.clone();
        // a dropped sender means the bridge is gone as well
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Stops the bridge, which ends the remote context if this side started it, and waits until it
    /// is down. Pending and later calls fail with `CallError::ChannelClosed`.
    pub async fn terminate(&self) {
        let Some(bridge) = self.inner.bridge.get() else {
            return;
        };
        info!("Terminating instance {}", self.inner.name);
        bridge.stop(Some("terminated".to_string()));
        self.closed().await;
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.inner.name)
            .field("side", &self.inner.side)
            .field("closed", &self.is_closed())
            .finish()
    }
}
