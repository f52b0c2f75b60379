pub mod framed;

use futures::{Sink, SinkExt, Stream, StreamExt, channel::mpsc};
use log::{error, info, warn};
use ractor::ActorRef;
use std::pin::Pin;

use crate::bridge::BridgeMessage;

// -------------------------------------------------------------------------------------------------------

pub enum ConduitMessage {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<String>),
}

pub type ConduitError = anyhow::Error;

pub type ConduitSink = Pin<Box<dyn Sink<ConduitMessage, Error = ConduitError> + Send>>;
pub type ConduitSource = Pin<Box<dyn Stream<Item = Result<ConduitMessage, ConduitError>> + Send>>;

/// One side of a duplex channel.
pub struct ConduitEnd {
    pub sink: ConduitSink,
    pub source: ConduitSource,
}

/// An in-memory duplex channel. Whatever is sent into one end comes out of the other, in order.
pub fn duplex(capacity: usize) -> (ConduitEnd, ConduitEnd) {
    let (tx1, rx1) = mpsc::channel::<ConduitMessage>(capacity);
    let (tx2, rx2) = mpsc::channel::<ConduitMessage>(capacity);

    let a = ConduitEnd {
        sink: Box::pin(tx1.sink_map_err(|e| ConduitError::msg(e.to_string()))),
        source: Box::pin(rx2.map(Ok)),
    };
    let b = ConduitEnd {
        sink: Box::pin(tx2.sink_map_err(|e| ConduitError::msg(e.to_string()))),
        source: Box::pin(rx1.map(Ok)),
    };
    (a, b)
}

// -------------------------------------------------------------------------------------------------------

/// Feeds every frame received on `source` to the bridge, in receipt order, until the channel ends.
pub async fn receive_loop(
    mut source: ConduitSource,
    identifier: String,
    bridge: ActorRef<BridgeMessage>,
) {
    while let Some(msg) = source.next().await {
        match msg {
            Ok(ConduitMessage::Text(text)) => {
                if let Err(err) = bridge.cast(BridgeMessage::Inbound(text)) {
                    error!("Error forwarding frame to bridge {}: {}", identifier, err);
                    break;
                }
            }
            Ok(ConduitMessage::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => {
                    if let Err(err) = bridge.cast(BridgeMessage::Inbound(text)) {
                        error!("Error forwarding frame to bridge {}: {}", identifier, err);
                        break;
                    }
                }
                Err(err) => {
                    warn!("Dropping non-utf8 binary frame on {}: {}", identifier, err);
                }
            },
            Ok(ConduitMessage::Close(reason)) => {
                info!(
                    "Channel {} closed by peer because of reason: {:?}",
                    identifier, reason
                );
                break;
            }
            Err(e) => {
                error!("Error receiving frame on {}: {}", identifier, e);
                break;
            }
        }
    }

    info!("Channel {} closed", identifier);
    let _ = bridge.cast(BridgeMessage::Close);
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
