use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// -------------------------------------------------------------------------------------------------------

/// Failures of the call machinery itself, as opposed to failures of the called method.
#[derive(Debug, Error)]
pub enum CallError {
    /// the channel to the peer is gone: the instance was terminated or the peer exited
    #[error("channel closed before the call completed")]
    ChannelClosed,

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// the instance has not been attached to a bridge yet (e.g. a call from inside its constructor)
    #[error("instance is not connected to a channel")]
    NotConnected,

    #[error("failed to encode call payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode call payload: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Misuse of the registration step. Raised when a method table is built, before any channel exists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("annotated methods need a non-empty name")]
    EmptyMethodName,

    #[error("method `{0}` is registered more than once")]
    DuplicateMethod(String),
}

// -------------------------------------------------------------------------------------------------------

/// A failure that happened on the other side of the channel, in serialized form.
///
/// `Display` prints only the message, so a remote failure reads exactly like the local one.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(from = "WireRemoteError")]
#[error("{message}")]
pub struct RemoteError {
    pub name: String,
    pub message: String,
    /// the rest of the error chain, outermost first
    pub causes: Vec<String>,
}

/// Shapes a peer may put in the `error` field: the full object, an object with only a message, or a
/// bare message string.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireRemoteError {
    Structured {
        #[serde(default = "default_error_name")]
        name: String,
        message: String,
        #[serde(default)]
        causes: Vec<String>,
    },
    Message(String),
}

fn default_error_name() -> String {
    "Error".to_string()
}

impl From<WireRemoteError> for RemoteError {
    fn from(wire: WireRemoteError) -> Self {
        match wire {
            WireRemoteError::Structured {
                name,
                message,
                causes,
            } => Self {
                name,
                message,
                causes,
            },
            WireRemoteError::Message(message) => Self::new(default_error_name(), message),
        }
    }
}

impl RemoteError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            causes: Vec::new(),
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        // a failure that crossed the channel before keeps its original name
        if let Some(remote) = err.downcast_ref::<RemoteError>() {
            return remote.clone();
        }

        let name = if err.downcast_ref::<CallError>().is_some() {
            "CallError"
        } else {
            "Error"
        };

        Self {
            name: name.to_string(),
            message: err.to_string(),
            causes: err.chain().skip(1).map(|cause| cause.to_string()).collect(),
        }
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new("UnknownMethod", format!("unknown method: {method}"))
    }

    /// the envelope carrying a call arrived, but its payload could not be read
    pub fn undecodable(err: &serde_json::Error) -> Self {
        Self::new("Decode", format!("undecodable envelope: {err}"))
    }

    pub fn panicked(method: &str, payload: &(dyn std::any::Any + Send)) -> Self {
        let detail = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_string()
        };
        Self::new("Panic", format!("method {method} panicked: {detail}"))
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
