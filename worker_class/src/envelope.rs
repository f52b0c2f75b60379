use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{context::Context, error::RemoteError};

// -------------------------------------------------------------------------------------------------------

/// these are the messages that are actually sent over the wire, json encoded, one per conduit text frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// sent once by the worker when it is alive and listening
    #[serde(rename = "init")]
    Init,
    #[serde(rename = "req")]
    Request(Request),
    #[serde(rename = "res")]
    Response(Response),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(rename = "methodType")]
    pub method_type: Context,
    pub nonce: u64,
    /// positional arguments
    #[serde(default)]
    pub data: Vec<Value>,
    /// always null on a request, kept so both shapes line up
    #[serde(default)]
    pub error: Option<RemoteError>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub method: String,
    #[serde(rename = "methodType")]
    pub method_type: Context,
    pub nonce: u64,
    /// the return value, null on error
    #[serde(default)]
    pub data: Value,
    /// null on success
    #[serde(default)]
    pub error: Option<RemoteError>,
}

impl Request {
    pub fn new(id: &CallId, data: Vec<Value>) -> Self {
        Self {
            method: id.method.clone(),
            method_type: id.home,
            nonce: id.nonce,
            data,
            error: None,
        }
    }

    pub fn call_id(&self) -> CallId {
        CallId {
            method: self.method.clone(),
            home: self.method_type,
            nonce: self.nonce,
        }
    }

    /// the response answering this request, carrying either the value or the failure
    pub fn respond(&self, outcome: Result<Value, RemoteError>) -> Response {
        let (data, error) = match outcome {
            Ok(data) => (data, None),
            Err(error) => (Value::Null, Some(error)),
        };
        Response {
            method: self.method.clone(),
            method_type: self.method_type,
            nonce: self.nonce,
            data,
            error,
        }
    }
}

impl Response {
    pub fn call_id(&self) -> CallId {
        CallId {
            method: self.method.clone(),
            home: self.method_type,
            nonce: self.nonce,
        }
    }

    pub fn into_outcome(self) -> Result<Value, RemoteError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

impl Envelope {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// The routing fields of a request or response, read on their own when the rest of the envelope is
/// malformed, so the call can still be answered or settled.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Header {
    #[serde(rename = "type")]
    pub kind: String,
    pub method: String,
    #[serde(rename = "methodType")]
    pub method_type: Context,
    pub nonce: u64,
}

impl Header {
    pub fn peek(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn call_id(&self) -> CallId {
        CallId {
            method: self.method.clone(),
            home: self.method_type,
            nonce: self.nonce,
        }
    }

    /// a failed response for the call this header names
    pub fn fail(&self, error: RemoteError) -> Response {
        Response {
            method: self.method.clone(),
            method_type: self.method_type,
            nonce: self.nonce,
            data: Value::Null,
            error: Some(error),
        }
    }
}

// -------------------------------------------------------------------------------------------------------

/// Correlates one request with its one response. Unique among the in-flight calls of an instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallId {
    pub method: String,
    pub home: Context,
    pub nonce: u64,
}

impl Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.method, self.home, self.nonce)
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
