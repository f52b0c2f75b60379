//! A coordinator-side instance talking to a hand-driven peer: the test plays the worker and reads and
//! writes raw envelopes.

use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use worker_class::{
    Context, Nexus, RemoteError, WorkerClass,
    bridge::BridgeConfig,
    conduit::{ConduitEnd, ConduitMessage, duplex},
    lifecycle::attach,
};

use crate::counter::{Counter, CounterArgs};

struct Peer {
    end: ConduitEnd,
}

impl Peer {
    async fn send(&mut self, envelope: Value) -> anyhow::Result<()> {
        self.end
            .sink
            .send(ConduitMessage::Text(serde_json::to_string(&envelope)?))
            .await
    }

    async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.end.sink.send(ConduitMessage::Text(text.to_string())).await
    }

    async fn recv(&mut self) -> anyhow::Result<Value> {
        match tokio::time::timeout(Duration::from_secs(5), self.end.source.next()).await? {
            Some(Ok(ConduitMessage::Text(text))) => Ok(serde_json::from_str(&text)?),
            Some(Ok(ConduitMessage::Binary(_))) => anyhow::bail!("expected text, got binary"),
            Some(Ok(ConduitMessage::Close(_))) => anyhow::bail!("expected text, got close"),
            Some(Err(err)) => Err(err),
            None => anyhow::bail!("channel ended"),
        }
    }

    /// nothing arrives within `wait`
    async fn silent_for(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.end.source.next()).await.is_err()
    }

    async fn respond(&mut self, request: &Value, data: Value) -> anyhow::Result<()> {
        self.send(json!({
            "type": "res",
            "method": request["method"],
            "methodType": request["methodType"],
            "nonce": request["nonce"],
            "data": data,
            "error": null,
        }))
        .await
    }
}

async fn coordinator_with_peer(nexus: &Nexus, seed: i64) -> anyhow::Result<(Arc<Counter>, Peer)> {
    let (ours, theirs) = duplex(16);
    let counter = attach::<Counter>(
        nexus,
        Context::Coordinator,
        "counter#peer".to_string(),
        CounterArgs { seed },
        ours,
        None,
        BridgeConfig::default(),
    )
    .await?;
    Ok((counter, Peer { end: theirs }))
}

#[tokio::test]
pub async fn test_requests_wait_for_init() -> anyhow::Result<()> {
    let nexus = Nexus::start("wire: init gating").await?;
    let (counter, mut peer) = coordinator_with_peer(&nexus, 0).await?;

    let call = {
        let counter = counter.clone();
        tokio::spawn(async move { counter.get_worker_counter().await })
    };

    assert!(peer.silent_for(Duration::from_millis(100)).await);
    assert!(!counter.link().is_ready().await);

    peer.send(json!({ "type": "init" })).await?;

    let request = peer.recv().await?;
    assert_eq!(request["type"], "req");
    assert_eq!(request["method"], "get_worker_counter");
    assert_eq!(request["methodType"], "worker");
    assert_eq!(request["data"], json!([]));
    assert_eq!(request["error"], Value::Null);
    assert!(request["nonce"].as_u64().unwrap_or(0) >= 1);

    peer.respond(&request, json!(17)).await?;
    assert_eq!(call.await??, 17);

    // a second init changes nothing
    peer.send(json!({ "type": "init" })).await?;
    assert!(counter.link().is_ready().await);

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_out_of_order_responses_are_correlated() -> anyhow::Result<()> {
    let nexus = Nexus::start("wire: out of order").await?;
    let (counter, mut peer) = coordinator_with_peer(&nexus, 0).await?;
    peer.send(json!({ "type": "init" })).await?;

    let first = {
        let counter = counter.clone();
        tokio::spawn(async move { counter.add_to_worker_counter(1).await })
    };
    let first_request = peer.recv().await?;

    let second = {
        let counter = counter.clone();
        tokio::spawn(async move { counter.add_to_worker_counter(2).await })
    };
    let second_request = peer.recv().await?;

    assert_eq!(first_request["data"], json!([1]));
    assert_eq!(second_request["data"], json!([2]));
    assert_ne!(first_request["nonce"], second_request["nonce"]);

    peer.respond(&second_request, json!(200)).await?;
    peer.respond(&first_request, json!(100)).await?;

    assert_eq!(first.await??, 100);
    assert_eq!(second.await??, 200);

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_unknown_responses_and_garbage_are_dropped() -> anyhow::Result<()> {
    let nexus = Nexus::start("wire: unknown").await?;
    let (counter, mut peer) = coordinator_with_peer(&nexus, 0).await?;
    peer.send(json!({ "type": "init" })).await?;

    peer.send(json!({
        "type": "res",
        "method": "get_worker_counter",
        "methodType": "worker",
        "nonce": 999_999,
        "data": 1,
        "error": null,
    }))
    .await?;
    peer.send_raw("this is not an envelope").await?;
    peer.send(json!({ "type": "ping" })).await?;

    // the instance still works
    let call = {
        let counter = counter.clone();
        tokio::spawn(async move { counter.get_worker_counter().await })
    };
    let request = peer.recv().await?;
    peer.respond(&request, json!(5)).await?;
    assert_eq!(call.await??, 5);

    let stats = counter.link().stats().await?;
    assert_eq!(stats.responses_received, 2);
    assert_eq!(stats.pending, 0);

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_serves_requests_from_the_peer() -> anyhow::Result<()> {
    let nexus = Nexus::start("wire: serving").await?;
    let (_counter, mut peer) = coordinator_with_peer(&nexus, 10).await?;

    peer.send(json!({
        "type": "req",
        "method": "get_main_counter",
        "methodType": "coordinator",
        "nonce": 1,
        "data": [],
        "error": null,
    }))
    .await?;

    let response = peer.recv().await?;
    assert_eq!(response["type"], "res");
    assert_eq!(response["method"], "get_main_counter");
    assert_eq!(response["methodType"], "coordinator");
    assert_eq!(response["nonce"], 1);
    assert_eq!(response["data"], 10);
    assert_eq!(response["error"], Value::Null);

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_failures_are_sent_back_as_errors() -> anyhow::Result<()> {
    let nexus = Nexus::start("wire: failures").await?;
    let (_counter, mut peer) = coordinator_with_peer(&nexus, 0).await?;

    let request = |method: &str, method_type: &str, nonce: u64| {
        json!({
            "type": "req",
            "method": method,
            "methodType": method_type,
            "nonce": nonce,
            "data": [],
            "error": null,
        })
    };

    peer.send(request("throw_in_main", "coordinator", 1)).await?;
    let response = peer.recv().await?;
    assert_eq!(response["data"], Value::Null);
    let error: RemoteError = serde_json::from_value(response["error"].clone())?;
    assert_eq!(error.message, "Thrown in main.");

    peer.send(request("no_such_method", "coordinator", 2)).await?;
    let response = peer.recv().await?;
    let error: RemoteError = serde_json::from_value(response["error"].clone())?;
    assert_eq!(error.name, "UnknownMethod");

    // homed on the worker, so the coordinator refuses to run it
    peer.send(request("get_worker_counter", "worker", 3)).await?;
    let response = peer.recv().await?;
    let error: RemoteError = serde_json::from_value(response["error"].clone())?;
    assert_eq!(error.name, "WrongContext");

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_peer_hanging_up_closes_the_instance() -> anyhow::Result<()> {
    let nexus = Nexus::start("wire: hang up").await?;
    let (counter, mut peer) = coordinator_with_peer(&nexus, 0).await?;
    peer.send(json!({ "type": "init" })).await?;

    let call = {
        let counter = counter.clone();
        tokio::spawn(async move { counter.get_worker_counter().await })
    };
    let _request = peer.recv().await?;
    drop(peer);

    let err = tokio::time::timeout(Duration::from_secs(5), call).await??.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<worker_class::CallError>(),
        Some(worker_class::CallError::ChannelClosed)
    ));
    tokio::time::timeout(Duration::from_secs(5), counter.link().closed()).await?;

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_loose_and_malformed_errors_still_settle_the_call() -> anyhow::Result<()> {
    let nexus = Nexus::start("wire: loose errors").await?;
    let (counter, mut peer) = coordinator_with_peer(&nexus, 0).await?;
    peer.send(json!({ "type": "init" })).await?;

    let failure_for = |error: Value| {
        move |request: &Value| {
            json!({
                "type": "res",
                "method": request["method"],
                "methodType": request["methodType"],
                "nonce": request["nonce"],
                "data": null,
                "error": error,
            })
        }
    };

    let cases = [
        (failure_for(json!({ "message": "boom" })), "Error", "boom"),
        (failure_for(json!("bare boom")), "Error", "bare boom"),
        (failure_for(json!(7)), "Decode", ""),
    ];

    for (answer, name, message) in cases {
        let call = {
            let counter = counter.clone();
            tokio::spawn(async move { counter.get_worker_counter().await })
        };
        let request = peer.recv().await?;
        peer.send(answer(&request)).await?;

        let err = tokio::time::timeout(Duration::from_secs(5), call).await??.unwrap_err();
        let remote = err
            .downcast_ref::<RemoteError>()
            .ok_or_else(|| anyhow::anyhow!("expected a remote error, got {err:#}"))?;
        assert_eq!(remote.name, name);
        if !message.is_empty() {
            assert_eq!(remote.message, message);
        }
    }

    let stats = counter.link().stats().await?;
    assert_eq!(stats.responses_received, 3);
    assert_eq!(stats.pending, 0);

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_malformed_requests_are_answered_with_an_error() -> anyhow::Result<()> {
    let nexus = Nexus::start("wire: malformed request").await?;
    let (_counter, mut peer) = coordinator_with_peer(&nexus, 0).await?;

    peer.send(json!({
        "type": "req",
        "method": "get_main_counter",
        "methodType": "coordinator",
        "nonce": 1,
        "data": 5,
    }))
    .await?;

    let response = peer.recv().await?;
    assert_eq!(response["type"], "res");
    assert_eq!(response["method"], "get_main_counter");
    assert_eq!(response["methodType"], "coordinator");
    assert_eq!(response["nonce"], 1);
    assert_eq!(response["data"], Value::Null);
    let error: RemoteError = serde_json::from_value(response["error"].clone())?;
    assert_eq!(error.name, "Decode");

    // the instance keeps serving well-formed requests
    peer.send(json!({
        "type": "req",
        "method": "get_main_counter",
        "methodType": "coordinator",
        "nonce": 2,
        "data": [],
        "error": null,
    }))
    .await?;
    let response = peer.recv().await?;
    assert_eq!(response["nonce"], 2);
    assert_eq!(response["data"], 0);

    nexus.shutdown().await;
    Ok(())
}
