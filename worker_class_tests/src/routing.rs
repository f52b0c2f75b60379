use std::{sync::Arc, time::Duration};

use worker_class::{Context, Nexus, WorkerClass};

use crate::counter::{Counter, CounterArgs};

async fn counter(nexus: &Nexus, seed: i64) -> anyhow::Result<Arc<Counter>> {
    worker_class::spawn::<Counter>(nexus, CounterArgs { seed }).await
}

#[tokio::test]
pub async fn test_home_calls_stay_local() -> anyhow::Result<()> {
    let nexus = Nexus::start("routing: home").await?;
    let counter = counter(&nexus, 0).await?;

    assert_eq!(counter.increment_main_counter().await?, 1);
    assert_eq!(counter.get_main_counter().await?, 1);
    assert_eq!(counter.main_side().await?, Context::Coordinator);

    let stats = counter.link().stats().await?;
    assert_eq!(stats.requests_sent, 0);
    assert_eq!(stats.responses_received, 0);
    assert_eq!(stats.pending, 0);

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_remote_call_is_one_request_and_one_response() -> anyhow::Result<()> {
    let nexus = Nexus::start("routing: remote").await?;
    let counter = counter(&nexus, 0).await?;

    let value = tokio::time::timeout(Duration::from_secs(5), counter.increment_worker_counter())
        .await??;
    assert_eq!(value, 1);
    assert_eq!(counter.worker_side().await?, Context::Worker);

    let stats = counter.link().stats().await?;
    assert_eq!(stats.requests_sent, 2);
    assert_eq!(stats.responses_received, 2);
    assert_eq!(stats.requests_served, 0);
    assert_eq!(stats.pending, 0);
    assert!(stats.ready);

    // the coordinator's copy of the worker counter was never touched
    assert_eq!(counter.local_snapshot(), (0, 0));

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_seed_reaches_both_sides() -> anyhow::Result<()> {
    let nexus = Nexus::start("routing: seed").await?;
    let counter = counter(&nexus, 10).await?;

    assert_eq!(counter.get_main_counter().await?, 10);
    assert_eq!(counter.get_worker_counter().await?, 10);

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_sides_evolve_independently() -> anyhow::Result<()> {
    let nexus = Nexus::start("routing: sequence").await?;
    let counter = counter(&nexus, 0).await?;

    assert_eq!(counter.get_main_counter().await?, 0);
    assert_eq!(counter.increment_main_counter().await?, 1);
    assert_eq!(counter.get_worker_counter().await?, 0);
    assert_eq!(counter.increment_worker_counter().await?, 1);
    assert_eq!(counter.get_main_counter().await?, 1);
    assert_eq!(counter.get_worker_counter().await?, 1);

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_arguments_and_renamed_methods() -> anyhow::Result<()> {
    let nexus = Nexus::start("routing: arguments").await?;
    let counter = counter(&nexus, 5).await?;

    assert_eq!(counter.add_to_worker_counter(37).await?, 42);

    let (label, items) = counter
        .echo_pair("primes".to_string(), vec![2, 3, 5, 7])
        .await?;
    assert_eq!(label, "primes");
    assert_eq!(items, vec![2, 3, 5, 7]);

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_concurrent_calls_resolve_with_their_own_response() -> anyhow::Result<()> {
    let nexus = Nexus::start("routing: concurrent").await?;
    let counter = counter(&nexus, 0).await?;

    // later calls finish first
    let calls = (0..8u64).map(|i| counter.echo_after(i, (8 - i) * 20));
    let results = tokio::time::timeout(Duration::from_secs(5), futures::future::join_all(calls))
        .await?
        .into_iter()
        .collect::<anyhow::Result<Vec<u64>>>()?;

    assert_eq!(results, (0..8u64).collect::<Vec<_>>());
    assert_eq!(counter.link().stats().await?.pending, 0);

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_worker_method_can_call_back_into_the_coordinator() -> anyhow::Result<()> {
    let nexus = Nexus::start("routing: callback").await?;
    let counter = counter(&nexus, 1).await?;

    counter.increment_main_counter().await?;
    counter.add_to_worker_counter(10).await?;

    // worker 11 + main 2, the main counter is read from the coordinator mid-call
    let sum = tokio::time::timeout(Duration::from_secs(5), counter.sum_of_both_counters()).await??;
    assert_eq!(sum, 13);

    let stats = counter.link().stats().await?;
    assert_eq!(stats.requests_served, 1);
    assert_eq!(stats.responses_sent, 1);

    nexus.shutdown().await;
    Ok(())
}
