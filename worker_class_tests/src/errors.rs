use std::time::Duration;

use worker_class::{
    CallError, DefinitionError, MethodTableBuilder, Nexus, RemoteError, Routed, bridge::BridgeConfig,
    spawn::ThreadSpawner,
};

use crate::counter::{Counter, CounterArgs};

#[tokio::test]
pub async fn test_local_failure_is_returned_unchanged() -> anyhow::Result<()> {
    let nexus = Nexus::start("errors: local").await?;
    let counter = worker_class::spawn::<Counter>(&nexus, CounterArgs::default()).await?;

    let err = counter.throw_in_main().await.unwrap_err();
    assert_eq!(err.to_string(), "Thrown in main.");
    // it never crossed the channel
    assert!(err.downcast_ref::<RemoteError>().is_none());

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_remote_failure_reads_like_the_original() -> anyhow::Result<()> {
    let nexus = Nexus::start("errors: remote").await?;
    let counter = worker_class::spawn::<Counter>(&nexus, CounterArgs::default()).await?;

    let err = tokio::time::timeout(Duration::from_secs(5), counter.throw_in_worker())
        .await?
        .unwrap_err();
    assert_eq!(err.to_string(), "Thrown in worker.");

    let remote = err
        .downcast_ref::<RemoteError>()
        .expect("a remote failure carries a RemoteError");
    assert_eq!(remote.name, "Error");

    // the worker's state is unaffected
    assert_eq!(counter.increment_worker_counter().await?, 1);

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_remote_panic_becomes_an_error() -> anyhow::Result<()> {
    let nexus = Nexus::start("errors: panic").await?;
    let counter = worker_class::spawn::<Counter>(&nexus, CounterArgs::default()).await?;

    let err = tokio::time::timeout(Duration::from_secs(5), counter.panic_in_worker())
        .await?
        .unwrap_err();
    let remote = err.downcast_ref::<RemoteError>().expect("remote error");
    assert_eq!(remote.name, "Panic");
    assert!(remote.message.contains("worker gave up"));

    // the worker survives its method panicking
    assert_eq!(counter.get_worker_counter().await?, 0);

    nexus.shutdown().await;
    Ok(())
}

#[tokio::test]
pub async fn test_call_timeout() -> anyhow::Result<()> {
    let nexus = Nexus::start("errors: timeout").await?;
    let config = BridgeConfig {
        call_timeout: Some(Duration::from_millis(100)),
        ..BridgeConfig::default()
    };
    let counter =
        worker_class::spawn_with::<Counter, _>(&nexus, &ThreadSpawner, CounterArgs::default(), config)
            .await?;

    let err = counter.echo_after(1, 2_000).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CallError>(),
        Some(CallError::Timeout(_))
    ));

    // a fast call on the same instance is still fine
    assert_eq!(counter.echo_after(7, 0).await?, 7);

    nexus.shutdown().await;
    Ok(())
}

struct Misdeclared;

impl Routed for Misdeclared {
    fn register(methods: &mut MethodTableBuilder<Self>) {
        methods
            .worker("ping", |_this, ()| async move { anyhow::Ok(1) })
            .coordinator("ping", |_this, ()| async move { anyhow::Ok(2) });
    }
}

#[test]
pub fn test_duplicate_names_are_a_definition_error() {
    match Misdeclared::method_table() {
        Err(err) => assert_eq!(err, DefinitionError::DuplicateMethod("ping".to_string())),
        Ok(_) => panic!("expected a definition error"),
    }
}

#[test]
pub fn test_generated_table_lists_every_annotated_method() -> anyhow::Result<()> {
    let table = Counter::method_table()?;

    assert_eq!(table.home_of("get_main_counter"), Some(worker_class::Context::Coordinator));
    assert_eq!(table.home_of("increment_worker_counter"), Some(worker_class::Context::Worker));
    assert_eq!(table.home_of("echoPair"), Some(worker_class::Context::Worker));
    assert_eq!(table.home_of("echo_pair"), None);
    // plain methods are not routed
    assert_eq!(table.home_of("local_snapshot"), None);
    Ok(())
}
