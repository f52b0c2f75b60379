use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::Duration,
};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use worker_class::{Context, Link, WorkerClass};

/// Two counters, one per context. Each side's copy of the instance keeps its own values; the annotations
/// decide which side's copy a call reaches.
pub struct Counter {
    link: Link,
    main_counter: AtomicI64,
    worker_counter: AtomicI64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CounterArgs {
    pub seed: i64,
}

impl WorkerClass for Counter {
    type Args = CounterArgs;
    const NAME: &'static str = "counter";

    fn construct(args: CounterArgs, link: Link) -> Result<Self> {
        Ok(Self {
            link,
            main_counter: AtomicI64::new(args.seed),
            worker_counter: AtomicI64::new(args.seed),
        })
    }

    fn link(&self) -> &Link {
        &self.link
    }
}

#[worker_class::methods]
impl Counter {
    #[coordinator]
    pub async fn get_main_counter(&self) -> Result<i64> {
        Ok(self.main_counter.load(Ordering::SeqCst))
    }

    #[coordinator]
    pub async fn increment_main_counter(&self) -> Result<i64> {
        Ok(self.main_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[worker]
    pub async fn get_worker_counter(&self) -> Result<i64> {
        Ok(self.worker_counter.load(Ordering::SeqCst))
    }

    #[worker]
    pub async fn increment_worker_counter(&self) -> Result<i64> {
        Ok(self.worker_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[worker]
    pub async fn add_to_worker_counter(&self, by: i64) -> Result<i64> {
        Ok(self.worker_counter.fetch_add(by, Ordering::SeqCst) + by)
    }

    #[coordinator]
    pub async fn throw_in_main(&self) -> Result<()> {
        bail!("Thrown in main.")
    }

    #[worker]
    pub async fn throw_in_worker(&self) -> Result<()> {
        bail!("Thrown in worker.")
    }

    #[worker]
    pub async fn panic_in_worker(&self) -> Result<()> {
        panic!("worker gave up")
    }

    /// reports the context the body actually ran in
    #[worker]
    pub async fn worker_side(&self) -> Result<Context> {
        Ok(Context::current())
    }

    #[coordinator]
    pub async fn main_side(&self) -> Result<Context> {
        Ok(Context::current())
    }

    /// a worker method that calls back into the coordinator while it runs
    #[worker]
    pub async fn sum_of_both_counters(&self) -> Result<i64> {
        let main = self.get_main_counter().await?;
        Ok(main + self.worker_counter.load(Ordering::SeqCst))
    }

    /// resolves after `millis`, so concurrent calls finish in a different order than they started
    #[worker]
    pub async fn echo_after(&self, value: u64, millis: u64) -> Result<u64> {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(value)
    }

    #[worker(name = "echoPair")]
    pub async fn echo_pair(&self, label: String, items: Vec<u32>) -> Result<(String, Vec<u32>)> {
        Ok((label, items))
    }

    /// not annotated: runs wherever it is called
    pub fn local_snapshot(&self) -> (i64, i64) {
        (
            self.main_counter.load(Ordering::SeqCst),
            self.worker_counter.load(Ordering::SeqCst),
        )
    }
}
