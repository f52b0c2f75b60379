use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use worker_class::{Link, WorkerClass};

/// The counter demo: one counter per context, reachable from both.
pub struct Counter {
    link: Link,
    main_counter: AtomicI64,
    worker_counter: AtomicI64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CounterArgs {
    pub seed: i64,
}

impl WorkerClass for Counter {
    type Args = CounterArgs;
    const NAME: &'static str = "sample-counter";

    fn construct(args: CounterArgs, link: Link) -> Result<Self> {
        log::info!(
            "Counter constructed on the {} side with seed {}",
            link.side(),
            args.seed
        );
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
    #[coordinator(name = "getMainCounter")]
    pub async fn get_main_counter(&self) -> Result<i64> {
        Ok(self.main_counter.load(Ordering::SeqCst))
    }

    #[coordinator(name = "incrementMainCounter")]
    pub async fn increment_main_counter(&self) -> Result<i64> {
        Ok(self.main_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[worker(name = "getWorkerCounter")]
    pub async fn get_worker_counter(&self) -> Result<i64> {
        Ok(self.worker_counter.load(Ordering::SeqCst))
    }

    #[worker(name = "incrementWorkerCounter")]
    pub async fn increment_worker_counter(&self) -> Result<i64> {
        Ok(self.worker_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[worker(name = "throwInWorker")]
    pub async fn throw_in_worker(&self) -> Result<()> {
        bail!("Thrown in worker.")
    }
}

/// Replays the counter sequence and returns one line per step.
pub async fn replay(counter: &Counter) -> Result<Vec<String>> {
    let mut lines = Vec::new();

    lines.push(format!("main counter: {}", counter.get_main_counter().await?));
    lines.push(format!(
        "increment main counter: {}",
        counter.increment_main_counter().await?
    ));
    lines.push(format!("worker counter: {}", counter.get_worker_counter().await?));
    lines.push(format!(
        "increment worker counter: {}",
        counter.increment_worker_counter().await?
    ));
    lines.push(format!("main counter: {}", counter.get_main_counter().await?));

    match counter.throw_in_worker().await {
        Ok(()) => lines.push("throw in worker: returned normally".to_string()),
        Err(err) => lines.push(format!("throw in worker: {}", err)),
    }

    Ok(lines)
}
