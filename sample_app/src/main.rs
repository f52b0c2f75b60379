use clap::{Parser, ValueEnum};
use worker_class::{
    Nexus, bridge::BridgeConfig, spawn::ProcessSpawner, spawn::ThreadSpawner, spawn::process,
};
use worker_class_sample_app::{Counter, CounterArgs, replay};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// run the worker on a thread of this process
    Thread,
    /// run the worker as a child process of this binary
    Process,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Where the worker side runs
    #[arg(long, value_enum, default_value_t = Mode::Thread)]
    mode: Mode,

    /// Initial value of both counters
    #[arg(long, default_value_t = 0)]
    seed: i64,

    /// Per-call deadline in milliseconds, none by default
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("ERROR: {:#}", e); // Pretty format with all causes
        std::process::exit(1);
    }
}

async fn run() -> Result<(), anyhow::Error> {
    // logs go to stderr, stdout may be the channel to the coordinator
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if process::worker_role().is_some() {
        return process::serve::<Counter>().await;
    }

    let cli = Cli::parse();
    let config = BridgeConfig {
        call_timeout: cli.timeout_ms.map(std::time::Duration::from_millis),
        ..BridgeConfig::default()
    };
    let args = CounterArgs { seed: cli.seed };

    let nexus = Nexus::start("sample app").await?;
    let _guard = nexus.exit_guard();

    let counter = match cli.mode {
        Mode::Thread => {
            worker_class::spawn_with::<Counter, _>(&nexus, &ThreadSpawner, args, config).await?
        }
        Mode::Process => {
            worker_class::spawn_with::<Counter, _>(
                &nexus,
                &ProcessSpawner::current_exe(),
                args,
                config,
            )
            .await?
        }
    };

    println!("Running the counter sequence with the worker on a {:?}", cli.mode);
    for line in replay(&counter).await? {
        println!("{}", line);
    }

    worker_class::terminate(&*counter).await;
    nexus.shutdown().await;
    Ok(())
}
