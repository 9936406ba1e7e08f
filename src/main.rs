use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use redis_engine::aof::{run_append_task, run_fsync_ticker, AofEngine};
use redis_engine::config::{AppendFsync, Config};
use redis_engine::db::Db;
use redis_engine::dispatcher::Dispatcher;
use redis_engine::pubsub::PubSub;
use redis_engine::server;

use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.len() {
        1 => None,
        2 => Some(PathBuf::from(&args[1])),
        _ => {
            eprintln!("Usage: redis-engine [/path/to/config.toml]");
            std::process::exit(1);
        }
    };
    let config = Config::load(config_path.as_deref())?;

    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let (aof_tx, aof_rx) = if config.append_only {
        let (tx, rx) = std::sync::mpsc::sync_channel(config.aof_channel_capacity);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let db = Arc::new(Db::new(config.dict_shards, config.lock_stripes, aof_tx));
    let pubsub = Arc::new(PubSub::new());
    let dispatcher = Arc::new(Dispatcher::new(db.clone()));

    let aof_engine = if config.append_only {
        let engine = Arc::new(AofEngine::open(&config.append_filename, config.append_fsync)?);

        let start = Instant::now();
        match engine.replay(&dispatcher, &pubsub) {
            Ok(n) => info!(
                records = n,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "AOF replay complete"
            ),
            Err(e) => {
                // §7: no partial replay is accepted — a corrupt AOF is fatal.
                error!(error = %e, "fatal: append only file is corrupt, refusing to start");
                anyhow::bail!("corrupt append only file: {e}");
            }
        }

        let append_task_engine = engine.clone();
        let append_task_db = db.clone();
        if let Some(rx) = aof_rx {
            std::thread::spawn(move || run_append_task(append_task_engine, append_task_db, rx));
        }

        if config.append_fsync == AppendFsync::EverySec {
            let ticker_engine = engine.clone();
            tokio::spawn(run_fsync_ticker(ticker_engine, Duration::from_secs(1)));
        }

        Some(engine)
    } else {
        None
    };

    let sweeper_db = db.clone();
    let sweeper_interval = Duration::from_millis(config.sweeper_interval_ms);
    let sweeper_sample_size = config.sweeper_sample_size;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweeper_interval);
        loop {
            ticker.tick().await;
            let now = Instant::now();
            for (key, at) in sweeper_db.ttl_sample(sweeper_sample_size) {
                if at <= now {
                    let db = sweeper_db.clone();
                    let key = key.clone();
                    tokio::task::block_in_place(|| {
                        // Same write lock a mutating command would take for
                        // this key (§4.G), so a concurrent handler can't
                        // read-then-write the key out from under an
                        // in-flight eviction and resurrect it without a TTL.
                        let _guard = db.lock_keys(std::slice::from_ref(&key));
                        db.evict_if_expired(&key);
                    });
                }
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            let _ = shutdown_tx.send(());
        }
    });

    info!(addr = %config.bind_addr, "redis-engine starting");
    server::run(&config.bind_addr, dispatcher, pubsub, shutdown_rx).await?;

    // Dropping the engine drops its file handle; the append task's sender
    // half (owned by `db`) is dropped along with `db` once every Arc clone
    // goes out of scope, which is what lets `run_append_task`'s `rx.iter()`
    // terminate.
    drop(aof_engine);
    Ok(())
}
