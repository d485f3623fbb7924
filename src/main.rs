use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{error, info, warn};

use parkd::config::Config;
use parkd::console::{self, Command, Console};
use parkd::engine::{BookingEngine, LockRegistry};
use parkd::notify::NotifyHub;
use parkd::store::WalStore;

const MAX_LINE_LEN: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they don't interleave with console output.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = Config::from_env();
    parkd::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(WalStore::open(&config.wal_path())?);
    let engine = Arc::new(BookingEngine::new(
        store.clone(),
        LockRegistry::new(),
        Arc::new(NotifyHub::new()),
    ));

    if engine.list_slots().await.is_empty() {
        for slot in &config.seed_slots {
            if let Err(e) = engine.add_slot(slot).await {
                error!("could not seed slot {slot}: {e}");
            }
        }
    }

    tokio::spawn(parkd::compactor::run_compactor(
        store.clone(),
        config.compact_threshold,
        config.compact_every,
    ));

    info!("parkd started");
    info!("  wal: {}", config.wal_path().display());
    info!("  slots: {}", engine.occupancy().await.total);

    let (mut session, mut watch_events) = Console::new(engine);
    let mut stdout = tokio::io::stdout();
    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new_with_max_length(MAX_LINE_LEN));
    stdout.write_all(b"parkd ready, type 'help' for commands\n> ").await?;
    stdout.flush().await?;

    loop {
        tokio::select! {
            line = lines.next() => {
                let reply = match line {
                    None => break,
                    Some(Err(e)) => {
                        warn!("bad input line: {e}");
                        format!("error: {e}")
                    }
                    Some(Ok(line)) => match console::parse(&line) {
                        Ok(None) => String::new(),
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(cmd)) => session.run(cmd).await,
                        Err(msg) => msg,
                    },
                };
                if !reply.is_empty() {
                    stdout.write_all(reply.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                }
                stdout.write_all(b"> ").await?;
                stdout.flush().await?;
            }
            Some(event) = watch_events.recv() => {
                stdout.write_all(format!("\n{event}\n> ").as_bytes()).await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    store.shutdown().await;
    info!("parkd stopped");
    Ok(())
}
