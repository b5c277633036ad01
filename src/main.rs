use std::sync::Arc;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use chairbook::compactor;
use chairbook::console::{self, Command, Console};
use chairbook::engine::Engine;
use chairbook::settings::Settings;
use chairbook::store::LocalStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let settings = Settings::from_env();
    chairbook::observability::init(settings.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&settings.data_dir)?;

    let wal_path = settings.wal_path();
    let store = Arc::new(LocalStore::open(&wal_path)?);
    let compactor_store = store.clone();
    let threshold = settings.compact_threshold;
    tokio::spawn(async move {
        compactor::run_compactor(compactor_store, threshold).await;
    });

    let engine = Engine::new(store, &settings);
    if engine.bootstrap(Local::now().date_naive()).await? {
        info!("seeded default catalog and schedule");
    }

    info!("chairbook ready");
    info!("  wal: {}", wal_path.display());
    info!("  max_per_slot: {}", engine.max_per_slot());
    info!("  metrics: {}", settings.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown on SIGTERM/ctrl-c
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut console = Console::new();
    println!("{}", console::HELP);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    break;
                };
                match console.feed(&line) {
                    None => {}
                    Some(Err(e)) => println!("error: {e}"),
                    Some(Ok(Command::Quit)) => break,
                    Some(Ok(cmd)) => match console::execute(&engine, cmd).await {
                        Ok(out) => println!("{out}"),
                        Err(e) => println!("error: {e}"),
                    },
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("chairbook stopped");
    Ok(())
}
