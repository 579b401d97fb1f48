// lanshare node: discovery, file lookup and transfer daemon with a local command bridge.

mod bridge;
mod config;
mod discovery;
mod file_server;
mod net;
mod node;
mod query;
mod transfer;

use anyhow::Context;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("lanshare-node {}", VERSION);
            return Ok(());
        }
    }

    let (cfg, config_problems) = config::load();
    init_logging(&cfg.log_level);
    for problem in &config_problems {
        warn!("{problem}");
    }
    info!(version = VERSION, "lanshare node starting");

    let rt = tokio::runtime::Runtime::new().context("cannot start async runtime")?;
    rt.block_on(async {
        let node = node::Node::start(cfg.clone())
            .await
            .context("cannot start node")?;
        let bridge = if cfg.bridge_port != 0 {
            let listener = bridge::bind(cfg.bridge_port)
                .await
                .with_context(|| format!("cannot bind command bridge on port {}", cfg.bridge_port))?;
            Some(tokio::spawn(bridge::run_bridge(
                listener,
                node.clone(),
                node.shutdown_signal(),
            )))
        } else {
            None
        };

        shutdown_signal().await?;
        info!("shutting down");
        node.stop().await;
        if let Some(task) = bridge {
            if let Err(e) = task.await {
                warn!("command bridge ended abnormally: {e}");
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}

/// `LANSHARE_LOG` / config `log_level` sets the default level; `RUST_LOG` directives refine it.
fn init_logging(level: &str) {
    let default = level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();
    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);
    tracing_subscriber::registry().with(layer).init();
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
