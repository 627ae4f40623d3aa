mod logging;

use anyhow::{Context, Result};
use cycler_core::{ConfigStore, Cycler, RuntimeState, Scheduler};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

/// 退出时等待下载结束的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// 配置目录，可通过 `CYCLER_CONF_DIR` 覆盖
fn conf_dir() -> PathBuf {
    std::env::var_os("CYCLER_CONF_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("conf"))
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();

    let conf_dir = conf_dir();
    fs_err::create_dir_all(&conf_dir)?;

    let config = ConfigStore::load(conf_dir.join("config.json"))
        .await
        .context("failed to load config")?;
    let download_dir = config.get().await.dir;
    if let Err(e) = fs_err::create_dir_all(&download_dir) {
        tracing::warn!("{e}");
    }

    let state = Arc::new(RuntimeState::load(config, conf_dir.join("stats.json")).await);
    let cycler = Cycler::new(state).context("failed to build HTTP client")?;

    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::new(cycler.clone()).spawn(shutdown.clone());
    tracing::info!("cycler running, config in {}", conf_dir.display());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    shutdown.cancel();
    scheduler.await?;
    if !cycler.stop_and_wait(SHUTDOWN_GRACE).await {
        tracing::warn!("download did not stop within {SHUTDOWN_GRACE:?}");
    }
    Ok(())
}
