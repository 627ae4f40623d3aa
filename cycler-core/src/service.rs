use crate::{
    cache,
    downloader::{Downloader, TransferReport},
    error::StartRejected,
    state::RuntimeState,
    types::{AppStatus, Config, Origin, Progress, TaskStatus},
};
use anyhow::Result;
use std::{path::Path, sync::Arc, time::Duration};
use tokio::task::JoinHandle;

const SETTLE_POLL: Duration = Duration::from_millis(50);

/// 对外暴露的操作集合，供调度器和上层（如 HTTP 接口）调用
#[derive(Debug, Clone)]
pub struct Cycler {
    state: Arc<RuntimeState>,
    downloader: Downloader,
}

impl Cycler {
    pub fn new(state: Arc<RuntimeState>) -> reqwest::Result<Self> {
        let downloader = Downloader::new(Arc::clone(&state))?;
        Ok(Self { state, downloader })
    }

    pub fn state(&self) -> &Arc<RuntimeState> {
        &self.state
    }

    /// 立即开始一次下载
    ///
    /// 接受时返回后台任务句柄，下载结果会写回运行时状态。
    pub async fn start_transfer_now(&self) -> Result<JoinHandle<TransferReport>, StartRejected> {
        let launched = self.launch(Origin::Manual).await;
        if let Err(reason) = &launched {
            self.state
                .update_message(format!("download rejected: {reason}"))
                .await;
        }
        launched
    }

    /// 停止当前下载（签发新的取消句柄）
    pub async fn cancel_current_transfer(&self) {
        self.state.new_cancel_token().await;
        self.state.update_message("stop signal sent").await;
    }

    /// 停止当前下载，并等待其结果写回，最多等待 `timeout`
    ///
    /// 超时返回 `false`。
    pub async fn stop_and_wait(&self, timeout: Duration) -> bool {
        self.cancel_current_transfer().await;
        let settled = async {
            while self.state.task_status().await == TaskStatus::Downloading {
                tokio::time::sleep(SETTLE_POLL).await;
            }
        };
        tokio::time::timeout(timeout, settled).await.is_ok()
    }

    pub async fn progress(&self) -> Progress {
        self.state.progress().await
    }

    pub async fn status(&self) -> AppStatus {
        self.state.status().await
    }

    /// 修改配置并保存
    pub async fn update_config<F>(&self, f: F) -> Result<AppStatus>
    where
        F: FnOnce(&mut Config),
    {
        self.state.config_store().update(f).await?;
        self.state.update_message("config saved").await;
        Ok(self.status().await)
    }

    pub async fn toggle_task_enabled(&self) -> Result<bool> {
        let enabled = self.state.config_store().toggle_task_enabled().await?;
        let word = if enabled { "enabled" } else { "disabled" };
        self.state
            .update_message(format!("scheduled task {word}"))
            .await;
        Ok(enabled)
    }

    pub async fn toggle_daily_cap_enabled(&self) -> Result<bool> {
        let enabled = self
            .state
            .config_store()
            .toggle_daily_limit_enabled()
            .await?;
        let word = if enabled { "enabled" } else { "disabled" };
        self.state.update_message(format!("daily cap {word}")).await;
        Ok(enabled)
    }

    /// 清空下载目录，返回删除的文件数
    pub async fn clean_cache(&self) -> usize {
        let dir = self.state.config().await.dir;
        let count = cache::clean_dir(&dir).await;
        self.state
            .update_message(format!("cleaned {count} cached files"))
            .await;
        count
    }

    /// 检查前置条件后在后台启动下载
    pub(crate) async fn launch(
        &self,
        origin: Origin,
    ) -> Result<JoinHandle<TransferReport>, StartRejected> {
        let config = self.state.config().await;
        if config.url.is_empty() {
            return Err(StartRejected::NoUrl);
        }
        if self.state.task_status().await == TaskStatus::Downloading {
            return Err(StartRejected::AlreadyRunning);
        }
        if config.daily_cap_reached(self.state.stats().await.daily_downloaded_mb) {
            return Err(StartRejected::DailyCapReached);
        }
        let cancel = self
            .state
            .try_begin_transfer()
            .await
            .ok_or(StartRejected::AlreadyRunning)?;

        tracing::info!("{} started: {}", origin.label(), config.url);
        let state = Arc::clone(&self.state);
        let downloader = self.downloader.clone();
        Ok(tokio::spawn(async move {
            let report = downloader
                .run(&cancel, &config.url, config.speed_kb, &config.dir)
                .await;
            finish(&state, origin, &report).await;
            report
        }))
    }
}

/// 把下载结果写回运行时状态
///
/// 任务状态最后更新：离开 `Downloading` 时统计与消息都已落盘。
async fn finish(state: &RuntimeState, origin: Origin, report: &TransferReport) {
    let label = origin.label();
    let status = match &report.result {
        Ok(()) => {
            let file = report.file.as_deref().unwrap_or(Path::new(""));
            state.record_download(file, report.bytes).await;
            state
                .update_message(format!("{label} succeeded: {}", file.display()))
                .await;
            TaskStatus::Idle
        }
        Err(e) if e.is_cancelled() => {
            state.update_message(format!("{label} stopped: {e}")).await;
            TaskStatus::Failed
        }
        Err(e) => {
            state.update_message(format!("{label} failed: {e}")).await;
            TaskStatus::Failed
        }
    };
    state.set_task_status(status).await;
}
