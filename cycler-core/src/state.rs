use crate::{
    config::ConfigStore,
    types::{AppStatus, Config, Progress, Stats, TaskStatus},
};
use anyhow::Result;
use chrono::{Datelike, Local, NaiveDate};
use fs_err::tokio as fs;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

impl Stats {
    /// 保存统计到文件
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data).await?;
        Ok(())
    }

    /// 从文件加载统计
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).await?;
        let stats = serde_json::from_str(&content)?;
        Ok(Some(stats))
    }

    /// 按日期滚动重置计数器，返回是否有计数器被重置
    fn roll_over(&mut self, today: NaiveDate) -> bool {
        let reset_daily = today.day() != self.last_stat_day;
        let reset_monthly = today.month() != self.last_stat_month;
        if reset_daily {
            self.daily_downloaded_mb = 0;
            self.last_stat_day = today.day();
        }
        if reset_monthly {
            self.monthly_downloaded_mb = 0;
            self.last_stat_month = today.month();
        }
        reset_daily || reset_monthly
    }
}

/// 运行时共享状态
///
/// 进度、任务状态、统计和取消句柄各自独立加锁；
/// 调度器与手动触发都只通过这里协调。
#[derive(Debug)]
pub struct RuntimeState {
    config: ConfigStore,
    stats_path: PathBuf,
    stats: RwLock<Stats>,
    progress: RwLock<Progress>,
    task_status: RwLock<TaskStatus>,
    cancel: Mutex<CancellationToken>,
}

impl RuntimeState {
    /// 创建运行时状态并加载统计文件
    ///
    /// 加载成功时以今天作为重置基准；加载失败时清零所有计数器。
    pub async fn load(config: ConfigStore, stats_path: impl Into<PathBuf>) -> Self {
        let stats_path = stats_path.into();
        let today = Local::now().date_naive();

        let stats = match Stats::load(&stats_path).await {
            Ok(Some(mut stats)) => {
                stats.last_stat_day = today.day();
                stats.last_stat_month = today.month();
                tracing::info!("loaded stats from {}", stats_path.display());
                stats
            }
            result => {
                if let Err(e) = result {
                    tracing::warn!("failed to load stats: {e}; starting from zero");
                }
                let mut stats = Stats::default();
                stats.roll_over(today);
                if let Err(e) = stats.save(&stats_path).await {
                    tracing::warn!("failed to save stats: {e}");
                }
                stats
            }
        };

        Self {
            config,
            stats_path,
            stats: RwLock::new(stats),
            progress: RwLock::new(Progress::default()),
            task_status: RwLock::new(TaskStatus::Idle),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config
    }

    /// 当前配置快照
    pub async fn config(&self) -> Config {
        self.config.get().await
    }

    // --- 进度 ---

    pub async fn progress(&self) -> Progress {
        self.progress.read().await.clone()
    }

    pub async fn set_progress(&self, progress: Progress) {
        *self.progress.write().await = progress;
    }

    // --- 任务状态 ---

    pub async fn task_status(&self) -> TaskStatus {
        *self.task_status.read().await
    }

    pub async fn set_task_status(&self, status: TaskStatus) {
        *self.task_status.write().await = status;
    }

    /// 原子地检查并进入下载状态
    ///
    /// 已有下载时返回 `None`；否则把任务状态设为下载中，
    /// 签发新的取消句柄（旧句柄随之取消）并返回。
    pub async fn try_begin_transfer(&self) -> Option<CancellationToken> {
        let mut status = self.task_status.write().await;
        if *status == TaskStatus::Downloading {
            return None;
        }
        *status = TaskStatus::Downloading;
        Some(self.new_cancel_token().await)
    }

    // --- 取消句柄 ---

    /// 签发新的取消句柄，旧句柄立即被取消
    pub async fn new_cancel_token(&self) -> CancellationToken {
        let mut current = self.cancel.lock().await;
        current.cancel();
        *current = CancellationToken::new();
        current.clone()
    }

    pub async fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().await.clone()
    }

    // --- 统计 ---

    pub async fn stats(&self) -> Stats {
        self.stats.read().await.clone()
    }

    /// 更新状态消息并写入日志
    pub async fn update_message(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        let mut stats = self.stats.write().await;
        stats.message = message;
        self.persist(&stats).await;
    }

    /// 记录一次成功下载：更新最后下载信息并累加 MB 计数
    pub async fn record_download(&self, file: &Path, bytes: u64) {
        let mut stats = self.stats.write().await;
        stats.last_download = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        stats.last_file = file.display().to_string();
        let mb = bytes / 1024 / 1024;
        if mb > 0 {
            stats.daily_downloaded_mb += mb;
            stats.monthly_downloaded_mb += mb;
        }
        self.persist(&stats).await;
    }

    /// 日期或月份变化时重置对应计数器
    pub async fn check_and_reset_stats(&self) -> bool {
        self.check_and_reset_stats_on(Local::now().date_naive()).await
    }

    pub async fn check_and_reset_stats_on(&self, today: NaiveDate) -> bool {
        let mut stats = self.stats.write().await;
        let reset = stats.roll_over(today);
        if reset {
            tracing::info!(
                "stats rolled over: daily={} monthly={}",
                stats.daily_downloaded_mb,
                stats.monthly_downloaded_mb
            );
            self.persist(&stats).await;
        }
        reset
    }

    /// 汇总的整体状态
    pub async fn status(&self) -> AppStatus {
        let config = self.config().await;
        let stats = self.stats().await;
        let task_status = self.task_status().await;
        AppStatus {
            task_enabled: config.task_enabled,
            config,
            stats,
            task_status,
        }
    }

    async fn persist(&self, stats: &Stats) {
        if let Err(e) = stats.save(&self.stats_path).await {
            tracing::warn!("failed to save stats: {e}");
        }
    }
}
