use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// 计划类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    /// 每天在固定的时:分触发
    Daily,
    /// 每隔固定分钟数触发
    #[default]
    Interval,
}

/// 用户配置
///
/// `interval_minutes` 只对 [`PlanType::Interval`] 有意义，
/// `hour`/`minute` 只对 [`PlanType::Daily`] 有意义。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 下载地址
    pub url: String,
    pub plan_type: PlanType,
    /// 间隔分钟数，<= 0 时间隔计划永远不会触发
    pub interval_minutes: i64,
    pub hour: u32,
    pub minute: u32,
    /// 限速（KB/s），0 表示不限速
    pub speed_kb: u64,
    /// 下载目录
    pub dir: PathBuf,
    /// 每日下载量上限（MB）
    pub limit_mb: u64,
    /// 定时任务是否启用
    pub task_enabled: bool,
    /// 每日下载量上限是否启用
    pub daily_limit_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: String::new(),
            plan_type: PlanType::Interval,
            interval_minutes: 30,
            hour: 3,
            minute: 0,
            speed_kb: 0,
            dir: PathBuf::from("tmp"),
            limit_mb: 1024,
            task_enabled: true,
            daily_limit_enabled: false,
        }
    }
}

impl Config {
    /// 今日下载量是否已达到上限（未启用上限时永远为 false）
    pub fn daily_cap_reached(&self, daily_downloaded_mb: u64) -> bool {
        self.daily_limit_enabled && daily_downloaded_mb >= self.limit_mb
    }
}

pub const STATUS_IDLE: &str = "idle";
pub const STATUS_DOWNLOADING: &str = "downloading";
pub const STATUS_STOPPED: &str = "stopped";
pub const STATUS_COMPLETE: &str = "complete";

/// 当前下载进度，每次采样整体覆盖
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 百分比，总大小未知时为 0
    pub percent: u32,
    /// 瞬时速度（KB/s）
    pub speed: u64,
    /// 大小（KB）：已知时为总大小，否则为已下载大小
    pub size: u64,
    pub status: String,
}

impl Progress {
    pub fn new(percent: u32, speed: u64, size: u64, status: impl Into<String>) -> Self {
        Self {
            percent,
            speed,
            size,
            status: status.into(),
        }
    }

    /// 失败进度，状态文本为 `download failed: <detail>`
    pub fn failed(percent: u32, size: u64, detail: impl fmt::Display) -> Self {
        Self::new(percent, 0, size, format!("download failed: {detail}"))
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(0, 0, 0, STATUS_IDLE)
    }
}

/// 累计下载统计
///
/// 重置日期不会被持久化，也不对外暴露。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    /// 上次成功下载时间（本地时间）
    pub last_download: String,
    /// 上次成功下载的文件
    pub last_file: String,
    /// 最近一条状态消息
    pub message: String,
    pub daily_downloaded_mb: u64,
    pub monthly_downloaded_mb: u64,
    #[serde(skip)]
    pub(crate) last_stat_day: u32,
    #[serde(skip)]
    pub(crate) last_stat_month: u32,
}

/// 任务状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// 空闲，可以开始新的下载
    #[default]
    Idle,
    /// 正在下载
    Downloading,
    /// 上次下载失败
    Failed,
    /// 上次下载被手动停止
    Stopped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Failed => "failed",
            TaskStatus::Stopped => "stopped",
        })
    }
}

/// 对外报告的整体状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppStatus {
    pub config: Config,
    pub stats: Stats,
    pub task_enabled: bool,
    pub task_status: TaskStatus,
}

/// 下载的发起方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// 手动触发
    Manual,
    /// 调度器触发
    Scheduled,
}

impl Origin {
    /// 状态消息前缀
    pub(crate) fn label(self) -> &'static str {
        match self {
            Origin::Manual => "download",
            Origin::Scheduled => "scheduled download",
        }
    }
}
