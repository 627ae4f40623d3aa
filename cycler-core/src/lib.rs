//! 定时下载引擎：限速、可取消的流式下载，进度采样，
//! 以及按计划触发下载的调度器。

pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;
pub mod limiter;
pub mod progress;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod types;

pub use config::ConfigStore;
pub use downloader::{Downloader, TransferReport};
pub use error::{Outcome, StartRejected, TransferError};
pub use limiter::SpeedLimiter;
pub use progress::ProgressSampler;
pub use scheduler::{POLL_INTERVAL, Phase, Scheduler, Tick, Trigger};
pub use service::Cycler;
pub use state::RuntimeState;
pub use types::{AppStatus, Config, Origin, PlanType, Progress, Stats, TaskStatus};
