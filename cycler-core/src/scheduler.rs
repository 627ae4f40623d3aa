//! 定时触发
//!
//! 每个轮询周期检查一次是否需要开始新的下载：
//! `daily` 计划在设定的时:分触发，`interval` 计划距上次触发超过间隔后触发。
//! 下载在独立任务中运行，轮询循环不会被阻塞。

use crate::{
    downloader::TransferReport,
    error::StartRejected,
    service::Cycler,
    types::{Config, Origin, PlanType},
};
use chrono::{DateTime, Local, TimeDelta, Timelike};
use std::time::Duration;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

/// 默认轮询周期
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// 触发判定，记录上次触发时间用于去抖
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    last_triggered: Option<DateTime<Local>>,
}

impl Trigger {
    pub fn last_triggered(&self) -> Option<DateTime<Local>> {
        self.last_triggered
    }

    /// 当前时间是否满足配置的计划
    pub fn is_due(&self, config: &Config, now: DateTime<Local>) -> bool {
        match config.plan_type {
            PlanType::Daily => {
                now.hour() == config.hour
                    && now.minute() == config.minute
                    && self.elapsed_more_than(now, TimeDelta::minutes(1))
            }
            PlanType::Interval => {
                if config.interval_minutes <= 0 {
                    return false;
                }
                TimeDelta::try_minutes(config.interval_minutes)
                    .is_some_and(|interval| self.elapsed_more_than(now, interval))
            }
        }
    }

    /// 记录本次触发
    pub fn mark(&mut self, now: DateTime<Local>) {
        self.last_triggered = Some(now);
    }

    fn elapsed_more_than(&self, now: DateTime<Local>, window: TimeDelta) -> bool {
        self.last_triggered
            .is_none_or(|last| now.signed_duration_since(last) > window)
    }
}

/// 调度器所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// 定时任务未启用
    Idle,
    /// 已启用，等待触发条件
    Armed,
    /// 本次轮询启动了下载
    Firing,
}

/// 单次轮询的结果
#[derive(Debug)]
pub enum Tick {
    Disabled,
    NoUrl,
    NotDue,
    /// 已有下载在进行，本次跳过
    Busy,
    /// 今日下载量已达上限，本次跳过
    CapReached,
    Fired(JoinHandle<TransferReport>),
}

impl Tick {
    pub fn phase(&self) -> Phase {
        match self {
            Tick::Disabled => Phase::Idle,
            Tick::Fired(_) => Phase::Firing,
            _ => Phase::Armed,
        }
    }
}

/// 定时调度器
#[derive(Debug)]
pub struct Scheduler {
    cycler: Cycler,
    trigger: Trigger,
    period: Duration,
}

impl Scheduler {
    pub fn new(cycler: Cycler) -> Self {
        Self {
            cycler,
            trigger: Trigger::default(),
            period: POLL_INTERVAL,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// 在后台运行调度循环，直到 `shutdown` 被取消
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!("scheduler started, polling every {:?}", self.period);
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // 下载任务独立运行，结果经由运行时状态回报
            let _ = self.tick(Local::now()).await;
        }
        tracing::info!("scheduler stopped");
    }

    /// 执行一次轮询
    pub async fn tick(&mut self, now: DateTime<Local>) -> Tick {
        let state = self.cycler.state();
        let config = state.config().await;
        if !config.task_enabled {
            return Tick::Disabled;
        }

        state.check_and_reset_stats_on(now.date_naive()).await;

        if config.url.is_empty() {
            return Tick::NoUrl;
        }
        if !self.trigger.is_due(&config, now) {
            return Tick::NotDue;
        }

        match self.cycler.launch(Origin::Scheduled).await {
            Ok(handle) => {
                self.trigger.mark(now);
                Tick::Fired(handle)
            }
            Err(StartRejected::AlreadyRunning) => {
                tracing::debug!("scheduler: a download is already running, skipping");
                Tick::Busy
            }
            Err(StartRejected::DailyCapReached) => {
                state
                    .update_message("scheduler: daily cap reached, skipping")
                    .await;
                Tick::CapReached
            }
            Err(StartRejected::NoUrl) => Tick::NoUrl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        state::tests::state_in,
        types::{Config, TaskStatus},
    };
    use chrono::{NaiveDate, TimeZone};
    use std::path::Path;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        let naive = NaiveDate::from_ymd_opt(2026, 6, 10)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap();
        Local.from_local_datetime(&naive).earliest().unwrap()
    }

    fn today_at(h: u32, m: u32) -> DateTime<Local> {
        let naive = Local::now().date_naive().and_hms_opt(h, m, 10).unwrap();
        Local.from_local_datetime(&naive).earliest().unwrap()
    }

    fn daily(hour: u32, minute: u32) -> Config {
        Config {
            url: "http://127.0.0.1:9/file".into(),
            plan_type: PlanType::Daily,
            hour,
            minute,
            ..Default::default()
        }
    }

    fn interval(minutes: i64) -> Config {
        Config {
            url: "http://127.0.0.1:9/file".into(),
            plan_type: PlanType::Interval,
            interval_minutes: minutes,
            ..Default::default()
        }
    }

    /// 以 30 秒为步长模拟一整天的轮询，返回触发次数
    fn count_fires(config: &Config) -> usize {
        let mut trigger = Trigger::default();
        let mut now = at(0, 0, 5);
        let end = now + TimeDelta::days(1);
        let mut fires = 0;
        while now < end {
            if trigger.is_due(config, now) {
                trigger.mark(now);
                fires += 1;
            }
            now += TimeDelta::seconds(30);
        }
        fires
    }

    #[test]
    fn daily_fires_once_per_day() {
        assert_eq!(count_fires(&daily(3, 0)), 1);
    }

    #[test]
    fn daily_debounces_within_the_same_minute() {
        let config = daily(3, 0);
        let mut trigger = Trigger::default();
        assert!(!trigger.is_due(&config, at(2, 59, 50)));
        assert!(trigger.is_due(&config, at(3, 0, 0)));
        trigger.mark(at(3, 0, 0));
        assert!(!trigger.is_due(&config, at(3, 0, 30)));
        assert!(!trigger.is_due(&config, at(3, 0, 59)));
    }

    #[test]
    fn interval_fires_once_per_interval() {
        // 超过 30 分钟才触发，30 秒步长下每 30.5 分钟一次
        let fires = count_fires(&interval(30));
        assert!((47..=48).contains(&fires), "fired {fires} times");

        let mut trigger = Trigger::default();
        let config = interval(30);
        trigger.mark(at(10, 0, 0));
        assert!(!trigger.is_due(&config, at(10, 30, 0)));
        assert!(trigger.is_due(&config, at(10, 30, 1)));
    }

    #[test]
    fn non_positive_interval_never_fires() {
        assert_eq!(count_fires(&interval(0)), 0);
        assert_eq!(count_fires(&interval(-5)), 0);
    }

    #[tokio::test]
    async fn disabled_task_stays_idle() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            task_enabled: false,
            ..interval(1)
        };
        let cycler = Cycler::new(state_in(dir.path(), config).await).unwrap();
        let mut scheduler = Scheduler::new(cycler);

        let tick = scheduler.tick(today_at(12, 0)).await;

        assert_eq!(tick.phase(), Phase::Idle);
        assert!(scheduler.trigger().last_triggered().is_none());
    }

    #[tokio::test]
    async fn missing_url_skips() {
        let dir = tempfile::tempdir().unwrap();
        let cycler = Cycler::new(state_in(dir.path(), Config::default()).await).unwrap();
        let mut scheduler = Scheduler::new(cycler);

        assert!(matches!(scheduler.tick(today_at(12, 0)).await, Tick::NoUrl));
    }

    #[tokio::test]
    async fn busy_task_skips_without_marking() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_in(dir.path(), interval(1)).await;
        state.set_task_status(TaskStatus::Downloading).await;
        let mut scheduler = Scheduler::new(Cycler::new(state).unwrap());

        let tick = scheduler.tick(today_at(12, 0)).await;

        assert!(matches!(tick, Tick::Busy));
        assert_eq!(tick.phase(), Phase::Armed);
        assert!(scheduler.trigger().last_triggered().is_none());
    }

    #[tokio::test]
    async fn daily_cap_blocks_matching_time() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            limit_mb: 10,
            daily_limit_enabled: true,
            dir: dir.path().join("tmp"),
            ..daily(3, 0)
        };
        let state = state_in(dir.path(), config).await;
        state.record_download(Path::new("old"), 10 * 1024 * 1024).await;
        let mut scheduler = Scheduler::new(Cycler::new(state.clone()).unwrap());

        let tick = scheduler.tick(today_at(3, 0)).await;

        assert!(matches!(tick, Tick::CapReached));
        assert_eq!(state.task_status().await, TaskStatus::Idle);
        assert!(state.stats().await.message.contains("daily cap reached"));
    }

    #[tokio::test]
    async fn due_tick_fires_and_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            url: "http://127.0.0.1:9/unreachable".into(),
            dir: dir.path().join("tmp"),
            ..interval(5)
        };
        let state = state_in(dir.path(), config).await;
        let mut scheduler = Scheduler::new(Cycler::new(state.clone()).unwrap());
        let now = today_at(12, 0);

        let Tick::Fired(handle) = scheduler.tick(now).await else {
            panic!("expected the scheduler to fire");
        };
        assert_eq!(scheduler.trigger().last_triggered(), Some(now));
        handle.await.unwrap();

        assert_eq!(state.task_status().await, TaskStatus::Failed);
        assert!(state.stats().await.message.starts_with("scheduled download failed"));
        // 间隔未到，不会再次触发
        assert!(matches!(
            scheduler.tick(now + TimeDelta::minutes(1)).await,
            Tick::NotDue
        ));
    }
}
