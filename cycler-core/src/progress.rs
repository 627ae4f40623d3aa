use crate::{
    state::RuntimeState,
    types::{Progress, STATUS_DOWNLOADING},
};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// 进度采样器
///
/// 每次写入累加字节数，最多每秒向 [`RuntimeState`] 发布一次进度；
/// 已知总大小且写满时无条件发布。
#[derive(Debug)]
pub struct ProgressSampler {
    state: Arc<RuntimeState>,
    /// 总大小（字节），0 表示未知
    total_size: u64,
    written: u64,
    last_update: Instant,
    last_bytes: u64,
}

impl ProgressSampler {
    pub fn new(state: Arc<RuntimeState>, total_size: Option<u64>) -> Self {
        Self {
            state,
            total_size: total_size.unwrap_or(0),
            written: 0,
            last_update: Instant::now(),
            last_bytes: 0,
        }
    }

    /// 记录一次写入
    pub async fn record(&mut self, len: u64) {
        self.written += len;

        let now = Instant::now();
        let since = now.duration_since(self.last_update);
        let finished = self.total_size > 0 && self.written == self.total_size;
        if since < SAMPLE_INTERVAL && !finished {
            return;
        }

        let mut elapsed = since.as_secs_f64();
        if elapsed == 0.0 {
            elapsed = 1.0;
        }
        let speed = (self.written - self.last_bytes) as f64 / 1024.0 / elapsed;

        self.state
            .set_progress(Progress::new(
                self.percent(),
                speed as u64,
                self.size_kb(),
                STATUS_DOWNLOADING,
            ))
            .await;

        self.last_update = now;
        self.last_bytes = self.written;
    }

    /// 已写入字节数
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn total_size(&self) -> Option<u64> {
        (self.total_size > 0).then_some(self.total_size)
    }

    /// 当前百分比，总大小未知时为 0
    pub fn percent(&self) -> u32 {
        if self.total_size == 0 {
            return 0;
        }
        (self.written.saturating_mul(100) / self.total_size).min(100) as u32
    }

    /// 报告的大小（KB）：已知时为总大小，否则为已写入大小
    pub fn size_kb(&self) -> u64 {
        if self.total_size > 0 {
            self.total_size / 1024
        } else {
            self.written / 1024
        }
    }
}
