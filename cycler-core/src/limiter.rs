use crate::error::TransferError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 令牌桶限速器
///
/// 令牌以 `rate` 个/秒的速度连续补充，桶容量为 2 倍速率，
/// 每消耗 1 字节需要 1 个令牌。桶初始为空，因此从开始下载起算，
/// 任意时刻累计吞吐量都不会超过限速。
#[derive(Debug)]
pub struct SpeedLimiter {
    /// 字节/秒
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl SpeedLimiter {
    /// 按 KB/s 创建限速器，0 表示不限速
    pub fn from_kb(speed_kb: u64) -> Option<Self> {
        (speed_kb > 0).then(|| Self::new(speed_kb.saturating_mul(1024)))
    }

    /// 按字节/秒创建限速器
    pub fn new(bytes_per_second: u64) -> Self {
        let rate = bytes_per_second.max(1) as f64;
        Self {
            rate,
            capacity: rate * 2.0,
            tokens: 0.0,
            last_refill: Instant::now(),
        }
    }

    #[cfg(test)]
    fn bytes_per_second(&self) -> u64 {
        self.rate as u64
    }

    /// 等待直到获得 `bytes` 个令牌
    ///
    /// 超过桶容量的请求按容量分批获取。等待期间取消会立即返回
    /// [`TransferError::Cancelled`]。
    pub async fn wait(&mut self, bytes: u64, cancel: &CancellationToken) -> Result<(), TransferError> {
        let mut remaining = bytes as f64;
        while remaining > 0.0 {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let want = remaining.min(self.capacity);
            self.refill();
            if self.tokens >= want {
                self.tokens -= want;
                remaining -= want;
                continue;
            }

            let deficit = want - self.tokens;
            let delay = Duration::from_secs_f64(deficit / self.rate);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(())
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }
}
