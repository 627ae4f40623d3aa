use thiserror::Error;

/// 单次下载的错误
#[derive(Debug, Error)]
pub enum TransferError {
    /// URL 或请求无法构造，不重试
    #[error("invalid request: {0}")]
    Request(String),

    /// 服务器返回非 2xx 状态码
    #[error("HTTP status: {0}")]
    Status(reqwest::StatusCode),

    /// 连接失败或响应体读取失败
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// 下载被取消（新的取消句柄已签发）
    #[error("download was stopped")]
    Cancelled,

    /// 本地文件读写失败
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }

    pub fn outcome(&self) -> Outcome {
        if self.is_cancelled() {
            Outcome::Stopped
        } else {
            Outcome::Failed
        }
    }
}

/// 下载结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Stopped,
    Failed,
}

/// 拒绝启动新下载的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartRejected {
    #[error("no download URL configured")]
    NoUrl,
    #[error("a download is already running")]
    AlreadyRunning,
    #[error("daily download cap reached")]
    DailyCapReached,
}
