use crate::{
    cache,
    error::{Outcome, TransferError},
    limiter::SpeedLimiter,
    progress::ProgressSampler,
    state::RuntimeState,
    types::{Progress, STATUS_COMPLETE, STATUS_DOWNLOADING, STATUS_STOPPED},
};
use fs_err::tokio as fs;
use futures::StreamExt;
use reqwest::{Client, Response, Url, header::USER_AGENT};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

const DEFAULT_USER_AGENT: &str = concat!("cycler/", env!("CARGO_PKG_VERSION"));

/// 单次下载的结果
#[derive(Debug)]
pub struct TransferReport {
    /// 输出文件，请求阶段失败时为 `None`
    pub file: Option<PathBuf>,
    /// 已写入的字节数
    pub bytes: u64,
    pub result: Result<(), TransferError>,
}

impl TransferReport {
    fn rejected(error: TransferError) -> Self {
        Self {
            file: None,
            bytes: 0,
            result: Err(error),
        }
    }

    pub fn outcome(&self) -> Outcome {
        match &self.result {
            Ok(()) => Outcome::Success,
            Err(e) => e.outcome(),
        }
    }
}

/// 单文件下载器
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    state: Arc<RuntimeState>,
}

impl Downloader {
    /// 创建下载器，进度发布到 `state`
    pub fn new(state: Arc<RuntimeState>) -> reqwest::Result<Self> {
        let client = Client::builder()
            .tcp_keepalive(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(30))
            .no_proxy()
            .build()?;
        Ok(Self { client, state })
    }

    /// 下载文件
    ///
    /// # 参数
    /// * `cancel` - 本次下载的取消句柄
    /// * `url` - 下载 URL
    /// * `speed_kb` - 限速（KB/s），0 表示不限速
    /// * `dir` - 目标目录，下载前会被清空
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        url: &str,
        speed_kb: u64,
        dir: &Path,
    ) -> TransferReport {
        let removed = cache::clean_dir(dir).await;
        if removed > 0 {
            tracing::debug!("removed {removed} stale files before download");
        }

        let response = match self.open(cancel, url).await {
            Ok(response) => response,
            Err(e) => {
                let progress = if e.is_cancelled() {
                    Progress::new(0, 0, 0, STATUS_STOPPED)
                } else {
                    Progress::failed(0, 0, &e)
                };
                self.state.set_progress(progress).await;
                return TransferReport::rejected(e);
            }
        };

        let (path, file) = match create_output(dir).await {
            Ok(created) => created,
            Err(e) => {
                let e = TransferError::Io(e);
                self.state.set_progress(Progress::failed(0, 0, &e)).await;
                return TransferReport::rejected(e);
            }
        };
        tracing::info!("downloading {url} to {}", path.display());

        let mut sampler =
            ProgressSampler::new(Arc::clone(&self.state), response.content_length());
        self.state
            .set_progress(Progress::new(0, 0, sampler.size_kb(), STATUS_DOWNLOADING))
            .await;

        let limiter = SpeedLimiter::from_kb(speed_kb);
        let result = copy_body(response, file, limiter, &mut sampler, cancel).await;

        let terminal = match &result {
            Ok(()) => Progress::new(100, 0, sampler.size_kb(), STATUS_COMPLETE),
            Err(TransferError::Cancelled) => {
                Progress::new(sampler.percent(), 0, sampler.size_kb(), STATUS_STOPPED)
            }
            Err(e) => Progress::failed(sampler.percent(), sampler.size_kb(), e),
        };
        self.state.set_progress(terminal).await;

        TransferReport {
            file: Some(path),
            bytes: sampler.written(),
            result,
        }
    }

    /// 发送请求，等待响应头期间可被取消
    async fn open(&self, cancel: &CancellationToken, url: &str) -> Result<Response, TransferError> {
        let url = Url::parse(url).map_err(|e| TransferError::Request(format!("{url}: {e}")))?;
        let request = self.client.get(url).header(USER_AGENT, DEFAULT_USER_AGENT);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            response = request.send() => response?,
        };

        if !response.status().is_success() {
            return Err(TransferError::Status(response.status()));
        }
        Ok(response)
    }
}

/// 在目录下创建新的输出文件，名称基于当前时间戳，已存在时追加序号
async fn create_output(dir: &Path) -> std::io::Result<(PathBuf, fs::File)> {
    fs::create_dir_all(dir).await?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            format!("file_{stamp}")
        } else {
            format!("file_{stamp}_{suffix}")
        };
        let path = dir.join(name);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(e),
        }
    }
}

/// 响应体 → 限速 → 文件 + 进度
async fn copy_body(
    response: Response,
    mut file: fs::File,
    mut limiter: Option<SpeedLimiter>,
    sampler: &mut ProgressSampler,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let mut stream = response.bytes_stream();

    while let Some(item) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(TransferError::Cancelled),
        item = stream.next() => item,
    } {
        let chunk = item?;
        let len = chunk.len() as u64;

        if let Some(limiter) = limiter.as_mut() {
            limiter.wait(len, cancel).await?;
        }

        file.write_all(&chunk).await?;
        sampler.record(len).await;
    }

    file.flush().await?;
    Ok(())
}
