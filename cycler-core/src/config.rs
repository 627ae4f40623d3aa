use crate::types::Config;
use anyhow::Result;
use fs_err::tokio as fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// 配置存储，内存中的配置与 JSON 文件保持同步
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: RwLock<Config>,
}

impl ConfigStore {
    /// 从文件加载配置
    ///
    /// 文件不存在时写入默认配置；内容无法解析时使用默认配置。
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let store = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            let config = serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("failed to parse {}: {e}; using defaults", path.display());
                Config::default()
            });
            Self::with_config(path, config)
        } else {
            let store = Self::with_config(path, Config::default());
            store.save().await?;
            store
        };
        Ok(store)
    }

    /// 使用给定配置创建，不读取文件
    pub fn with_config(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: path.into(),
            config: RwLock::new(config),
        }
    }

    /// 当前配置的快照
    pub async fn get(&self) -> Config {
        self.config.read().await.clone()
    }

    /// 修改并保存配置，同时确保下载目录存在
    ///
    /// 保存失败时内存中的配置保持不变。
    pub async fn update<F>(&self, f: F) -> Result<Config>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.config.write().await;
        let mut updated = config.clone();
        f(&mut updated);
        Self::write_file(&self.path, &updated).await?;
        *config = updated;
        fs::create_dir_all(&config.dir).await?;
        Ok(config.clone())
    }

    /// 保存配置到文件
    pub async fn save(&self) -> Result<()> {
        let config = self.config.read().await;
        Self::write_file(&self.path, &config).await
    }

    /// 切换定时任务开关，返回新状态
    pub async fn toggle_task_enabled(&self) -> Result<bool> {
        let config = self
            .update(|c| c.task_enabled = !c.task_enabled)
            .await?;
        Ok(config.task_enabled)
    }

    /// 切换每日上限开关，返回新状态
    pub async fn toggle_daily_limit_enabled(&self) -> Result<bool> {
        let config = self
            .update(|c| c.daily_limit_enabled = !c.daily_limit_enabled)
            .await?;
        Ok(config.daily_limit_enabled)
    }

    async fn write_file(path: &Path, config: &Config) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content).await?;
        Ok(())
    }
}
