use fs_err::tokio as fs;
use std::path::Path;

/// 删除目录下的所有文件（跳过子目录），返回删除的文件数
///
/// 尽力而为：目录不可读或单个文件删除失败只记录日志。
pub async fn clean_dir(dir: &Path) -> usize {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("failed to clean cache: {e}");
            return 0;
        }
    };

    let mut count = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("failed to list {}: {e}", dir.display());
                break;
            }
        };

        match entry.file_type().await {
            Ok(file_type) if file_type.is_dir() => continue,
            Ok(_) => {}
            Err(_) => continue,
        }

        match fs::remove_file(entry.path()).await {
            Ok(()) => count += 1,
            Err(e) => tracing::warn!("failed to remove cached file: {e}"),
        }
    }

    tracing::debug!("removed {count} cached files from {}", dir.display());
    count
}
