use crate::config::Config;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// 删除对象的结果；对象本就不存在不算失败
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// 对象存储（帖子图片及其缩略图）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn delete(&self, path: &str) -> Result<DeleteOutcome>;
}

pub async fn create_storage(config: &Config) -> Result<Arc<dyn BlobStorage>> {
    match config.storage_type.as_str() {
        "memory" => Ok(Arc::new(MemoryBlobStorage::new())),
        "local" => Ok(Arc::new(LocalBlobStorage::new(&config.storage_root))),
        #[cfg(feature = "s3-storage")]
        "s3" => Ok(Arc::new(S3BlobStorage::new(config).await?)),
        other => Err(AppError::Internal(format!("Unsupported storage type: {}", other))),
    }
}

/// 本地文件系统存储，对象路径相对于根目录
#[derive(Debug, Clone)]
pub struct LocalBlobStorage {
    root: PathBuf,
}

impl LocalBlobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(AppError::Storage(format!("Invalid object path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    async fn delete(&self, path: &str) -> Result<DeleteOutcome> {
        let full_path = self.resolve(path)?;
        match tokio::fs::remove_file(&full_path).await {
            Ok(()) => {
                debug!("Deleted object {}", full_path.display());
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(AppError::Storage(format!("Failed to delete {}: {}", path, e))),
        }
    }
}

/// 进程内对象存储，记录每一次删除尝试
#[derive(Debug, Default)]
pub struct MemoryBlobStorage {
    objects: DashMap<String, Vec<u8>>,
    attempts: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, path: &str, bytes: Vec<u8>) {
        self.objects.insert(path.to_string(), bytes);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.contains_key(path)
    }

    /// 让指定路径的删除返回存储错误
    pub fn fail_on(&self, path: &str) {
        self.failing.lock().insert(path.to_string());
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn delete(&self, path: &str) -> Result<DeleteOutcome> {
        self.attempts.lock().push(path.to_string());

        if self.failing.lock().contains(path) {
            return Err(AppError::Storage(format!("Failed to delete {}", path)));
        }

        Ok(match self.objects.remove(path) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }
}

#[cfg(feature = "s3-storage")]
pub struct S3BlobStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

#[cfg(feature = "s3-storage")]
impl S3BlobStorage {
    pub async fn new(config: &Config) -> Result<Self> {
        let aws_config = aws_config::from_env()
            .region(aws_sdk_s3::Region::new(config.s3_region.clone()))
            .load()
            .await;

        tracing::info!("Using S3 bucket {} for post images", config.s3_bucket);
        Ok(Self {
            client: aws_sdk_s3::Client::new(&aws_config),
            bucket: config.s3_bucket.clone(),
        })
    }
}

#[cfg(feature = "s3-storage")]
#[async_trait]
impl BlobStorage for S3BlobStorage {
    async fn delete(&self, path: &str) -> Result<DeleteOutcome> {
        // S3 对不存在的键同样返回成功
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to delete {}: {}", path, e)))?;

        Ok(DeleteOutcome::Deleted)
    }
}
