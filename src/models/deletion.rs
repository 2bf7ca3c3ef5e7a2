use super::{collections, Document};
use crate::utils::serde_helpers::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 删除帖子级联的步骤，按顺序推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStep {
    PurgeStorage,
    DeleteRoot,
    DeleteChildren,
}

impl DeletionStep {
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::PurgeStorage => Some(Self::DeleteRoot),
            Self::DeleteRoot => Some(Self::DeleteChildren),
            Self::DeleteChildren => None,
        }
    }
}

/// 短期工作记录：进程在级联中途崩溃后，由后台清扫任务继续
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDeletion {
    /// 与帖子 ID 相同
    pub id: String,
    pub image_urls: Vec<String>,
    pub step: DeletionStep,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Document for PostDeletion {
    const COLLECTION: &'static str = collections::POST_DELETIONS;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPostDeletion {
    pub image_urls: Vec<String>,
    pub step: DeletionStep,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// 一次级联删除的执行结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub post_id: String,
    /// 尝试删除的全部存储路径（原图 + 缩略图）
    pub attempted_paths: Vec<String>,
    pub originals_deleted: usize,
    pub originals_failed: usize,
    pub post_deleted: bool,
    pub comments_deleted: usize,
    pub likes_deleted: usize,
    /// 是否所有文档步骤都已完成；否则工作记录会保留给清扫任务
    pub completed: bool,
}
