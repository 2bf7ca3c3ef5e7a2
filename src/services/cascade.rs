use crate::{
    error::{AppError, Result},
    models::{
        collections,
        deletion::{CascadeReport, DeletionStep, NewPostDeletion, PostDeletion},
        post::Post,
    },
    services::{
        database::{Filter, Query, WriteBatch},
        periodic,
        storage::{BlobStorage, DeleteOutcome},
        Database,
    },
    utils::{
        image::{storage_path_from_reference, ImageObjectSet},
        serde_helpers::format_timestamp,
    },
};
use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const DELETE_BATCH_SIZE: usize = 500;

/// 删除帖子的级联协调器
///
/// 顺序：清理存储 → 删除帖子 → 并发删除评论和点赞。
/// 不是事务：任何一步失败都只记录日志，工作记录保留给后台清扫继续执行。
#[derive(Clone)]
pub struct CascadeService {
    db: Arc<Database>,
    storage: Arc<dyn BlobStorage>,
}

impl CascadeService {
    pub async fn new(db: Arc<Database>, storage: Arc<dyn BlobStorage>) -> Result<Self> {
        Ok(Self { db, storage })
    }

    /// 帖子和工作记录都不存在时返回 `NotFound`
    pub async fn delete_post(&self, post_id: &str) -> Result<CascadeReport> {
        debug!("Deleting post with cascade: {}", post_id);

        let record = match self.db.get_by_id::<PostDeletion>(post_id).await? {
            Some(record) => {
                info!(post_id = %post_id, step = ?record.step, "Resuming interrupted post deletion");
                record
            }
            None => {
                let post = self
                    .db
                    .get_by_id::<Post>(post_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Post"))?;
                self.begin(&post).await?
            }
        };

        Ok(self.run(record).await)
    }

    /// 继续执行超过 `stale_after` 未推进的工作记录，返回完成的数量
    pub async fn resume_stale(&self, stale_after: Duration) -> Result<usize> {
        let stale_after = chrono::Duration::from_std(stale_after)
            .map_err(|e| AppError::Internal(format!("Invalid stale duration: {}", e)))?;
        let cutoff = Utc::now() - stale_after;

        let records: Vec<PostDeletion> = self
            .db
            .find(&Query::new(collections::POST_DELETIONS))
            .await?;

        let mut completed = 0;
        for record in records.into_iter().filter(|r| r.updated_at < cutoff) {
            warn!(post_id = %record.id, step = ?record.step, "Resuming stale post deletion");
            if self.run(record).await.completed {
                completed += 1;
            }
        }
        Ok(completed)
    }

    pub fn spawn_sweep(self, interval: Duration, stale_after: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = periodic(interval);
            loop {
                ticker.tick().await;
                match self.resume_stale(stale_after).await {
                    Ok(0) => debug!("No stale post deletions"),
                    Ok(count) => info!("Completed {} stale post deletions", count),
                    Err(e) => warn!("Post deletion sweep failed: {}", e),
                }
            }
        })
    }

    async fn begin(&self, post: &Post) -> Result<PostDeletion> {
        let new_record = NewPostDeletion {
            image_urls: post.image_urls.clone(),
            step: DeletionStep::PurgeStorage,
            updated_at: Utc::now(),
        };

        match self.db.create::<PostDeletion, _>(&post.id, &new_record).await {
            Ok(record) => Ok(record),
            // 并发的删除请求已经开始
            Err(AppError::Conflict(_)) => self
                .db
                .get_by_id::<PostDeletion>(&post.id)
                .await?
                .ok_or_else(|| AppError::not_found("Post deletion")),
            Err(e) => Err(e),
        }
    }

    async fn run(&self, record: PostDeletion) -> CascadeReport {
        let mut report = CascadeReport {
            post_id: record.id.clone(),
            ..Default::default()
        };
        let mut failed_at: Option<DeletionStep> = None;
        let mut step = Some(record.step);

        while let Some(current) = step {
            let succeeded = match current {
                DeletionStep::PurgeStorage => {
                    self.purge_storage(&record.image_urls, &mut report).await;
                    true
                }
                DeletionStep::DeleteRoot => self.delete_root(&record.id, &mut report).await,
                DeletionStep::DeleteChildren => self.delete_children(&record.id, &mut report).await,
            };

            if !succeeded && failed_at.is_none() {
                failed_at = Some(current);
            }

            step = current.next();
            if let (None, Some(next)) = (failed_at, step) {
                self.advance(&record.id, next).await;
            }
        }

        match failed_at {
            None => {
                if let Err(e) = self.db.delete_by_id(collections::POST_DELETIONS, &record.id).await {
                    warn!(post_id = %record.id, "Failed to remove deletion work record: {}", e);
                }
                report.completed = true;
                info!(
                    post_id = %record.id,
                    comments = report.comments_deleted,
                    likes = report.likes_deleted,
                    images_failed = report.originals_failed,
                    "Post deletion completed"
                );
            }
            Some(step) => {
                warn!(post_id = %record.id, step = ?step, "Post deletion incomplete; left for sweep");
            }
        }

        report
    }

    async fn advance(&self, post_id: &str, next: DeletionStep) {
        let fields = json!({
            "step": next,
            "updatedAt": format_timestamp(&Utc::now()),
        });
        if let Err(e) = self.db.merge(collections::POST_DELETIONS, post_id, fields).await {
            warn!(post_id = %post_id, "Failed to record deletion progress: {}", e);
        }
    }

    /// 原图删除失败记录错误；缩略图的失败直接忽略
    async fn purge_storage(&self, image_urls: &[String], report: &mut CascadeReport) {
        let mut sets = Vec::with_capacity(image_urls.len());
        for reference in image_urls {
            match storage_path_from_reference(reference) {
                Some(path) => sets.push(ImageObjectSet::for_path(&path)),
                None => warn!(reference = %reference, "Unrecognized image reference, skipping"),
            }
        }

        for set in &sets {
            report.attempted_paths.push(set.original.clone());
            report
                .attempted_paths
                .extend(set.derivatives().iter().map(|p| p.to_string()));
        }

        let results = join_all(sets.iter().map(|set| self.purge_image(set))).await;
        for deleted in results {
            if deleted {
                report.originals_deleted += 1;
            } else {
                report.originals_failed += 1;
            }
        }
    }

    async fn purge_image(&self, set: &ImageObjectSet) -> bool {
        let original = match self.storage.delete(&set.original).await {
            Ok(DeleteOutcome::Deleted) => true,
            Ok(DeleteOutcome::NotFound) => {
                debug!(path = %set.original, "Original image already absent");
                true
            }
            Err(e) => {
                error!(path = %set.original, "Failed to delete original image: {}", e);
                false
            }
        };

        for path in set.derivatives() {
            if let Err(e) = self.storage.delete(path).await {
                debug!(path = %path, "Ignoring thumbnail delete failure: {}", e);
            }
        }

        original
    }

    async fn delete_root(&self, post_id: &str, report: &mut CascadeReport) -> bool {
        match self.db.delete_by_id(collections::POSTS, post_id).await {
            Ok(deleted) => {
                report.post_deleted = deleted;
                true
            }
            Err(e) => {
                error!(post_id = %post_id, "Failed to delete post document: {}", e);
                false
            }
        }
    }

    async fn delete_children(&self, post_id: &str, report: &mut CascadeReport) -> bool {
        let (comments, likes) = tokio::join!(
            self.delete_matching(collections::COMMENTS, post_id),
            self.delete_matching(collections::LIKES, post_id),
        );

        let mut succeeded = true;
        match comments {
            Ok(count) => report.comments_deleted = count,
            Err(e) => {
                error!(post_id = %post_id, "Failed to delete comments: {}", e);
                succeeded = false;
            }
        }
        match likes {
            Ok(count) => report.likes_deleted = count,
            Err(e) => {
                error!(post_id = %post_id, "Failed to delete likes: {}", e);
                succeeded = false;
            }
        }
        succeeded
    }

    async fn delete_matching(&self, collection: &str, post_id: &str) -> Result<usize> {
        let query = Query::new(collection).filter(Filter::eq("postId", post_id));
        let ids: Vec<String> = self
            .db
            .store()
            .query(&query)
            .await?
            .iter()
            .filter_map(|doc| doc.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect();

        for chunk in ids.chunks(DELETE_BATCH_SIZE) {
            let mut batch = WriteBatch::new();
            for id in chunk {
                batch.delete(collection, id);
            }
            self.db.commit(batch).await?;
        }

        debug!("Deleted {} {} for post {}", ids.len(), collection, post_id);
        Ok(ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{database::DocumentStore, memory::MemoryStore};
    use crate::services::storage::{MemoryBlobStorage, MockBlobStorage};

    fn seed_post(store: &MemoryStore, images: &[&str]) {
        store
            .seed(
                "posts",
                json!({
                    "id": "p1",
                    "authorId": "u1",
                    "imageUrls": images,
                    "createdAt": "2024-01-01T00:00:00.000000Z"
                }),
            )
            .unwrap();
        store
            .seed("comments", json!({"id": "c1", "postId": "p1", "authorId": "u2", "text": "a"}))
            .unwrap();
        store
            .seed("comments", json!({"id": "c2", "postId": "p2", "authorId": "u2", "text": "b"}))
            .unwrap();
        store
            .seed("likes", json!({"id": "u2~p1", "postId": "p1", "userId": "u2"}))
            .unwrap();
    }

    #[tokio::test]
    async fn test_cascade_removes_children_and_images() {
        let store = Arc::new(MemoryStore::new());
        seed_post(&store, &["posts/u1/a.jpg"]);
        let blobs = Arc::new(MemoryBlobStorage::new());
        blobs.put("posts/u1/a.jpg", vec![1]);
        blobs.put("posts/u1/a_thumb_small.jpg", vec![1]);

        let cascade = CascadeService::new(Arc::new(Database::with_store(store.clone(), 30)), blobs.clone())
            .await
            .unwrap();
        let report = cascade.delete_post("p1").await.unwrap();

        assert!(report.completed);
        assert!(report.post_deleted);
        assert_eq!(report.comments_deleted, 1);
        assert_eq!(report.likes_deleted, 1);
        assert_eq!(
            report.attempted_paths,
            vec!["posts/u1/a.jpg", "posts/u1/a_thumb_small.jpg", "posts/u1/a_thumb_medium.jpg"]
        );
        assert!(!blobs.contains("posts/u1/a.jpg"));
        assert_eq!(store.count("comments"), 1);
        assert_eq!(store.count("post_deletions"), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_block_documents() {
        let store = Arc::new(MemoryStore::new());
        seed_post(&store, &["posts/u1/a.jpg"]);

        let mut storage = MockBlobStorage::new();
        storage
            .expect_delete()
            .returning(|path| Err(AppError::Storage(format!("denied: {}", path))));

        let cascade = CascadeService::new(Arc::new(Database::with_store(store.clone(), 30)), Arc::new(storage))
            .await
            .unwrap();
        let report = cascade.delete_post("p1").await.unwrap();

        assert!(report.completed);
        assert_eq!(report.originals_failed, 1);
        assert!(store.get("posts", "p1").await.unwrap().is_none());
        assert_eq!(store.count("likes"), 0);
    }

    #[tokio::test]
    async fn test_missing_post_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let cascade = CascadeService::new(
            Arc::new(Database::with_store(store, 30)),
            Arc::new(MemoryBlobStorage::new()),
        )
        .await
        .unwrap();

        assert!(cascade.delete_post("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_resumes_from_recorded_step() {
        let store = Arc::new(MemoryStore::new());
        seed_post(&store, &["posts/u1/a.jpg"]);
        // 进程在删除帖子后崩溃：只剩子文档
        store.delete("posts", "p1").await.unwrap();
        store
            .seed(
                "post_deletions",
                json!({
                    "id": "p1",
                    "imageUrls": ["posts/u1/a.jpg"],
                    "step": "delete_children",
                    "createdAt": "2024-01-01T00:00:00.000000Z",
                    "updatedAt": "2024-01-01T00:00:00.000000Z"
                }),
            )
            .unwrap();

        let blobs = Arc::new(MemoryBlobStorage::new());
        let cascade = CascadeService::new(Arc::new(Database::with_store(store.clone(), 30)), blobs.clone())
            .await
            .unwrap();
        let completed = cascade.resume_stale(Duration::from_secs(60)).await.unwrap();

        assert_eq!(completed, 1);
        assert!(blobs.attempts().is_empty());
        assert_eq!(store.count("likes"), 0);
        assert_eq!(store.count("post_deletions"), 0);
    }

    #[tokio::test]
    async fn test_zero_sweep_interval_keeps_task_running() {
        let store = Arc::new(MemoryStore::new());
        let cascade = CascadeService::new(
            Arc::new(Database::with_store(store, 30)),
            Arc::new(MemoryBlobStorage::new()),
        )
        .await
        .unwrap();

        let handle = cascade.spawn_sweep(Duration::ZERO, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!handle.is_finished());
        handle.abort();
    }
}
