pub mod cascade;
pub mod comment;
pub mod counter;
pub mod database;
pub mod events;
pub mod follow;
pub mod idempotency;
pub mod like;
pub mod memory;
pub mod notification;
pub mod pagination;
pub mod post;
pub mod push;
pub mod storage;
pub mod surreal;

// 重新导出常用类型
pub use cascade::CascadeService;
pub use comment::CommentService;
pub use counter::CounterService;
pub use database::Database;
pub use events::EventDispatcher;
pub use follow::FollowService;
pub use idempotency::IdempotencyLedger;
pub use like::LikeService;
pub use notification::NotificationService;
pub use pagination::Paginator;
pub use post::PostService;

use std::time::Duration;

/// 后台周期任务的最短间隔
pub const MIN_TASK_INTERVAL: Duration = Duration::from_secs(1);

/// 周期计时器；零间隔会让 tokio 直接 panic，这里抬到最短间隔
pub(crate) fn periodic(interval: Duration) -> tokio::time::Interval {
    tokio::time::interval(interval.max(MIN_TASK_INTERVAL))
}
