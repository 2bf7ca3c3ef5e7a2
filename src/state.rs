use crate::{
    config::Config,
    error::Result,
    services::{
        push::PushGateway, storage::BlobStorage, CascadeService, CommentService, CounterService,
        Database, EventDispatcher, FollowService, IdempotencyLedger, LikeService,
        NotificationService, PostService,
    },
};
use std::sync::Arc;

/// 应用程序的共享状态
/// 包含所有服务和配置的引用
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 文档存储
    pub db: Arc<Database>,

    /// 幂等记录
    pub ledger: IdempotencyLedger,

    /// 通知扇出
    pub notification_service: NotificationService,

    /// 计数一致性
    pub counter_service: CounterService,

    /// 级联删除
    pub cascade_service: CascadeService,

    /// 事件分发
    pub events: EventDispatcher,

    pub comment_service: CommentService,
    pub like_service: LikeService,
    pub follow_service: FollowService,
    pub post_service: PostService,
}

impl AppState {
    /// 按依赖顺序组装所有服务
    pub async fn build(
        config: Config,
        db: Arc<Database>,
        storage: Arc<dyn BlobStorage>,
        push: Arc<dyn PushGateway>,
    ) -> Result<Self> {
        let ledger = IdempotencyLedger::new(db.clone());
        let notification_service = NotificationService::new(db.clone(), push).await?;
        let counter_service = CounterService::new(db.clone(), notification_service.clone()).await?;
        let cascade_service = CascadeService::new(db.clone(), storage).await?;
        let events = EventDispatcher::new(
            counter_service.clone(),
            notification_service.clone(),
            ledger.clone(),
        );

        let comment_service =
            CommentService::new(db.clone(), events.clone(), config.max_comment_length).await?;
        let like_service = LikeService::new(db.clone(), events.clone()).await?;
        let follow_service = FollowService::new(db.clone(), events.clone()).await?;
        let post_service =
            PostService::new(db.clone(), follow_service.clone(), cascade_service.clone()).await?;

        Ok(Self {
            config,
            db,
            ledger,
            notification_service,
            counter_service,
            cascade_service,
            events,
            comment_service,
            like_service,
            follow_service,
            post_service,
        })
    }

    /// 获取分页配置
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        self.config.clamp_page_size(requested)
    }

    /// 检查是否为生产环境
    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }
}
