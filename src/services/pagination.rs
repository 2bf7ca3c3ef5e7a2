use crate::{
    error::Result,
    models::{
        decode,
        pagination::{Hydrated, Page, PageRequest},
        user::{User, UserSummary},
        Document,
    },
    services::{
        database::{Filter, Query, SortDirection, CREATED_AT},
        Database,
    },
    utils::serde_helpers::plain_record_id,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// 所有列表接口共用的游标分页与用户信息水合
#[derive(Clone)]
pub struct Paginator {
    db: Arc<Database>,
}

impl Paginator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// 按 `createdAt` 倒序分页
    ///
    /// 游标文档已不存在时从最新一条重新开始，而不是报错。
    pub async fn paginate<T: Document>(&self, filters: Vec<Filter>, request: &PageRequest) -> Result<Page<T>> {
        let mut query = Query::new(T::COLLECTION)
            .order_by(CREATED_AT, SortDirection::Descending)
            .limit(request.page_size);
        for filter in filters {
            query = query.filter(filter);
        }

        if let Some(cursor) = &request.cursor {
            match self.db.store().get(T::COLLECTION, cursor).await? {
                Some(doc) => query = query.start_after_document(&doc),
                None => debug!(
                    collection = T::COLLECTION,
                    cursor = %cursor,
                    "Cursor document no longer exists, restarting from newest"
                ),
            }
        }

        let rows = self.db.store().query(&query).await?;
        let fetched = rows.len();
        let next_cursor = rows
            .last()
            .and_then(|row| row.get("id"))
            .and_then(plain_record_id);

        let items = rows
            .into_iter()
            .filter_map(|row| match decode::<T>(row) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!("Skipping undecodable row in page: {}", e);
                    None
                }
            })
            .collect();

        Ok(Page {
            items,
            next_cursor,
            has_more: fetched == request.page_size,
        })
    }

    /// 用一次批量查询把用户公开字段合并到每条记录上；私有字段永远不会出现
    pub async fn hydrate<T, F>(&self, page: Page<T>, user_id_of: F) -> Result<Page<Hydrated<T>>>
    where
        F: Fn(&T) -> &str,
    {
        let ids: Vec<String> = {
            let mut seen = HashSet::new();
            page.items
                .iter()
                .map(|item| user_id_of(item))
                .filter(|id| seen.insert(*id))
                .map(str::to_string)
                .collect()
        };

        let profiles: HashMap<String, UserSummary> = self
            .db
            .get_many::<User>(&ids)
            .await?
            .into_iter()
            .map(|user| (user.id.clone(), user.summary()))
            .collect();

        if profiles.len() < ids.len() {
            debug!("{} referenced users not found during hydration", ids.len() - profiles.len());
        }

        Ok(page.map(|item| {
            let profile = profiles.get(user_id_of(&item)).cloned();
            Hydrated { item, profile }
        }))
    }
}
