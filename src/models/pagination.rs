use super::user::UserSummary;
use serde::{Deserialize, Serialize};

/// 游标分页请求：游标是上一页最后一条记录的 ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: usize,
    pub cursor: Option<String>,
}

impl PageRequest {
    pub fn new(page_size: usize, cursor: Option<String>) -> Self {
        Self {
            page_size: page_size.max(1),
            cursor: cursor.filter(|c| !c.trim().is_empty()),
        }
    }

    pub fn first(page_size: usize) -> Self {
        Self::new(page_size, None)
    }
}

/// `has_more` 在页满时为 true，即使下一页可能为空
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
            has_more: self.has_more,
        }
    }
}

/// 合并了关联用户公开字段的记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hydrated<T> {
    #[serde(flatten)]
    pub item: T,
    #[serde(flatten)]
    pub profile: Option<UserSummary>,
}

/// 列表接口的查询参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_request_normalizes() {
        let request = PageRequest::new(0, Some("  ".to_string()));
        assert_eq!(request.page_size, 1);
        assert_eq!(request.cursor, None);
    }

    #[test]
    fn test_hydrated_merges_profile_fields() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Item {
            id: String,
            author_id: String,
        }

        let hydrated = Hydrated {
            item: Item { id: "c1".to_string(), author_id: "u1".to_string() },
            profile: Some(UserSummary {
                username: "alice".to_string(),
                profile_image_url: None,
            }),
        };
        assert_eq!(
            serde_json::to_value(&hydrated).unwrap(),
            json!({"id": "c1", "authorId": "u1", "username": "alice", "profileImageUrl": null})
        );

        let bare = Hydrated {
            item: Item { id: "c2".to_string(), author_id: "gone".to_string() },
            profile: None,
        };
        assert_eq!(serde_json::to_value(&bare).unwrap(), json!({"id": "c2", "authorId": "gone"}));
    }
}
