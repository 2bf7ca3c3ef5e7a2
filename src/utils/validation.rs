use crate::error::{AppError, Result};

/// 通知预览文本的最大可见字符数（含省略号）
pub const PREVIEW_MAX_CHARS: usize = 50;
pub const ELLIPSIS: &str = "...";

/// 验证客户端提供的文档/用户 ID
///
/// ID 会作为存储记录键使用，只允许字母、数字、下划线和连字符
pub fn validate_document_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(AppError::Validation("ID不能为空".to_string()));
    }

    if id.len() > 128 {
        return Err(AppError::Validation("ID不能超过128个字符".to_string()));
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::Validation("ID只能包含字母、数字、下划线和连字符".to_string()));
    }

    Ok(())
}

/// 验证评论内容
pub fn validate_comment_text(text: &str, max_length: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(AppError::Validation("评论内容不能为空".to_string()));
    }

    if text.chars().count() > max_length {
        return Err(AppError::Validation(format!("评论内容不能超过{}个字符", max_length)));
    }

    Ok(())
}

/// 截断文本用于通知预览：超过上限时保留前 `max_chars - 3` 个字符并追加 `...`
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let keep = max_chars.saturating_sub(ELLIPSIS.chars().count());
    let mut preview: String = text.chars().take(keep).collect();
    preview.push_str(ELLIPSIS);
    preview
}
