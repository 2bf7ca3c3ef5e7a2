//! 图片存储路径与缩略图命名规则
//!
//! 帖子图片在存储中以原图加两个缩略图的形式存在：
//! `{dir}{basename}_thumb_small{ext}` 与 `{dir}{basename}_thumb_medium{ext}`。

use serde::{Deserialize, Serialize};

pub const SMALL_THUMB_SUFFIX: &str = "_thumb_small";
pub const MEDIUM_THUMB_SUFFIX: &str = "_thumb_medium";

/// 缩略图尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThumbnailSize {
    Small,
    Medium,
}

impl ThumbnailSize {
    pub const ALL: [ThumbnailSize; 2] = [ThumbnailSize::Small, ThumbnailSize::Medium];

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Small => SMALL_THUMB_SUFFIX,
            Self::Medium => MEDIUM_THUMB_SUFFIX,
        }
    }
}

/// 一张图片在存储中的全部对象路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageObjectSet {
    pub original: String,
    pub small: String,
    pub medium: String,
}

impl ImageObjectSet {
    pub fn for_path(original: &str) -> Self {
        Self {
            original: original.to_string(),
            small: thumbnail_path(original, ThumbnailSize::Small),
            medium: thumbnail_path(original, ThumbnailSize::Medium),
        }
    }

    pub fn derivatives(&self) -> [&str; 2] {
        [&self.small, &self.medium]
    }
}

/// 把路径拆成 (目录含末尾斜杠, 文件基名, 扩展名含点)
fn split_path(path: &str) -> (&str, &str, &str) {
    let (dir, file) = match path.rfind('/') {
        Some(pos) => path.split_at(pos + 1),
        None => ("", path),
    };

    match file.rfind('.') {
        Some(pos) if pos > 0 => {
            let (basename, ext) = file.split_at(pos);
            (dir, basename, ext)
        }
        _ => (dir, file, ""),
    }
}

pub fn thumbnail_path(original: &str, size: ThumbnailSize) -> String {
    let (dir, basename, ext) = split_path(original);
    format!("{}{}{}{}", dir, basename, size.suffix(), ext)
}

/// 将帖子上保存的图片引用解析为存储路径
///
/// 引用可能是存储路径本身、`gs://bucket/path`，或下载 URL。
/// 下载 URL 中 `/o/` 之后的部分是百分号编码的对象路径。
pub fn storage_path_from_reference(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    let path = if let Some(rest) = reference.strip_prefix("gs://") {
        rest.split_once('/').map(|(_, path)| path.to_string())?
    } else if reference.starts_with("http://") || reference.starts_with("https://") {
        let url = url::Url::parse(reference).ok()?;
        let raw = match url.path().split_once("/o/") {
            Some((_, object)) => object.to_string(),
            None => url.path().to_string(),
        };
        urlencoding::decode(&raw).ok()?.into_owned()
    } else {
        reference.to_string()
    };

    let path = path.trim_start_matches('/');
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}
