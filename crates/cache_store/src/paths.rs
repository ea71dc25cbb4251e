use std::path::{Path, PathBuf};

use crate::schema::CacheKind;

pub const CACHE_APP_DIR: &str = "matterless";

/// Per-user cache directory for the application, if the platform defines one.
#[must_use]
pub fn cache_root() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join(CACHE_APP_DIR))
}

#[must_use]
pub fn sanitize_dir_name(label: &str) -> String {
    let sanitized: String = label
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '-',
        })
        .collect();

    if sanitized.is_empty() {
        "default".to_string()
    } else {
        sanitized
    }
}

/// Directory holding the cache files of one server.
#[must_use]
pub fn server_cache_dir(root: &Path, server: &str) -> PathBuf {
    root.join(sanitize_dir_name(server))
}

#[must_use]
pub fn cache_file_name(kind: CacheKind) -> String {
    format!("{}.json", kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_labels_become_flat_directory_names() {
        assert_eq!(sanitize_dir_name("chat.example.com:8065"), "chat.example.com-8065");
        assert_eq!(sanitize_dir_name("a/b\\c"), "a-b-c");
        assert_eq!(sanitize_dir_name("  "), "default");
    }

    #[test]
    fn each_kind_has_its_own_file() {
        assert_eq!(cache_file_name(CacheKind::User), "user.json");
        assert_eq!(cache_file_name(CacheKind::PostPage), "post-page.json");
        assert_eq!(
            server_cache_dir(Path::new("/tmp/cache"), "host"),
            PathBuf::from("/tmp/cache/host")
        );
    }
}
