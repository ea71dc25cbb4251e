use std::fmt;

use serde::{Deserialize, Serialize};

pub const CACHE_FILE_VERSION: u32 = 1;

/// Resource kinds with an independently sized store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    User,
    Team,
    Channel,
    PostPage,
}

impl CacheKind {
    pub const ALL: [CacheKind; 4] = [Self::User, Self::Team, Self::Channel, Self::PostPage];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Team => "team",
            Self::Channel => "channel",
            Self::PostPage => "post-page",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk layout of one store. Entries run from least to most recently used.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CacheFile<V> {
    pub version: u32,
    pub kind: CacheKind,
    pub capacity: usize,
    pub entries: Vec<CacheEntry<V>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CacheEntry<V> {
    pub key: String,
    pub value: V,
}

#[derive(Debug, Serialize)]
pub(crate) struct CacheFileRef<'a, V> {
    pub version: u32,
    pub kind: CacheKind,
    pub capacity: usize,
    pub entries: Vec<CacheEntryRef<'a, V>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CacheEntryRef<'a, V> {
    pub key: &'a str,
    pub value: &'a V,
}
