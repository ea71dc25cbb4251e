//! Accumulated, deduplicated view of one channel's post history.

use std::collections::{HashMap, HashSet};

use chat_client::{Post, PostId, PostPage};
use serde::{Deserialize, Serialize};

use crate::error::MatterlessError;

/// Counters describing how one page merged into a history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageMerge {
    /// Identifiers appended to `order`.
    pub added: usize,
    /// Identifiers that were already known.
    pub collisions: usize,
    /// Identifiers listed in the page order without a post body.
    pub missing: usize,
}

impl PageMerge {
    /// True when the page added nothing and at least one of its posts was
    /// already known. A page made only of body-less ids does not qualify.
    #[must_use]
    pub fn is_full_collision(&self) -> bool {
        self.added == 0 && self.collisions > 0
    }
}

/// Channel history merged across pages and syncs.
///
/// `order` lists identifiers in first-seen order and never repeats one; every
/// identifier in `order` has a post in `posts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredHistory", into = "StoredHistory")]
pub struct MergedChannelHistory {
    channel_id: String,
    known: HashSet<PostId>,
    order: Vec<PostId>,
    posts: HashMap<PostId, Post>,
}

impl MergedChannelHistory {
    #[must_use]
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            known: HashSet::new(),
            order: Vec::new(),
            posts: HashMap::new(),
        }
    }

    /// Assembles a history from raw parts without checking that `order` and
    /// `posts` agree; [`MergedChannelHistory::posts_by_server_order`] reports
    /// any disagreement.
    #[must_use]
    pub fn from_parts(
        channel_id: impl Into<String>,
        order: Vec<PostId>,
        posts: HashMap<PostId, Post>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            known: order.iter().cloned().collect(),
            order,
            posts,
        }
    }

    #[must_use]
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    #[must_use]
    pub fn order(&self) -> &[PostId] {
        &self.order
    }

    #[must_use]
    pub fn posts(&self) -> &HashMap<PostId, Post> {
        &self.posts
    }

    #[must_use]
    pub fn contains(&self, post_id: &str) -> bool {
        self.known.contains(post_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Most recent post by creation time.
    #[must_use]
    pub fn newest_post(&self) -> Option<&Post> {
        self.posts
            .values()
            .max_by(|a, b| a.create_at.cmp(&b.create_at).then_with(|| a.id.cmp(&b.id)))
    }

    /// Appends the page's unseen identifiers in page order.
    pub fn merge_page(&mut self, page: &PostPage) -> PageMerge {
        let mut merge = PageMerge::default();

        for post_id in &page.order {
            if self.known.contains(post_id) {
                merge.collisions += 1;
                continue;
            }

            let Some(post) = page.posts.get(post_id) else {
                merge.missing += 1;
                tracing::warn!(
                    channel_id = %self.channel_id,
                    post_id = %post_id,
                    "page order references a post the page does not contain"
                );
                continue;
            };

            self.known.insert(post_id.clone());
            self.order.push(post_id.clone());
            self.posts.insert(post_id.clone(), post.clone());
            merge.added += 1;
        }

        merge
    }

    /// All posts sorted by creation time, ties broken by identifier.
    #[must_use]
    pub fn posts_by_date_ascending(&self) -> Vec<&Post> {
        let mut posts: Vec<&Post> = self.posts.values().collect();
        posts.sort_by(|a, b| a.create_at.cmp(&b.create_at).then_with(|| a.id.cmp(&b.id)));
        posts
    }

    /// Posts in `order` sequence.
    pub fn posts_by_server_order(&self) -> Result<Vec<&Post>, MatterlessError> {
        self.order
            .iter()
            .map(|post_id| {
                self.posts
                    .get(post_id)
                    .ok_or_else(|| MatterlessError::MissingPostReference {
                        channel_id: self.channel_id.clone(),
                        post_id: post_id.clone(),
                    })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredHistory {
    channel_id: String,
    order: Vec<PostId>,
    posts: HashMap<PostId, Post>,
}

impl From<StoredHistory> for MergedChannelHistory {
    fn from(stored: StoredHistory) -> Self {
        Self::from_parts(stored.channel_id, stored.order, stored.posts)
    }
}

impl From<MergedChannelHistory> for StoredHistory {
    fn from(history: MergedChannelHistory) -> Self {
        Self {
            channel_id: history.channel_id,
            order: history.order,
            posts: history.posts,
        }
    }
}
