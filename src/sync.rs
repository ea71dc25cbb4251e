//! Incremental channel history sync.
//!
//! The engine pages through a channel's posts, merges every page into the
//! cached [`MergedChannelHistory`] and stops on the first of:
//!
//! - a page whose posts are all already cached (the cache is current past
//!   this point);
//! - a page without a continuation cursor (the server has nothing further);
//! - a continuation cursor equal to the one just used (stalled pagination);
//! - the page ceiling, the wall-clock timeout or a cancellation request.
//!
//! Whatever was merged is written back to the cache before returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chat_client::{PostCursor, PostPage, RemoteClient, RemoteError};

use crate::cache::CacheStore;
use crate::error::MatterlessError;
use crate::history::MergedChannelHistory;

/// Shared cancellation flag for an in-flight sync.
pub type CancelSignal = Arc<AtomicBool>;

pub const DEFAULT_MAX_PAGES: usize = 1000;
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(120);

/// Direction the pagination walks in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PageDirection {
    /// Newest first, continuing with `prev_post_id` into older posts.
    #[default]
    Backward,
    /// Oldest unseen first, continuing with `next_post_id` into newer posts.
    /// Starts after the newest cached post when the channel has a history.
    Forward,
}

impl PageDirection {
    fn initial_cursor(self, history: &MergedChannelHistory) -> Option<PostCursor> {
        match self {
            Self::Backward => None,
            Self::Forward => history
                .newest_post()
                .map(|post| PostCursor::After(post.id.clone())),
        }
    }

    fn continuation(self, page: &PostPage) -> Option<PostCursor> {
        match self {
            Self::Backward => page.prev_post_id.clone().map(PostCursor::Before),
            Self::Forward => page.next_post_id.clone().map(PostCursor::After),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub max_pages: usize,
    pub timeout: Duration,
    pub direction: PageDirection,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            timeout: DEFAULT_SYNC_TIMEOUT,
            direction: PageDirection::default(),
        }
    }
}

impl SyncOptions {
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_direction(mut self, direction: PageDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// Why a sync stopped before the server's declared end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteReason {
    PageLimit,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Complete,
    /// The server returned the cursor that was just requested.
    Stalled { cursor: PostCursor },
    Incomplete { reason: IncompleteReason },
}

impl SyncStatus {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Stalled { .. } => "stalled",
            Self::Incomplete { .. } => "incomplete",
        }
    }
}

/// Result of one sync: the merged history as persisted, plus how it ended.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub history: MergedChannelHistory,
    pub pages_fetched: usize,
    pub new_posts: usize,
    /// Ids the server listed in a page's order without sending their bodies.
    pub missing_posts: usize,
}

pub struct SyncEngine<'a> {
    client: &'a dyn RemoteClient,
    cache: &'a CacheStore,
    options: &'a SyncOptions,
}

impl<'a> SyncEngine<'a> {
    #[must_use]
    pub fn new(client: &'a dyn RemoteClient, cache: &'a CacheStore, options: &'a SyncOptions) -> Self {
        Self {
            client,
            cache,
            options,
        }
    }

    /// Fetches everything new in `channel_id` and merges it into the cache.
    ///
    /// Stalls, budget exhaustion and cancellation are reported through
    /// [`SyncStatus`]; only transport and cache failures are errors. A fetch
    /// aborted by `cancel` counts as cancellation. Posts merged before a
    /// transport failure are still persisted.
    pub fn sync_channel(
        &self,
        channel_id: &str,
        cancel: &CancelSignal,
    ) -> Result<SyncOutcome, MatterlessError> {
        let started = Instant::now();
        let mut history = self
            .cache
            .post_pages()
            .get(channel_id)
            .unwrap_or_else(|| MergedChannelHistory::new(channel_id));
        let mut cursor = self.options.direction.initial_cursor(&history);
        let mut pages_fetched = 0;
        let mut new_posts = 0;
        let mut missing_posts = 0;

        let status = loop {
            if let Some(reason) = self.budget_exhausted(pages_fetched, started, cancel) {
                break SyncStatus::Incomplete { reason };
            }

            let page = match self.client.fetch_posts(channel_id, cursor.as_ref()) {
                Ok(page) => page,
                Err(RemoteError::Cancelled) => {
                    break SyncStatus::Incomplete {
                        reason: IncompleteReason::Cancelled,
                    };
                }
                Err(source) => {
                    if new_posts > 0 {
                        if let Err(error) = self.cache.post_pages().put(channel_id, history) {
                            tracing::warn!(channel_id, %error, "failed to persist partial sync");
                        }
                    }
                    return Err(MatterlessError::transport("fetching channel posts", source));
                }
            };
            pages_fetched += 1;

            let merge = history.merge_page(&page);
            new_posts += merge.added;
            missing_posts += merge.missing;
            tracing::debug!(
                channel_id,
                page = pages_fetched,
                cursor = ?cursor,
                added = merge.added,
                collisions = merge.collisions,
                missing = merge.missing,
                "merged post page"
            );

            if merge.is_full_collision() {
                break SyncStatus::Complete;
            }
            let Some(next) = self.options.direction.continuation(&page) else {
                break SyncStatus::Complete;
            };
            if cursor.as_ref() == Some(&next) {
                tracing::warn!(channel_id, cursor = %next, "pagination cursor did not advance");
                break SyncStatus::Stalled { cursor: next };
            }
            cursor = Some(next);
        };

        self.cache.post_pages().put(channel_id, history.clone())?;
        tracing::info!(
            channel_id,
            status = status.label(),
            pages = pages_fetched,
            new_posts,
            missing_posts,
            total_posts = history.len(),
            "channel sync finished"
        );

        Ok(SyncOutcome {
            status,
            history,
            pages_fetched,
            new_posts,
            missing_posts,
        })
    }

    fn budget_exhausted(
        &self,
        pages_fetched: usize,
        started: Instant,
        cancel: &CancelSignal,
    ) -> Option<IncompleteReason> {
        if cancel.load(Ordering::Acquire) {
            Some(IncompleteReason::Cancelled)
        } else if pages_fetched >= self.options.max_pages {
            Some(IncompleteReason::PageLimit)
        } else if started.elapsed() >= self.options.timeout {
            Some(IncompleteReason::Timeout)
        } else {
            None
        }
    }
}

/// Convenience for callers that never cancel.
#[must_use]
pub fn never_cancel() -> CancelSignal {
    Arc::new(AtomicBool::new(false))
}
