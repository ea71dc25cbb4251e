//! Per-kind bounded caches owned by one session.

use std::path::Path;

use cache_store::{BoundedStore, CacheKind, LoadOutcome, DEFAULT_CAPACITY};
use chat_client::{Channel, Team, User};

use crate::error::MatterlessError;
use crate::history::MergedChannelHistory;

/// Entry limits for each cache kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheCapacities {
    pub users: usize,
    pub teams: usize,
    pub channels: usize,
    pub post_pages: usize,
}

impl CacheCapacities {
    /// Same limit for every kind.
    #[must_use]
    pub fn uniform(capacity: usize) -> Self {
        Self {
            users: capacity,
            teams: capacity,
            channels: capacity,
            post_pages: capacity,
        }
    }
}

impl Default for CacheCapacities {
    fn default() -> Self {
        Self::uniform(DEFAULT_CAPACITY)
    }
}

/// Result of [`CacheStore::load`] for each kind.
#[derive(Debug, Default)]
pub struct CacheLoadReport {
    pub outcomes: Vec<(CacheKind, LoadOutcome)>,
}

impl CacheLoadReport {
    /// Kinds whose backing file was unreadable and got reset.
    #[must_use]
    pub fn recovered_kinds(&self) -> Vec<CacheKind> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, LoadOutcome::Recovered { .. }))
            .map(|(kind, _)| *kind)
            .collect()
    }
}

/// Users keyed by user id, teams keyed by member user id, channels keyed by
/// team id and merged post histories keyed by channel id.
#[derive(Debug)]
pub struct CacheStore {
    users: BoundedStore<User>,
    teams: BoundedStore<Vec<Team>>,
    channels: BoundedStore<Vec<Channel>>,
    post_pages: BoundedStore<MergedChannelHistory>,
}

impl CacheStore {
    /// Creates stores backed by files under `dir`. Call [`CacheStore::load`]
    /// before use to pick up previously persisted entries.
    #[must_use]
    pub fn new(dir: &Path, capacities: CacheCapacities) -> Self {
        Self {
            users: BoundedStore::new(CacheKind::User, dir, capacities.users),
            teams: BoundedStore::new(CacheKind::Team, dir, capacities.teams),
            channels: BoundedStore::new(CacheKind::Channel, dir, capacities.channels),
            post_pages: BoundedStore::new(CacheKind::PostPage, dir, capacities.post_pages),
        }
    }

    #[must_use]
    pub fn in_memory(capacities: CacheCapacities) -> Self {
        Self {
            users: BoundedStore::in_memory(CacheKind::User, capacities.users),
            teams: BoundedStore::in_memory(CacheKind::Team, capacities.teams),
            channels: BoundedStore::in_memory(CacheKind::Channel, capacities.channels),
            post_pages: BoundedStore::in_memory(CacheKind::PostPage, capacities.post_pages),
        }
    }

    /// Loads every kind from disk. Unreadable files are logged and reset;
    /// only an unusable cache directory fails.
    pub fn load(&self) -> Result<CacheLoadReport, MatterlessError> {
        let outcomes = vec![
            (CacheKind::User, self.users.load()?),
            (CacheKind::Team, self.teams.load()?),
            (CacheKind::Channel, self.channels.load()?),
            (CacheKind::PostPage, self.post_pages.load()?),
        ];

        for (kind, outcome) in &outcomes {
            match outcome {
                LoadOutcome::Loaded { entries } => {
                    tracing::debug!(kind = %kind, entries, "loaded cache");
                }
                LoadOutcome::Missing => tracing::debug!(kind = %kind, "no cache file yet"),
                LoadOutcome::Recovered { reason } => {
                    tracing::debug!(kind = %kind, error = %reason, "cache reset to empty");
                }
            }
        }

        Ok(CacheLoadReport { outcomes })
    }

    pub fn flush(&self) -> Result<(), MatterlessError> {
        self.users.flush()?;
        self.teams.flush()?;
        self.channels.flush()?;
        self.post_pages.flush()?;
        Ok(())
    }

    pub fn clear(&self, kind: CacheKind) -> Result<(), MatterlessError> {
        match kind {
            CacheKind::User => self.users.clear()?,
            CacheKind::Team => self.teams.clear()?,
            CacheKind::Channel => self.channels.clear()?,
            CacheKind::PostPage => self.post_pages.clear()?,
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self, kind: CacheKind) -> usize {
        match kind {
            CacheKind::User => self.users.len(),
            CacheKind::Team => self.teams.len(),
            CacheKind::Channel => self.channels.len(),
            CacheKind::PostPage => self.post_pages.len(),
        }
    }

    #[must_use]
    pub fn users(&self) -> &BoundedStore<User> {
        &self.users
    }

    #[must_use]
    pub fn teams(&self) -> &BoundedStore<Vec<Team>> {
        &self.teams
    }

    #[must_use]
    pub fn channels(&self) -> &BoundedStore<Vec<Channel>> {
        &self.channels
    }

    #[must_use]
    pub fn post_pages(&self) -> &BoundedStore<MergedChannelHistory> {
        &self.post_pages
    }
}
