//! One logged-in session: a remote client, its cache and the sync settings.
//!
//! UI and CLI code receive a [`Session`] at construction and go through it for
//! every read; nothing here reaches for global state.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::thread;

use chat_client::{Channel, RemoteClient, Team, User, CURRENT_USER_ID};

use crate::cache::{CacheCapacities, CacheLoadReport, CacheStore};
use crate::display_name::DisplayNameResolver;
use crate::error::MatterlessError;
use crate::history::MergedChannelHistory;
use crate::sync::{CancelSignal, SyncEngine, SyncOptions, SyncOutcome};

pub struct Session {
    client: Arc<dyn RemoteClient>,
    cache: CacheStore,
    sync_options: SyncOptions,
    current_user: OnceLock<User>,
}

impl Session {
    #[must_use]
    pub fn new(client: Arc<dyn RemoteClient>, cache: CacheStore, sync_options: SyncOptions) -> Self {
        Self {
            client,
            cache,
            sync_options,
            current_user: OnceLock::new(),
        }
    }

    /// Creates the file-backed cache under `cache_dir` and loads it.
    pub fn open(
        client: Arc<dyn RemoteClient>,
        cache_dir: &Path,
        capacities: CacheCapacities,
        sync_options: SyncOptions,
    ) -> Result<(Self, CacheLoadReport), MatterlessError> {
        let cache = CacheStore::new(cache_dir, capacities);
        let report = cache.load()?;
        Ok((Self::new(client, cache, sync_options), report))
    }

    #[must_use]
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    #[must_use]
    pub fn sync_options(&self) -> &SyncOptions {
        &self.sync_options
    }

    /// The logged-in user, fetched once per session.
    pub fn current_user(&self) -> Result<User, MatterlessError> {
        if let Some(user) = self.current_user.get() {
            return Ok(user.clone());
        }

        let user = self
            .client
            .fetch_user(CURRENT_USER_ID)
            .map_err(|source| MatterlessError::transport("fetching the current user", source))?;
        self.cache.users().put(user.id.clone(), user.clone())?;
        Ok(self.current_user.get_or_init(|| user).clone())
    }

    /// Teams of the current user, refreshed from the server.
    pub fn teams(&self) -> Result<Vec<Team>, MatterlessError> {
        let me = self.current_user()?;
        let teams = self
            .client
            .fetch_teams(&me.id)
            .map_err(|source| MatterlessError::transport("fetching teams", source))?;
        self.cache.teams().put(me.id, teams.clone())?;
        Ok(teams)
    }

    /// Teams stored by an earlier [`Session::teams`] call, without a network round trip.
    #[must_use]
    pub fn cached_teams(&self) -> Option<Vec<Team>> {
        let me = self.current_user.get()?;
        self.cache.teams().get(&me.id)
    }

    /// Channels of `team_id` with every display name resolved.
    pub fn channels_for_team(&self, team_id: &str) -> Result<Vec<Channel>, MatterlessError> {
        let me = self.current_user()?;
        let mut channels = self
            .client
            .fetch_channels(&me.id, team_id)
            .map_err(|source| MatterlessError::transport("fetching channels", source))?;

        DisplayNameResolver::new(self.client.as_ref(), self.cache.users(), &me.id)
            .resolve_all(&mut channels);

        self.cache.channels().put(team_id, channels.clone())?;
        Ok(channels)
    }

    #[must_use]
    pub fn cached_channels(&self, team_id: &str) -> Option<Vec<Channel>> {
        self.cache.channels().get(team_id)
    }

    pub fn sync_channel(
        &self,
        channel_id: &str,
        cancel: &CancelSignal,
    ) -> Result<SyncOutcome, MatterlessError> {
        SyncEngine::new(self.client.as_ref(), &self.cache, &self.sync_options)
            .sync_channel(channel_id, cancel)
    }

    /// Syncs several channels concurrently, one worker thread per channel.
    /// Results come back in the order of `channel_ids`.
    pub fn sync_channels(
        &self,
        channel_ids: &[String],
        cancel: &CancelSignal,
    ) -> Vec<(String, Result<SyncOutcome, MatterlessError>)> {
        thread::scope(|scope| {
            let workers: Vec<_> = channel_ids
                .iter()
                .map(|channel_id| {
                    let worker = scope.spawn(move || self.sync_channel(channel_id, cancel));
                    (channel_id, worker)
                })
                .collect();

            workers
                .into_iter()
                .map(|(channel_id, worker)| {
                    let result = worker.join().unwrap_or_else(|_| {
                        Err(MatterlessError::WorkerPanicked {
                            channel_id: channel_id.clone(),
                        })
                    });
                    (channel_id.clone(), result)
                })
                .collect()
        })
    }

    /// Cached history for `channel_id`, as left by the last sync.
    #[must_use]
    pub fn cached_history(&self, channel_id: &str) -> Option<MergedChannelHistory> {
        self.cache.post_pages().get(channel_id)
    }

    /// Flushes every cache kind and ends the session.
    pub fn close(self) -> Result<(), MatterlessError> {
        self.cache.flush()
    }
}
