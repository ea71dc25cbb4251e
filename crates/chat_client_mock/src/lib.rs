//! Deterministic in-memory implementations of the `chat_client` contract.
//!
//! This crate contains no transport logic and is intended for local
//! development and engine-level integration testing.
//!
//! - [`MockChatServer`] paginates real post sequences the way the server does.
//! - [`ScriptedClient`] replays a fixed list of page results, which makes it
//!   possible to simulate misbehaving servers.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use chat_client::{
    Channel, Post, PostCursor, PostPage, RemoteClient, RemoteError, Team, User, CURRENT_USER_ID,
};

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 60;

#[derive(Debug, Default)]
struct ServerState {
    current_user_id: Option<String>,
    users: HashMap<String, User>,
    teams: HashMap<String, Vec<Team>>,
    channels: HashMap<(String, String), Vec<Channel>>,
    /// Channel posts, newest first.
    posts: HashMap<String, Vec<Post>>,
    pending_failures: VecDeque<RemoteError>,
}

/// Fake chat server holding users, teams, channels and post histories.
#[derive(Debug)]
pub struct MockChatServer {
    page_size: usize,
    state: Mutex<ServerState>,
    post_fetches: AtomicUsize,
    user_fetches: AtomicUsize,
    cursors: Mutex<Vec<Option<PostCursor>>>,
}

impl Default for MockChatServer {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl MockChatServer {
    #[must_use]
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            state: Mutex::new(ServerState::default()),
            post_fetches: AtomicUsize::new(0),
            user_fetches: AtomicUsize::new(0),
            cursors: Mutex::new(Vec::new()),
        }
    }

    /// Registers the user the `"me"` alias resolves to.
    pub fn set_current_user(&self, user: User) {
        let mut state = lock_unpoisoned(&self.state);
        state.current_user_id = Some(user.id.clone());
        state.users.insert(user.id.clone(), user);
    }

    pub fn add_user(&self, user: User) {
        lock_unpoisoned(&self.state)
            .users
            .insert(user.id.clone(), user);
    }

    pub fn set_teams(&self, user_id: &str, teams: Vec<Team>) {
        lock_unpoisoned(&self.state)
            .teams
            .insert(user_id.to_string(), teams);
    }

    pub fn set_channels(&self, user_id: &str, team_id: &str, channels: Vec<Channel>) {
        lock_unpoisoned(&self.state)
            .channels
            .insert((user_id.to_string(), team_id.to_string()), channels);
    }

    /// Replaces a channel's history. Posts are stored newest first by `create_at`.
    pub fn set_posts(&self, channel_id: &str, mut posts: Vec<Post>) {
        posts.sort_by(|a, b| b.create_at.cmp(&a.create_at).then_with(|| b.id.cmp(&a.id)));
        lock_unpoisoned(&self.state)
            .posts
            .insert(channel_id.to_string(), posts);
    }

    /// Publishes a new post at the head of a channel's history.
    pub fn publish(&self, post: Post) {
        let mut state = lock_unpoisoned(&self.state);
        state
            .posts
            .entry(post.channel_id.clone())
            .or_default()
            .insert(0, post);
    }

    /// Makes the next post fetch fail with `error` instead of answering.
    pub fn fail_next_post_fetch(&self, error: RemoteError) {
        lock_unpoisoned(&self.state).pending_failures.push_back(error);
    }

    #[must_use]
    pub fn post_fetch_count(&self) -> usize {
        self.post_fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn user_fetch_count(&self) -> usize {
        self.user_fetches.load(Ordering::SeqCst)
    }

    /// Cursors received by `fetch_posts`, in call order.
    #[must_use]
    pub fn requested_cursors(&self) -> Vec<Option<PostCursor>> {
        lock_unpoisoned(&self.cursors).clone()
    }

    fn resolve_user_id(state: &ServerState, user_id: &str) -> String {
        if user_id == CURRENT_USER_ID {
            state
                .current_user_id
                .clone()
                .unwrap_or_else(|| user_id.to_string())
        } else {
            user_id.to_string()
        }
    }

    fn paginate(&self, history: &[Post], cursor: Option<&PostCursor>) -> PostPage {
        let (start, end) = match cursor {
            None => (0, self.page_size.min(history.len())),
            Some(PostCursor::Before(post_id)) => {
                match history.iter().position(|post| &post.id == post_id) {
                    Some(index) => {
                        let start = index + 1;
                        (start, (start + self.page_size).min(history.len()))
                    }
                    None => (0, 0),
                }
            }
            Some(PostCursor::After(post_id)) => {
                match history.iter().position(|post| &post.id == post_id) {
                    Some(index) => (index.saturating_sub(self.page_size), index),
                    None => (0, 0),
                }
            }
        };

        let slice = &history[start..end];
        let mut page = PostPage::from_posts(slice.iter().cloned());
        if end < history.len() {
            page.prev_post_id = slice.last().map(|post| post.id.clone());
        }
        if start > 0 {
            page.next_post_id = slice.first().map(|post| post.id.clone());
        }
        page
    }
}

impl RemoteClient for MockChatServer {
    fn fetch_posts(
        &self,
        channel_id: &str,
        cursor: Option<&PostCursor>,
    ) -> Result<PostPage, RemoteError> {
        self.post_fetches.fetch_add(1, Ordering::SeqCst);
        lock_unpoisoned(&self.cursors).push(cursor.cloned());

        let mut state = lock_unpoisoned(&self.state);
        if let Some(error) = state.pending_failures.pop_front() {
            return Err(error);
        }

        let history = state
            .posts
            .get(channel_id)
            .ok_or_else(|| RemoteError::not_found("channel", channel_id))?;
        Ok(self.paginate(history, cursor))
    }

    fn fetch_user(&self, user_id: &str) -> Result<User, RemoteError> {
        self.user_fetches.fetch_add(1, Ordering::SeqCst);
        let state = lock_unpoisoned(&self.state);
        let user_id = Self::resolve_user_id(&state, user_id);
        state
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| RemoteError::not_found("user", user_id))
    }

    fn fetch_teams(&self, user_id: &str) -> Result<Vec<Team>, RemoteError> {
        let state = lock_unpoisoned(&self.state);
        let user_id = Self::resolve_user_id(&state, user_id);
        Ok(state.teams.get(&user_id).cloned().unwrap_or_default())
    }

    fn fetch_channels(&self, user_id: &str, team_id: &str) -> Result<Vec<Channel>, RemoteError> {
        let state = lock_unpoisoned(&self.state);
        let user_id = Self::resolve_user_id(&state, user_id);
        state
            .channels
            .get(&(user_id, team_id.to_string()))
            .cloned()
            .ok_or_else(|| RemoteError::not_found("team", team_id))
    }
}

/// Client that answers post fetches from a fixed script.
///
/// Once the script is exhausted every further fetch returns an empty page.
/// User, team and channel lookups always report `NotFound`/empty.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<PostPage, RemoteError>>>,
    users: Mutex<HashMap<String, User>>,
    cursors: Mutex<Vec<Option<PostCursor>>>,
}

impl ScriptedClient {
    #[must_use]
    pub fn new(pages: Vec<PostPage>) -> Self {
        Self::with_results(pages.into_iter().map(Ok).collect())
    }

    #[must_use]
    pub fn with_results(results: Vec<Result<PostPage, RemoteError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            users: Mutex::new(HashMap::new()),
            cursors: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_user(self, user: User) -> Self {
        lock_unpoisoned(&self.users).insert(user.id.clone(), user);
        self
    }

    #[must_use]
    pub fn fetch_count(&self) -> usize {
        lock_unpoisoned(&self.cursors).len()
    }

    #[must_use]
    pub fn requested_cursors(&self) -> Vec<Option<PostCursor>> {
        lock_unpoisoned(&self.cursors).clone()
    }
}

impl RemoteClient for ScriptedClient {
    fn fetch_posts(
        &self,
        _channel_id: &str,
        cursor: Option<&PostCursor>,
    ) -> Result<PostPage, RemoteError> {
        lock_unpoisoned(&self.cursors).push(cursor.cloned());
        lock_unpoisoned(&self.script)
            .pop_front()
            .unwrap_or_else(|| Ok(PostPage::default()))
    }

    fn fetch_user(&self, user_id: &str) -> Result<User, RemoteError> {
        lock_unpoisoned(&self.users)
            .get(user_id)
            .cloned()
            .ok_or_else(|| RemoteError::not_found("user", user_id))
    }

    fn fetch_teams(&self, _user_id: &str) -> Result<Vec<Team>, RemoteError> {
        Ok(Vec::new())
    }

    fn fetch_channels(&self, _user_id: &str, team_id: &str) -> Result<Vec<Channel>, RemoteError> {
        Err(RemoteError::not_found("team", team_id))
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(count: i64) -> Vec<Post> {
        (1..=count)
            .map(|n| Post::new(format!("p{n:02}"), "ch", n * 10, format!("post {n}")))
            .collect()
    }

    #[test]
    fn most_recent_page_is_newest_first_with_backward_cursor() {
        let server = MockChatServer::new(3);
        server.set_posts("ch", history(5));

        let page = server.fetch_posts("ch", None).expect("page should load");

        assert_eq!(page.order, vec!["p05", "p04", "p03"]);
        assert_eq!(page.prev_post_id.as_deref(), Some("p03"));
        assert_eq!(page.next_post_id, None);
    }

    #[test]
    fn before_cursor_walks_to_the_oldest_page() {
        let server = MockChatServer::new(3);
        server.set_posts("ch", history(5));

        let page = server
            .fetch_posts("ch", Some(&PostCursor::Before("p03".to_string())))
            .expect("page should load");

        assert_eq!(page.order, vec!["p02", "p01"]);
        assert_eq!(page.prev_post_id, None);
        assert_eq!(page.next_post_id.as_deref(), Some("p02"));
        assert_eq!(server.post_fetch_count(), 1);
    }

    #[test]
    fn after_cursor_returns_posts_newer_than_the_anchor() {
        let server = MockChatServer::new(2);
        server.set_posts("ch", history(5));

        let page = server
            .fetch_posts("ch", Some(&PostCursor::After("p02".to_string())))
            .expect("page should load");

        assert_eq!(page.order, vec!["p04", "p03"]);
        assert_eq!(page.next_post_id.as_deref(), Some("p04"));
    }

    #[test]
    fn queued_failure_is_returned_once() {
        let server = MockChatServer::new(3);
        server.set_posts("ch", history(2));
        server.fail_next_post_fetch(RemoteError::transport("connection reset"));

        assert!(server.fetch_posts("ch", None).is_err());
        assert!(server.fetch_posts("ch", None).is_ok());
    }

    #[test]
    fn me_alias_resolves_to_current_user() {
        let server = MockChatServer::default();
        server.set_current_user(User::new("u1", "ann"));

        let user = server.fetch_user(CURRENT_USER_ID).expect("me should resolve");
        assert_eq!(user.id, "u1");
        assert!(server.fetch_user("u2").unwrap_err().is_not_found());
    }

    #[test]
    fn scripted_client_replays_then_returns_empty_pages() {
        let client = ScriptedClient::new(vec![PostPage::from_posts(vec![Post::new(
            "a", "ch", 1, "hi",
        )])]);

        assert_eq!(client.fetch_posts("ch", None).unwrap().order, vec!["a"]);
        assert!(client.fetch_posts("ch", None).unwrap().is_empty());
        assert_eq!(client.fetch_count(), 2);
    }
}
