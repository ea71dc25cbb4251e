use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chat_client::{Post, User};
use chat_client_mock::MockChatServer;
use clap::Parser;
use matterless::{never_cancel, CacheCapacities, Session, SyncOptions};
use matterless_cli::args::Args;
use matterless_cli::{dispatch, resolve_cache_dir, run};
use pretty_assertions::assert_eq;

const SERVER_URL: &str = "chat.example.com";

fn parse(argv: &[&str]) -> Args {
    Args::try_parse_from(std::iter::once("matterless").chain(argv.iter().copied()))
        .expect("arguments should parse")
}

fn open_session(cache_root: &Path) -> Session {
    let server = MockChatServer::new(10);
    server.set_current_user(User::new("U1", "ann"));
    server.set_posts(
        "c1",
        vec![
            Post::new("p1", "c1", 1_000, "hello").with_user_id("U1"),
            Post::new("p2", "c1", 2_000, "again").with_user_id("U1"),
        ],
    );
    let cache_dir = resolve_cache_dir(Some(cache_root), SERVER_URL).unwrap();
    let (session, _) = Session::open(
        Arc::new(server),
        &cache_dir,
        CacheCapacities::default(),
        SyncOptions::default(),
    )
    .unwrap();
    session
}

fn offline_args(config: &Path, cache_root: &Path, command: &[&str]) -> Args {
    let mut argv = vec![
        "--url",
        SERVER_URL,
        "--config",
        config.to_str().unwrap(),
        "--cache-dir",
        cache_root.to_str().unwrap(),
    ];
    argv.extend_from_slice(command);
    parse(&argv)
}

#[test]
fn synced_channel_can_be_shown_offline() {
    let root = tempfile::tempdir().unwrap();
    let config = root.path().join("config.json");
    let session = open_session(root.path());
    let mut out = Vec::new();

    dispatch(&session, parse(&["sync", "c1"]).command, &never_cancel(), &mut out).unwrap();
    session.close().unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "c1\tcomplete\t2 new\t1 pages\t2 cached\n"
    );
    run(offline_args(&config, root.path(), &["show", "c1"])).unwrap();
    let missing = run(offline_args(&config, root.path(), &["show", "c2"])).unwrap_err();
    assert!(missing.to_string().contains("no cached history"));
}

#[test]
fn interrupted_sync_reports_cancellation_instead_of_failing() {
    let root = tempfile::tempdir().unwrap();
    let session = open_session(root.path());
    let cancel = Arc::new(AtomicBool::new(true));
    let mut out = Vec::new();

    dispatch(&session, parse(&["sync", "c1"]).command, &cancel, &mut out).unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "c1\tincomplete (cancelled)\t0 new\t0 pages\t0 cached\n"
    );
}

#[test]
fn cache_clear_runs_without_contacting_the_server() {
    let root = tempfile::tempdir().unwrap();
    let config = root.path().join("config.json");
    let session = open_session(root.path());
    session.sync_channel("c1", &never_cancel()).unwrap();
    session.close().unwrap();

    run(offline_args(&config, root.path(), &["cache", "clear"])).unwrap();

    let reopened = open_session(root.path());
    assert!(reopened.cached_history("c1").is_none());
    assert!(!config.exists());
}
