//! `matterless` command-line front end.
//!
//! Resolves configuration, connects through the Mattermost adapter and hands
//! a [`matterless::Session`] to the subcommand bodies in [`commands`].
//! `show` and `cache clear` work from the local cache alone.

pub mod args;
pub mod commands;
pub mod config;
pub mod signals;
pub mod tracing_setup;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use cache_store::{cache_root, sanitize_dir_name, server_cache_dir};
use chat_client_mattermost::{MattermostRemote, MattermostRemoteConfig};
use matterless::{
    never_cancel, CacheCapacities, CacheStore, CancelSignal, PageDirection, Session,
};

use crate::args::{Args, CacheAction, Command};
use crate::config::CliConfig;

pub fn run(args: Args) -> anyhow::Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => CliConfig::default_path()
            .context("this platform has no config directory; pass --config")?,
    };
    let mut config = CliConfig::load(&config_path)?;
    config.apply_overrides(&args.connection);

    let server_url = config.server_url()?.to_string();
    let cache_dir = resolve_cache_dir(args.cache_dir.as_deref(), &server_url)?;
    tracing::debug!(cache_dir = %cache_dir.display(), "using cache directory");

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if !args.command.is_online() {
        let cache = open_cache(&cache_dir, config.capacities())?;
        return match args.command {
            Command::Show { channel, order } => commands::show(&cache, &channel, order, &mut out),
            Command::Cache {
                action: CacheAction::Clear,
            } => commands::clear_cache(&cache, &mut out),
            command => bail!("{command:?} needs a server connection"),
        };
    }

    let cancel = never_cancel();
    let remote = MattermostRemote::connect(
        MattermostRemoteConfig::new(server_url.as_str(), config.credentials()?)
            .with_cancel(cancel.clone()),
    )
    .with_context(|| format!("failed to connect to {server_url}"))?;
    config.token = Some(remote.token().to_string());
    config.save(&config_path)?;

    let sync_options = match &args.command {
        Command::Sync {
            max_pages,
            timeout_sec,
            forward,
            ..
        } => {
            let direction = if *forward {
                PageDirection::Forward
            } else {
                PageDirection::Backward
            };
            config.sync_options(*max_pages, *timeout_sec, direction)
        }
        _ => config.sync_options(None, None, PageDirection::Backward),
    };

    let (session, _) = Session::open(
        Arc::new(remote),
        &cache_dir,
        config.capacities(),
        sync_options,
    )?;

    let result = dispatch(&session, args.command, &cancel, &mut out);
    session.close().context("failed to write the cache")?;
    result
}

/// Runs one subcommand against an open session.
///
/// `cancel` must be the flag the session's client observes, so that an
/// interrupt during `sync` also aborts the request in flight.
pub fn dispatch(
    session: &Session,
    command: Command,
    cancel: &CancelSignal,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::Me => commands::me(session, out),
        Command::Teams => commands::teams(session, out),
        Command::Channels { team } => commands::channels(session, team.as_deref(), out),
        Command::Sync { channels, all, .. } => {
            let channel_ids = commands::sync_targets(session, channels, all)?;
            let _guard = signals::cancel_on_signal(cancel.clone())
                .context("failed to install the interrupt handler")?;

            let failed = commands::sync(session, &channel_ids, cancel, out)?;
            if failed > 0 {
                bail!("{failed} of {} channels failed to sync", channel_ids.len());
            }
            Ok(())
        }
        Command::Show { channel, order } => commands::show(session.cache(), &channel, order, out),
        Command::Cache {
            action: CacheAction::Clear,
        } => commands::clear_cache(session.cache(), out),
    }
}

/// `<root>/<server host>`, where root is `--cache-dir` or the platform cache dir.
pub fn resolve_cache_dir(root: Option<&Path>, server_url: &str) -> anyhow::Result<PathBuf> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => cache_root().context("this platform has no cache directory; pass --cache-dir")?,
    };
    let server = mattermost_api::url::server_host(server_url)
        .unwrap_or_else(|_| sanitize_dir_name(server_url));
    Ok(server_cache_dir(&root, &server))
}

fn open_cache(dir: &Path, capacities: CacheCapacities) -> anyhow::Result<CacheStore> {
    let cache = CacheStore::new(dir, capacities);
    cache.load()?;
    Ok(cache)
}
