//! Subcommand bodies. Each one writes plain tab-separated lines to `out`.

use std::collections::BTreeSet;
use std::io::Write;

use anyhow::{bail, Context};
use cache_store::CacheKind;
use chat_client::{Channel, ChannelType, Post};
use matterless::{
    user_label, CacheStore, CancelSignal, IncompleteReason, Session, SyncOutcome, SyncStatus,
};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::args::HistoryOrder;

pub fn me(session: &Session, out: &mut impl Write) -> anyhow::Result<()> {
    let user = session
        .current_user()
        .context("failed to load the current user")?;
    writeln!(out, "{}\t@{}\t{}", user_label(&user), user.username, user.id)?;
    Ok(())
}

pub fn teams(session: &Session, out: &mut impl Write) -> anyhow::Result<()> {
    for team in session.teams().context("failed to list teams")? {
        let label = if team.display_name.is_empty() {
            &team.name
        } else {
            &team.display_name
        };
        writeln!(out, "{}\t{}", team.id, label)?;
    }
    Ok(())
}

/// Lists the channels of `team`, or of every team when `None`.
pub fn channels(session: &Session, team: Option<&str>, out: &mut impl Write) -> anyhow::Result<()> {
    for team_id in team_ids(session, team)? {
        let channels = session
            .channels_for_team(&team_id)
            .with_context(|| format!("failed to list channels of team '{team_id}'"))?;
        for channel in channels {
            writeln!(
                out,
                "{}\t{}\t{}\t{}",
                team_id,
                channel.id,
                channel_kind(channel.channel_type),
                channel_label(&channel)
            )?;
        }
    }
    Ok(())
}

/// Channel ids to sync: the named ones, or every listed channel with `all`.
/// Direct channels listed under several teams are synced once.
pub fn sync_targets(
    session: &Session,
    requested: Vec<String>,
    all: bool,
) -> anyhow::Result<Vec<String>> {
    if !all {
        if requested.is_empty() {
            bail!("name at least one channel id, or pass --all");
        }
        return Ok(requested);
    }

    let mut seen: BTreeSet<String> = requested.iter().cloned().collect();
    let mut targets = requested;
    for team_id in team_ids(session, None)? {
        let channels = session
            .channels_for_team(&team_id)
            .with_context(|| format!("failed to list channels of team '{team_id}'"))?;
        for channel in channels {
            if seen.insert(channel.id.clone()) {
                targets.push(channel.id);
            }
        }
    }
    Ok(targets)
}

/// Syncs `channel_ids` concurrently and prints one line per channel.
/// Returns how many channels failed.
pub fn sync(
    session: &Session,
    channel_ids: &[String],
    cancel: &CancelSignal,
    out: &mut impl Write,
) -> anyhow::Result<usize> {
    let mut failed = 0;
    for (channel_id, result) in session.sync_channels(channel_ids, cancel) {
        match result {
            Ok(outcome) => writeln!(out, "{channel_id}\t{}", describe_outcome(&outcome))?,
            Err(error) => {
                failed += 1;
                tracing::warn!(%channel_id, %error, "channel sync failed");
                writeln!(out, "{channel_id}\tfailed\t{error}")?;
            }
        }
    }
    Ok(failed)
}

/// Prints the cached history of `channel_id` without any server call.
pub fn show(
    cache: &CacheStore,
    channel_id: &str,
    order: HistoryOrder,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let history = cache.post_pages().peek(channel_id).with_context(|| {
        format!("no cached history for channel '{channel_id}'; run `matterless sync {channel_id}` first")
    })?;

    let posts = match order {
        HistoryOrder::Date => history.posts_by_date_ascending(),
        HistoryOrder::Server => history
            .posts_by_server_order()
            .context("cached history is inconsistent; run `matterless cache clear`")?,
    };

    for post in posts {
        writeln!(out, "{}", format_post(cache, post))?;
    }
    Ok(())
}

pub fn clear_cache(cache: &CacheStore, out: &mut impl Write) -> anyhow::Result<()> {
    for kind in CacheKind::ALL {
        cache
            .clear(kind)
            .with_context(|| format!("failed to clear cached {kind}"))?;
    }
    writeln!(out, "cache cleared")?;
    Ok(())
}

fn team_ids(session: &Session, team: Option<&str>) -> anyhow::Result<Vec<String>> {
    match team {
        Some(team_id) => Ok(vec![team_id.to_string()]),
        None => Ok(session
            .teams()
            .context("failed to list teams")?
            .into_iter()
            .map(|team| team.id)
            .collect()),
    }
}

fn channel_kind(channel_type: ChannelType) -> &'static str {
    match channel_type {
        ChannelType::Public => "public",
        ChannelType::Private => "private",
        ChannelType::Direct => "direct",
        ChannelType::Group => "group",
    }
}

fn channel_label(channel: &Channel) -> &str {
    channel
        .display_name
        .as_deref()
        .filter(|label| !label.is_empty())
        .unwrap_or(&channel.name)
}

fn describe_outcome(outcome: &SyncOutcome) -> String {
    let status = match &outcome.status {
        SyncStatus::Complete => "complete".to_string(),
        SyncStatus::Stalled { cursor } => format!("stalled at {cursor}"),
        SyncStatus::Incomplete { reason } => format!("incomplete ({})", incomplete_reason(*reason)),
    };
    let mut line = format!(
        "{status}\t{} new\t{} pages\t{} cached",
        outcome.new_posts,
        outcome.pages_fetched,
        outcome.history.len()
    );
    if outcome.missing_posts > 0 {
        line.push_str(&format!("\t{} missing", outcome.missing_posts));
    }
    line
}

fn incomplete_reason(reason: IncompleteReason) -> &'static str {
    match reason {
        IncompleteReason::PageLimit => "page limit",
        IncompleteReason::Timeout => "timeout",
        IncompleteReason::Cancelled => "cancelled",
    }
}

fn format_post(cache: &CacheStore, post: &Post) -> String {
    let author = if post.user_id.is_empty() {
        "system".to_string()
    } else {
        cache
            .users()
            .peek(&post.user_id)
            .map(|user| user_label(&user))
            .unwrap_or_else(|| post.user_id.clone())
    };
    let message = post.message.replace('\n', "\n    ");
    format!("{}\t{author}\t{message}", format_timestamp(post.create_at))
}

/// RFC 3339 UTC time for a millisecond epoch timestamp.
pub fn format_timestamp(create_at_ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(create_at_ms) * 1_000_000)
        .ok()
        .and_then(|time| time.format(&Rfc3339).ok())
        .unwrap_or_else(|| create_at_ms.to_string())
}
