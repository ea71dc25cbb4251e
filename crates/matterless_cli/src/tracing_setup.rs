//! Structured diagnostics on stderr, filtered by `RUST_LOG`.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Env var consulted for filter directives, e.g. `RUST_LOG=chat_client_mattermost=trace`.
pub const LOG_ENV_VAR: &str = "RUST_LOG";

/// Filter from `directives`, defaulting to `warn` (or `debug` when verbose).
pub fn build_filter(verbose: bool, directives: Option<&str>) -> EnvFilter {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    EnvFilter::builder()
        .with_default_directive(default.into())
        .parse_lossy(directives.unwrap_or_default())
}

/// Builds the subscriber without installing it.
pub fn build_subscriber<W>(
    verbose: bool,
    directives: Option<&str>,
    writer: W,
) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose, directives))
        .with_writer(writer)
        .with_target(verbose)
        .with_ansi(false)
        .finish()
}

/// Installs the stderr subscriber as the global default.
///
/// A second call is a no-op.
pub fn init_global(verbose: bool) {
    let directives = std::env::var(LOG_ENV_VAR).ok();
    let subscriber = build_subscriber(verbose, directives.as_deref(), std::io::stderr);
    let _ = tracing::subscriber::set_global_default(subscriber);
}
