//! Tracing subscriber initialization, matching the teacher's
//! `abp-cli`/`abp-daemon` pattern: an `EnvFilter` default that widens
//! under `--debug`, routed to stderr.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `debug` widens the default filter from `btfhub=info` to
/// `btfhub=debug`; `RUST_LOG` always overrides both when set, since
/// `EnvFilter::new` still honors it as the env var takes priority over
/// the directive string passed in.
pub fn init(debug: bool) {
    let default_directive = if debug { "btfhub=debug" } else { "btfhub=info" };
    let filter = std::env::var("RUST_LOG").ok().map(EnvFilter::new).unwrap_or_else(|| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
