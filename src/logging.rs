//! `tracing` initialization for the `nfsd` binary. The library crate never
//! installs a subscriber itself so that embedding applications (and tests)
//! can configure their own; see `SPEC_FULL.md` §4.9.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
