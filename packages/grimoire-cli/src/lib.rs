//! Shared command-line plumbing for the Grimoire binaries.

use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};
use tracing_subscriber::EnvFilter;

/// Crate version, git revision, and target triple.
pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

const FALLBACK_LOG_LEVEL: &str = "info";

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Magenta.on_default() | Effects::BOLD)
		.usage(AnsiColor::Magenta.on_default() | Effects::BOLD)
		.literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Yellow.on_default())
}

/// Installs the global `fmt` subscriber.
///
/// An unparsable directive falls back to `info` instead of aborting startup.
pub fn init_tracing(log_level: &str) {
	let filter = tracing_filter(log_level);

	tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn tracing_filter(log_level: &str) -> EnvFilter {
	EnvFilter::try_new(log_level.trim()).unwrap_or_else(|_| EnvFilter::new(FALLBACK_LOG_LEVEL))
}
