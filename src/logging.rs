// Copyright 2024-2025 Irreducible Inc.

use tracing::{level_filters::LevelFilter, Subscriber};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{filter::Filtered, layer::SubscriberExt, util::SubscriberInitExt, Layer};

trait WithEnvFilter<S: Subscriber>: Layer<S> + Sized {
    fn with_env_filter(self) -> Filtered<Self, EnvFilter, S> {
        let env_level_filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env_lossy();

        self.with_filter(env_level_filter)
    }
}

impl<S: Subscriber, T: Layer<S>> WithEnvFilter<S> for T {}

/// Send the crate's diagnostics to stderr.
///
/// The level defaults to `WARN` and follows `RUST_LOG` when set. Returns
/// false if a global subscriber was already installed, in which case
/// diagnostics go to that subscriber instead.
pub fn init_logging() -> bool {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(layer.with_env_filter())
        .try_init()
        .is_ok()
}
