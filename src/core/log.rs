use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// Target of the per-operation action records.
pub const ACTIONS_TARGET: &str = "fxtrade::actions";

/// Installs the global subscriber. Action records are always shown at info,
/// everything else from the crate only with `verbose`. `RUST_LOG` overrides
/// both.
pub fn init_logging(verbose: bool) {
    let (level_filter, level) = if verbose {
        (LevelFilter::DEBUG, "debug")
    } else {
        (LevelFilter::WARN, "warn")
    };
    let app_filter = Targets::new()
        .with_target("fxtrade", level_filter)
        .with_target(ACTIONS_TARGET, LevelFilter::INFO.max(level_filter));
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},{ACTIONS_TARGET}=info")));

    tracing_subscriber::registry()
        .with(fmt::layer().pretty().without_time())
        .with(app_filter)
        .with(env_filter)
        .init();
}
