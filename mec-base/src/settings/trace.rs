use eyre::Result;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt,
    prelude::*,
};

/// Logging level. A "higher level" means more will be logged.
#[derive(Default, Debug, Clone, Copy, serde::Deserialize, PartialOrd, Ord, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Level {
    Off = 0,
    Error = 1,
    Warn = 2,
    Debug = 3,
    Trace = 4,
    #[serde(other)]
    #[default]
    Info = 5,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
            Level::Info => LevelFilter::INFO,
        }
    }
}

/// Output style for the `fmt` layer.
#[derive(Debug, Clone, Copy, serde::Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Style {
    Pretty,
    Json,
    Compact,
    #[serde(other)]
    Full,
}

impl Default for Style {
    fn default() -> Self {
        Style::Full
    }
}

/// Configuration for the tracing subscriber every federation agent starts
/// with before doing anything else.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub fmt: Style,
    #[serde(default)]
    pub level: Level,
}

impl TracingConfig {
    /// Install the global tracing subscriber. Must be called exactly once,
    /// as early in `main` as possible.
    pub fn start_tracing(&self) -> Result<()> {
        let target_layer = Targets::new()
            .with_default(self.level)
            .with_target("hyper", Level::Info)
            .with_target("reqwest", Level::Info)
            .with_target("ethers_providers", Level::Info)
            .with_target("tokio", Level::Debug);

        let err_layer = tracing_error::ErrorLayer::default();

        let registry = tracing_subscriber::Registry::default()
            .with(target_layer)
            .with(err_layer);

        match self.fmt {
            Style::Pretty => registry.with(fmt::layer().pretty()).try_init()?,
            Style::Json => registry.with(fmt::layer().json()).try_init()?,
            Style::Compact => registry.with(fmt::layer().compact()).try_init()?,
            Style::Full => registry.with(fmt::layer()).try_init()?,
        }
        Ok(())
    }
}
