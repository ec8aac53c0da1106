mod core;

pub use self::core::CoreMetrics;

pub(crate) const NAMESPACE: &str = "mec";
