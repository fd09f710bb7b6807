use std::{fmt, time::Duration};

use crate::target::TargetError;

/// A [`SearchConfig`](crate::search::SearchConfig) that is rejected
/// before any burst is scheduled.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ZeroStartConcurrency,
    ZeroStep,
    MaxBelowStart { start: usize, max: usize },
    NonPositiveBurstInterval,
    DurationShorterThanBurst { total: Duration, burst: Duration },
    ZeroFailLatency,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroStartConcurrency => {
                write!(f, "start concurrency must be at least 1")
            }
            ConfigError::ZeroStep => write!(f, "concurrency step must be at least 1"),
            ConfigError::MaxBelowStart { start, max } => write!(
                f,
                "max concurrency must be unset or >= start concurrency. Got: {max} as compared to {start}"
            ),
            ConfigError::NonPositiveBurstInterval => {
                write!(f, "burst interval must be greater than zero")
            }
            ConfigError::DurationShorterThanBurst { total, burst } => write!(
                f,
                "total duration ({total:?}) must cover at least one burst interval ({burst:?})"
            ),
            ConfigError::ZeroFailLatency => write!(f, "fail latency must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors that abort a throughput search.
///
/// Failing requests, drain timeouts and a failing first level are never
/// reported through this type: those end up in the report instead.
#[derive(Debug)]
pub enum SearchError {
    /// Rejected configuration.
    Configuration(ConfigError),
    /// The control host could not keep up with launching or joining
    /// workers while strict client errors are enabled.
    ClientOverload { message: String },
    /// The preflight request did not get served.
    TargetUnavailable(TargetError),
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::Configuration(err) => write!(f, "invalid search configuration: {err}"),
            SearchError::ClientOverload { message } => write!(f, "client overload: {message}"),
            SearchError::TargetUnavailable(err) => {
                write!(f, "target failed preflight request: {err}")
            }
        }
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SearchError::Configuration(err) => Some(err),
            SearchError::ClientOverload { .. } => None,
            SearchError::TargetUnavailable(err) => Some(err),
        }
    }
}

impl From<ConfigError> for SearchError {
    fn from(err: ConfigError) -> Self {
        SearchError::Configuration(err)
    }
}
