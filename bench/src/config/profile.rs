use std::time::Duration;

use super::{MockArgs, SearchArgs};

/// Benchmark presets.
/// Each profile defines search parameters and the behavior of the mock endpoint.
#[derive(Debug, Clone, Copy, clap::ValueEnum, Default)]
pub enum Profile {
    /// A few short levels.
    /// Used to check that a target is reachable and behaves.
    Smoke,

    /// A single level with the default one minute duration.
    /// Used to validate that a target sustains a known rate.
    #[default]
    Standard,

    /// Increase concurrency until the target breaks.
    /// Used to find the max throughput.
    Ramp,
}

impl Profile {
    /// Construct the concrete search parameters
    /// associated with this profile.
    pub fn search_args(self) -> SearchArgs {
        match self {
            Profile::Smoke => SearchArgs {
                start_concurrency: Some(1),
                max_concurrency: Some(4),
                step: Some(1),
                duration: Some(Duration::from_secs(5)),
                burst_interval: Some(Duration::from_secs(1)),
                fail_latency: Some(Duration::from_secs(30)),
                queue_wait: None,
            },

            Profile::Standard => SearchArgs {
                start_concurrency: Some(5),
                max_concurrency: None,
                step: None,
                duration: Some(Duration::from_secs(60)),
                burst_interval: Some(Duration::from_secs(1)),
                fail_latency: None,
                queue_wait: None,
            },

            Profile::Ramp => SearchArgs {
                start_concurrency: Some(5),
                max_concurrency: Some(200),
                step: Some(3),
                duration: Some(Duration::from_secs(60)),
                burst_interval: Some(Duration::from_secs(1)),
                fail_latency: None,
                queue_wait: None,
            },
        }
    }

    /// Construct the mock endpoint behavior
    /// associated with this profile.
    pub fn mock_args(self) -> MockArgs {
        match self {
            Profile::Smoke => {
                // Fast and fully reliable endpoint.
                MockArgs {
                    base_latency: Some(0.05),
                    ..Default::default()
                }
            }

            Profile::Standard => {
                // Generation time varies per request.
                MockArgs {
                    base_latency: Some(2.),
                    jitter: Some(0.5),
                    ..Default::default()
                }
            }

            Profile::Ramp => {
                // Saturates at a fixed number of in-flight requests,
                // so the search has a break point to find.
                MockArgs {
                    base_latency: Some(0.5),
                    jitter: Some(0.1),
                    capacity: Some(32),
                    ..Default::default()
                }
            }
        }
    }
}
