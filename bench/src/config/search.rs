use std::time::Duration;

use ai_throughput_lib::SearchConfig;

/// Throughput search parameters.
/// Every value left undefined falls back to the profile, then to the default.
#[derive(Debug, Clone, clap::Args, Default)]
pub struct SearchArgs {
    /// Requests sent per burst at the first level.
    #[arg(long, value_name = "N")]
    pub start_concurrency: Option<usize>,

    /// Exclusive upper bound on the requests per burst;
    /// when unset (or equal to the start) only the first level runs.
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Requests per burst added between levels.
    #[arg(long, value_name = "N")]
    pub step: Option<usize>,

    /// How long each level keeps sending bursts (e.g. `60s`, `2m`).
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Time between the starts of consecutive bursts.
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub burst_interval: Option<Duration>,

    /// Responses slower than this count as failures;
    /// also bounds how long a single worker is waited for.
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub fail_latency: Option<Duration>,

    /// Upper bound on a single pass draining collected outcomes.
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub queue_wait: Option<Duration>,
}

impl SearchArgs {
    /// Resolve into a library config, using library defaults for whatever
    /// is still undefined.
    pub fn into_search_config(self, strict_client_errors: bool) -> SearchConfig {
        let defaults = SearchConfig::default();
        SearchConfig {
            start_concurrency: self
                .start_concurrency
                .unwrap_or(defaults.start_concurrency),
            max_concurrency: self.max_concurrency.or(defaults.max_concurrency),
            step: self.step.unwrap_or(defaults.step),
            total_duration: self.duration.unwrap_or(defaults.total_duration),
            burst_interval: self.burst_interval.unwrap_or(defaults.burst_interval),
            fail_latency: self.fail_latency.unwrap_or(defaults.fail_latency),
            queue_wait: self.queue_wait.unwrap_or(defaults.queue_wait),
            strict_client_errors,
        }
    }
}
