//! Breaking point search over increasing concurrency levels.
//!
//! Every level runs a full [`BurstScheduler`] pass. The search stops at the
//! first level producing any failed outcome, or once the next level would
//! reach the configured max. The throughput reported is the one implied by
//! the highest level that stayed clean.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use rama::telemetry::tracing;
use serde::Serialize;

use crate::{
    aggregate::{self, AggregationParams, MAX_THROUGHPUT, Metadata, Sample, Unit},
    error::{ConfigError, SearchError},
    scheduler::{BurstRunResult, BurstScheduler, BurstSettings},
    target::{PromptRequest, Target},
};

pub const DEFAULT_START_CONCURRENCY: usize = 5;
pub const DEFAULT_STEP: usize = 3;
pub const DEFAULT_TOTAL_DURATION: Duration = Duration::from_secs(60);
pub const DEFAULT_BURST_INTERVAL: Duration = Duration::from_secs(1);
/// Managed endpoints commonly time out requests after 95 seconds.
pub const DEFAULT_FAIL_LATENCY: Duration = Duration::from_secs(95);
pub const DEFAULT_QUEUE_WAIT: Duration = Duration::from_secs(10 * 60);

/// Immutable parameters of one throughput search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchConfig {
    pub start_concurrency: usize,
    /// Exclusive upper bound for the levels tried;
    /// `None` (or equal to the start) runs the start level only.
    pub max_concurrency: Option<usize>,
    pub step: usize,
    pub total_duration: Duration,
    pub burst_interval: Duration,
    pub fail_latency: Duration,
    pub queue_wait: Duration,
    pub strict_client_errors: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            start_concurrency: DEFAULT_START_CONCURRENCY,
            max_concurrency: None,
            step: DEFAULT_STEP,
            total_duration: DEFAULT_TOTAL_DURATION,
            burst_interval: DEFAULT_BURST_INTERVAL,
            fail_latency: DEFAULT_FAIL_LATENCY,
            queue_wait: DEFAULT_QUEUE_WAIT,
            strict_client_errors: false,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_concurrency == 0 {
            return Err(ConfigError::ZeroStartConcurrency);
        }
        if self.step == 0 {
            return Err(ConfigError::ZeroStep);
        }
        if let Some(max) = self.max_concurrency
            && max < self.start_concurrency
        {
            return Err(ConfigError::MaxBelowStart {
                start: self.start_concurrency,
                max,
            });
        }
        if self.burst_interval.is_zero() {
            return Err(ConfigError::NonPositiveBurstInterval);
        }
        if self.total_duration < self.burst_interval {
            return Err(ConfigError::DurationShorterThanBurst {
                total: self.total_duration,
                burst: self.burst_interval,
            });
        }
        if self.fail_latency.is_zero() {
            return Err(ConfigError::ZeroFailLatency);
        }
        Ok(())
    }

    fn level_bound(&self) -> usize {
        match self.max_concurrency {
            Some(max) if max > self.start_concurrency => max,
            _ => self.start_concurrency.saturating_add(1),
        }
    }

    /// All levels the search may try, in order.
    pub fn levels(&self) -> impl Iterator<Item = usize> {
        (self.start_concurrency..self.level_bound()).step_by(self.step.max(1))
    }

    /// State following a finished run at `level`.
    pub fn next_state(&self, level: usize, failed: bool) -> SearchState {
        if failed {
            SearchState::Stopped(StopReason::FoundBreak)
        } else {
            match level.checked_add(self.step) {
                Some(next) if next < self.level_bound() => SearchState::Searching { level: next },
                _ => SearchState::Stopped(StopReason::ReachedMax),
            }
        }
    }

    pub fn burst_settings(&self) -> BurstSettings {
        BurstSettings {
            total_duration: self.total_duration,
            burst_interval: self.burst_interval,
            fail_latency: self.fail_latency,
            queue_wait: self.queue_wait,
            strict_client_errors: self.strict_client_errors,
        }
    }

    pub fn aggregation_params(&self) -> AggregationParams {
        AggregationParams {
            total_duration: self.total_duration,
            burst_interval: self.burst_interval,
            fail_latency: self.fail_latency,
            step: self.step,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Searching { level: usize },
    Stopped(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A level produced failed outcomes.
    FoundBreak,
    /// Every level up to the max stayed clean.
    ReachedMax,
}

/// What happened at one concurrency level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelSummary {
    pub concurrency: usize,
    pub goal_bursts: usize,
    pub expected: usize,
    pub collected: usize,
    pub failed: usize,
    pub client_overload: bool,
    pub drain_timed_out: bool,
    pub abandoned_workers: usize,
}

impl From<&BurstRunResult> for LevelSummary {
    fn from(run: &BurstRunResult) -> Self {
        Self {
            concurrency: run.concurrency(),
            goal_bursts: run.goal_bursts(),
            expected: run.expected_outcomes(),
            collected: run.outcomes().len(),
            failed: run.failed().len(),
            client_overload: run.client_overload(),
            drain_timed_out: run.drain_timed_out(),
            abandoned_workers: run.abandoned_workers(),
        }
    }
}

/// Final result of a search, built once and not mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ThroughputReport {
    pub stop_reason: StopReason,
    pub concurrency_at_break: Option<usize>,
    /// `None` when the very first level already failed.
    pub last_successful_concurrency: Option<usize>,
    pub max_throughput: Option<f64>,
    pub levels: Vec<LevelSummary>,
    pub samples: Vec<Sample>,
    pub metadata: Metadata,
}

impl ThroughputReport {
    pub fn statistic(&self, metric: &str) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| s.metric == metric)
            .map(|s| s.value)
    }

    pub fn statistics(&self) -> BTreeMap<String, f64> {
        self.samples
            .iter()
            .map(|s| (s.metric.clone(), s.value))
            .collect()
    }

    pub fn levels_attempted(&self) -> Vec<usize> {
        self.levels.iter().map(|l| l.concurrency).collect()
    }
}

/// Drives burst runs at increasing concurrency until the target breaks.
#[derive(Debug)]
pub struct ThroughputSearch<T> {
    target: Arc<T>,
    request: Arc<PromptRequest>,
    config: SearchConfig,
}

impl<T: Target> ThroughputSearch<T> {
    pub fn new(target: Arc<T>, request: PromptRequest, config: SearchConfig) -> Self {
        Self {
            target,
            request: Arc::new(request),
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Confirm the target serves a single prompt before searching.
    pub async fn preflight(&self) -> Result<(), SearchError> {
        let responses = self
            .target
            .send_prompt(&self.request)
            .await
            .map_err(SearchError::TargetUnavailable)?;
        for response in &responses {
            tracing::info!("preflight request got response: {response}");
        }
        Ok(())
    }

    pub async fn run(&self) -> Result<ThroughputReport, SearchError> {
        self.config.validate()?;
        tracing::info!(config = ?self.config, "finding max throughput for target");

        let scheduler = BurstScheduler::new(
            self.target.clone(),
            self.request.clone(),
            self.config.burst_settings(),
        );

        let mut state = SearchState::Searching {
            level: self.config.start_concurrency,
        };
        let mut levels = Vec::new();
        let mut last_clean: Option<BurstRunResult> = None;
        let mut broken: Option<BurstRunResult> = None;

        let reason = loop {
            let level = match state {
                SearchState::Searching { level } => level,
                SearchState::Stopped(reason) => break reason,
            };

            tracing::info!("sending {level} requests per burst");
            let run = scheduler.run(level).await?;
            levels.push(LevelSummary::from(&run));

            state = self.config.next_state(level, run.has_failures());
            if run.has_failures() {
                tracing::info!(
                    "reached failure point when trying {level} requests per burst with {} failures",
                    run.failed().len(),
                );
                broken = Some(run);
            } else {
                last_clean = Some(run);
            }
        };

        Ok(self.build_report(reason, levels, last_clean, broken))
    }

    fn build_report(
        &self,
        stop_reason: StopReason,
        levels: Vec<LevelSummary>,
        last_clean: Option<BurstRunResult>,
        broken: Option<BurstRunResult>,
    ) -> ThroughputReport {
        let params = self.config.aggregation_params();
        let base_metadata = self.target.metadata();
        let concurrency_at_break = broken.as_ref().map(BurstRunResult::concurrency);

        let Some(last_clean) = last_clean else {
            tracing::warn!(
                "the very first concurrency level tried had errors; probably a smaller starting concurrency needs to be chosen"
            );
            let samples = broken
                .as_ref()
                .map(|run| aggregate::aggregate(run, &params, &base_metadata))
                .unwrap_or_default();
            return ThroughputReport {
                stop_reason,
                concurrency_at_break,
                last_successful_concurrency: None,
                max_throughput: None,
                levels,
                samples,
                metadata: base_metadata,
            };
        };

        let last_successful = last_clean.concurrency();
        if stop_reason == StopReason::ReachedMax {
            tracing::warn!(
                "reached max concurrency of {last_successful} without failures; \
                 outputting results from the highest level run",
            );
        }

        let mut samples = aggregate::aggregate(&last_clean, &params, &base_metadata);
        let max_throughput = params.qps(last_successful);
        samples.push(Sample::new(
            MAX_THROUGHPUT,
            max_throughput,
            Unit::Count,
            aggregate::sample_metadata(last_successful, &params, &base_metadata),
        ));

        tracing::info!(
            "max throughput of {max_throughput} requests per second at {last_successful} requests per burst"
        );

        ThroughputReport {
            stop_reason,
            concurrency_at_break,
            last_successful_concurrency: Some(last_successful),
            max_throughput: Some(max_throughput),
            levels,
            samples,
            metadata: base_metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{MockConfig, MockTarget};

    use tracing_test::traced_test;

    fn config(start: usize, max: Option<usize>) -> SearchConfig {
        SearchConfig {
            start_concurrency: start,
            max_concurrency: max,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate() {
        assert_eq!(config(5, None).validate(), Ok(()));
        assert_eq!(config(5, Some(5)).validate(), Ok(()));
        assert_eq!(
            config(5, Some(3)).validate(),
            Err(ConfigError::MaxBelowStart { start: 5, max: 3 })
        );
        assert_eq!(
            config(0, None).validate(),
            Err(ConfigError::ZeroStartConcurrency)
        );
        assert_eq!(
            SearchConfig {
                step: 0,
                ..Default::default()
            }
            .validate(),
            Err(ConfigError::ZeroStep)
        );
        assert_eq!(
            SearchConfig {
                burst_interval: Duration::ZERO,
                ..Default::default()
            }
            .validate(),
            Err(ConfigError::NonPositiveBurstInterval)
        );
        assert!(matches!(
            SearchConfig {
                total_duration: Duration::from_millis(500),
                ..Default::default()
            }
            .validate(),
            Err(ConfigError::DurationShorterThanBurst { .. })
        ));
    }

    #[test]
    fn test_levels() {
        for (start, max, expected) in [
            (5, Some(11), vec![5, 8]),
            (5, Some(12), vec![5, 8, 11]),
            (5, None, vec![5]),
            (5, Some(5), vec![5]),
            (5, Some(6), vec![5]),
            (1, Some(10), vec![1, 4, 7]),
        ] {
            let levels: Vec<_> = config(start, max).levels().collect();
            assert_eq!(levels, expected, "start = {start}, max = {max:?}");
        }
    }

    #[test]
    fn test_next_state() {
        let cfg = config(5, Some(11));
        assert_eq!(
            cfg.next_state(5, false),
            SearchState::Searching { level: 8 }
        );
        assert_eq!(
            cfg.next_state(8, false),
            SearchState::Stopped(StopReason::ReachedMax)
        );
        assert_eq!(
            cfg.next_state(5, true),
            SearchState::Stopped(StopReason::FoundBreak)
        );

        let cfg = config(5, None);
        assert_eq!(
            cfg.next_state(5, false),
            SearchState::Stopped(StopReason::ReachedMax)
        );
    }

    #[test]
    fn test_huge_step_reaches_max() {
        for max in [Some(usize::MAX), Some(100), None] {
            let cfg = SearchConfig {
                step: usize::MAX,
                ..config(5, max)
            };
            assert_eq!(cfg.levels().collect::<Vec<_>>(), vec![5], "max: {max:?}");
            assert_eq!(
                cfg.next_state(5, false),
                SearchState::Stopped(StopReason::ReachedMax),
                "max: {max:?}"
            );
        }

        let cfg = config(usize::MAX - 1, None);
        assert_eq!(cfg.levels().collect::<Vec<_>>(), vec![usize::MAX - 1]);
        assert_eq!(
            cfg.next_state(usize::MAX - 1, false),
            SearchState::Stopped(StopReason::ReachedMax)
        );
    }

    #[test]
    fn test_next_state_matches_levels() {
        let cfg = SearchConfig {
            start_concurrency: 2,
            max_concurrency: Some(20),
            step: 4,
            ..Default::default()
        };
        let mut visited = vec![cfg.start_concurrency];
        let mut level = cfg.start_concurrency;
        while let SearchState::Searching { level: next } = cfg.next_state(level, false) {
            visited.push(next);
            level = next;
        }
        assert_eq!(visited, cfg.levels().collect::<Vec<_>>());
    }

    fn mock_search(mock: MockConfig, config: SearchConfig) -> ThroughputSearch<MockTarget> {
        ThroughputSearch::new(
            Arc::new(MockTarget::try_new(mock).unwrap()),
            PromptRequest::default(),
            SearchConfig {
                total_duration: Duration::from_secs(2),
                fail_latency: Duration::from_secs(10),
                ..config
            },
        )
    }

    #[tokio::test(flavor = "current_thread")]
    #[traced_test]
    async fn test_first_level_failure_is_warned() {
        tokio::time::pause();

        let search = mock_search(
            MockConfig {
                base_latency: 0.1,
                error_rate: 1.0,
                ..Default::default()
            },
            config(3, Some(9)),
        );
        let report = search.run().await.unwrap();

        assert_eq!(report.levels_attempted(), vec![3]);
        assert_eq!(report.last_successful_concurrency, None);
        assert!(logs_contain("very first concurrency level tried had errors"));
    }

    #[tokio::test(flavor = "current_thread")]
    #[traced_test]
    async fn test_reached_max_is_warned() {
        tokio::time::pause();

        let search = mock_search(
            MockConfig {
                base_latency: 0.1,
                ..Default::default()
            },
            config(3, Some(9)),
        );
        let report = search.run().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::ReachedMax);
        assert_eq!(report.levels_attempted(), vec![3, 6]);
        assert_eq!(report.levels[1].collected, 12);
        assert!(logs_contain("reached max concurrency of 6 without failures"));
        assert!(logs_contain("sending 6 requests per burst"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_invalid_config_is_rejected_by_run() {
        let search = mock_search(MockConfig::default(), config(5, Some(3)));
        let err = search.run().await.unwrap_err();
        assert!(
            matches!(
                err,
                SearchError::Configuration(ConfigError::MaxBelowStart { .. })
            ),
            "{err}"
        );
    }
}
