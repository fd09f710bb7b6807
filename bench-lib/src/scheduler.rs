//! Fixed-cadence bursts of concurrent request workers.

use std::{sync::Arc, time::Duration};

use rama::telemetry::tracing;
use tokio::time::Instant;

use crate::{
    collector::ResultCollector,
    error::SearchError,
    outcome::Outcome,
    target::{PromptRequest, Target},
    worker::RequestWorker,
};

/// Upper bound on worker handles reserved up front.
const MAX_PREALLOCATED_WORKERS: usize = 1 << 16;

/// Timing and policy of a single burst run.
#[derive(Debug, Clone, Copy)]
pub struct BurstSettings {
    pub total_duration: Duration,
    pub burst_interval: Duration,
    pub fail_latency: Duration,
    pub queue_wait: Duration,
    pub strict_client_errors: bool,
}

impl BurstSettings {
    /// Number of bursts that fit in the total duration.
    pub fn goal_bursts(&self) -> usize {
        let interval = self.burst_interval.as_nanos();
        if interval == 0 {
            return 0;
        }
        usize::try_from(self.total_duration.as_nanos() / interval).unwrap_or(usize::MAX)
    }
}

/// Everything collected while running bursts at one concurrency level.
#[derive(Debug, Clone)]
pub struct BurstRunResult {
    concurrency: usize,
    goal_bursts: usize,
    fail_latency: Duration,
    outcomes: Vec<Outcome>,
    failed: Vec<Outcome>,
    client_overload: bool,
    drain_timed_out: bool,
    abandoned_workers: usize,
}

impl BurstRunResult {
    /// Build a result from collected outcomes, classifying failures
    /// with `fail_latency`.
    pub fn new(
        concurrency: usize,
        goal_bursts: usize,
        fail_latency: Duration,
        outcomes: Vec<Outcome>,
    ) -> Self {
        let failed = outcomes
            .iter()
            .filter(|o| o.is_failed(fail_latency))
            .cloned()
            .collect();
        Self {
            concurrency,
            goal_bursts,
            fail_latency,
            outcomes,
            failed,
            client_overload: false,
            drain_timed_out: false,
            abandoned_workers: 0,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn goal_bursts(&self) -> usize {
        self.goal_bursts
    }

    /// Outcomes the run could have produced if nothing got lost.
    pub fn expected_outcomes(&self) -> usize {
        self.goal_bursts.saturating_mul(self.concurrency)
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn failed(&self) -> &[Outcome] {
        &self.failed
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &Outcome> {
        let fail_latency = self.fail_latency;
        self.outcomes
            .iter()
            .filter(move |o| !o.is_failed(fail_latency))
    }

    /// Launching or joining workers could not keep up at some point.
    pub fn client_overload(&self) -> bool {
        self.client_overload
    }

    pub fn drain_timed_out(&self) -> bool {
        self.drain_timed_out
    }

    /// Workers that were still running when the scheduler stopped joining.
    pub fn abandoned_workers(&self) -> usize {
        self.abandoned_workers
    }
}

/// Issues `concurrency` workers every burst interval for the total
/// duration, then collects what they produced within bounded waits.
#[derive(Debug)]
pub struct BurstScheduler<T> {
    target: Arc<T>,
    request: Arc<PromptRequest>,
    settings: BurstSettings,
}

impl<T: Target> BurstScheduler<T> {
    pub fn new(target: Arc<T>, request: Arc<PromptRequest>, settings: BurstSettings) -> Self {
        Self {
            target,
            request,
            settings,
        }
    }

    pub fn settings(&self) -> &BurstSettings {
        &self.settings
    }

    pub async fn run(&self, concurrency: usize) -> Result<BurstRunResult, SearchError> {
        let BurstSettings {
            total_duration,
            burst_interval,
            fail_latency,
            queue_wait,
            ..
        } = self.settings;

        let run_start = Instant::now();
        let goal_bursts = self.settings.goal_bursts();
        tracing::info!(
            "starting to send {concurrency} requests every {burst_interval:?} over {total_duration:?}, {goal_bursts} times",
        );

        let mut collector = ResultCollector::new(queue_wait);
        let mut workers = Vec::with_capacity(
            goal_bursts
                .saturating_mul(concurrency)
                .min(MAX_PREALLOCATED_WORKERS),
        );
        let mut client_overload = false;

        for burst in 0..goal_bursts {
            let burst_start = Instant::now();
            tracing::debug!("sending burst #{burst} of {concurrency} requests in parallel");
            for _ in 0..concurrency {
                let worker =
                    RequestWorker::new(self.target.clone(), self.request.clone(), collector.sender());
                workers.push(worker.spawn());
            }

            let launch_duration = burst_start.elapsed();
            if launch_duration > burst_interval {
                client_overload = true;
                self.encounter_client_error(format!(
                    "after running for {:?}, the client took {launch_duration:?} to send {concurrency} requests, \
                     which is more than the {burst_interval:?} needed to meet QPS; \
                     the client is not powerful enough and a client with more CPUs should be used",
                    run_start.elapsed(),
                ))?;
            }

            tokio::time::sleep_until(burst_start + burst_interval).await;
        }

        tracing::debug!("waiting for all queued results");
        let mut drain = collector.drain_pending().await;
        let mut drain_timed_out = drain.timed_out;

        let launched = workers.len();
        let mut abandoned_workers = 0;
        let join_start = Instant::now();
        let mut join_duration = Duration::ZERO;
        let mut pending = workers.into_iter();
        #[allow(clippy::while_let_on_iterator)]
        while let Some(mut handle) = pending.next() {
            match tokio::time::timeout(fail_latency, &mut handle).await {
                Ok(Ok(())) => (),
                Ok(Err(err)) => tracing::debug!("request worker failed to complete: {err}"),
                Err(_) => {
                    // dropping the handle detaches the worker, it keeps running
                    abandoned_workers += 1;
                }
            }

            join_duration = join_start.elapsed();
            if join_duration > fail_latency {
                client_overload = true;
                abandoned_workers += pending.len();
                self.encounter_client_error(format!(
                    "waited more than {fail_latency:?} for workers to join; \
                     continuing, but some data may have been dropped",
                ))?;
                break;
            }
        }
        tracing::debug!(
            "{} of {launched} workers joined in {join_duration:?}",
            launched - abandoned_workers,
        );

        if drain.outcomes.is_empty() {
            drain = collector.drain_fallback().await;
            drain_timed_out |= drain.timed_out;
        }

        let expected = goal_bursts.saturating_mul(concurrency);
        if drain.outcomes.len() < expected {
            tracing::info!(
                "theoretically started {expected} requests but only got {} outcomes from {launched} workers; \
                 exact reason is unknown, but this is not entirely unexpected",
                drain.outcomes.len(),
            );
        }

        let mut result = BurstRunResult::new(concurrency, goal_bursts, fail_latency, drain.outcomes);
        result.client_overload = client_overload;
        result.drain_timed_out = drain_timed_out;
        result.abandoned_workers = abandoned_workers;
        Ok(result)
    }

    fn encounter_client_error(&self, message: String) -> Result<(), SearchError> {
        if self.settings.strict_client_errors {
            return Err(SearchError::ClientOverload { message });
        }
        tracing::warn!("{message}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        outcome::OutcomeStatus,
        target::{MockConfig, MockTarget},
    };

    use tracing_test::traced_test;

    fn settings(total: u64, interval: u64, fail_latency: u64, strict: bool) -> BurstSettings {
        BurstSettings {
            total_duration: Duration::from_secs(total),
            burst_interval: Duration::from_secs(interval),
            fail_latency: Duration::from_secs(fail_latency),
            queue_wait: Duration::from_secs(600),
            strict_client_errors: strict,
        }
    }

    fn scheduler(mock: MockConfig, settings: BurstSettings) -> BurstScheduler<MockTarget> {
        BurstScheduler::new(
            Arc::new(MockTarget::try_new(mock).unwrap()),
            Arc::new(PromptRequest::default()),
            settings,
        )
    }

    #[test]
    fn test_goal_bursts() {
        for (total_ms, interval_ms, expected) in [
            (60_000, 1_000, 60),
            (10_000, 3_000, 3),
            (2_500, 1_000, 2),
            (1_000, 1_000, 1),
            (300, 100, 3),
            (700, 100, 7),
            (1_000, 0, 0),
        ] {
            let settings = BurstSettings {
                total_duration: Duration::from_millis(total_ms),
                burst_interval: Duration::from_millis(interval_ms),
                ..settings(1, 1, 1, false)
            };
            assert_eq!(
                settings.goal_bursts(),
                expected,
                "total={total_ms}ms interval={interval_ms}ms"
            );
        }
    }

    #[tokio::test(flavor = "current_thread")]
    #[traced_test]
    async fn test_all_outcomes_collected() {
        tokio::time::pause();

        let scheduler = scheduler(
            MockConfig {
                base_latency: 0.5,
                ..Default::default()
            },
            settings(3, 1, 95, true),
        );

        let start = Instant::now();
        let result = scheduler.run(4).await.unwrap();

        assert_eq!(result.goal_bursts(), 3);
        assert_eq!(result.outcomes().len(), 12);
        assert!(result.outcomes().len() <= result.expected_outcomes());
        assert!(!result.has_failures());
        assert!(!result.client_overload());
        assert!(
            result
                .outcomes()
                .iter()
                .all(|o| o.status() == OutcomeStatus::Ok)
        );
        // bursts keep their cadence
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(logs_contain("starting to send 4 requests every 1s"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_slow_outcomes_classified_as_failed() {
        tokio::time::pause();

        let scheduler = scheduler(
            MockConfig {
                base_latency: 0.1,
                stall_rate: 1.0,
                stall_latency: 3.0,
                ..Default::default()
            },
            settings(1, 1, 2, false),
        );

        let result = scheduler.run(2).await.unwrap();
        assert_eq!(result.outcomes().len(), 2);
        assert_eq!(result.failed().len(), 2);
        assert_eq!(result.successes().count(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_join_overload_is_fatal_when_strict() {
        tokio::time::pause();

        let scheduler = scheduler(
            MockConfig {
                base_latency: 30.0,
                ..Default::default()
            },
            settings(2, 1, 2, true),
        );

        let err = scheduler.run(2).await.unwrap_err();
        assert!(matches!(err, SearchError::ClientOverload { .. }), "{err}");
    }

    #[tokio::test(flavor = "current_thread")]
    #[traced_test]
    async fn test_join_overload_abandons_workers_when_lenient() {
        tokio::time::pause();

        let scheduler = scheduler(
            MockConfig {
                base_latency: 30.0,
                ..Default::default()
            },
            settings(2, 1, 2, false),
        );

        let result = scheduler.run(2).await.unwrap();
        assert!(result.client_overload());
        assert_eq!(result.abandoned_workers(), 4);
        assert!(result.outcomes().is_empty());
        assert!(logs_contain("workers to join"));
    }

    fn launch_overload_settings(strict: bool) -> BurstSettings {
        BurstSettings {
            total_duration: Duration::from_nanos(1),
            burst_interval: Duration::from_nanos(1),
            fail_latency: Duration::from_secs(5),
            queue_wait: Duration::from_secs(5),
            strict_client_errors: strict,
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_launch_overload_is_fatal_when_strict() {
        let scheduler = scheduler(MockConfig::default(), launch_overload_settings(true));

        let err = scheduler.run(500).await.unwrap_err();
        assert!(matches!(err, SearchError::ClientOverload { .. }), "{err}");
        assert!(err.to_string().contains("not powerful enough"), "{err}");
    }

    #[tokio::test(flavor = "current_thread")]
    #[traced_test]
    async fn test_launch_overload_is_warned_when_lenient() {
        let scheduler = scheduler(MockConfig::default(), launch_overload_settings(false));

        let result = scheduler.run(500).await.unwrap();
        assert_eq!(result.goal_bursts(), 1);
        assert!(result.client_overload());
        assert!(!result.outcomes().is_empty());
        assert!(result.outcomes().len() <= result.expected_outcomes());
        assert!(!result.has_failures());
        assert!(logs_contain("not powerful enough"));
    }

    #[test]
    fn test_expected_outcomes_saturate() {
        let result = BurstRunResult::new(usize::MAX, 2, Duration::from_secs(1), Vec::new());
        assert_eq!(result.expected_outcomes(), usize::MAX);
    }
}
