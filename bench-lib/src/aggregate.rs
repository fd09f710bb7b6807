//! Turns a batch of outcomes into named metric samples.

use std::{collections::BTreeMap, fmt, time::Duration};

use rama::telemetry::tracing;
use serde::Serialize;

use crate::scheduler::BurstRunResult;

/// Key/value context shared by all samples of one aggregation.
pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Seconds,
    Count,
    Percent,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Unit::Seconds => "seconds",
            Unit::Count => "count",
            Unit::Percent => "percent",
        })
    }
}

/// One named metric record handed to the harness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub metric: String,
    pub value: f64,
    pub unit: Unit,
    pub metadata: Metadata,
}

impl Sample {
    pub fn new(metric: impl Into<String>, value: f64, unit: Unit, metadata: Metadata) -> Self {
        Self {
            metric: metric.into(),
            value,
            unit,
            metadata,
        }
    }
}

pub const FAILURE_MEDIAN_RESPONSE_TIME: &str = "failure_median_response_time";
pub const NUM_FAILURES: &str = "num_failures";
pub const SUCCESS_RATE: &str = "success_rate";
pub const NUM_RESPONSES: &str = "num_responses";
pub const MEDIAN_RESPONSE_TIME: &str = "median_response_time";
pub const MEAN_RESPONSE_TIME: &str = "mean_response_time";
pub const MAX_THROUGHPUT: &str = "max_throughput";

/// Test parameters recorded in the metadata of every sample.
#[derive(Debug, Clone, Copy)]
pub struct AggregationParams {
    pub total_duration: Duration,
    pub burst_interval: Duration,
    pub fail_latency: Duration,
    pub step: usize,
}

impl AggregationParams {
    /// Requests per second implied by sending `concurrency` requests
    /// every burst interval.
    pub fn qps(&self, concurrency: usize) -> f64 {
        concurrency as f64 / self.burst_interval.as_secs_f64()
    }
}

/// Compute latency and success statistics for one burst run.
///
/// Failure metrics are only emitted when failures exist, success metrics
/// only when at least one outcome succeeded.
pub fn aggregate(
    run: &BurstRunResult,
    params: &AggregationParams,
    base_metadata: &Metadata,
) -> Vec<Sample> {
    let successful_durations: Vec<f64> = run
        .successes()
        .map(|o| o.duration().as_secs_f64())
        .collect();
    tracing::debug!("response durations dump: {successful_durations:?}");

    let failed_durations: Vec<f64> = run
        .failed()
        .iter()
        .map(|o| o.duration().as_secs_f64())
        .collect();
    tracing::debug!("failed response durations dump: {failed_durations:?}");

    let metadata = sample_metadata(run.concurrency(), params, base_metadata);

    let mut samples = Vec::with_capacity(6);

    if let Some(median) = median(&failed_durations) {
        samples.push(Sample::new(
            FAILURE_MEDIAN_RESPONSE_TIME,
            median,
            Unit::Seconds,
            metadata.clone(),
        ));
        samples.push(Sample::new(
            NUM_FAILURES,
            failed_durations.len() as f64,
            Unit::Count,
            metadata.clone(),
        ));
    }

    if successful_durations.is_empty() {
        return samples;
    }

    let successes = successful_durations.len() as f64;
    samples.push(Sample::new(
        SUCCESS_RATE,
        successes / (successes + failed_durations.len() as f64) * 100.0,
        Unit::Percent,
        metadata.clone(),
    ));
    samples.push(Sample::new(
        NUM_RESPONSES,
        successes,
        Unit::Count,
        metadata.clone(),
    ));
    if let Some(median) = median(&successful_durations) {
        samples.push(Sample::new(
            MEDIAN_RESPONSE_TIME,
            median,
            Unit::Seconds,
            metadata.clone(),
        ));
    }
    if let Some(mean) = mean(&successful_durations) {
        samples.push(Sample::new(
            MEAN_RESPONSE_TIME,
            mean,
            Unit::Seconds,
            metadata,
        ));
    }

    samples
}

/// Base metadata extended with the test parameters of one level.
pub fn sample_metadata(
    concurrency: usize,
    params: &AggregationParams,
    base: &Metadata,
) -> Metadata {
    let mut metadata = base.clone();
    metadata.insert("parallel_requests".to_owned(), concurrency.to_string());
    metadata.insert(
        "test_duration".to_owned(),
        params.total_duration.as_secs_f64().to_string(),
    );
    metadata.insert(
        "burst_time".to_owned(),
        params.burst_interval.as_secs_f64().to_string(),
    );
    metadata.insert(
        "effective_qps".to_owned(),
        params.qps(concurrency).to_string(),
    );
    metadata.insert(
        "fail_latency".to_owned(),
        params.fail_latency.as_secs_f64().to_string(),
    );
    metadata.insert("step".to_owned(), params.step.to_string());
    metadata
}

/// Median of `values`; the mean of the two middle values for even sizes.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::outcome::{Outcome, OutcomeStatus};

    const PARAMS: AggregationParams = AggregationParams {
        total_duration: Duration::from_secs(60),
        burst_interval: Duration::from_secs(1),
        fail_latency: Duration::from_secs(95),
        step: 3,
    };

    fn run(concurrency: usize, outcomes: &[(OutcomeStatus, f64)]) -> BurstRunResult {
        let start = Instant::now();
        BurstRunResult::new(
            concurrency,
            1,
            PARAMS.fail_latency,
            outcomes
                .iter()
                .map(|&(status, secs)| {
                    Outcome::new(start, start + Duration::from_secs_f64(secs), status, None)
                })
                .collect(),
        )
    }

    fn value(samples: &[Sample], metric: &str) -> Option<f64> {
        samples.iter().find(|s| s.metric == metric).map(|s| s.value)
    }

    #[test]
    fn test_aggregate_mixed_run() {
        let run = run(
            4,
            &[
                (OutcomeStatus::Ok, 1.0),
                (OutcomeStatus::Ok, 2.0),
                (OutcomeStatus::Ok, 3.0),
                (OutcomeStatus::Ok, 96.0),
            ],
        );
        let samples = aggregate(&run, &PARAMS, &Metadata::new());

        assert_eq!(value(&samples, SUCCESS_RATE), Some(75.0));
        assert_eq!(value(&samples, MEDIAN_RESPONSE_TIME), Some(2.0));
        assert_eq!(value(&samples, MEAN_RESPONSE_TIME), Some(2.0));
        assert_eq!(value(&samples, NUM_RESPONSES), Some(3.0));
        assert_eq!(value(&samples, FAILURE_MEDIAN_RESPONSE_TIME), Some(96.0));
        assert_eq!(value(&samples, NUM_FAILURES), Some(1.0));
    }

    #[test]
    fn test_aggregate_clean_run() {
        let run = run(2, &[(OutcomeStatus::Ok, 0.5), (OutcomeStatus::Ok, 1.5)]);
        let samples = aggregate(&run, &PARAMS, &Metadata::new());

        assert_eq!(value(&samples, SUCCESS_RATE), Some(100.0));
        assert_eq!(value(&samples, MEDIAN_RESPONSE_TIME), Some(1.0));
        assert_eq!(value(&samples, NUM_FAILURES), None);
        assert_eq!(value(&samples, FAILURE_MEDIAN_RESPONSE_TIME), None);
    }

    #[test]
    fn test_aggregate_failures_only() {
        let run = run(
            2,
            &[(OutcomeStatus::Error, 0.25), (OutcomeStatus::Error, 0.75)],
        );
        let samples = aggregate(&run, &PARAMS, &Metadata::new());

        let metrics: Vec<_> = samples.iter().map(|s| s.metric.as_str()).collect();
        assert_eq!(metrics, vec![FAILURE_MEDIAN_RESPONSE_TIME, NUM_FAILURES]);
        assert_eq!(value(&samples, FAILURE_MEDIAN_RESPONSE_TIME), Some(0.5));
    }

    #[test]
    fn test_aggregate_empty_run() {
        let samples = aggregate(&run(5, &[]), &PARAMS, &Metadata::new());
        assert!(samples.is_empty());
    }

    #[test]
    fn test_aggregate_metadata() {
        let mut base = Metadata::new();
        base.insert("target".to_owned(), "mock".to_owned());

        let samples = aggregate(&run(5, &[(OutcomeStatus::Ok, 1.0)]), &PARAMS, &base);
        assert!(!samples.is_empty());
        for sample in &samples {
            assert_eq!(sample.metadata["target"], "mock");
            assert_eq!(sample.metadata["parallel_requests"], "5");
            assert_eq!(sample.metadata["effective_qps"], "5");
            assert_eq!(sample.metadata["burst_time"], "1");
            assert_eq!(sample.metadata["test_duration"], "60");
        }
    }

    #[test]
    fn test_median() {
        for (input, expected) in [
            (vec![], None),
            (vec![4.0], Some(4.0)),
            (vec![3.0, 1.0, 2.0], Some(2.0)),
            (vec![4.0, 1.0, 3.0, 2.0], Some(2.5)),
            (vec![1.0, 1.0, 5.0, 9.0, 100.0], Some(5.0)),
        ] {
            assert_eq!(median(&input), expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(mean(&[1.0, 2.0]), Some(1.5));
    }

    #[test]
    fn test_unit_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Unit::Seconds).unwrap(),
            r#""seconds""#
        );
    }
}
