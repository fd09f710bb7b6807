use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use super::{PromptRequest, Target, TargetError};
use crate::aggregate::Metadata;

/// Behavior of a [`MockTarget`].
///
/// Models processing cost, instability and a saturation point.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Base processing time in seconds.
    pub base_latency: f64,
    /// Random delay in seconds, added to or subtracted from `base_latency`.
    pub jitter: f64,
    /// Probability of answering with an unavailable error.
    pub error_rate: f32,
    /// Probability of stalling for `stall_latency` before answering.
    pub stall_rate: f32,
    /// Extra delay in seconds applied to stalled requests.
    pub stall_latency: f64,
    /// Max requests served concurrently; requests beyond it fail immediately.
    pub capacity: Option<usize>,
}

/// In-process stand-in for an inference endpoint.
#[derive(Debug, Clone)]
pub struct MockTarget {
    config: Arc<MockConfig>,
    in_flight: Arc<AtomicUsize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockBehavior {
    Error,
    Stall,
    Ok,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl MockTarget {
    pub fn try_new(config: MockConfig) -> Result<Self, String> {
        let error_rate = clamp_rate(config.error_rate);
        let stall_rate = clamp_rate(config.stall_rate);
        if error_rate + stall_rate > 1. {
            return Err("error_rate + stall_rate must be <= 1.0".to_owned());
        }
        if config.capacity == Some(0) {
            return Err("capacity must be at least 1 when set".to_owned());
        }

        Ok(Self {
            config: Arc::new(config),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// Number of prompts currently being served.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn pick_behavior(&self) -> MockBehavior {
        let error_rate = clamp_rate(self.config.error_rate);
        let stall_rate = clamp_rate(self.config.stall_rate);

        let r: f32 = rand::random();
        if r < error_rate {
            MockBehavior::Error
        } else if r < error_rate + stall_rate {
            MockBehavior::Stall
        } else {
            MockBehavior::Ok
        }
    }

    fn compute_delay(&self) -> Duration {
        let base = self.config.base_latency.max(0.0);
        let jitter = self.config.jitter.max(0.0);

        if jitter == 0.0 {
            return Duration::from_secs_f64(base);
        }

        let span = jitter * 2.0;
        let u: f64 = rand::random();
        let delta = (u * span) - jitter;

        Duration::from_secs_f64((base + delta).max(0.0))
    }
}

fn clamp_rate(v: f32) -> f32 {
    v.clamp(0., 1.0)
}

impl Target for MockTarget {
    async fn send_prompt(&self, request: &PromptRequest) -> Result<Vec<String>, TargetError> {
        let in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        let _guard = InFlightGuard(&self.in_flight);

        if let Some(capacity) = self.config.capacity
            && in_flight > capacity
        {
            return Err(TargetError::Unavailable(format!(
                "{in_flight} requests in flight exceeds capacity of {capacity}"
            )));
        }

        let behavior = self.pick_behavior();

        let mut delay = self.compute_delay();
        if behavior == MockBehavior::Stall {
            delay += Duration::from_secs_f64(self.config.stall_latency.max(0.0));
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match behavior {
            MockBehavior::Error => Err(TargetError::Unavailable(
                "mock target failed the request".to_owned(),
            )),
            MockBehavior::Stall | MockBehavior::Ok => Ok(vec![format!(
                "mock completion ({} max tokens) for: {}",
                request.max_tokens, request.prompt
            )]),
        }
    }

    fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("target".to_owned(), "mock".to_owned());
        metadata.insert(
            "mock_base_latency".to_owned(),
            self.config.base_latency.to_string(),
        );
        metadata.insert("mock_jitter".to_owned(), self.config.jitter.to_string());
        metadata.insert(
            "mock_error_rate".to_owned(),
            self.config.error_rate.to_string(),
        );
        if let Some(capacity) = self.config.capacity {
            metadata.insert("mock_capacity".to_owned(), capacity.to_string());
        }
        metadata
    }
}
