use std::time::Duration;

use tokio::time::Instant;

/// Whether the target served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Ok,
    Error,
}

/// The timestamped result of one dispatched request.
///
/// Created exactly once by a [`RequestWorker`](crate::worker::RequestWorker)
/// and never modified afterwards.
#[derive(Debug, Clone)]
pub struct Outcome {
    start_time: Instant,
    end_time: Instant,
    status: OutcomeStatus,
    payload: Option<Vec<String>>,
}

impl Outcome {
    pub fn new(
        start_time: Instant,
        end_time: Instant,
        status: OutcomeStatus,
        payload: Option<Vec<String>>,
    ) -> Self {
        Self {
            start_time,
            end_time,
            status,
            payload,
        }
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn end_time(&self) -> Instant {
        self.end_time
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    /// Responses yielded by the target, if it served the request.
    pub fn payload(&self) -> Option<&[String]> {
        self.payload.as_deref()
    }

    /// Wall clock time between dispatch and observed completion.
    pub fn duration(&self) -> Duration {
        self.end_time.saturating_duration_since(self.start_time)
    }

    /// An outcome counts as failed when the target errored
    /// or when it took longer than `fail_latency`, regardless of status.
    pub fn is_failed(&self, fail_latency: Duration) -> bool {
        self.status == OutcomeStatus::Error || self.duration() > fail_latency
    }
}
