use std::sync::Arc;

use rama::telemetry::tracing;
use tokio::{task::JoinHandle, time::Instant};

use crate::{
    collector::OutcomeSender,
    outcome::{Outcome, OutcomeStatus},
    target::{PromptRequest, Target},
};

/// Executes a single prompt against the target on its own task.
#[derive(Debug)]
pub struct RequestWorker<T> {
    target: Arc<T>,
    request: Arc<PromptRequest>,
    outcomes: OutcomeSender,
}

impl<T: Target> RequestWorker<T> {
    pub fn new(target: Arc<T>, request: Arc<PromptRequest>, outcomes: OutcomeSender) -> Self {
        Self {
            target,
            request,
            outcomes,
        }
    }

    /// Spawn the worker. The returned handle resolves once the outcome
    /// has been enqueued; dropping it detaches the worker without
    /// cancelling it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Time one prompt and enqueue exactly one outcome, whatever happens
    /// inside the target call.
    pub async fn run(self) {
        let Self {
            target,
            request,
            outcomes,
        } = self;

        let start_time = Instant::now();

        // The call runs on a nested task so that a panic inside the target
        // surfaces as a join error instead of taking this worker down.
        let call = tokio::spawn(async move { target.send_prompt(&request).await });

        let (status, payload) = match call.await {
            Ok(Ok(responses)) => {
                for response in &responses {
                    tracing::trace!("sent request & got response: {response}");
                }
                (OutcomeStatus::Ok, Some(responses))
            }
            Ok(Err(err)) => {
                tracing::debug!("failed to send prompt: {err}");
                (OutcomeStatus::Error, None)
            }
            Err(err) => {
                tracing::debug!("prompt task did not complete: {err}");
                (OutcomeStatus::Error, None)
            }
        };
        let end_time = Instant::now();

        if !outcomes.send(Outcome::new(start_time, end_time, status, payload)) {
            tracing::debug!("outcome collector closed: drop outcome");
        }
    }
}
