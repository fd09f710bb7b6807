//! Multi-producer, single-consumer collection of worker outcomes.
//!
//! Workers only ever hold an [`OutcomeSender`]. The scheduler owns the
//! [`ResultCollector`] and drains it without requiring workers to finish
//! first. Every produced outcome is delivered to the consumer at most once.

use std::time::Duration;

use rama::telemetry::tracing;
use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError},
    time::Instant,
};

use crate::outcome::Outcome;

/// Producer side handed to each worker.
#[derive(Debug, Clone)]
pub struct OutcomeSender(UnboundedSender<Outcome>);

impl OutcomeSender {
    /// Enqueue an outcome. Returns `false` if the collector is gone,
    /// in which case the outcome is dropped.
    pub fn send(&self, outcome: Outcome) -> bool {
        self.0.send(outcome).is_ok()
    }
}

/// Result of one drain pass.
#[derive(Debug, Default)]
pub struct Drain {
    pub outcomes: Vec<Outcome>,
    /// The pass was cut short because it exceeded its wait bound.
    pub timed_out: bool,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct ResultCollector {
    tx: UnboundedSender<Outcome>,
    rx: UnboundedReceiver<Outcome>,
    queue_wait: Duration,
}

impl ResultCollector {
    /// Create a collector whose drain passes give up after `queue_wait`.
    pub fn new(queue_wait: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx, queue_wait }
    }

    pub fn sender(&self) -> OutcomeSender {
        OutcomeSender(self.tx.clone())
    }

    /// Pop every outcome that is currently available.
    ///
    /// Never waits for new outcomes: the pass ends as soon as the queue is
    /// empty. If popping reaches the configured queue wait the
    /// pass stops early and reports `timed_out`, keeping what was collected.
    pub async fn drain_pending(&mut self) -> Drain {
        let start = Instant::now();
        let mut drain = Drain::default();

        loop {
            match self.rx.try_recv() {
                Ok(outcome) => drain.outcomes.push(outcome),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }

            drain.elapsed = start.elapsed();
            if drain.elapsed >= self.queue_wait {
                tracing::warn!(
                    "waited more than {:?} for the queue to empty; stop draining, some outcomes may be dropped",
                    self.queue_wait,
                );
                drain.timed_out = true;
                break;
            }

            // keep the runtime responsive while emptying a large backlog
            if drain.outcomes.len() % 1024 == 0 {
                tokio::task::yield_now().await;
            }
        }

        drain.elapsed = start.elapsed();
        tracing::debug!(
            "all {} queue results collected in {:?}",
            drain.outcomes.len(),
            drain.elapsed,
        );
        drain
    }

    /// Post-join fallback: one more pass to harvest outcomes of workers
    /// that finished after the scheduler stopped polling.
    pub async fn drain_fallback(&mut self) -> Drain {
        tracing::debug!("nothing collected before join: run fallback drain");
        self.drain_pending().await
    }
}
