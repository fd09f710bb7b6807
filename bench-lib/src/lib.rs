//! Adaptive throughput search for remote inference endpoints.
//!
//! The search issues timed, isolated bursts of concurrent requests against
//! a single target at increasing concurrency levels until latency or error
//! behavior degrades, and reports the highest clean level as the maximum
//! sustainable request rate.
//!
//! The harness (CLI flags, presets, output formatting) lives in the
//! `ai-throughput-bench` binary crate.

#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

pub mod aggregate;
pub mod collector;
pub mod error;
pub mod outcome;
pub mod scheduler;
pub mod search;
pub mod target;
pub mod utils;
pub mod worker;

pub use self::{
    aggregate::{Metadata, Sample, Unit},
    error::{ConfigError, SearchError},
    outcome::{Outcome, OutcomeStatus},
    scheduler::{BurstRunResult, BurstScheduler},
    search::{LevelSummary, SearchConfig, StopReason, ThroughputReport, ThroughputSearch},
    target::{HttpTarget, MockConfig, MockTarget, PromptRequest, Target, TargetError},
};
