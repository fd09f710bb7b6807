use ai_throughput_lib::{LevelSummary, ThroughputReport};

mod human;
mod json;

pub use self::{human::HumanReporter, json::JsonlReporter};

pub trait Reporter: Send + Sync + 'static {
    /// Called once for every finished concurrency level, in order.
    fn on_level(&mut self, level: &LevelSummary);
    fn finish(&mut self, report: &ThroughputReport);
}
