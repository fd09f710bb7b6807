use ai_throughput_lib::{LevelSummary, ThroughputReport};

use super::Reporter;

/// Writes one JSON object per line: a `level` line per finished level,
/// a `sample` line per metric and a `final` line with the report summary.
#[derive(Debug, Default)]
pub struct JsonlReporter;

impl JsonlReporter {
    pub fn new() -> Self {
        Self
    }

    pub(super) fn level_event(level: &LevelSummary) -> serde_json::Value {
        serde_json::json!({
            "type": "level",
            "level": level,
        })
    }

    pub(super) fn final_events(report: &ThroughputReport) -> Vec<serde_json::Value> {
        let mut events: Vec<_> = report
            .samples
            .iter()
            .map(|sample| {
                serde_json::json!({
                    "type": "sample",
                    "sample": sample,
                })
            })
            .collect();
        events.push(serde_json::json!({
            "type": "final",
            "stop_reason": report.stop_reason,
            "levels": report.levels_attempted(),
            "concurrency_at_break": report.concurrency_at_break,
            "last_successful_concurrency": report.last_successful_concurrency,
            "max_throughput": report.max_throughput,
            "metadata": report.metadata,
        }));
        events
    }
}

impl Reporter for JsonlReporter {
    fn on_level(&mut self, level: &LevelSummary) {
        println!("{}", Self::level_event(level));
    }

    fn finish(&mut self, report: &ThroughputReport) {
        for line in Self::final_events(report) {
            println!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use ai_throughput_lib::{Metadata, Sample, StopReason, Unit};

    use super::*;

    #[test]
    fn test_final_events() {
        let mut metadata = Metadata::new();
        metadata.insert("target".to_owned(), "mock".to_owned());

        let report = ThroughputReport {
            stop_reason: StopReason::FoundBreak,
            concurrency_at_break: Some(8),
            last_successful_concurrency: Some(5),
            max_throughput: Some(5.0),
            levels: Vec::new(),
            samples: vec![Sample::new(
                "max_throughput",
                5.0,
                Unit::Count,
                metadata.clone(),
            )],
            metadata,
        };

        let events = JsonlReporter::final_events(&report);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "sample");
        assert_eq!(events[0]["sample"]["metric"], "max_throughput");
        assert_eq!(events[0]["sample"]["unit"], "count");
        assert_eq!(events[1]["type"], "final");
        assert_eq!(events[1]["stop_reason"], "found_break");
        assert_eq!(events[1]["max_throughput"], 5.0);
        assert_eq!(events[1]["metadata"]["target"], "mock");
    }

    #[test]
    fn test_level_event() {
        let event = JsonlReporter::level_event(&LevelSummary {
            concurrency: 5,
            goal_bursts: 60,
            expected: 300,
            collected: 300,
            failed: 0,
            client_overload: false,
            drain_timed_out: false,
            abandoned_workers: 0,
        });
        assert_eq!(event["type"], "level");
        assert_eq!(event["level"]["concurrency"], 5);
        assert_eq!(event["level"]["client_overload"], false);
    }
}
