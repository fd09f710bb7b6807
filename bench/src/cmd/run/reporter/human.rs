use ai_throughput_lib::{LevelSummary, StopReason, ThroughputReport};

use super::Reporter;

#[derive(Debug, Default)]
pub struct HumanReporter {
    levels: usize,
}

impl HumanReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn level_line(level: &LevelSummary) -> String {
        let mut line = format!(
            "level concurrency={} bursts={} expected={} collected={} failed={}",
            level.concurrency, level.goal_bursts, level.expected, level.collected, level.failed,
        );
        if level.client_overload {
            line.push_str(" client_overload");
        }
        if level.drain_timed_out {
            line.push_str(" drain_timed_out");
        }
        if level.abandoned_workers > 0 {
            line.push_str(&format!(" abandoned={}", level.abandoned_workers));
        }
        line
    }

    pub(super) fn summary_line(report: &ThroughputReport) -> String {
        let levels = report.levels_attempted().len();
        match (report.stop_reason, report.max_throughput) {
            (_, None) => format!(
                "done: no clean level found after {levels} level(s), first level broke at concurrency {}",
                report.concurrency_at_break.unwrap_or_default(),
            ),
            (StopReason::FoundBreak, Some(qps)) => format!(
                "done: max_throughput={qps:.2} req/s at concurrency {}, broke at {} after {levels} level(s)",
                report.last_successful_concurrency.unwrap_or_default(),
                report.concurrency_at_break.unwrap_or_default(),
            ),
            (StopReason::ReachedMax, Some(qps)) => format!(
                "done: max_throughput={qps:.2} req/s at concurrency {}, reached max without failures after {levels} level(s)",
                report.last_successful_concurrency.unwrap_or_default(),
            ),
        }
    }
}

impl Reporter for HumanReporter {
    fn on_level(&mut self, level: &LevelSummary) {
        self.levels += 1;
        println!("#{} {}", self.levels, Self::level_line(level));
    }

    fn finish(&mut self, report: &ThroughputReport) {
        for sample in &report.samples {
            println!("{:<30} {:>12.4} {}", sample.metric, sample.value, sample.unit);
        }
        println!("{}", Self::summary_line(report));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(failed: usize, client_overload: bool) -> LevelSummary {
        LevelSummary {
            concurrency: 8,
            goal_bursts: 60,
            expected: 480,
            collected: 478,
            failed,
            client_overload,
            drain_timed_out: false,
            abandoned_workers: 0,
        }
    }

    fn report(stop_reason: StopReason, max_throughput: Option<f64>) -> ThroughputReport {
        ThroughputReport {
            stop_reason,
            concurrency_at_break: (stop_reason == StopReason::FoundBreak).then_some(8),
            last_successful_concurrency: max_throughput.map(|qps| qps as usize),
            max_throughput,
            levels: vec![level(0, false), level(3, false)],
            samples: Vec::new(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_level_line() {
        assert_eq!(
            HumanReporter::level_line(&level(3, false)),
            "level concurrency=8 bursts=60 expected=480 collected=478 failed=3"
        );
        assert!(HumanReporter::level_line(&level(0, true)).ends_with(" client_overload"));
    }

    #[test]
    fn test_summary_line() {
        for (report, expected) in [
            (
                report(StopReason::FoundBreak, Some(5.0)),
                "done: max_throughput=5.00 req/s at concurrency 5, broke at 8 after 2 level(s)",
            ),
            (
                report(StopReason::ReachedMax, Some(8.0)),
                "done: max_throughput=8.00 req/s at concurrency 8, reached max without failures after 2 level(s)",
            ),
            (
                report(StopReason::FoundBreak, None),
                "done: no clean level found after 2 level(s), first level broke at concurrency 8",
            ),
        ] {
            assert_eq!(HumanReporter::summary_line(&report), expected);
        }
    }
}
