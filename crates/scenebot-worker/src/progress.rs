//! Job-wide progress composed from per-stage progress.
//!
//! Each stage owns a contiguous band of the 0..=100 range. Stage-local
//! fractions are mapped into their band, so the caller sees one
//! progression from 0 to 100 instead of one counter per stage.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

use scenebot_models::Stage;

/// Receiver of job progress.
///
/// Failures and panics inside a sink are logged and otherwise ignored.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, stage_label: &str) -> anyhow::Result<()>;
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) -> anyhow::Result<()> + Send + Sync,
{
    fn report(&self, percent: u8, stage_label: &str) -> anyhow::Result<()> {
        self(percent, stage_label)
    }
}

/// Percent bands per stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressPlan {
    bands: Vec<(Stage, u8, u8)>,
}

impl ProgressPlan {
    /// Bands for a local file.
    pub fn direct() -> Self {
        Self {
            bands: vec![
                (Stage::Validating, 0, 5),
                (Stage::Detecting, 5, 40),
                (Stage::Splitting, 40, 90),
                (Stage::Normalizing, 90, 100),
            ],
        }
    }

    /// Bands for an input that is downloaded in chunks first.
    pub fn chunked() -> Self {
        Self {
            bands: vec![
                (Stage::Reassembling, 0, 40),
                (Stage::Validating, 40, 45),
                (Stage::Detecting, 45, 65),
                (Stage::Splitting, 65, 95),
                (Stage::Normalizing, 95, 100),
            ],
        }
    }

    pub fn for_input(chunked: bool) -> Self {
        if chunked {
            Self::chunked()
        } else {
            Self::direct()
        }
    }

    pub fn band(&self, stage: Stage) -> Option<(u8, u8)> {
        self.bands
            .iter()
            .find(|(s, _, _)| *s == stage)
            .map(|&(_, lo, hi)| (lo, hi))
    }

    /// Overall percent for `fraction` of `stage`.
    pub fn percent(&self, stage: Stage, fraction: f64) -> u8 {
        let Some((lo, hi)) = self.band(stage) else {
            return 0;
        };
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let span = f64::from(hi - lo);
        (f64::from(lo) + span * fraction).floor() as u8
    }
}

/// Forwards monotonic, de-duplicated progress to a sink.
///
/// Values below 100 come from [`update`](Self::update); 100 is only ever
/// sent once, by [`complete`](Self::complete).
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    plan: ProgressPlan,
    // Last emitted percent + 1; 0 before the first emission
    last: AtomicU16,
    completed: AtomicBool,
    last_detail: Mutex<Option<String>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink, plan: ProgressPlan) -> Self {
        Self {
            sink,
            plan,
            last: AtomicU16::new(0),
            completed: AtomicBool::new(false),
            last_detail: Mutex::new(None),
        }
    }

    /// Last percent sent to the sink.
    pub fn last_percent(&self) -> Option<u8> {
        match self.last.load(Ordering::SeqCst) {
            0 => None,
            n => Some((n - 1) as u8),
        }
    }

    /// Report `fraction` of `stage`. Regressions and repeats are dropped.
    pub fn update(&self, stage: Stage, fraction: f64) {
        if self.completed.load(Ordering::SeqCst) {
            return;
        }
        let percent = self.plan.percent(stage, fraction).min(99);
        if self.advance_to(percent) {
            self.emit(percent, stage.label());
        }
    }

    /// Report the start of `stage`.
    pub fn stage_started(&self, stage: Stage) {
        self.update(stage, 0.0);
    }

    /// Report activity in `stage` while its fraction is unknown.
    ///
    /// Sent at the current percent, never below the stage's band start,
    /// with `detail` appended to the stage label. A detail equal to the
    /// previous one is dropped.
    pub fn indeterminate(&self, stage: Stage, detail: &str) {
        if self.completed.load(Ordering::SeqCst) {
            return;
        }
        let mut last_detail = self.last_detail.lock().unwrap_or_else(|e| e.into_inner());
        if last_detail.as_deref() == Some(detail) {
            return;
        }
        *last_detail = Some(detail.to_string());

        self.advance_to(self.plan.percent(stage, 0.0).min(99));
        let percent = self.last_percent().unwrap_or(0);
        self.emit(percent, &format!("{}: {}", stage.label(), detail));
    }

    /// Report 100%. Later calls are ignored.
    pub fn complete(&self, label: &str) {
        if self.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.last.fetch_max(101, Ordering::SeqCst);
        self.emit(100, label);
    }

    fn advance_to(&self, percent: u8) -> bool {
        let encoded = u16::from(percent) + 1;
        self.last.fetch_max(encoded, Ordering::SeqCst) < encoded
    }

    fn emit(&self, percent: u8, label: &str) {
        debug!("Progress {}%: {}", percent, label);
        match catch_unwind(AssertUnwindSafe(|| self.sink.report(percent, label))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Progress sink failed at {}%: {:#}", percent, e),
            Err(_) => warn!("Progress sink panicked at {}%", percent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands_are_contiguous() {
        for plan in [ProgressPlan::direct(), ProgressPlan::chunked()] {
            assert_eq!(plan.bands.first().unwrap().1, 0);
            assert_eq!(plan.bands.last().unwrap().2, 100);
            for pair in plan.bands.windows(2) {
                assert_eq!(pair[0].2, pair[1].1);
            }
        }
        assert_eq!(ProgressPlan::direct().band(Stage::Reassembling), None);
    }

    #[test]
    fn test_percent_mapping() {
        let plan = ProgressPlan::direct();
        assert_eq!(plan.percent(Stage::Detecting, 0.0), 5);
        assert_eq!(plan.percent(Stage::Detecting, 0.5), 22);
        assert_eq!(plan.percent(Stage::Splitting, 1.0), 90);
        assert_eq!(plan.percent(Stage::Splitting, 7.0), 90);
        assert_eq!(plan.percent(Stage::Splitting, f64::NAN), 40);
    }

    #[test]
    fn test_reporter_is_monotonic_and_deduplicated() {
        let seen = Mutex::new(Vec::new());
        let sink = |p: u8, _: &str| -> anyhow::Result<()> {
            seen.lock().unwrap().push(p);
            Ok(())
        };
        let reporter = ProgressReporter::new(&sink, ProgressPlan::direct());

        reporter.stage_started(Stage::Validating);
        reporter.update(Stage::Detecting, 0.5);
        reporter.update(Stage::Detecting, 0.5);
        reporter.update(Stage::Detecting, 0.1);
        reporter.update(Stage::Normalizing, 1.0);
        reporter.complete("done");
        reporter.complete("done");
        reporter.update(Stage::Splitting, 0.5);

        assert_eq!(seen.into_inner().unwrap(), vec![0, 22, 99, 100]);
    }

    #[test]
    fn test_failing_and_panicking_sinks_do_not_propagate() {
        let calls = Mutex::new(0u32);
        let sink = |p: u8, _: &str| -> anyhow::Result<()> {
            *calls.lock().unwrap() += 1;
            match p {
                0 => anyhow::bail!("chat message deleted"),
                5 => panic!("sink bug"),
                _ => Ok(()),
            }
        };
        let reporter = ProgressReporter::new(&sink, ProgressPlan::direct());

        reporter.stage_started(Stage::Validating);
        reporter.stage_started(Stage::Detecting);
        reporter.update(Stage::Splitting, 0.0);
        reporter.complete("done");

        assert_eq!(reporter.last_percent(), Some(100));
        assert_eq!(*calls.lock().unwrap_or_else(|e| e.into_inner()), 4);
    }

    #[test]
    fn test_indeterminate_progress_repeats_band_start_with_detail() {
        let seen = Mutex::new(Vec::new());
        let sink = |p: u8, label: &str| -> anyhow::Result<()> {
            seen.lock().unwrap().push((p, label.to_string()));
            Ok(())
        };
        let reporter = ProgressReporter::new(&sink, ProgressPlan::chunked());

        reporter.stage_started(Stage::Reassembling);
        reporter.indeterminate(Stage::Reassembling, "downloading, 0.0 MB received");
        reporter.indeterminate(Stage::Reassembling, "downloading, 0.0 MB received");
        reporter.indeterminate(Stage::Reassembling, "downloading, 2.0 MB received");
        reporter.stage_started(Stage::Validating);
        reporter.complete("done");
        reporter.indeterminate(Stage::Reassembling, "late");

        let seen = seen.into_inner().unwrap();
        let percents: Vec<u8> = seen.iter().map(|(p, _)| *p).collect();
        assert_eq!(percents, vec![0, 0, 0, 40, 100]);
        assert!(seen[1].1.ends_with("downloading, 0.0 MB received"));
        assert!(seen[2].1.ends_with("downloading, 2.0 MB received"));
    }

    #[test]
    fn test_indeterminate_progress_never_moves_backwards() {
        let seen = Mutex::new(Vec::new());
        let sink = |p: u8, _: &str| -> anyhow::Result<()> {
            seen.lock().unwrap().push(p);
            Ok(())
        };
        let reporter = ProgressReporter::new(&sink, ProgressPlan::chunked());

        reporter.update(Stage::Reassembling, 0.5);
        reporter.indeterminate(Stage::Reassembling, "retrying");

        assert_eq!(seen.into_inner().unwrap(), vec![20, 20]);
    }
}
