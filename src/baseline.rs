//! Rolling-window personal baselines
//!
//! A baseline is the arithmetic mean of a metric over the most recent W
//! days strictly before the target date. The target day's own value never
//! contributes to its baseline, and windows with too few valid days yield
//! a distinct insufficient-data result instead of a number.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashSet;

use crate::models::DailyPhysioRecord;

/// Metrics a baseline can be computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    Hrv,
    RestingHr,
    RespiratoryRate,
    SleepDuration,
    ActiveMinutes,
    BodyTempDelta,
}

impl Metric {
    /// Extract this metric's value from a daily record
    pub fn value(&self, record: &DailyPhysioRecord) -> Option<f64> {
        match self {
            Metric::Hrv => record.hrv_rmssd,
            Metric::RestingHr => record.resting_hr,
            Metric::RespiratoryRate => record.respiratory_rate,
            Metric::SleepDuration => record.sleep_duration_minutes,
            Metric::ActiveMinutes => record.active_minutes,
            Metric::BodyTempDelta => record.body_temp_delta,
        }
    }
}

/// A computed baseline with dispersion and support
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Arithmetic mean over the valid days in the window
    pub mean: f64,

    /// Sample standard deviation; None when fewer than 2 valid days
    pub std_dev: Option<f64>,

    /// Number of valid (non-missing) days that contributed
    pub valid_days: usize,
}

/// Baseline computation outcome
///
/// Insufficient is a distinct case, never coerced to zero: callers must
/// branch on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BaselineResult {
    Value(Baseline),
    Insufficient { valid_days: usize },
}

impl BaselineResult {
    /// Mean when a baseline exists
    pub fn mean(&self) -> Option<f64> {
        match self {
            BaselineResult::Value(b) => Some(b.mean),
            BaselineResult::Insufficient { .. } => None,
        }
    }

    pub fn is_sufficient(&self) -> bool {
        matches!(self, BaselineResult::Value(_))
    }
}

/// Per-metric window sizes and the minimum support threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// HRV window in days
    pub hrv_window: u16,

    /// Resting HR window in days
    pub rhr_window: u16,

    /// Respiratory rate window in days
    pub respiratory_window: u16,

    /// Sleep duration window in days
    pub sleep_window: u16,

    /// Activity level window in days
    pub activity_window: u16,

    /// Bed/wake-time consistency window in days
    pub consistency_window: u16,

    /// Sleep-score window used by the wellness detector, in days
    pub sleep_score_window: u16,

    /// Minimum valid days before a baseline is trusted
    pub min_samples: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        BaselineConfig {
            hrv_window: 7,
            rhr_window: 7,
            respiratory_window: 7,
            sleep_window: 28,
            activity_window: 7,
            consistency_window: 14,
            sleep_score_window: 14,
            min_samples: 3,
        }
    }
}

/// Pure baseline calculator over a physio history slice
pub struct BaselineTracker {
    min_samples: usize,
}

impl BaselineTracker {
    pub fn new(min_samples: usize) -> Self {
        BaselineTracker { min_samples }
    }

    /// Baseline for a metric ending the day before `target_date`
    ///
    /// The window is the `window_days` calendar days strictly before the
    /// target; days without a value for the metric are skipped, not
    /// counted as zero.
    pub fn baseline(
        &self,
        history: &[DailyPhysioRecord],
        metric: Metric,
        target_date: NaiveDate,
        window_days: u16,
    ) -> BaselineResult {
        self.baseline_excluding(history, metric, target_date, window_days, &HashSet::new())
    }

    /// Baseline skipping dates already flagged as anomaly outliers
    pub fn baseline_excluding(
        &self,
        history: &[DailyPhysioRecord],
        metric: Metric,
        target_date: NaiveDate,
        window_days: u16,
        outlier_dates: &HashSet<NaiveDate>,
    ) -> BaselineResult {
        let window_start = target_date
            .checked_sub_days(Days::new(window_days as u64))
            .unwrap_or(target_date);

        let values: Vec<f64> = history
            .iter()
            .filter(|r| r.date >= window_start && r.date < target_date)
            .filter(|r| !outlier_dates.contains(&r.date))
            .filter_map(|r| metric.value(r))
            .collect();

        self.from_values(&values)
    }

    /// Baseline over an already-extracted value series (e.g. past sleep
    /// scores, bed/wake instants mapped to minutes)
    pub fn from_values(&self, values: &[f64]) -> BaselineResult {
        if values.len() < self.min_samples {
            return BaselineResult::Insufficient {
                valid_days: values.len(),
            };
        }

        let mean = values.iter().mean();
        let std_dev = if values.len() >= 2 {
            Some(values.iter().std_dev())
        } else {
            None
        };

        BaselineResult::Value(Baseline {
            mean,
            std_dev,
            valid_days: values.len(),
        })
    }
}

/// The bundle of baselines one scoring pass needs
///
/// Recomputed on every pass; cheap enough that caching across passes is
/// not worth the staleness risk.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineSet {
    pub hrv: BaselineResult,
    pub resting_hr: BaselineResult,
    pub respiratory_rate: BaselineResult,
    pub sleep_duration: BaselineResult,
    pub active_minutes: BaselineResult,
}

impl BaselineSet {
    /// Compute all baselines for `date` from the physio history
    pub fn compute(
        history: &[DailyPhysioRecord],
        date: NaiveDate,
        config: &BaselineConfig,
    ) -> Self {
        Self::compute_excluding(history, date, config, &HashSet::new())
    }

    /// Same, with known illness-outlier dates removed from every window
    pub fn compute_excluding(
        history: &[DailyPhysioRecord],
        date: NaiveDate,
        config: &BaselineConfig,
        outlier_dates: &HashSet<NaiveDate>,
    ) -> Self {
        let tracker = BaselineTracker::new(config.min_samples);
        BaselineSet {
            hrv: tracker.baseline_excluding(history, Metric::Hrv, date, config.hrv_window, outlier_dates),
            resting_hr: tracker.baseline_excluding(
                history,
                Metric::RestingHr,
                date,
                config.rhr_window,
                outlier_dates,
            ),
            respiratory_rate: tracker.baseline_excluding(
                history,
                Metric::RespiratoryRate,
                date,
                config.respiratory_window,
                outlier_dates,
            ),
            sleep_duration: tracker.baseline_excluding(
                history,
                Metric::SleepDuration,
                date,
                config.sleep_window,
                outlier_dates,
            ),
            active_minutes: tracker.baseline_excluding(
                history,
                Metric::ActiveMinutes,
                date,
                config.activity_window,
                outlier_dates,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn record(d: u32, hrv: Option<f64>) -> DailyPhysioRecord {
        DailyPhysioRecord {
            hrv_rmssd: hrv,
            ..DailyPhysioRecord::empty(date(d))
        }
    }

    #[test]
    fn test_baseline_mean() {
        let history: Vec<_> = (1..=7).map(|d| record(d, Some(40.0 + d as f64))).collect();
        let tracker = BaselineTracker::new(3);

        let result = tracker.baseline(&history, Metric::Hrv, date(8), 7);
        match result {
            BaselineResult::Value(b) => {
                assert!((b.mean - 44.0).abs() < 1e-9); // mean of 41..=47
                assert_eq!(b.valid_days, 7);
                assert!(b.std_dev.is_some());
            }
            _ => panic!("Expected a baseline"),
        }
    }

    #[test]
    fn test_baseline_excludes_target_day() {
        // Target day carries an extreme value that must not leak into
        // its own baseline.
        let mut history: Vec<_> = (1..=7).map(|d| record(d, Some(40.0))).collect();
        history.push(record(8, Some(400.0)));
        let tracker = BaselineTracker::new(3);

        let result = tracker.baseline(&history, Metric::Hrv, date(8), 7);
        assert_eq!(result.mean(), Some(40.0));
    }

    #[test]
    fn test_baseline_insufficient_under_min_samples() {
        let history = vec![record(6, Some(40.0)), record(7, Some(42.0))];
        let tracker = BaselineTracker::new(3);

        let result = tracker.baseline(&history, Metric::Hrv, date(8), 7);
        assert_eq!(result, BaselineResult::Insufficient { valid_days: 2 });
        assert_eq!(result.mean(), None);
    }

    #[test]
    fn test_baseline_skips_missing_days() {
        // Missing values are skipped, never counted as zero.
        let history = vec![
            record(4, Some(50.0)),
            record(5, None),
            record(6, Some(52.0)),
            record(7, Some(48.0)),
        ];
        let tracker = BaselineTracker::new(3);

        let result = tracker.baseline(&history, Metric::Hrv, date(8), 7);
        match result {
            BaselineResult::Value(b) => {
                assert!((b.mean - 50.0).abs() < 1e-9);
                assert_eq!(b.valid_days, 3);
            }
            _ => panic!("Expected a baseline"),
        }
    }

    #[test]
    fn test_baseline_excluding_outliers() {
        let history: Vec<_> = (1..=7).map(|d| record(d, Some(40.0))).collect();
        let mut with_spike = history.clone();
        with_spike[3].hrv_rmssd = Some(120.0);

        let mut outliers = HashSet::new();
        outliers.insert(date(4));

        let tracker = BaselineTracker::new(3);
        let result =
            tracker.baseline_excluding(&with_spike, Metric::Hrv, date(8), 7, &outliers);
        assert_eq!(result.mean(), Some(40.0));
    }

    #[test]
    fn test_baseline_window_bounds() {
        // Values older than the window must not contribute.
        let mut history = vec![record(1, Some(100.0))];
        history.extend((5..=7).map(|d| record(d, Some(40.0))));
        let tracker = BaselineTracker::new(3);

        let result = tracker.baseline(&history, Metric::Hrv, date(8), 3);
        assert_eq!(result.mean(), Some(40.0));
    }

    #[test]
    fn test_baseline_set_compute() {
        let history: Vec<_> = (1..=10)
            .map(|d| DailyPhysioRecord {
                hrv_rmssd: Some(45.0),
                resting_hr: Some(55.0),
                respiratory_rate: Some(15.0),
                sleep_duration_minutes: Some(440.0),
                active_minutes: Some(60.0),
                ..DailyPhysioRecord::empty(date(d))
            })
            .collect();

        let set = BaselineSet::compute(&history, date(11), &BaselineConfig::default());
        assert_eq!(set.hrv.mean(), Some(45.0));
        assert_eq!(set.resting_hr.mean(), Some(55.0));
        assert_eq!(set.respiratory_rate.mean(), Some(15.0));
        assert_eq!(set.sleep_duration.mean(), Some(440.0));
        assert_eq!(set.active_minutes.mean(), Some(60.0));
    }
}
