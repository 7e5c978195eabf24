//! Adaptive threshold estimation: FTP, VO2max, HR zones
//!
//! FTP is estimated from mean-max power over a trailing window of rides
//! with power streams, preferring the longest effort duration available
//! (60-minute power nearly is FTP; shorter efforts use steeper
//! conversions). Estimates carry a confidence from the number of
//! qualifying rides and are never silently written back to the profile:
//! applying is an explicit call with a confidence floor.

use chrono::{Days, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{ActivityRecord, AthleteProfile, HrZones};

/// Estimation window and confidence tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Trailing window for FTP estimation in days
    pub lookback_days: u16,

    /// Hard ceiling on the window
    pub max_lookback_days: u16,

    /// Qualifying ride count at which confidence saturates at 1.0
    pub saturation_samples: usize,

    /// Minimum confidence before an estimate may update the profile
    pub min_apply_confidence: f64,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        ZoneConfig {
            lookback_days: 90,
            max_lookback_days: 120,
            saturation_samples: 20,
            min_apply_confidence: 0.5,
        }
    }
}

/// Which effort duration an FTP estimate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FtpMethod {
    /// Best 60-minute power x 0.99
    SixtyMinute,
    /// Best 20-minute power x 0.95
    TwentyMinute,
    /// Best 5-minute power x 0.87
    FiveMinute,
}

impl FtpMethod {
    fn window_seconds(&self) -> usize {
        match self {
            FtpMethod::SixtyMinute => 3600,
            FtpMethod::TwentyMinute => 1200,
            FtpMethod::FiveMinute => 300,
        }
    }

    fn conversion(&self) -> f64 {
        match self {
            FtpMethod::SixtyMinute => 0.99,
            FtpMethod::TwentyMinute => 0.95,
            FtpMethod::FiveMinute => 0.87,
        }
    }
}

/// An FTP estimate with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FtpEstimate {
    pub ftp_watts: u16,
    pub method: FtpMethod,

    /// Qualifying rides / saturation count, capped at 1.0
    pub confidence: f64,

    /// Rides with power streams inside the window
    pub sample_count: usize,

    /// Day the window ends (exclusive)
    pub as_of: NaiveDate,
}

/// Best rolling mean power over a window, from per-second samples
///
/// Prefix sums keep a full mean-max scan linear in the stream length.
pub fn best_effort(stream: &[u16], window_seconds: usize) -> Option<f64> {
    if window_seconds == 0 || stream.len() < window_seconds {
        return None;
    }

    let mut prefix = Vec::with_capacity(stream.len() + 1);
    prefix.push(0u64);
    let mut running = 0u64;
    for &sample in stream {
        running += sample as u64;
        prefix.push(running);
    }

    let mut best = 0u64;
    for start in 0..=(stream.len() - window_seconds) {
        let sum = prefix[start + window_seconds] - prefix[start];
        if sum > best {
            best = sum;
        }
    }

    Some(best as f64 / window_seconds as f64)
}

/// FTP and VO2max estimator over activity history
pub struct FtpEstimator {
    config: ZoneConfig,
}

impl FtpEstimator {
    pub fn new() -> Self {
        FtpEstimator {
            config: ZoneConfig::default(),
        }
    }

    pub fn with_config(config: ZoneConfig) -> Self {
        FtpEstimator { config }
    }

    /// Estimate FTP from rides strictly before `as_of`
    ///
    /// The longest effort duration with a qualifying ride wins; shorter
    /// durations are only consulted when no ride sustains the longer
    /// window. Returns None when no ride in the window carries power.
    pub fn estimate(
        &self,
        activities: &[ActivityRecord],
        as_of: NaiveDate,
        tz: chrono::FixedOffset,
    ) -> Option<FtpEstimate> {
        let window_start = as_of
            .checked_sub_days(Days::new(self.config.lookback_days as u64))
            .unwrap_or(as_of);

        let streams: Vec<&Vec<u16>> = activities
            .iter()
            .filter(|a| {
                let date = a.local_date(tz);
                date >= window_start && date < as_of
            })
            .filter_map(|a| a.power_stream.as_ref())
            .filter(|s| !s.is_empty())
            .collect();

        if streams.is_empty() {
            return None;
        }

        let sample_count = streams.len();
        let confidence =
            (sample_count as f64 / self.config.saturation_samples as f64).min(1.0);

        for method in [
            FtpMethod::SixtyMinute,
            FtpMethod::TwentyMinute,
            FtpMethod::FiveMinute,
        ] {
            let best = streams
                .iter()
                .filter_map(|s| best_effort(s, method.window_seconds()))
                .fold(None::<f64>, |acc, v| {
                    Some(acc.map_or(v, |a| a.max(v)))
                });

            if let Some(power) = best {
                let ftp = (power * method.conversion()).round() as u16;
                debug!(?method, ftp, sample_count, confidence, "FTP estimated");
                return Some(FtpEstimate {
                    ftp_watts: ftp,
                    method,
                    confidence,
                    sample_count,
                    as_of,
                });
            }
        }

        None
    }

    /// Weekly FTP snapshots across a span, each from its own trailing
    /// window
    ///
    /// Snapshots are independent of each other, so they are computed in
    /// parallel.
    pub fn snapshot_series(
        &self,
        activities: &[ActivityRecord],
        start: NaiveDate,
        end: NaiveDate,
        tz: chrono::FixedOffset,
    ) -> Vec<(NaiveDate, Option<FtpEstimate>)> {
        let mut dates = Vec::new();
        let mut date = start;
        while date <= end {
            dates.push(date);
            date = match date.checked_add_days(Days::new(7)) {
                Some(next) => next,
                None => break,
            };
        }

        dates
            .into_par_iter()
            .map(|d| (d, self.estimate(activities, d, tz)))
            .collect()
    }

    /// Apply an estimate to the profile when confident enough
    ///
    /// Returns false (profile untouched) below the confidence floor.
    pub fn apply_estimate(
        &self,
        profile: &mut AthleteProfile,
        estimate: &FtpEstimate,
    ) -> bool {
        if estimate.confidence < self.config.min_apply_confidence {
            debug!(
                confidence = estimate.confidence,
                floor = self.config.min_apply_confidence,
                "FTP estimate below confidence floor; profile unchanged"
            );
            return false;
        }

        info!(
            old_ftp = ?profile.ftp,
            new_ftp = estimate.ftp_watts,
            ?estimate.method,
            "Updating profile FTP"
        );
        profile.ftp = Some(estimate.ftp_watts);
        profile.updated_at = chrono::Utc::now();
        true
    }
}

impl Default for FtpEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// VO2max in ml/kg/min from FTP and body weight
///
/// The widely used power-based approximation: 10.8 x watts/kg + 7.
pub fn estimate_vo2max(ftp_watts: u16, weight_kg: f64) -> Option<f64> {
    if weight_kg <= 0.0 {
        return None;
    }
    Some(10.8 * ftp_watts as f64 / weight_kg + 7.0)
}

/// Five-zone HR boundaries from heart-rate reserve
///
/// Zone ceilings at 60/70/80/90/100% of HRR above resting.
pub fn hr_zones(max_hr: u16, resting_hr: u16) -> Option<HrZones> {
    if max_hr <= resting_hr {
        return None;
    }
    let reserve = (max_hr - resting_hr) as f64;
    let at = |pct: f64| (resting_hr as f64 + reserve * pct).round() as u16;

    Some(HrZones {
        zone1_max: at(0.60),
        zone2_max: at(0.70),
        zone3_max: at(0.80),
        zone4_max: at(0.90),
        zone5_max: max_hr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProviderKind, Sport};
    use chrono::{FixedOffset, TimeZone, Utc};

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn ride(day: u32, stream: Vec<u16>) -> ActivityRecord {
        ActivityRecord {
            id: format!("ride-{}", day),
            source: ProviderKind::Strava,
            start_time: Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap(),
            duration_seconds: stream.len() as u32,
            sport: Sport::Cycling,
            avg_heart_rate: None,
            normalized_power: None,
            avg_power: None,
            source_tss: None,
            power_stream: Some(stream),
            name: None,
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_best_effort_finds_peak_window() {
        // 10s stream, best 3s window is the 300s in the middle.
        let stream = vec![100, 100, 300, 300, 300, 100, 100, 100, 100, 100];
        assert_eq!(best_effort(&stream, 3), Some(300.0));
        assert_eq!(best_effort(&stream, 10), Some(160.0));
    }

    #[test]
    fn test_best_effort_stream_too_short() {
        assert_eq!(best_effort(&[250; 100], 300), None);
        assert_eq!(best_effort(&[], 1), None);
    }

    #[test]
    fn test_estimate_prefers_longest_duration() {
        // One 65-minute steady ride and one short hard ride; the 60-min
        // method wins despite the 5-min effort implying a higher FTP.
        let long_ride = ride(10, vec![250; 3900]);
        let short_ride = ride(12, vec![400; 400]);

        let estimate = FtpEstimator::new()
            .estimate(&[long_ride, short_ride], date(20), tz())
            .unwrap();
        assert_eq!(estimate.method, FtpMethod::SixtyMinute);
        assert_eq!(estimate.ftp_watts, 248); // 250 * 0.99
    }

    #[test]
    fn test_estimate_falls_back_to_shorter_efforts() {
        let short_ride = ride(10, vec![300; 400]);
        let estimate = FtpEstimator::new()
            .estimate(&[short_ride], date(20), tz())
            .unwrap();
        assert_eq!(estimate.method, FtpMethod::FiveMinute);
        assert_eq!(estimate.ftp_watts, 261); // 300 * 0.87
    }

    #[test]
    fn test_estimate_excludes_as_of_day_and_window_edge() {
        let inside = ride(10, vec![200; 1500]);
        let on_as_of = ride(20, vec![350; 1500]);

        let estimate = FtpEstimator::new()
            .estimate(&[inside, on_as_of], date(20), tz())
            .unwrap();
        // The as_of day's ride must not contribute.
        assert_eq!(estimate.ftp_watts, 190); // 200 * 0.95
        assert_eq!(estimate.sample_count, 1);
    }

    #[test]
    fn test_no_power_data_yields_none() {
        let mut a = ride(10, Vec::new());
        a.power_stream = None;
        assert!(FtpEstimator::new().estimate(&[a], date(20), tz()).is_none());
    }

    #[test]
    fn test_confidence_scales_with_samples() {
        let few: Vec<_> = (1..=4).map(|d| ride(d, vec![200; 400])).collect();
        let estimate = FtpEstimator::new().estimate(&few, date(20), tz()).unwrap();
        assert!((estimate.confidence - 0.2).abs() < 1e-9);
        assert_eq!(estimate.sample_count, 4);
    }

    #[test]
    fn test_apply_respects_confidence_floor() {
        let estimator = FtpEstimator::new();
        let mut profile = AthleteProfile::new("Test");
        profile.ftp = Some(240);

        let weak = FtpEstimate {
            ftp_watts: 260,
            method: FtpMethod::TwentyMinute,
            confidence: 0.2,
            sample_count: 4,
            as_of: date(20),
        };
        assert!(!estimator.apply_estimate(&mut profile, &weak));
        assert_eq!(profile.ftp, Some(240));

        let strong = FtpEstimate {
            confidence: 0.8,
            sample_count: 16,
            ..weak
        };
        assert!(estimator.apply_estimate(&mut profile, &strong));
        assert_eq!(profile.ftp, Some(260));
    }

    #[test]
    fn test_snapshot_series_weekly_and_window_sensitive() {
        // A big ride early on ages out of later snapshots' windows when
        // the lookback is short.
        let estimator = FtpEstimator::with_config(ZoneConfig {
            lookback_days: 7,
            ..ZoneConfig::default()
        });
        let activities = vec![ride(1, vec![300; 1500]), ride(15, vec![200; 1500])];

        let series = estimator.snapshot_series(&activities, date(8), date(22), tz());
        assert_eq!(series.len(), 3);

        let first = series[0].1.as_ref().unwrap();
        assert_eq!(first.ftp_watts, 285); // 300 * 0.95 from the early ride
        assert!(series[1].1.is_none()); // nothing inside day 8..15's window
        let last = series[2].1.as_ref().unwrap();
        assert_eq!(last.ftp_watts, 190);
    }

    #[test]
    fn test_vo2max() {
        let v = estimate_vo2max(280, 70.0).unwrap();
        assert!((v - 50.2).abs() < 0.01);
        assert!(estimate_vo2max(280, 0.0).is_none());
    }

    #[test]
    fn test_hr_zones_from_reserve() {
        let zones = hr_zones(190, 50).unwrap();
        assert_eq!(zones.zone1_max, 134);
        assert_eq!(zones.zone2_max, 148);
        assert_eq!(zones.zone3_max, 162);
        assert_eq!(zones.zone4_max, 176);
        assert_eq!(zones.zone5_max, 190);
        assert!(hr_zones(50, 50).is_none());
    }
}
