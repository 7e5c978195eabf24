//! Sleep scoring
//!
//! A night is scored 0-100 from five weighted components: performance
//! (duration vs personal need), quality (restorative-stage share),
//! efficiency (asleep vs in bed), disturbances (wake events), and
//! consistency (bed/wake regularity vs recent nights). Components whose
//! inputs the source did not supply are dropped and the remaining weights
//! renormalized, so a stage-less session still scores on span data alone.
//!
//! All arithmetic uses the session's absolute timestamps. There is no
//! hour-of-day math anywhere, so sessions crossing midnight need no
//! special casing.

use chrono::{Days, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::baseline::BaselineTracker;
use crate::error::{Result, VeloError};
use crate::models::{SleepSession, SleepStage};

/// Component weights and scoring anchors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepConfig {
    /// Weight of duration vs personal sleep need
    pub performance_weight: f64,

    /// Weight of deep+REM share
    pub quality_weight: f64,

    /// Weight of sleep efficiency
    pub efficiency_weight: f64,

    /// Weight of wake-event count
    pub disturbances_weight: f64,

    /// Weight of bed/wake-time regularity
    pub consistency_weight: f64,

    /// Restorative (deep+REM) share of sleep need considered ideal
    pub restorative_target_ratio: f64,

    /// Efficiency treated as 100; typical adult reference
    pub efficiency_anchor: f64,

    /// Points deducted per wake event
    pub wake_event_penalty: f64,

    /// Minimum prior nights before consistency is scored
    pub consistency_min_nights: usize,
}

impl Default for SleepConfig {
    fn default() -> Self {
        SleepConfig {
            performance_weight: 0.30,
            quality_weight: 0.32,
            efficiency_weight: 0.22,
            disturbances_weight: 0.14,
            consistency_weight: 0.02,
            restorative_target_ratio: 0.40,
            efficiency_anchor: 0.85,
            wake_event_penalty: 12.0,
            consistency_min_nights: 3,
        }
    }
}

/// Per-component sub-scores, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepComponents {
    pub performance: f64,
    pub quality: Option<f64>,
    pub efficiency: f64,
    pub disturbances: Option<f64>,
    pub consistency: Option<f64>,
}

/// A scored night
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepScore {
    /// Composite 0-100
    pub score: u8,
    pub components: SleepComponents,
    /// Minutes asleep, echoed for the summary surface
    pub asleep_minutes: f64,
}

/// Sleep scorer
pub struct SleepScorer {
    config: SleepConfig,
}

impl SleepScorer {
    pub fn new() -> Self {
        SleepScorer {
            config: SleepConfig::default(),
        }
    }

    pub fn with_config(config: SleepConfig) -> Self {
        SleepScorer { config }
    }

    /// Score one night
    ///
    /// `recent` is the trailing window of prior sessions used only for the
    /// consistency component; it may be empty. A session with zero time in
    /// bed is rejected as insufficient data, never scored as zero.
    pub fn score(
        &self,
        session: &SleepSession,
        sleep_need_minutes: f64,
        recent: &[SleepSession],
        tz: FixedOffset,
    ) -> Result<SleepScore> {
        let in_bed = session.time_in_bed_minutes();
        if in_bed <= 0.0 {
            return Err(VeloError::InsufficientData {
                what: "sleep score".to_string(),
                reason: "session has no time in bed".to_string(),
            });
        }
        if sleep_need_minutes <= 0.0 {
            return Err(VeloError::Validation(
                "sleep need must be positive".to_string(),
            ));
        }

        let asleep = session.asleep_minutes();
        let has_stages = !session.stages.is_empty();

        let performance = (asleep / sleep_need_minutes * 100.0).min(100.0);

        let quality = has_stages.then(|| {
            let restorative = session.stage_minutes(SleepStage::Deep)
                + session.stage_minutes(SleepStage::Rem);
            let target = self.config.restorative_target_ratio * sleep_need_minutes;
            (restorative / target * 100.0).min(100.0)
        });

        let efficiency = (asleep / in_bed / self.config.efficiency_anchor * 100.0).min(100.0);

        let disturbances = has_stages.then(|| {
            (100.0 - session.wake_events() as f64 * self.config.wake_event_penalty).max(0.0)
        });

        let consistency = self.consistency_score(session, recent, tz);

        let components = SleepComponents {
            performance,
            quality,
            efficiency,
            disturbances,
            consistency,
        };

        let score = self.combine(&components);
        debug!(score, asleep, ?components, "Sleep score computed");

        Ok(SleepScore {
            score,
            components,
            asleep_minutes: asleep,
        })
    }

    /// Weighted composite over the available components
    fn combine(&self, c: &SleepComponents) -> u8 {
        let parts: [(Option<f64>, f64); 5] = [
            (Some(c.performance), self.config.performance_weight),
            (c.quality, self.config.quality_weight),
            (Some(c.efficiency), self.config.efficiency_weight),
            (c.disturbances, self.config.disturbances_weight),
            (c.consistency, self.config.consistency_weight),
        ];

        let mut total = 0.0;
        let mut weight_sum = 0.0;
        for (value, weight) in parts {
            if let Some(v) = value {
                total += v * weight;
                weight_sum += weight;
            }
        }

        if weight_sum <= 0.0 {
            return 0;
        }
        (total / weight_sum).round().clamp(0.0, 100.0) as u8
    }

    /// Regularity of bedtime and wake time vs recent nights
    ///
    /// Instants are mapped to minutes past a fixed evening anchor (18:00
    /// local on the night before the sleep date) so the comparison is a
    /// plain difference of numbers with no wraparound at midnight.
    fn consistency_score(
        &self,
        session: &SleepSession,
        recent: &[SleepSession],
        tz: FixedOffset,
    ) -> Option<f64> {
        let tracker = BaselineTracker::new(self.config.consistency_min_nights);

        let bed_offsets: Vec<f64> = recent
            .iter()
            .map(|s| bedtime_offset_minutes(s, tz))
            .collect();
        let wake_offsets: Vec<f64> = recent
            .iter()
            .map(|s| wake_offset_minutes(s, tz))
            .collect();

        let bed_base = tracker.from_values(&bed_offsets).mean()?;
        let wake_base = tracker.from_values(&wake_offsets).mean()?;

        let bed_dev = (bedtime_offset_minutes(session, tz) - bed_base).abs();
        let wake_dev = (wake_offset_minutes(session, tz) - wake_base).abs();
        let dev = (bed_dev + wake_dev) / 2.0;

        // Full marks within ~15 min of habit, zero beyond two hours off.
        Some(((120.0 - dev) / 105.0 * 100.0).clamp(0.0, 100.0).min(100.0))
    }
}

impl Default for SleepScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Minutes from 18:00 local on the evening before the sleep date to
/// the session's bedtime
fn bedtime_offset_minutes(session: &SleepSession, tz: FixedOffset) -> f64 {
    let anchor = evening_anchor(session, tz);
    (session.bedtime - anchor).num_seconds() as f64 / 60.0
}

/// Same anchor, measured to the wake instant
fn wake_offset_minutes(session: &SleepSession, tz: FixedOffset) -> f64 {
    let anchor = evening_anchor(session, tz);
    (session.wake_time - anchor).num_seconds() as f64 / 60.0
}

fn evening_anchor(
    session: &SleepSession,
    tz: FixedOffset,
) -> chrono::DateTime<chrono::Utc> {
    let evening = session
        .sleep_date(tz)
        .checked_sub_days(Days::new(1))
        .unwrap_or_else(|| session.sleep_date(tz));
    evening
        .and_hms_opt(18, 0, 0)
        .expect("18:00 is a valid time")
        .and_local_timezone(tz)
        .single()
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or(session.bedtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SleepStageSegment;
    use chrono::{DateTime, TimeZone, Utc};

    fn utc(d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, h, mi, 0).unwrap()
    }

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn staged_session(d: u32) -> SleepSession {
        // 23:00 -> 07:00, 90m deep, 90m REM, one 15m wake.
        SleepSession {
            bedtime: utc(d - 1, 23, 0),
            wake_time: utc(d, 7, 0),
            stages: vec![
                SleepStageSegment {
                    stage: SleepStage::Core,
                    start: utc(d - 1, 23, 0),
                    end: utc(d, 1, 0),
                },
                SleepStageSegment {
                    stage: SleepStage::Deep,
                    start: utc(d, 1, 0),
                    end: utc(d, 2, 30),
                },
                SleepStageSegment {
                    stage: SleepStage::Awake,
                    start: utc(d, 2, 30),
                    end: utc(d, 2, 45),
                },
                SleepStageSegment {
                    stage: SleepStage::Rem,
                    start: utc(d, 2, 45),
                    end: utc(d, 4, 15),
                },
                SleepStageSegment {
                    stage: SleepStage::Core,
                    start: utc(d, 4, 15),
                    end: utc(d, 7, 0),
                },
            ],
        }
    }

    #[test]
    fn test_good_night_scores_high() {
        let score = SleepScorer::new()
            .score(&staged_session(10), 480.0, &[], tz())
            .unwrap();
        assert!(score.score >= 90, "score was {}", score.score);
        assert_eq!(score.asleep_minutes, 465.0);
        // Consistency has no history and must be absent, not zero.
        assert!(score.components.consistency.is_none());
    }

    #[test]
    fn test_short_night_scores_low() {
        // 4 hours against an 8-hour need.
        let session = SleepSession {
            bedtime: utc(10, 2, 0),
            wake_time: utc(10, 6, 0),
            stages: Vec::new(),
        };
        let score = SleepScorer::new()
            .score(&session, 480.0, &[], tz())
            .unwrap();
        assert!(score.score < 75, "score was {}", score.score);
        assert!((score.components.performance - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_stageless_session_drops_stage_components() {
        let session = SleepSession {
            bedtime: utc(9, 23, 0),
            wake_time: utc(10, 7, 0),
            stages: Vec::new(),
        };
        let score = SleepScorer::new()
            .score(&session, 480.0, &[], tz())
            .unwrap();

        assert!(score.components.quality.is_none());
        assert!(score.components.disturbances.is_none());
        // Span-only data still yields a full-range score.
        assert!(score.score >= 95, "score was {}", score.score);
    }

    #[test]
    fn test_midnight_bedtime_not_penalized() {
        // Bed at exactly 00:00 is just a late bedtime, not a wraparound.
        let session = SleepSession {
            bedtime: utc(10, 0, 0),
            wake_time: utc(10, 8, 0),
            stages: Vec::new(),
        };
        let score = SleepScorer::new()
            .score(&session, 480.0, &[], tz())
            .unwrap();
        assert_eq!(score.components.performance, 100.0);
    }

    #[test]
    fn test_consistency_rewards_regular_habits() {
        let recent: Vec<_> = (5..=9).map(staged_session).collect();
        let scorer = SleepScorer::new();

        let steady = scorer
            .score(&staged_session(10), 480.0, &recent, tz())
            .unwrap();
        assert_eq!(steady.components.consistency, Some(100.0));

        // Same night shifted 3 hours later.
        let shifted = SleepSession {
            bedtime: utc(10, 2, 0),
            wake_time: utc(10, 10, 0),
            stages: Vec::new(),
        };
        let late = scorer.score(&shifted, 480.0, &recent, tz()).unwrap();
        assert_eq!(late.components.consistency, Some(0.0));
    }

    #[test]
    fn test_empty_session_is_insufficient() {
        let session = SleepSession {
            bedtime: utc(10, 7, 0),
            wake_time: utc(10, 7, 0),
            stages: Vec::new(),
        };
        let err = SleepScorer::new()
            .score(&session, 480.0, &[], tz())
            .unwrap_err();
        assert!(matches!(err, VeloError::InsufficientData { .. }));
    }

    #[test]
    fn test_wake_events_reduce_score() {
        let calm = staged_session(10);
        let mut restless = staged_session(10);
        // Add three more brief wakes inside the final core block.
        for i in 0..3u32 {
            let start = utc(10, 5, i * 20);
            restless.stages.push(SleepStageSegment {
                stage: SleepStage::Awake,
                start,
                end: start + chrono::Duration::minutes(2),
            });
            restless.stages.push(SleepStageSegment {
                stage: SleepStage::Core,
                start: start + chrono::Duration::minutes(2),
                end: start + chrono::Duration::minutes(10),
            });
        }

        let scorer = SleepScorer::new();
        let calm_score = scorer.score(&calm, 480.0, &[], tz()).unwrap();
        let restless_score = scorer.score(&restless, 480.0, &[], tz()).unwrap();
        assert!(restless_score.score < calm_score.score);
        assert_eq!(restless_score.components.disturbances, Some(52.0));
    }
}
