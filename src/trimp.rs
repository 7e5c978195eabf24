//! TRIMP / TSS calculation
//!
//! Every activity is converted to a single non-negative training-stress
//! value through a strict priority cascade: source-provided TSS, then
//! power-based TSS, then Banister TRIMP from heart-rate reserve, then a
//! duration-only estimate. The duration-only path is flagged
//! low-confidence so diagnostics can tell it apart from measured load.

use chrono::{FixedOffset, NaiveDate};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::models::{ActivityRecord, AthleteProfile};

/// Which path produced a training-load value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadMethod {
    /// TSS computed by the source platform, used as-is
    SourceProvided,
    /// duration_hours x IF^2 x 100 from normalized power and FTP
    PowerBased,
    /// Banister TRIMP from heart-rate reserve
    HeartRateBased,
    /// Conservative duration-only estimate, low confidence
    DurationOnly,
}

/// Training load for one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLoad {
    pub tss: Decimal,
    pub method: LoadMethod,
    /// True only for the duration-only fallback
    pub low_confidence: bool,
}

/// Daily aggregate of per-activity loads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayLoadInputs {
    pub date: NaiveDate,
    pub tss: Decimal,
    /// Activities contributing to the total
    pub input_count: u16,
    /// How many used the duration-only fallback
    pub estimated_inputs: u16,
}

/// Tunables for the TRIMP calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimpConfig {
    /// Assumed HR-reserve-equivalent intensity for the duration-only
    /// fallback. An uncalibrated heuristic, deliberately configurable.
    pub assumed_intensity: f64,
}

impl Default for TrimpConfig {
    fn default() -> Self {
        TrimpConfig {
            assumed_intensity: 0.6,
        }
    }
}

/// Training-load calculator with the fixed priority cascade
pub struct TrimpCalculator {
    config: TrimpConfig,
}

impl TrimpCalculator {
    pub fn new() -> Self {
        TrimpCalculator {
            config: TrimpConfig::default(),
        }
    }

    pub fn with_config(config: TrimpConfig) -> Self {
        TrimpCalculator { config }
    }

    /// Training load for one activity
    ///
    /// Priority order: source TSS, power TSS, HR TRIMP, duration-only.
    /// The first applicable path wins; later paths are ignored even when
    /// their inputs are present.
    pub fn calculate(&self, activity: &ActivityRecord, profile: &AthleteProfile) -> TrainingLoad {
        // 1. Source-provided TSS
        if let Some(tss) = activity.source_tss {
            if tss > Decimal::ZERO {
                debug!(activity = %activity.id, %tss, "Using source-provided TSS");
                return TrainingLoad {
                    tss,
                    method: LoadMethod::SourceProvided,
                    low_confidence: false,
                };
            }
        }

        // 2. Power-based TSS
        if let (Some(np), Some(ftp)) = (activity.normalized_power, profile.ftp) {
            if np > 0 && ftp > 0 {
                let intensity_factor = Decimal::from(np) / Decimal::from(ftp);
                let duration_hours =
                    Decimal::from(activity.duration_seconds) / Decimal::from(3600);
                let tss =
                    duration_hours * intensity_factor * intensity_factor * Decimal::from(100);
                debug!(activity = %activity.id, %tss, "Power-based TSS");
                return TrainingLoad {
                    tss,
                    method: LoadMethod::PowerBased,
                    low_confidence: false,
                };
            }
        }

        // 3. Banister TRIMP from heart-rate reserve
        if let (Some(avg_hr), Some(max_hr), Some(rest_hr)) =
            (activity.avg_heart_rate, profile.max_hr, profile.resting_hr)
        {
            if max_hr > rest_hr {
                let hrr = ((avg_hr as f64 - rest_hr as f64) / (max_hr as f64 - rest_hr as f64))
                    .clamp(0.0, 1.0);
                let trimp =
                    activity.duration_minutes() * hrr * 0.64 * (1.92 * hrr).exp();
                let tss = Decimal::from_f64(trimp).unwrap_or(Decimal::ZERO);
                debug!(activity = %activity.id, %tss, hrr, "Heart-rate TRIMP");
                return TrainingLoad {
                    tss,
                    method: LoadMethod::HeartRateBased,
                    low_confidence: false,
                };
            }
        }

        // 4. Duration-only fallback. Common for indoor/virtual sessions
        // whose summaries omit average HR; may materially misstate the
        // session's true load, so it is flagged and logged.
        let estimate = activity.duration_minutes() * self.config.assumed_intensity;
        let tss = Decimal::from_f64(estimate).unwrap_or(Decimal::ZERO);
        warn!(
            activity = %activity.id,
            duration_minutes = activity.duration_minutes(),
            assumed_intensity = self.config.assumed_intensity,
            %tss,
            "No HR or power data; duration-only TRIMP estimate"
        );
        TrainingLoad {
            tss,
            method: LoadMethod::DurationOnly,
            low_confidence: true,
        }
    }

    /// Bucket activities by local calendar day and sum their loads
    ///
    /// A day with no activities simply has no entry; callers treat that
    /// as TSS = 0 (a valid rest day, not an error).
    pub fn daily_totals(
        &self,
        activities: &[ActivityRecord],
        profile: &AthleteProfile,
        tz: FixedOffset,
    ) -> BTreeMap<NaiveDate, DayLoadInputs> {
        let mut days: BTreeMap<NaiveDate, DayLoadInputs> = BTreeMap::new();

        for activity in activities {
            let load = self.calculate(activity, profile);
            let date = activity.local_date(tz);

            days.entry(date)
                .and_modify(|day| {
                    day.tss += load.tss;
                    day.input_count += 1;
                    if load.low_confidence {
                        day.estimated_inputs += 1;
                    }
                })
                .or_insert(DayLoadInputs {
                    date,
                    tss: load.tss,
                    input_count: 1,
                    estimated_inputs: if load.low_confidence { 1 } else { 0 },
                });
        }

        days
    }
}

impl Default for TrimpCalculator {
    fn default() -> Self {
        Self::new()
    }
}
