//! Recovery scoring
//!
//! The recovery score is a weighted composite of HRV (vs baseline), last
//! night's sleep score, resting-HR elevation, respiratory-rate deviation,
//! and training stress balance. HRV and sleep are required; the other
//! components are optional and the weights renormalize over whatever is
//! present. A high-severity illness flag caps the numeric score instead
//! of replacing it.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{IllnessSeverity, ScoreBreakdown};
use crate::wellness::WellnessAssessment;

/// Component weights and the illness cap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub hrv_weight: f64,
    pub sleep_weight: f64,
    pub rhr_weight: f64,
    pub respiratory_weight: f64,
    pub tsb_weight: f64,

    /// Ceiling applied when illness severity is High
    pub illness_cap: u8,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            hrv_weight: 0.30,
            sleep_weight: 0.30,
            rhr_weight: 0.20,
            respiratory_weight: 0.10,
            tsb_weight: 0.10,
            illness_cap: 40,
        }
    }
}

/// Today's values for the composite
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryInputs {
    /// (today, baseline) HRV RMSSD; required
    pub hrv: Option<(f64, f64)>,

    /// Last night's sleep score 0-100; required
    pub sleep_score: Option<f64>,

    /// (today, baseline) resting HR
    pub resting_hr: Option<(f64, f64)>,

    /// (today, baseline) respiratory rate
    pub respiratory_rate: Option<(f64, f64)>,

    /// Previous day's training stress balance; readiness reflects the
    /// form the athlete woke up with, not today's riding
    pub tsb: Option<f64>,
}

/// Qualitative recovery bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryBand {
    /// 80-100: primed for hard training
    Optimal,
    /// 60-79: normal training supported
    Good,
    /// 40-59: reduce intensity
    Fair,
    /// 0-39: rest or very light movement
    Poor,
}

impl RecoveryBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => RecoveryBand::Optimal,
            60..=79 => RecoveryBand::Good,
            40..=59 => RecoveryBand::Fair,
            _ => RecoveryBand::Poor,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RecoveryBand::Optimal => "Primed; high-intensity training supported",
            RecoveryBand::Good => "Recovered; normal training supported",
            RecoveryBand::Fair => "Partially recovered; keep intensity moderate",
            RecoveryBand::Poor => "Under-recovered; prioritize rest",
        }
    }
}

/// A scored day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryScore {
    pub score: u8,
    pub band: RecoveryBand,
    pub breakdown: ScoreBreakdown,
}

/// Outcome of a recovery scoring attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    /// A required input (HRV or sleep) was absent; no number substituted
    InsufficientData { reason: String },

    /// Illness severity High: the composite was computed but capped
    IllnessCapped {
        capped_score: u8,
        uncapped_score: u8,
        breakdown: ScoreBreakdown,
    },

    /// Normal scored day
    Scored(RecoveryScore),
}

/// Recovery composite scorer
pub struct RecoveryScorer {
    config: RecoveryConfig,
}

impl RecoveryScorer {
    pub fn new() -> Self {
        RecoveryScorer {
            config: RecoveryConfig::default(),
        }
    }

    pub fn with_config(config: RecoveryConfig) -> Self {
        RecoveryScorer { config }
    }

    /// Score one day given its inputs and the day's wellness assessment
    pub fn score(
        &self,
        inputs: &RecoveryInputs,
        wellness: &WellnessAssessment,
    ) -> RecoveryOutcome {
        let hrv = match inputs.hrv {
            Some((today, baseline)) if baseline > 0.0 => hrv_subscore(today, baseline),
            _ => {
                return RecoveryOutcome::InsufficientData {
                    reason: "no HRV reading or baseline for the day".to_string(),
                }
            }
        };

        let sleep = match inputs.sleep_score {
            Some(s) => s.clamp(0.0, 100.0),
            None => {
                return RecoveryOutcome::InsufficientData {
                    reason: "no sleep score for the day".to_string(),
                }
            }
        };

        let rhr = inputs
            .resting_hr
            .filter(|(_, baseline)| *baseline > 0.0)
            .map(|(today, baseline)| rhr_subscore(today, baseline));

        let respiratory = inputs
            .respiratory_rate
            .filter(|(_, baseline)| *baseline > 0.0)
            .map(|(today, baseline)| respiratory_subscore(today, baseline));

        let tsb = inputs.tsb.map(tsb_subscore);

        let parts: [(Option<f64>, f64); 5] = [
            (Some(hrv), self.config.hrv_weight),
            (Some(sleep), self.config.sleep_weight),
            (rhr, self.config.rhr_weight),
            (respiratory, self.config.respiratory_weight),
            (tsb, self.config.tsb_weight),
        ];

        let mut total = 0.0;
        let mut weight_sum = 0.0;
        for (value, weight) in parts {
            if let Some(v) = value {
                total += v * weight;
                weight_sum += weight;
            }
        }

        let score = (total / weight_sum).round().clamp(0.0, 100.0) as u8;
        let breakdown = ScoreBreakdown {
            hrv: Some(hrv),
            sleep: Some(sleep),
            rhr,
            respiratory,
            training_load: tsb,
        };

        if wellness.severity >= IllnessSeverity::High {
            let capped = score.min(self.config.illness_cap);
            warn!(
                score,
                capped,
                confidence = wellness.confidence,
                "Recovery capped by high-severity illness flag"
            );
            return RecoveryOutcome::IllnessCapped {
                capped_score: capped,
                uncapped_score: score,
                breakdown,
            };
        }

        debug!(score, ?breakdown, "Recovery score computed");
        RecoveryOutcome::Scored(RecoveryScore {
            score,
            band: RecoveryBand::from_score(score),
            breakdown,
        })
    }
}

impl Default for RecoveryScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Saturating HRV sub-score
///
/// At baseline the score is 75; gains above baseline approach 100
/// asymptotically, so a large rebound never dominates the composite,
/// and suppression falls away steeply.
fn hrv_subscore(today: f64, baseline: f64) -> f64 {
    let ratio = (today / baseline).max(0.0);
    let ln4 = 4.0f64.ln();
    (100.0 * (1.0 - (-ln4 * ratio).exp())).clamp(0.0, 100.0)
}

/// Resting-HR sub-score: 90 at baseline, 3 points per percent elevated
fn rhr_subscore(today: f64, baseline: f64) -> f64 {
    let elevation_pct = (today - baseline) / baseline * 100.0;
    (90.0 - 3.0 * elevation_pct).clamp(0.0, 100.0)
}

/// Respiratory sub-score: 100 at baseline, 8 points per percent deviated
/// in either direction
fn respiratory_subscore(today: f64, baseline: f64) -> f64 {
    let dev_pct = ((today - baseline) / baseline * 100.0).abs();
    (100.0 - 8.0 * dev_pct).clamp(0.0, 100.0)
}

/// Form sub-score: neutral TSB maps to 70, floored at 20 so deep
/// overload alone cannot zero the composite
fn tsb_subscore(tsb: f64) -> f64 {
    (70.0 + 1.2 * tsb).clamp(20.0, 100.0)
}
