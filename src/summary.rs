//! Daily summary surface
//!
//! The compact per-day bundle handed to external consumers (coaching
//! brief generation, CLI display): scores, bands, deltas against
//! baseline, form, and a suggested load range for tomorrow.

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::{DailyLoadRecord, DailyScoreRecord, IllnessSeverity, ScoreStatus};
use crate::pmc::TsbBand;
use crate::recovery::RecoveryBand;

/// One day, summarized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,

    pub recovery: Option<u8>,
    pub recovery_band: Option<String>,

    pub sleep: Option<u8>,

    pub strain: Option<f64>,

    /// Percent change of today's HRV vs baseline
    pub hrv_delta_pct: Option<f64>,

    /// Percent change of today's resting HR vs baseline
    pub rhr_delta_pct: Option<f64>,

    pub tsb: f64,
    pub tsb_band: String,

    /// Suggested TSS range for tomorrow given current form
    pub suggested_tss_range: (u16, u16),

    pub illness_severity: IllnessSeverity,
    pub illness_confidence: f64,

    pub status: ScoreStatus,

    /// Plain-language guidance line
    pub guidance: String,
}

impl DailySummary {
    /// Assemble a summary from the day's score and load records
    pub fn assemble(
        score: &DailyScoreRecord,
        load: &DailyLoadRecord,
        hrv_delta_pct: Option<f64>,
        rhr_delta_pct: Option<f64>,
    ) -> Self {
        let tsb = load.tsb.to_f64().unwrap_or(0.0);
        let tsb_band = TsbBand::from_tsb(load.tsb);
        let recovery_band = score.recovery.map(RecoveryBand::from_score);

        let guidance = match (score.illness_severity, recovery_band) {
            (IllnessSeverity::High, _) => {
                "Signs consistent with illness; training is not recommended today".to_string()
            }
            (IllnessSeverity::Moderate, _) => {
                "Several wellness signals are off; keep today very easy".to_string()
            }
            (_, Some(band)) => format!("{}. {}", band.description(), tsb_band.description()),
            (_, None) => "Not enough data to score today".to_string(),
        };

        DailySummary {
            date: score.date,
            recovery: score.recovery,
            recovery_band: recovery_band.map(|b| format!("{:?}", b)),
            sleep: score.sleep,
            strain: score.strain,
            hrv_delta_pct,
            rhr_delta_pct,
            tsb,
            tsb_band: format!("{:?}", tsb_band),
            suggested_tss_range: tsb_band.suggested_tss_range(),
            illness_severity: score.illness_severity,
            illness_confidence: score.illness_confidence,
            status: score.status,
            guidance,
        }
    }
}
