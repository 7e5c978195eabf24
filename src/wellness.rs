//! Illness and wellness-anomaly detection
//!
//! The detector compares today's physiological inputs against personal
//! rolling baselines and classifies the day into graded illness severity
//! tiers. Confidence is the fraction of applicable signals that fired:
//! a signal whose input is missing is excluded from the denominator, not
//! counted as healthy.
//!
//! Thresholds here are empirical tunables, not clinical diagnostics, and
//! every one of them is surfaced through `WellnessConfig`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::IllnessSeverity;

/// Individual anomaly signals the detector evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// HRV suppressed well below baseline
    HrvDrop,
    /// HRV far above baseline; super-compensation or sensor artifact,
    /// still anomalous
    HrvSpike,
    /// Resting HR elevated above baseline
    RhrElevated,
    /// Respiratory rate deviating from baseline
    RespiratoryDeviation,
    /// Sleep score well below its recent baseline
    SleepDegraded,
    /// Daily activity far below habit, suggesting feeling unwell
    ActivityDrop,
    /// Body temperature above personal baseline
    TempElevated,
}

/// Today's values paired with their baseline means
///
/// A `None` field makes the corresponding signal inapplicable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WellnessInputs {
    /// (today, baseline) HRV RMSSD in ms
    pub hrv: Option<(f64, f64)>,

    /// (today, baseline) resting HR in bpm
    pub resting_hr: Option<(f64, f64)>,

    /// (today, baseline) respiratory rate in breaths/min
    pub respiratory_rate: Option<(f64, f64)>,

    /// (today, baseline) sleep score 0-100
    pub sleep_score: Option<(f64, f64)>,

    /// (today, baseline) active minutes
    pub active_minutes: Option<(f64, f64)>,

    /// Deviation from body-temperature baseline in degrees C
    pub body_temp_delta: Option<f64>,
}

/// Detection thresholds and severity tier gates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellnessConfig {
    /// HRV percent drop below baseline that fires HrvDrop
    pub hrv_drop_pct: f64,

    /// HRV percent rise above baseline that fires HrvSpike
    pub hrv_spike_pct: f64,

    /// Resting-HR percent elevation that fires RhrElevated
    pub rhr_elevation_pct: f64,

    /// Respiratory-rate percent deviation (either direction)
    pub respiratory_dev_pct: f64,

    /// Sleep-score percent drop below its baseline
    pub sleep_drop_pct: f64,

    /// Lower edge of the sleep band the signal reads; a score below
    /// this is a collapsed night, not the degraded-but-plausible
    /// pattern this signal looks for
    pub sleep_band_low: f64,

    /// Upper edge (exclusive) of the sleep band the signal reads
    pub sleep_band_high: f64,

    /// Active-minutes percent drop below baseline
    pub activity_drop_pct: f64,

    /// Body-temperature delta in degrees C
    pub temp_delta_c: f64,

    /// High tier: minimum confidence
    pub high_confidence: f64,

    /// High tier: minimum triggered signals
    pub high_min_signals: usize,

    /// Moderate tier: minimum confidence
    pub moderate_confidence: f64,

    /// Moderate tier: minimum triggered signals
    pub moderate_min_signals: usize,

    /// Low tier: minimum confidence
    pub low_confidence: f64,

    /// Low tier: minimum triggered signals
    pub low_min_signals: usize,
}

impl Default for WellnessConfig {
    fn default() -> Self {
        WellnessConfig {
            hrv_drop_pct: 10.0,
            hrv_spike_pct: 100.0,
            rhr_elevation_pct: 3.0,
            respiratory_dev_pct: 8.0,
            sleep_drop_pct: 15.0,
            sleep_band_low: 60.0,
            sleep_band_high: 85.0,
            activity_drop_pct: 40.0,
            temp_delta_c: 0.3,
            high_confidence: 0.6,
            high_min_signals: 3,
            moderate_confidence: 0.5,
            moderate_min_signals: 3,
            low_confidence: 0.25,
            low_min_signals: 2,
        }
    }
}

/// Outcome of one day's wellness assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellnessAssessment {
    pub severity: IllnessSeverity,

    /// Triggered / applicable signal ratio, 0.0 when nothing applies
    pub confidence: f64,

    /// Which signals fired
    pub triggered: Vec<Signal>,

    /// Illness-pattern signals overlap the alcohol signature; severity
    /// stands on the illness reading, but the cause is uncertain
    pub ambiguous_with_alcohol: bool,

    /// Below-Moderate reading whose shape matches the alcohol signature
    /// (HRV down, RHR up, respiration and temperature normal)
    pub alcohol_likely: bool,
}

impl WellnessAssessment {
    fn clear() -> Self {
        WellnessAssessment {
            severity: IllnessSeverity::None,
            confidence: 0.0,
            triggered: Vec::new(),
            ambiguous_with_alcohol: false,
            alcohol_likely: false,
        }
    }

    pub fn is_flagged(&self) -> bool {
        self.severity > IllnessSeverity::None
    }
}

/// Multi-signal illness detector
pub struct WellnessDetector {
    config: WellnessConfig,
}

impl WellnessDetector {
    pub fn new() -> Self {
        WellnessDetector {
            config: WellnessConfig::default(),
        }
    }

    pub fn with_config(config: WellnessConfig) -> Self {
        WellnessDetector { config }
    }

    /// Assess one day's inputs against their baselines
    pub fn assess(&self, inputs: &WellnessInputs) -> WellnessAssessment {
        let mut triggered = Vec::new();
        let mut applicable = 0usize;

        // HRV drop and spike are mutually exclusive readings of the same
        // input; it counts once toward the denominator.
        if let Some((today, baseline)) = inputs.hrv {
            applicable += 1;
            if baseline > 0.0 {
                let change_pct = (today - baseline) / baseline * 100.0;
                if change_pct <= -self.config.hrv_drop_pct {
                    triggered.push(Signal::HrvDrop);
                } else if change_pct >= self.config.hrv_spike_pct {
                    triggered.push(Signal::HrvSpike);
                }
            }
        }

        if let Some((today, baseline)) = inputs.resting_hr {
            applicable += 1;
            if baseline > 0.0
                && (today - baseline) / baseline * 100.0 >= self.config.rhr_elevation_pct
            {
                triggered.push(Signal::RhrElevated);
            }
        }

        if let Some((today, baseline)) = inputs.respiratory_rate {
            applicable += 1;
            if baseline > 0.0
                && ((today - baseline) / baseline * 100.0).abs()
                    >= self.config.respiratory_dev_pct
            {
                triggered.push(Signal::RespiratoryDeviation);
            }
        }

        // SleepDegraded only reads the moderate band: an in-band score
        // sitting well below its own baseline. Scores outside the band
        // tell a different story and are left to the other signals.
        if let Some((today, baseline)) = inputs.sleep_score {
            applicable += 1;
            let in_band =
                today >= self.config.sleep_band_low && today < self.config.sleep_band_high;
            if in_band
                && baseline > 0.0
                && (baseline - today) / baseline * 100.0 >= self.config.sleep_drop_pct
            {
                triggered.push(Signal::SleepDegraded);
            }
        }

        if let Some((today, baseline)) = inputs.active_minutes {
            applicable += 1;
            if baseline > 0.0
                && (baseline - today) / baseline * 100.0 >= self.config.activity_drop_pct
            {
                triggered.push(Signal::ActivityDrop);
            }
        }

        if let Some(delta) = inputs.body_temp_delta {
            applicable += 1;
            if delta >= self.config.temp_delta_c {
                triggered.push(Signal::TempElevated);
            }
        }

        if applicable == 0 || triggered.is_empty() {
            return WellnessAssessment::clear();
        }

        let confidence = triggered.len() as f64 / applicable as f64;
        let severity = self.tier(&triggered, confidence);

        // The alcohol signature: autonomic stress (HRV down, RHR up)
        // without respiratory or thermal involvement. An illness reading
        // of Moderate or above takes precedence over the heuristic and
        // the overlap is surfaced instead.
        let core_pattern = triggered.contains(&Signal::HrvDrop)
            && triggered.contains(&Signal::RhrElevated);
        let respiratory_or_temp = triggered.contains(&Signal::RespiratoryDeviation)
            || triggered.contains(&Signal::TempElevated);

        let alcohol_likely =
            severity < IllnessSeverity::Moderate && core_pattern && !respiratory_or_temp;
        let ambiguous_with_alcohol =
            severity >= IllnessSeverity::Moderate && core_pattern && !respiratory_or_temp;

        if severity > IllnessSeverity::None {
            info!(
                ?severity,
                confidence,
                signals = triggered.len(),
                alcohol_likely,
                ambiguous_with_alcohol,
                "Wellness anomaly detected"
            );
        } else {
            debug!(confidence, signals = triggered.len(), "Signals below severity floor");
        }

        WellnessAssessment {
            severity,
            confidence,
            triggered,
            ambiguous_with_alcohol,
            alcohol_likely,
        }
    }

    /// Severity from signal count and confidence
    ///
    /// High additionally requires an autonomic anomaly (HRV or resting
    /// HR); sleep, activity, and respiration alone never reach High.
    fn tier(&self, triggered: &[Signal], confidence: f64) -> IllnessSeverity {
        let n = triggered.len();
        let autonomic = triggered.iter().any(|s| {
            matches!(s, Signal::HrvDrop | Signal::HrvSpike | Signal::RhrElevated)
        });

        if n >= self.config.high_min_signals
            && confidence >= self.config.high_confidence
            && autonomic
        {
            IllnessSeverity::High
        } else if n >= self.config.moderate_min_signals
            && confidence >= self.config.moderate_confidence
        {
            IllnessSeverity::Moderate
        } else if n >= self.config.low_min_signals && confidence >= self.config.low_confidence {
            IllnessSeverity::Low
        } else {
            IllnessSeverity::None
        }
    }
}

impl Default for WellnessDetector {
    fn default() -> Self {
        Self::new()
    }
}
