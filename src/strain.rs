//! Daily strain on a 0-21 logarithmic scale
//!
//! Strain compresses daily TSS onto the familiar 0-21 scale with a log
//! curve anchored so that 600 TSS maps to the ceiling: early stress
//! moves the needle quickly, additional stress on an already huge day
//! barely does.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// TSS that saturates the scale
const STRAIN_ANCHOR_TSS: f64 = 600.0;

/// Scale ceiling
const STRAIN_MAX: f64 = 21.0;

/// Strain for a day's total TSS
pub fn strain_from_tss(tss: Decimal) -> f64 {
    let tss = tss.to_f64().unwrap_or(0.0).max(0.0);
    let strain = STRAIN_MAX * (tss + 1.0).ln() / (STRAIN_ANCHOR_TSS + 1.0).ln();
    strain.min(STRAIN_MAX)
}

/// Qualitative strain bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrainBand {
    /// 0-9: light day
    Light,
    /// 10-13: moderate day
    Moderate,
    /// 14-17: hard day
    Hard,
    /// 18-21: all-out day
    AllOut,
}

impl StrainBand {
    pub fn from_strain(strain: f64) -> Self {
        if strain >= 18.0 {
            StrainBand::AllOut
        } else if strain >= 14.0 {
            StrainBand::Hard
        } else if strain >= 10.0 {
            StrainBand::Moderate
        } else {
            StrainBand::Light
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StrainBand::Light => "Light load",
            StrainBand::Moderate => "Moderate load",
            StrainBand::Hard => "Hard load",
            StrainBand::AllOut => "All-out load",
        }
    }
}
