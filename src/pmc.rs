//! Performance Management Chart: CTL, ATL, TSB
//!
//! The fitness/fatigue model is a pair of exponentially-weighted moving
//! averages over daily TSS. CTL (chronic training load, "fitness") uses a
//! 42-day time constant, ATL (acute training load, "fatigue") 7 days, and
//! TSB (training stress balance, "form") is CTL minus ATL for the same
//! day. The recurrence is strictly sequential per athlete: each day's
//! values derive only from the previous day's values and that day's TSS,
//! with missing days contributing TSS = 0.

use chrono::{Days, NaiveDate};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::DailyLoadRecord;
use crate::trimp::DayLoadInputs;

/// Time constants for the load recurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmcConfig {
    /// CTL time constant in days
    pub ctl_days: u16,

    /// ATL time constant in days
    pub atl_days: u16,
}

impl Default for PmcConfig {
    fn default() -> Self {
        PmcConfig {
            ctl_days: 42,
            atl_days: 7,
        }
    }
}

/// CTL/ATL/TSB calculator
///
/// Decay constants are converted to Decimal once at construction so that
/// incremental day-by-day updates and batch recomputation of the same
/// span produce identical values.
pub struct PmcCalculator {
    k_ctl: Decimal,
    k_atl: Decimal,
}

impl PmcCalculator {
    pub fn new() -> Self {
        Self::with_config(&PmcConfig::default())
    }

    pub fn with_config(config: &PmcConfig) -> Self {
        PmcCalculator {
            k_ctl: decay_constant(config.ctl_days),
            k_atl: decay_constant(config.atl_days),
        }
    }

    /// Advance the recurrence by one day
    ///
    /// `prev` is the previous day's (CTL, ATL); a rest or gap day passes
    /// TSS = 0 and still decays both averages.
    pub fn step(&self, prev: (Decimal, Decimal), tss: Decimal) -> (Decimal, Decimal) {
        let (prev_ctl, prev_atl) = prev;
        let ctl = prev_ctl * self.k_ctl + tss * (Decimal::ONE - self.k_ctl);
        let atl = prev_atl * self.k_atl + tss * (Decimal::ONE - self.k_atl);
        (ctl, atl)
    }

    /// Expand daily TSS inputs into a dense, contiguous load series
    ///
    /// Every date in `[start, end]` gets a record. Dates absent from
    /// `daily` are treated as rest days (TSS = 0, zero inputs). `seed` is
    /// the (CTL, ATL) of the day before `start`; None starts the chain
    /// from zero.
    pub fn expand_series(
        &self,
        daily: &BTreeMap<NaiveDate, DayLoadInputs>,
        start: NaiveDate,
        end: NaiveDate,
        seed: Option<(Decimal, Decimal)>,
    ) -> Vec<DailyLoadRecord> {
        let mut records = Vec::new();
        let mut state = seed.unwrap_or((Decimal::ZERO, Decimal::ZERO));
        let mut date = start;

        while date <= end {
            let inputs = daily.get(&date);
            let tss = inputs.map(|d| d.tss).unwrap_or(Decimal::ZERO);
            if inputs.is_none() {
                debug!(%date, "No activities; treating as rest day");
            }

            state = self.step(state, tss);
            let (ctl, atl) = state;

            records.push(DailyLoadRecord {
                date,
                tss,
                ctl,
                atl,
                tsb: ctl - atl,
                input_count: inputs.map(|d| d.input_count).unwrap_or(0),
                estimated_inputs: inputs.map(|d| d.estimated_inputs).unwrap_or(0),
            });

            date = match date.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
        }

        records
    }
}

impl Default for PmcCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// `e^(-1/N)` for an N-day time constant, fixed into Decimal
fn decay_constant(days: u16) -> Decimal {
    let k = (-1.0 / days as f64).exp();
    Decimal::from_f64(k).unwrap_or(Decimal::ONE)
}

/// Qualitative TSB interpretation bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TsbBand {
    /// TSB >= +25: very fresh, fitness may be eroding
    VeryFresh,
    /// +5 <= TSB < +25: race-ready freshness
    Fresh,
    /// -10 <= TSB < +5: productive training balance
    Neutral,
    /// -30 <= TSB < -10: building fatigue
    Fatigued,
    /// TSB < -30: heavy overload, recovery needed
    VeryFatigued,
}

impl TsbBand {
    pub fn from_tsb(tsb: Decimal) -> Self {
        if tsb >= Decimal::from(25) {
            TsbBand::VeryFresh
        } else if tsb >= Decimal::from(5) {
            TsbBand::Fresh
        } else if tsb >= Decimal::from(-10) {
            TsbBand::Neutral
        } else if tsb >= Decimal::from(-30) {
            TsbBand::Fatigued
        } else {
            TsbBand::VeryFatigued
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TsbBand::VeryFresh => "Very fresh; extended rest is starting to cost fitness",
            TsbBand::Fresh => "Fresh and race-ready",
            TsbBand::Neutral => "Balanced; absorbing training well",
            TsbBand::Fatigued => "Carrying fatigue from recent load",
            TsbBand::VeryFatigued => "Deep fatigue; recovery strongly recommended",
        }
    }

    /// Suggested daily TSS range for tomorrow given this form
    pub fn suggested_tss_range(&self) -> (u16, u16) {
        match self {
            TsbBand::VeryFresh => (80, 150),
            TsbBand::Fresh => (60, 120),
            TsbBand::Neutral => (40, 100),
            TsbBand::Fatigued => (20, 60),
            TsbBand::VeryFatigued => (0, 30),
        }
    }
}
