//! CSV and JSON export
//!
//! Flat row shapes dedicated to export; the persisted records carry
//! nested structures (score breakdowns, Decimal load values) that CSV
//! cannot represent directly.

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::error::{Result, VeloError};
use crate::models::{DailyLoadRecord, DailyScoreRecord};
use crate::summary::DailySummary;

#[derive(Debug, Serialize)]
struct ScoreCsvRow {
    date: NaiveDate,
    recovery: Option<u8>,
    sleep: Option<u8>,
    strain: Option<f64>,
    status: String,
    confidence_rank: u8,
    illness_severity: String,
    illness_confidence: f64,
    hrv_subscore: Option<f64>,
    sleep_subscore: Option<f64>,
    rhr_subscore: Option<f64>,
    respiratory_subscore: Option<f64>,
    training_load_subscore: Option<f64>,
}

impl From<&DailyScoreRecord> for ScoreCsvRow {
    fn from(record: &DailyScoreRecord) -> Self {
        let breakdown = record.breakdown.as_ref();
        ScoreCsvRow {
            date: record.date,
            recovery: record.recovery,
            sleep: record.sleep,
            strain: record.strain,
            status: record.status.to_string(),
            confidence_rank: record.confidence.rank(),
            illness_severity: record.illness_severity.to_string(),
            illness_confidence: record.illness_confidence,
            hrv_subscore: breakdown.and_then(|b| b.hrv),
            sleep_subscore: breakdown.and_then(|b| b.sleep),
            rhr_subscore: breakdown.and_then(|b| b.rhr),
            respiratory_subscore: breakdown.and_then(|b| b.respiratory),
            training_load_subscore: breakdown.and_then(|b| b.training_load),
        }
    }
}

#[derive(Debug, Serialize)]
struct LoadCsvRow {
    date: NaiveDate,
    tss: f64,
    ctl: f64,
    atl: f64,
    tsb: f64,
    input_count: u16,
    estimated_inputs: u16,
}

impl From<&DailyLoadRecord> for LoadCsvRow {
    fn from(record: &DailyLoadRecord) -> Self {
        LoadCsvRow {
            date: record.date,
            tss: record.tss.to_f64().unwrap_or(0.0),
            ctl: record.ctl.to_f64().unwrap_or(0.0),
            atl: record.atl.to_f64().unwrap_or(0.0),
            tsb: record.tsb.to_f64().unwrap_or(0.0),
            input_count: record.input_count,
            estimated_inputs: record.estimated_inputs,
        }
    }
}

/// Write daily scores as CSV
pub fn export_scores_csv(scores: &[DailyScoreRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| VeloError::Validation(format!("cannot open {}: {}", path.display(), e)))?;

    for record in scores {
        writer
            .serialize(ScoreCsvRow::from(record))
            .map_err(|e| VeloError::Validation(format!("CSV write failed: {}", e)))?;
    }
    writer
        .flush()
        .map_err(VeloError::Io)?;

    info!(count = scores.len(), path = %path.display(), "Exported scores");
    Ok(())
}

/// Write the load chain as CSV
pub fn export_loads_csv(loads: &[DailyLoadRecord], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| VeloError::Validation(format!("cannot open {}: {}", path.display(), e)))?;

    for record in loads {
        writer
            .serialize(LoadCsvRow::from(record))
            .map_err(|e| VeloError::Validation(format!("CSV write failed: {}", e)))?;
    }
    writer
        .flush()
        .map_err(VeloError::Io)?;

    info!(count = loads.len(), path = %path.display(), "Exported load chain");
    Ok(())
}

/// Write daily summaries as pretty JSON
pub fn export_summaries_json(summaries: &[DailySummary], path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    serde_json::to_writer_pretty(&mut file, summaries)
        .map_err(|e| VeloError::Validation(format!("JSON write failed: {}", e)))?;
    file.write_all(b"\n")?;

    info!(count = summaries.len(), path = %path.display(), "Exported summaries");
    Ok(())
}
