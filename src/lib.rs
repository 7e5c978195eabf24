//! VeloScore: daily physiological scoring and training-load engine
//!
//! Turns raw provider data (activities, overnight physiology, sleep
//! sessions) into three daily scores plus a training-load chain:
//!
//! - **Recovery** (0-100): weighted HRV, sleep, resting HR, respiratory
//!   rate, and form sub-scores against rolling personal baselines
//! - **Sleep** (0-100): performance, quality, efficiency, disturbances,
//!   and consistency components from staged sleep sessions
//! - **Strain** (0-21): log-scaled daily training stress
//! - **CTL/ATL/TSB**: exponentially weighted load chain from per-activity
//!   TSS, with a strict priority cascade of estimation methods
//!
//! The wellness detector flags illness-consistent patterns across the
//! same signals, adaptive zone estimation keeps FTP and HR zones current
//! from recorded power data, and everything is persisted in SQLite with
//! confidence-guarded writes.

pub mod backfill;
pub mod baseline;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod pmc;
pub mod providers;
pub mod recovery;
pub mod sleep;
pub mod store;
pub mod strain;
pub mod summary;
pub mod trimp;
pub mod wellness;
pub mod zones;

pub use backfill::{BackfillJob, BackfillReport};
pub use baseline::{BaselineConfig, BaselineResult, BaselineSet, BaselineTracker};
pub use config::EngineConfig;
pub use error::{Result, VeloError};
pub use models::{
    ActivityRecord, AthleteProfile, DailyLoadRecord, DailyPhysioRecord, DailyScoreRecord,
    IllnessSeverity, ProviderKind, ScoreConfidence, ScoreStatus, SleepSession, Sport,
};
pub use pipeline::{DayOutcome, ScoringPipeline};
pub use providers::{DataProvider, ProviderChain};
pub use store::{Store, WriteOutcome};
pub use summary::DailySummary;
