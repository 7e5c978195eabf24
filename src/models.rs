use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sport types recognized by the scoring engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sport {
    Cycling,
    Running,
    Swimming,
    Strength,
    Walking,
    Other,
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sport::Cycling => write!(f, "Cycling"),
            Sport::Running => write!(f, "Running"),
            Sport::Swimming => write!(f, "Swimming"),
            Sport::Strength => write!(f, "Strength"),
            Sport::Walking => write!(f, "Walking"),
            Sport::Other => write!(f, "Other"),
        }
    }
}

impl std::str::FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cycling" => Ok(Sport::Cycling),
            "running" => Ok(Sport::Running),
            "swimming" => Ok(Sport::Swimming),
            "strength" => Ok(Sport::Strength),
            "walking" => Ok(Sport::Walking),
            "other" => Ok(Sport::Other),
            _ => Err(format!("Unknown sport: {}", s)),
        }
    }
}

/// Identity of an activity/health data source
///
/// The fallback chain is an ordered list of these, configured explicitly --
/// no source is authoritative by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    Intervals,
    Strava,
    HealthKit,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Intervals => write!(f, "intervals"),
            ProviderKind::Strava => write!(f, "strava"),
            ProviderKind::HealthKit => write!(f, "healthkit"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "intervals" => Ok(ProviderKind::Intervals),
            "strava" => Ok(ProviderKind::Strava),
            "healthkit" => Ok(ProviderKind::HealthKit),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Normalized workout record, regardless of source
///
/// Providers map their native payloads into this shape; the engine only
/// reads it, never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Stable content-derived identifier (see providers::dedup_key)
    pub id: String,

    /// Which provider supplied this record
    pub source: ProviderKind,

    /// Absolute start timestamp
    pub start_time: DateTime<Utc>,

    /// Duration in seconds
    pub duration_seconds: u32,

    /// Sport/activity type
    pub sport: Sport,

    /// Average heart rate in bpm (often absent for indoor/virtual rides)
    pub avg_heart_rate: Option<u16>,

    /// Normalized power in watts
    pub normalized_power: Option<u16>,

    /// Average power in watts
    pub avg_power: Option<u16>,

    /// Training stress score as computed by the source itself
    pub source_tss: Option<Decimal>,

    /// Per-second power samples when the source supplies them
    pub power_stream: Option<Vec<u16>>,

    /// Activity name/title
    pub name: Option<String>,
}

impl ActivityRecord {
    /// Calendar day this activity belongs to in the athlete's timezone
    pub fn local_date(&self, tz: FixedOffset) -> NaiveDate {
        self.start_time.with_timezone(&tz).date_naive()
    }

    /// Duration in minutes (fractional part kept)
    pub fn duration_minutes(&self) -> f64 {
        self.duration_seconds as f64 / 60.0
    }
}

/// Sleep stages as reported by the health-sample provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SleepStage {
    /// Deep / slow-wave sleep
    Deep,
    /// REM sleep
    Rem,
    /// Light/core sleep
    Core,
    /// Awake period during the session
    Awake,
}

impl fmt::Display for SleepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SleepStage::Deep => write!(f, "Deep"),
            SleepStage::Rem => write!(f, "REM"),
            SleepStage::Core => write!(f, "Core"),
            SleepStage::Awake => write!(f, "Awake"),
        }
    }
}

/// One contiguous stage segment within a sleep session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepStageSegment {
    pub stage: SleepStage,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SleepStageSegment {
    /// Segment duration in minutes, from the absolute timestamps
    pub fn duration_minutes(&self) -> f64 {
        (self.end - self.start).num_seconds().max(0) as f64 / 60.0
    }
}

/// A single night's sleep with absolute bed/wake instants
///
/// All durations are differences of absolute timestamps. Hour-of-day
/// arithmetic is never used, so a midnight bedtime is just a timestamp,
/// not "24 hours past yesterday".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSession {
    /// When the athlete got into bed
    pub bedtime: DateTime<Utc>,

    /// When the athlete got up
    pub wake_time: DateTime<Utc>,

    /// Stage breakdown; may be empty when the source only reports the span
    pub stages: Vec<SleepStageSegment>,
}

impl SleepSession {
    /// Calendar day this session scores against (the day the athlete woke)
    pub fn sleep_date(&self, tz: FixedOffset) -> NaiveDate {
        self.wake_time.with_timezone(&tz).date_naive()
    }

    /// Total time in bed in minutes
    pub fn time_in_bed_minutes(&self) -> f64 {
        (self.wake_time - self.bedtime).num_seconds().max(0) as f64 / 60.0
    }

    /// Minutes actually asleep (all non-awake stages; whole span when
    /// the source reported no stages)
    pub fn asleep_minutes(&self) -> f64 {
        if self.stages.is_empty() {
            return self.time_in_bed_minutes();
        }
        self.stages
            .iter()
            .filter(|s| s.stage != SleepStage::Awake)
            .map(|s| s.duration_minutes())
            .sum()
    }

    /// Minutes in a given stage
    pub fn stage_minutes(&self, stage: SleepStage) -> f64 {
        self.stages
            .iter()
            .filter(|s| s.stage == stage)
            .map(|s| s.duration_minutes())
            .sum()
    }

    /// Number of transitions into the awake stage
    pub fn wake_events(&self) -> u8 {
        let mut count = 0u8;
        let mut prev: Option<SleepStage> = None;
        for segment in &self.stages {
            if segment.stage == SleepStage::Awake
                && prev.map(|p| p != SleepStage::Awake).unwrap_or(false)
            {
                count = count.saturating_add(1);
            }
            prev = Some(segment.stage);
        }
        count
    }
}

/// Per-day physiological inputs, one record per calendar day
///
/// Every field is optional: the health-sample provider gives no guarantee
/// of daily data, and the scorers treat absence as a first-class case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPhysioRecord {
    /// Calendar day in the athlete's timezone
    pub date: NaiveDate,

    /// Overnight HRV (RMSSD) in milliseconds
    pub hrv_rmssd: Option<f64>,

    /// Resting heart rate in bpm
    pub resting_hr: Option<f64>,

    /// Respiratory rate in breaths/min
    pub respiratory_rate: Option<f64>,

    /// Total sleep duration in minutes
    pub sleep_duration_minutes: Option<f64>,

    /// Active minutes (steps/active-energy proxy), used by the
    /// activity-drop wellness signal
    pub active_minutes: Option<f64>,

    /// Deviation from personal body-temperature baseline in degrees C.
    /// Optional signal, participates in wellness detection when present.
    pub body_temp_delta: Option<f64>,
}

impl DailyPhysioRecord {
    /// Empty record for a date
    pub fn empty(date: NaiveDate) -> Self {
        DailyPhysioRecord {
            date,
            hrv_rmssd: None,
            resting_hr: None,
            respiratory_rate: None,
            sleep_duration_minutes: None,
            active_minutes: None,
            body_temp_delta: None,
        }
    }
}

/// Heart rate zone boundaries (5-zone model, HR-reserve based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HrZones {
    pub zone1_max: u16, // Active recovery
    pub zone2_max: u16, // Endurance
    pub zone3_max: u16, // Tempo
    pub zone4_max: u16, // Threshold
    pub zone5_max: u16, // VO2 max
}

/// Athlete thresholds and personal data
///
/// Passed into the calculators as an explicit value. The only writers are
/// the zone estimator's apply path and explicit user override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthleteProfile {
    /// Unique athlete identifier
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Functional Threshold Power in watts
    pub ftp: Option<u16>,

    /// Maximum heart rate in bpm
    pub max_hr: Option<u16>,

    /// Resting heart rate in bpm
    pub resting_hr: Option<u16>,

    /// Body weight in kilograms (needed for VO2max estimation)
    pub weight_kg: Option<f64>,

    /// Personalized nightly sleep need in minutes
    pub sleep_need_minutes: f64,

    /// Heart rate zones derived from max HR / HR reserve
    pub hr_zones: Option<HrZones>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl AthleteProfile {
    /// New profile with nothing measured yet
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        AthleteProfile {
            id: Uuid::new_v4(),
            name: name.to_string(),
            ftp: None,
            max_hr: None,
            resting_hr: None,
            weight_kg: None,
            sleep_need_minutes: 480.0,
            hr_zones: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether power-based TSS can be computed
    pub fn has_power_threshold(&self) -> bool {
        self.ftp.map(|f| f > 0).unwrap_or(false)
    }

    /// Whether heart-rate-reserve TRIMP can be computed
    pub fn has_hr_thresholds(&self) -> bool {
        matches!((self.max_hr, self.resting_hr), (Some(max), Some(rest)) if max > rest)
    }
}

/// One day of the training-load chain
///
/// CTL/ATL for day D are derived from day D-1 plus today's TSS via
/// exponential decay, so records in a timeline are only valid in date
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLoadRecord {
    /// Calendar day
    pub date: NaiveDate,

    /// Total training stress for the day (sum over all activities)
    pub tss: Decimal,

    /// Chronic Training Load (42-day exponentially weighted average)
    pub ctl: Decimal,

    /// Acute Training Load (7-day exponentially weighted average)
    pub atl: Decimal,

    /// Training Stress Balance (CTL - ATL)
    pub tsb: Decimal,

    /// Number of activities contributing to the day's TSS
    pub input_count: u16,

    /// How many of those activities used the duration-only fallback
    pub estimated_inputs: u16,
}

/// Finality of a persisted daily score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreStatus {
    /// All required inputs resolved
    Final,
    /// Computed from partial inputs, expected to be refined
    Provisional,
    /// Required inputs absent; no numeric score substituted
    InsufficientData,
    /// Numeric score suppressed by a high-severity illness flag
    IllnessFlagged,
}

impl fmt::Display for ScoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreStatus::Final => write!(f, "final"),
            ScoreStatus::Provisional => write!(f, "provisional"),
            ScoreStatus::InsufficientData => write!(f, "insufficient-data"),
            ScoreStatus::IllnessFlagged => write!(f, "illness-flagged"),
        }
    }
}

impl std::str::FromStr for ScoreStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "final" => Ok(ScoreStatus::Final),
            "provisional" => Ok(ScoreStatus::Provisional),
            "insufficient-data" => Ok(ScoreStatus::InsufficientData),
            "illness-flagged" => Ok(ScoreStatus::IllnessFlagged),
            _ => Err(format!("Unknown score status: {}", s)),
        }
    }
}

/// Completeness rank of the inputs behind a persisted score
///
/// Ordered: writers may only replace a record with an equal-or-higher
/// confidence one, unless explicitly forced. This is the guard against
/// a stale background recompute clobbering a good score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScoreConfidence {
    None,
    Provisional,
    Partial,
    Full,
}

impl ScoreConfidence {
    /// Stable integer rank for persistence
    pub fn rank(&self) -> u8 {
        match self {
            ScoreConfidence::None => 0,
            ScoreConfidence::Provisional => 1,
            ScoreConfidence::Partial => 2,
            ScoreConfidence::Full => 3,
        }
    }

    pub fn from_rank(rank: u8) -> Self {
        match rank {
            0 => ScoreConfidence::None,
            1 => ScoreConfidence::Provisional,
            2 => ScoreConfidence::Partial,
            _ => ScoreConfidence::Full,
        }
    }
}

/// Illness severity tiers from the wellness detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IllnessSeverity {
    None,
    Low,
    Moderate,
    High,
}

impl fmt::Display for IllnessSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IllnessSeverity::None => write!(f, "none"),
            IllnessSeverity::Low => write!(f, "low"),
            IllnessSeverity::Moderate => write!(f, "moderate"),
            IllnessSeverity::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for IllnessSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(IllnessSeverity::None),
            "low" => Ok(IllnessSeverity::Low),
            "moderate" => Ok(IllnessSeverity::Moderate),
            "high" => Ok(IllnessSeverity::High),
            _ => Err(format!("Unknown illness severity: {}", s)),
        }
    }
}

/// Per-component recovery sub-scores, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub hrv: Option<f64>,
    pub sleep: Option<f64>,
    pub rhr: Option<f64>,
    pub respiratory: Option<f64>,
    pub training_load: Option<f64>,
}

/// The final per-day output of the scoring engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyScoreRecord {
    /// Calendar day
    pub date: NaiveDate,

    /// Recovery score 0-100; None when inputs were insufficient
    pub recovery: Option<u8>,

    /// Sleep score 0-100
    pub sleep: Option<u8>,

    /// Strain on the 0-21 log scale
    pub strain: Option<f64>,

    /// Finality of this record
    pub status: ScoreStatus,

    /// Input completeness, used by the guarded upsert
    pub confidence: ScoreConfidence,

    /// Illness severity for the day
    pub illness_severity: IllnessSeverity,

    /// Illness confidence (fraction of applicable signals triggered)
    pub illness_confidence: f64,

    /// Recovery sub-score breakdown for diagnostics
    pub breakdown: Option<ScoreBreakdown>,

    /// When this record was computed
    pub computed_at: DateTime<Utc>,
}

impl DailyScoreRecord {
    /// Placeholder record for a day with no usable inputs
    pub fn insufficient(date: NaiveDate) -> Self {
        DailyScoreRecord {
            date,
            recovery: None,
            sleep: None,
            strain: None,
            status: ScoreStatus::InsufficientData,
            confidence: ScoreConfidence::None,
            illness_severity: IllnessSeverity::None,
            illness_confidence: 0.0,
            breakdown: None,
            computed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_activity_local_date_crosses_midnight() {
        let activity = ActivityRecord {
            id: "a1".to_string(),
            source: ProviderKind::Strava,
            start_time: utc(2024, 6, 1, 23, 30),
            duration_seconds: 3600,
            sport: Sport::Cycling,
            avg_heart_rate: None,
            normalized_power: None,
            avg_power: None,
            source_tss: None,
            power_stream: None,
            name: None,
        };

        // UTC+2: the 23:30 UTC start is already June 2nd locally
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(
            activity.local_date(tz),
            NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
        );

        let utc_tz = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            activity.local_date(utc_tz),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
    }

    #[test]
    fn test_sleep_session_midnight_bedtime() {
        // Bedtime exactly at 00:00, wake at 00:01: one literal minute,
        // never a 24-hour artifact.
        let session = SleepSession {
            bedtime: utc(2024, 6, 2, 0, 0),
            wake_time: utc(2024, 6, 2, 0, 1),
            stages: Vec::new(),
        };
        assert_eq!(session.time_in_bed_minutes(), 1.0);
        assert_eq!(session.asleep_minutes(), 1.0);
    }

    #[test]
    fn test_sleep_session_stage_aggregation() {
        let session = SleepSession {
            bedtime: utc(2024, 6, 1, 23, 0),
            wake_time: utc(2024, 6, 2, 7, 0),
            stages: vec![
                SleepStageSegment {
                    stage: SleepStage::Core,
                    start: utc(2024, 6, 1, 23, 0),
                    end: utc(2024, 6, 2, 1, 0),
                },
                SleepStageSegment {
                    stage: SleepStage::Deep,
                    start: utc(2024, 6, 2, 1, 0),
                    end: utc(2024, 6, 2, 2, 30),
                },
                SleepStageSegment {
                    stage: SleepStage::Awake,
                    start: utc(2024, 6, 2, 2, 30),
                    end: utc(2024, 6, 2, 2, 45),
                },
                SleepStageSegment {
                    stage: SleepStage::Rem,
                    start: utc(2024, 6, 2, 2, 45),
                    end: utc(2024, 6, 2, 4, 15),
                },
                SleepStageSegment {
                    stage: SleepStage::Core,
                    start: utc(2024, 6, 2, 4, 15),
                    end: utc(2024, 6, 2, 7, 0),
                },
            ],
        };

        assert_eq!(session.time_in_bed_minutes(), 480.0);
        assert_eq!(session.stage_minutes(SleepStage::Deep), 90.0);
        assert_eq!(session.stage_minutes(SleepStage::Rem), 90.0);
        assert_eq!(session.asleep_minutes(), 465.0);
        assert_eq!(session.wake_events(), 1);
    }

    #[test]
    fn test_score_confidence_ordering() {
        assert!(ScoreConfidence::Full > ScoreConfidence::Partial);
        assert!(ScoreConfidence::Partial > ScoreConfidence::Provisional);
        assert!(ScoreConfidence::Provisional > ScoreConfidence::None);
        for rank in 0..=3u8 {
            assert_eq!(ScoreConfidence::from_rank(rank).rank(), rank);
        }
    }

    #[test]
    fn test_illness_severity_ordering() {
        assert!(IllnessSeverity::High > IllnessSeverity::Moderate);
        assert!(IllnessSeverity::Low > IllnessSeverity::None);
    }

    #[test]
    fn test_profile_thresholds() {
        let mut profile = AthleteProfile::new("Test");
        assert!(!profile.has_power_threshold());
        assert!(!profile.has_hr_thresholds());

        profile.ftp = Some(250);
        profile.max_hr = Some(190);
        profile.resting_hr = Some(50);
        assert!(profile.has_power_threshold());
        assert!(profile.has_hr_thresholds());

        // resting >= max is not usable
        profile.resting_hr = Some(190);
        assert!(!profile.has_hr_thresholds());
    }

    #[test]
    fn test_provider_kind_roundtrip() {
        for kind in [
            ProviderKind::Intervals,
            ProviderKind::Strava,
            ProviderKind::HealthKit,
        ] {
            let parsed: ProviderKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }
}
