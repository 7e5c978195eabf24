//! SQLite persistence
//!
//! One row per (athlete, date) for physio inputs, load-chain days, and
//! scores; activities are keyed by their cross-source dedup key with
//! power streams compressed into blobs. Score writes go through a
//! confidence-guarded upsert: inside a transaction the existing row's
//! confidence rank is read and a lower-confidence replacement is
//! refused unless forced.

use chrono::{DateTime, NaiveDate, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    ActivityRecord, AthleteProfile, DailyLoadRecord, DailyPhysioRecord, DailyScoreRecord,
    HrZones, IllnessSeverity, ProviderKind, ScoreBreakdown, ScoreConfidence, ScoreStatus,
    Sport,
};

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Outcome of a guarded score write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The existing row has higher confidence; nothing was changed
    SkippedLowerConfidence { existing: ScoreConfidence },
}

/// Gzipped bincode blob of per-second power samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedPowerStream {
    pub compressed_data: Vec<u8>,
    pub original_size: usize,
    pub sample_count: usize,
}

impl CompressedPowerStream {
    pub fn compress(samples: &[u16]) -> Result<Self, StoreError> {
        let serialized = bincode::serialize(samples)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let original_size = serialized.len();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        let compressed_data = encoder.finish()?;

        Ok(Self {
            compressed_data,
            original_size,
            sample_count: samples.len(),
        })
    }

    pub fn decompress(&self) -> Result<Vec<u16>, StoreError> {
        let mut decoder = GzDecoder::new(self.compressed_data.as_slice());
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;

        bincode::deserialize(&decompressed)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// Counts for the status surface
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub athletes: i64,
    pub activities: i64,
    pub physio_days: i64,
    pub load_days: i64,
    pub score_days: i64,
    /// Scored days persisted below full confidence
    pub degraded_score_days: i64,
    /// First and last scored date across all athletes
    pub score_span: Option<(NaiveDate, NaiveDate)>,
}

/// SQLite-backed store
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Create or open a store at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store for tests
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS athletes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                ftp INTEGER,
                max_hr INTEGER,
                resting_hr INTEGER,
                weight_kg REAL,
                sleep_need_minutes REAL NOT NULL,
                zone1_max INTEGER,
                zone2_max INTEGER,
                zone3_max INTEGER,
                zone4_max INTEGER,
                zone5_max INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS physio_days (
                athlete_id TEXT NOT NULL,
                date TEXT NOT NULL,
                hrv_rmssd REAL,
                resting_hr REAL,
                respiratory_rate REAL,
                sleep_duration_minutes REAL,
                active_minutes REAL,
                body_temp_delta REAL,
                UNIQUE (athlete_id, date),
                FOREIGN KEY (athlete_id) REFERENCES athletes (id)
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                dedup_key TEXT PRIMARY KEY,
                athlete_id TEXT NOT NULL,
                source TEXT NOT NULL,
                start_time TEXT NOT NULL,
                duration_seconds INTEGER NOT NULL,
                sport TEXT NOT NULL,
                avg_heart_rate INTEGER,
                normalized_power INTEGER,
                avg_power INTEGER,
                source_tss TEXT,
                name TEXT,
                power_stream BLOB,
                power_original_size INTEGER,
                power_sample_count INTEGER,
                FOREIGN KEY (athlete_id) REFERENCES athletes (id)
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS load_days (
                athlete_id TEXT NOT NULL,
                date TEXT NOT NULL,
                tss TEXT NOT NULL,
                ctl TEXT NOT NULL,
                atl TEXT NOT NULL,
                tsb TEXT NOT NULL,
                input_count INTEGER NOT NULL,
                estimated_inputs INTEGER NOT NULL,
                UNIQUE (athlete_id, date),
                FOREIGN KEY (athlete_id) REFERENCES athletes (id)
            )
            "#,
            [],
        )?;

        self.conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS score_days (
                athlete_id TEXT NOT NULL,
                date TEXT NOT NULL,
                recovery INTEGER,
                sleep INTEGER,
                strain REAL,
                status TEXT NOT NULL,
                confidence_rank INTEGER NOT NULL,
                illness_severity TEXT NOT NULL,
                illness_confidence REAL NOT NULL,
                breakdown TEXT,
                computed_at TEXT NOT NULL,
                UNIQUE (athlete_id, date),
                FOREIGN KEY (athlete_id) REFERENCES athletes (id)
            )
            "#,
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_activities_athlete_start ON activities (athlete_id, start_time)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_load_days_athlete_date ON load_days (athlete_id, date)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_score_days_athlete_date ON score_days (athlete_id, date)",
            [],
        )?;

        Ok(())
    }

    // ---- athletes ----

    pub fn upsert_athlete(&self, profile: &AthleteProfile) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO athletes (
                id, name, ftp, max_hr, resting_hr, weight_kg, sleep_need_minutes,
                zone1_max, zone2_max, zone3_max, zone4_max, zone5_max,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                profile.id,
                profile.name,
                profile.ftp,
                profile.max_hr,
                profile.resting_hr,
                profile.weight_kg,
                profile.sleep_need_minutes,
                profile.hr_zones.map(|z| z.zone1_max),
                profile.hr_zones.map(|z| z.zone2_max),
                profile.hr_zones.map(|z| z.zone3_max),
                profile.hr_zones.map(|z| z.zone4_max),
                profile.hr_zones.map(|z| z.zone5_max),
                profile.created_at,
                profile.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Insert the athlete if missing, leaving an existing row untouched
    ///
    /// Day-keyed tables reference `athletes`; writers call this before
    /// their first insert so a freshly constructed engine never trips
    /// the foreign key.
    pub fn ensure_athlete(&self, profile: &AthleteProfile) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT OR IGNORE INTO athletes (
                id, name, ftp, max_hr, resting_hr, weight_kg, sleep_need_minutes,
                zone1_max, zone2_max, zone3_max, zone4_max, zone5_max,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                profile.id,
                profile.name,
                profile.ftp,
                profile.max_hr,
                profile.resting_hr,
                profile.weight_kg,
                profile.sleep_need_minutes,
                profile.hr_zones.map(|z| z.zone1_max),
                profile.hr_zones.map(|z| z.zone2_max),
                profile.hr_zones.map(|z| z.zone3_max),
                profile.hr_zones.map(|z| z.zone4_max),
                profile.hr_zones.map(|z| z.zone5_max),
                profile.created_at,
                profile.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Earliest-created athlete, for the single-athlete CLI default
    pub fn first_athlete(&self) -> Result<Option<AthleteProfile>, StoreError> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT id, name, ftp, max_hr, resting_hr, weight_kg, sleep_need_minutes,
                       zone1_max, zone2_max, zone3_max, zone4_max, zone5_max,
                       created_at, updated_at
                FROM athletes
                ORDER BY created_at
                LIMIT 1
                "#,
                [],
                athlete_from_row,
            )
            .optional()?)
    }

    pub fn load_athlete(&self, id: Uuid) -> Result<AthleteProfile, StoreError> {
        self.conn
            .query_row(
                r#"
                SELECT id, name, ftp, max_hr, resting_hr, weight_kg, sleep_need_minutes,
                       zone1_max, zone2_max, zone3_max, zone4_max, zone5_max,
                       created_at, updated_at
                FROM athletes WHERE id = ?1
                "#,
                params![id],
                athlete_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("athlete {}", id)))
    }

    // ---- physio days ----

    pub fn upsert_physio_day(
        &self,
        athlete_id: Uuid,
        record: &DailyPhysioRecord,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO physio_days (
                athlete_id, date, hrv_rmssd, resting_hr, respiratory_rate,
                sleep_duration_minutes, active_minutes, body_temp_delta
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                athlete_id,
                record.date,
                record.hrv_rmssd,
                record.resting_hr,
                record.respiratory_rate,
                record.sleep_duration_minutes,
                record.active_minutes,
                record.body_temp_delta,
            ],
        )?;
        Ok(())
    }

    pub fn physio_range(
        &self,
        athlete_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyPhysioRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT date, hrv_rmssd, resting_hr, respiratory_rate,
                   sleep_duration_minutes, active_minutes, body_temp_delta
            FROM physio_days
            WHERE athlete_id = ?1 AND date >= ?2 AND date <= ?3
            ORDER BY date
            "#,
        )?;

        let rows = stmt.query_map(params![athlete_id, start, end], |row| {
            Ok(DailyPhysioRecord {
                date: row.get("date")?,
                hrv_rmssd: row.get("hrv_rmssd")?,
                resting_hr: row.get("resting_hr")?,
                respiratory_rate: row.get("respiratory_rate")?,
                sleep_duration_minutes: row.get("sleep_duration_minutes")?,
                active_minutes: row.get("active_minutes")?,
                body_temp_delta: row.get("body_temp_delta")?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ---- activities ----

    pub fn store_activity(
        &self,
        athlete_id: Uuid,
        dedup_key: &str,
        activity: &ActivityRecord,
    ) -> Result<(), StoreError> {
        let compressed = activity
            .power_stream
            .as_deref()
            .map(CompressedPowerStream::compress)
            .transpose()?;

        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO activities (
                dedup_key, athlete_id, source, start_time, duration_seconds, sport,
                avg_heart_rate, normalized_power, avg_power, source_tss, name,
                power_stream, power_original_size, power_sample_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                dedup_key,
                athlete_id,
                activity.source.to_string(),
                activity.start_time,
                activity.duration_seconds,
                activity.sport.to_string(),
                activity.avg_heart_rate,
                activity.normalized_power,
                activity.avg_power,
                activity.source_tss.map(|t| t.to_string()),
                activity.name,
                compressed.as_ref().map(|c| c.compressed_data.clone()),
                compressed.as_ref().map(|c| c.original_size as i64),
                compressed.as_ref().map(|c| c.sample_count as i64),
            ],
        )?;
        Ok(())
    }

    /// Activities starting in `[start, end]` (UTC instants), streams
    /// decompressed
    pub fn activities_range(
        &self,
        athlete_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT dedup_key, source, start_time, duration_seconds, sport,
                   avg_heart_rate, normalized_power, avg_power, source_tss, name,
                   power_stream
            FROM activities
            WHERE athlete_id = ?1 AND start_time >= ?2 AND start_time <= ?3
            ORDER BY start_time
            "#,
        )?;

        let rows = stmt.query_map(params![athlete_id, start, end], activity_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // ---- load days ----

    pub fn upsert_load_day(
        &self,
        athlete_id: Uuid,
        record: &DailyLoadRecord,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO load_days (
                athlete_id, date, tss, ctl, atl, tsb, input_count, estimated_inputs
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                athlete_id,
                record.date,
                record.tss.to_string(),
                record.ctl.to_string(),
                record.atl.to_string(),
                record.tsb.to_string(),
                record.input_count,
                record.estimated_inputs,
            ],
        )?;
        Ok(())
    }

    pub fn load_range(
        &self,
        athlete_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyLoadRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT date, tss, ctl, atl, tsb, input_count, estimated_inputs
            FROM load_days
            WHERE athlete_id = ?1 AND date >= ?2 AND date <= ?3
            ORDER BY date
            "#,
        )?;

        let rows = stmt.query_map(params![athlete_id, start, end], load_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Most recent load day strictly before `date`, the backfill seed
    pub fn last_load_before(
        &self,
        athlete_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DailyLoadRecord>, StoreError> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT date, tss, ctl, atl, tsb, input_count, estimated_inputs
                FROM load_days
                WHERE athlete_id = ?1 AND date < ?2
                ORDER BY date DESC
                LIMIT 1
                "#,
                params![athlete_id, date],
                load_from_row,
            )
            .optional()?)
    }

    // ---- score days ----

    /// Confidence-guarded score upsert
    ///
    /// An existing row with strictly higher confidence wins over the new
    /// record unless `force` is set. Read and write happen in one
    /// transaction so concurrent recomputes cannot interleave.
    pub fn upsert_score_guarded(
        &mut self,
        athlete_id: Uuid,
        record: &DailyScoreRecord,
        force: bool,
    ) -> Result<WriteOutcome, StoreError> {
        let tx = self.conn.transaction()?;

        let existing_rank: Option<u8> = tx
            .query_row(
                "SELECT confidence_rank FROM score_days WHERE athlete_id = ?1 AND date = ?2",
                params![athlete_id, record.date],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(rank) = existing_rank {
            let existing = ScoreConfidence::from_rank(rank);
            if !force && existing > record.confidence {
                debug!(
                    date = %record.date,
                    ?existing,
                    incoming = ?record.confidence,
                    "Refusing to downgrade persisted score"
                );
                return Ok(WriteOutcome::SkippedLowerConfidence { existing });
            }
        }

        let breakdown = record
            .breakdown
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        tx.execute(
            r#"
            INSERT OR REPLACE INTO score_days (
                athlete_id, date, recovery, sleep, strain, status, confidence_rank,
                illness_severity, illness_confidence, breakdown, computed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                athlete_id,
                record.date,
                record.recovery,
                record.sleep,
                record.strain,
                record.status.to_string(),
                record.confidence.rank(),
                record.illness_severity.to_string(),
                record.illness_confidence,
                breakdown,
                record.computed_at,
            ],
        )?;

        tx.commit()?;
        Ok(WriteOutcome::Written)
    }

    pub fn load_score(
        &self,
        athlete_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DailyScoreRecord>, StoreError> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT date, recovery, sleep, strain, status, confidence_rank,
                       illness_severity, illness_confidence, breakdown, computed_at
                FROM score_days
                WHERE athlete_id = ?1 AND date = ?2
                "#,
                params![athlete_id, date],
                score_from_row,
            )
            .optional()?)
    }

    pub fn score_range(
        &self,
        athlete_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyScoreRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT date, recovery, sleep, strain, status, confidence_rank,
                   illness_severity, illness_confidence, breakdown, computed_at
            FROM score_days
            WHERE athlete_id = ?1 AND date >= ?2 AND date <= ?3
            ORDER BY date
            "#,
        )?;

        let rows = stmt.query_map(params![athlete_id, start, end], score_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ---- stats ----

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let count = |table: &str| -> Result<i64, StoreError> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?)
        };

        let degraded: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM score_days WHERE confidence_rank < ?1",
            params![ScoreConfidence::Full.rank()],
            |row| row.get(0),
        )?;
        let score_span: Option<(NaiveDate, NaiveDate)> = self
            .conn
            .query_row(
                "SELECT MIN(date), MAX(date) FROM score_days",
                [],
                |row| {
                    Ok(match (row.get::<_, Option<NaiveDate>>(0)?, row.get(1)?) {
                        (Some(min), Some(max)) => Some((min, max)),
                        _ => None,
                    })
                },
            )
            .optional()?
            .flatten();

        Ok(StoreStats {
            athletes: count("athletes")?,
            activities: count("activities")?,
            physio_days: count("physio_days")?,
            load_days: count("load_days")?,
            score_days: count("score_days")?,
            degraded_score_days: degraded,
            score_span,
        })
    }
}

fn athlete_from_row(row: &Row) -> rusqlite::Result<AthleteProfile> {
    let zones = match (
        row.get::<_, Option<u16>>("zone1_max")?,
        row.get::<_, Option<u16>>("zone2_max")?,
        row.get::<_, Option<u16>>("zone3_max")?,
        row.get::<_, Option<u16>>("zone4_max")?,
        row.get::<_, Option<u16>>("zone5_max")?,
    ) {
        (Some(z1), Some(z2), Some(z3), Some(z4), Some(z5)) => Some(HrZones {
            zone1_max: z1,
            zone2_max: z2,
            zone3_max: z3,
            zone4_max: z4,
            zone5_max: z5,
        }),
        _ => None,
    };

    Ok(AthleteProfile {
        id: row.get("id")?,
        name: row.get("name")?,
        ftp: row.get("ftp")?,
        max_hr: row.get("max_hr")?,
        resting_hr: row.get("resting_hr")?,
        weight_kg: row.get("weight_kg")?,
        sleep_need_minutes: row.get("sleep_need_minutes")?,
        hr_zones: zones,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn activity_from_row(row: &Row) -> rusqlite::Result<ActivityRecord> {
    let power_stream = row
        .get::<_, Option<Vec<u8>>>("power_stream")?
        .map(|compressed_data| {
            CompressedPowerStream {
                compressed_data,
                original_size: 0,
                sample_count: 0,
            }
            .decompress()
        })
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Blob,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
            )
        })?;

    Ok(ActivityRecord {
        id: row.get("dedup_key")?,
        source: ProviderKind::from_str(&row.get::<_, String>("source")?)
            .unwrap_or(ProviderKind::Intervals),
        start_time: row.get("start_time")?,
        duration_seconds: row.get("duration_seconds")?,
        sport: Sport::from_str(&row.get::<_, String>("sport")?).unwrap_or(Sport::Other),
        avg_heart_rate: row.get("avg_heart_rate")?,
        normalized_power: row.get("normalized_power")?,
        avg_power: row.get("avg_power")?,
        source_tss: row
            .get::<_, Option<String>>("source_tss")?
            .and_then(|s| s.parse::<Decimal>().ok()),
        power_stream,
        name: row.get("name")?,
    })
}

fn load_from_row(row: &Row) -> rusqlite::Result<DailyLoadRecord> {
    let decimal = |name: &str| -> rusqlite::Result<Decimal> {
        let s: String = row.get(name)?;
        Ok(s.parse::<Decimal>().unwrap_or(Decimal::ZERO))
    };

    Ok(DailyLoadRecord {
        date: row.get("date")?,
        tss: decimal("tss")?,
        ctl: decimal("ctl")?,
        atl: decimal("atl")?,
        tsb: decimal("tsb")?,
        input_count: row.get("input_count")?,
        estimated_inputs: row.get("estimated_inputs")?,
    })
}

fn score_from_row(row: &Row) -> rusqlite::Result<DailyScoreRecord> {
    let breakdown = row
        .get::<_, Option<String>>("breakdown")?
        .and_then(|s| serde_json::from_str::<ScoreBreakdown>(&s).ok());

    Ok(DailyScoreRecord {
        date: row.get("date")?,
        recovery: row.get("recovery")?,
        sleep: row.get("sleep")?,
        strain: row.get("strain")?,
        status: ScoreStatus::from_str(&row.get::<_, String>("status")?)
            .unwrap_or(ScoreStatus::Provisional),
        confidence: ScoreConfidence::from_rank(row.get("confidence_rank")?),
        illness_severity: IllnessSeverity::from_str(&row.get::<_, String>("illness_severity")?)
            .unwrap_or(IllnessSeverity::None),
        illness_confidence: row.get("illness_confidence")?,
        breakdown,
        computed_at: row.get("computed_at")?,
    })
}
