//! Per-day scoring pipeline
//!
//! One pass fetches the day's inputs from the provider chain with
//! bounded concurrent fetches, persists them, and then scores entirely
//! from the store: baselines, sleep, wellness, load chain, recovery,
//! strain. Partial input availability degrades the persisted confidence
//! instead of failing the day, and the final write goes through the
//! store's confidence guard so a degraded recompute can never clobber a
//! complete score.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::baseline::{BaselineResult, BaselineSet, BaselineTracker};
use crate::config::EngineConfig;
use crate::error::{Result, VeloError};
use crate::models::{
    AthleteProfile, DailyLoadRecord, DailyPhysioRecord, DailyScoreRecord, IllnessSeverity,
    ScoreConfidence, ScoreStatus, SleepSession,
};
use crate::pmc::PmcCalculator;
use crate::providers::{dedup_key, ProviderChain};
use crate::recovery::{RecoveryInputs, RecoveryOutcome, RecoveryScorer};
use crate::sleep::{SleepScore, SleepScorer};
use crate::store::{Store, WriteOutcome};
use crate::strain::strain_from_tss;
use crate::summary::DailySummary;
use crate::trimp::TrimpCalculator;
use crate::wellness::{WellnessDetector, WellnessInputs};

/// Result of scoring one day
#[derive(Debug, Clone)]
pub struct DayOutcome {
    pub score: DailyScoreRecord,
    pub load: DailyLoadRecord,
    pub summary: DailySummary,
    pub write: WriteOutcome,
}

/// What one fetch pass brought back
struct FetchReport {
    sleep_sessions: Vec<SleepSession>,
    /// At least one source category failed entirely
    degraded: bool,
}

/// The per-athlete scoring pipeline
///
/// The athlete profile is registered in the store on first use; an
/// already-persisted profile is left untouched.
pub struct ScoringPipeline {
    store: Arc<Mutex<Store>>,
    chain: Arc<ProviderChain>,
    config: EngineConfig,
    athlete: AthleteProfile,
}

impl ScoringPipeline {
    pub fn new(
        store: Arc<Mutex<Store>>,
        chain: Arc<ProviderChain>,
        config: EngineConfig,
        athlete: AthleteProfile,
    ) -> Self {
        ScoringPipeline {
            store,
            chain,
            config,
            athlete,
        }
    }

    pub fn athlete(&self) -> &AthleteProfile {
        &self.athlete
    }

    /// Fetch, persist, and score a single day
    pub async fn score_day(&self, date: NaiveDate, force: bool) -> Result<DayOutcome> {
        let report = self.fetch_and_persist(date).await?;
        self.score_from_store(date, &report.sleep_sessions, report.degraded, force)
            .await
    }

    /// Concurrent bounded fetches for the windows the day's scoring
    /// needs, persisted before scoring starts
    async fn fetch_and_persist(&self, date: NaiveDate) -> Result<FetchReport> {
        // The physio window covers the longest baseline lookback; sleep
        // covers the consistency window; activities only the scoring day
        // itself (earlier days are already in the load chain).
        let physio_start = back(date, self.config.baseline.sleep_window as u64 + 7);
        let sleep_start = back(date, self.config.baseline.consistency_window as u64);

        let (activities, physio, sleep) = tokio::join!(
            self.chain.activities(date, date),
            self.chain.physio(physio_start, date),
            self.chain.sleep(sleep_start, date),
        );

        let mut failures = 0;
        let mut degraded = false;

        let activities = match activities {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, "Activity fetch failed; scoring from persisted activities");
                failures += 1;
                degraded = true;
                Vec::new()
            }
        };
        let physio = match physio {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, "Physio fetch failed; scoring from persisted history");
                failures += 1;
                degraded = true;
                Vec::new()
            }
        };
        let sleep_sessions = match sleep {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, "Sleep fetch failed; scoring without fresh sessions");
                failures += 1;
                degraded = true;
                Vec::new()
            }
        };

        if failures == 3 && !self.chain.is_empty() {
            return Err(VeloError::SourceUnavailable {
                provider: "all".to_string(),
                reason: "every input fetch failed".to_string(),
            });
        }

        let tz = self.config.tz();
        let store = self.store.lock().await;
        store.ensure_athlete(&self.athlete)?;
        for record in &physio {
            store.upsert_physio_day(self.athlete.id, record)?;
        }
        for activity in &activities {
            store.store_activity(self.athlete.id, &dedup_key(activity), activity)?;
        }
        merge_sleep_durations(&store, self.athlete.id, &sleep_sessions, tz)?;
        drop(store);

        Ok(FetchReport {
            sleep_sessions,
            degraded,
        })
    }

    /// Score a day from persisted inputs plus in-memory sleep sessions
    pub async fn score_from_store(
        &self,
        date: NaiveDate,
        sleep_sessions: &[SleepSession],
        degraded: bool,
        force: bool,
    ) -> Result<DayOutcome> {
        let tz = self.config.tz();
        let history_start = back(date, self.config.baseline.sleep_window as u64 + 7);

        let store = self.store.lock().await;
        store.ensure_athlete(&self.athlete)?;
        let history = store.physio_range(self.athlete.id, history_start, date)?;
        let prior_scores = store.score_range(
            self.athlete.id,
            back(date, self.config.baseline.sleep_score_window as u64),
            prev_day(date),
        )?;
        let seed = store.last_load_before(self.athlete.id, date)?;
        let day_activities = store.activities_range(
            self.athlete.id,
            day_window_start(date, tz),
            day_window_end(date, tz),
        )?;
        drop(store);

        let today = history
            .iter()
            .find(|r| r.date == date)
            .cloned()
            .unwrap_or_else(|| DailyPhysioRecord::empty(date));

        let baselines = BaselineSet::compute(&history, date, &self.config.baseline);

        // Sleep first; its score is both an output and a wellness input.
        let sleep_score = self.score_sleep(date, sleep_sessions, tz);

        // Load chain: expand from the last persisted day through today,
        // treating any gap days as rest. Recovery reads the previous
        // day's TSB; today's riding must not move today's readiness.
        let (load, prior_tsb) = self.extend_load_chain(date, &day_activities, seed, tz).await?;

        let wellness = self.assess_wellness(&today, &baselines, &sleep_score, &prior_scores);
        let strain = strain_from_tss(load.tss);

        let recovery_inputs = RecoveryInputs {
            hrv: pair(today.hrv_rmssd, &baselines.hrv),
            sleep_score: sleep_score.as_ref().map(|s| s.score as f64),
            resting_hr: pair(today.resting_hr, &baselines.resting_hr),
            respiratory_rate: pair(today.respiratory_rate, &baselines.respiratory_rate),
            tsb: prior_tsb.and_then(|d| d.to_f64()),
        };

        let scorer = RecoveryScorer::with_config(self.config.recovery.clone());
        let outcome = scorer.score(&recovery_inputs, &wellness);

        let complete = recovery_inputs.resting_hr.is_some()
            && recovery_inputs.respiratory_rate.is_some()
            && !degraded;

        let record = match outcome {
            RecoveryOutcome::InsufficientData { reason } => {
                info!(%date, %reason, "Day has insufficient data for a recovery score");
                let mut record = DailyScoreRecord::insufficient(date);
                record.sleep = sleep_score.as_ref().map(|s| s.score);
                record.strain = Some(strain);
                record.illness_severity = wellness.severity;
                record.illness_confidence = wellness.confidence;
                record
            }
            RecoveryOutcome::IllnessCapped {
                capped_score,
                breakdown,
                ..
            } => DailyScoreRecord {
                date,
                recovery: Some(capped_score),
                sleep: sleep_score.as_ref().map(|s| s.score),
                strain: Some(strain),
                status: ScoreStatus::IllnessFlagged,
                confidence: if complete {
                    ScoreConfidence::Full
                } else {
                    ScoreConfidence::Partial
                },
                illness_severity: wellness.severity,
                illness_confidence: wellness.confidence,
                breakdown: Some(breakdown),
                computed_at: Utc::now(),
            },
            RecoveryOutcome::Scored(scored) => DailyScoreRecord {
                date,
                recovery: Some(scored.score),
                sleep: sleep_score.as_ref().map(|s| s.score),
                strain: Some(strain),
                status: if complete {
                    ScoreStatus::Final
                } else {
                    ScoreStatus::Provisional
                },
                confidence: if complete {
                    ScoreConfidence::Full
                } else {
                    ScoreConfidence::Partial
                },
                illness_severity: wellness.severity,
                illness_confidence: wellness.confidence,
                breakdown: Some(scored.breakdown),
                computed_at: Utc::now(),
            },
        };

        let mut store = self.store.lock().await;
        let write = store.upsert_score_guarded(self.athlete.id, &record, force)?;
        drop(store);

        if let WriteOutcome::SkippedLowerConfidence { existing } = write {
            debug!(%date, ?existing, "Persisted score kept over lower-confidence recompute");
        }

        let hrv_delta = delta_pct(today.hrv_rmssd, &baselines.hrv);
        let rhr_delta = delta_pct(today.resting_hr, &baselines.resting_hr);
        let summary = DailySummary::assemble(&record, &load, hrv_delta, rhr_delta);

        Ok(DayOutcome {
            score: record,
            load,
            summary,
            write,
        })
    }

    fn score_sleep(
        &self,
        date: NaiveDate,
        sessions: &[SleepSession],
        tz: chrono::FixedOffset,
    ) -> Option<SleepScore> {
        let tonight = sessions.iter().find(|s| s.sleep_date(tz) == date)?;
        let recent: Vec<SleepSession> = sessions
            .iter()
            .filter(|s| s.sleep_date(tz) < date)
            .cloned()
            .collect();

        let scorer = SleepScorer::with_config(self.config.sleep.clone());
        match scorer.score(tonight, self.athlete.sleep_need_minutes, &recent, tz) {
            Ok(score) => Some(score),
            Err(err) => {
                warn!(%date, %err, "Sleep session could not be scored");
                None
            }
        }
    }

    /// Extend the persisted load chain through `date`
    ///
    /// Returns the day's record and the previous day's TSB (the seed's
    /// when the chain resumes right behind `date`, None on a cold
    /// start), which is what the recovery composite reads.
    async fn extend_load_chain(
        &self,
        date: NaiveDate,
        day_activities: &[crate::models::ActivityRecord],
        seed: Option<DailyLoadRecord>,
        tz: chrono::FixedOffset,
    ) -> Result<(DailyLoadRecord, Option<Decimal>)> {
        let calculator = TrimpCalculator::with_config(self.config.trimp.clone());
        let daily = calculator.daily_totals(day_activities, &self.athlete, tz);

        let (start, seed_state, seed_tsb) = match seed {
            Some(prev) => {
                let start = prev
                    .date
                    .checked_add_days(Days::new(1))
                    .ok_or(VeloError::SequenceGap { date })?;
                if start < date {
                    debug!(
                        from = %prev.date,
                        to = %date,
                        "Load chain gap; intervening days treated as rest"
                    );
                }
                (start, Some((prev.ctl, prev.atl)), Some(prev.tsb))
            }
            None => (date, None, None),
        };

        let pmc = PmcCalculator::with_config(&self.config.pmc);
        let series = pmc.expand_series(&bounded(daily, date), start, date, seed_state);

        let store = self.store.lock().await;
        for record in &series {
            store.upsert_load_day(self.athlete.id, record)?;
        }
        drop(store);

        let prior_tsb = if series.len() >= 2 {
            Some(series[series.len() - 2].tsb)
        } else {
            seed_tsb
        };

        let today = series
            .into_iter()
            .last()
            .ok_or(VeloError::SequenceGap { date })?;
        Ok((today, prior_tsb))
    }

    fn assess_wellness(
        &self,
        today: &DailyPhysioRecord,
        baselines: &BaselineSet,
        sleep_score: &Option<SleepScore>,
        prior_scores: &[DailyScoreRecord],
    ) -> crate::wellness::WellnessAssessment {
        let tracker = BaselineTracker::new(self.config.baseline.min_samples);
        let past_sleep: Vec<f64> = prior_scores
            .iter()
            .filter_map(|r| r.sleep)
            .map(f64::from)
            .collect();
        let sleep_baseline = tracker.from_values(&past_sleep).mean();

        let inputs = WellnessInputs {
            hrv: pair(today.hrv_rmssd, &baselines.hrv),
            resting_hr: pair(today.resting_hr, &baselines.resting_hr),
            respiratory_rate: pair(today.respiratory_rate, &baselines.respiratory_rate),
            sleep_score: match (sleep_score, sleep_baseline) {
                (Some(score), Some(baseline)) => Some((score.score as f64, baseline)),
                _ => None,
            },
            active_minutes: pair(today.active_minutes, &baselines.active_minutes),
            body_temp_delta: today.body_temp_delta,
        };

        WellnessDetector::with_config(self.config.wellness.clone()).assess(&inputs)
    }

    /// Scores over a date range, for trends and export
    pub async fn score_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyScoreRecord>> {
        let store = self.store.lock().await;
        Ok(store.score_range(self.athlete.id, start, end)?)
    }

    /// Load-chain records over a date range
    pub async fn load_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyLoadRecord>> {
        let store = self.store.lock().await;
        Ok(store.load_range(self.athlete.id, start, end)?)
    }
}

/// Fill physio days' sleep duration from sessions
///
/// Sleep sessions are not persisted as rows; when a day's physio record
/// carries no duration, the session's asleep minutes fill it. A
/// duration the sample stream already provided wins. Returns how many
/// days were filled.
pub fn merge_sleep_durations(
    store: &Store,
    athlete_id: uuid::Uuid,
    sessions: &[SleepSession],
    tz: chrono::FixedOffset,
) -> Result<usize> {
    let mut filled = 0usize;
    for session in sessions {
        let day = session.sleep_date(tz);
        let mut existing = store
            .physio_range(athlete_id, day, day)?
            .into_iter()
            .next()
            .unwrap_or_else(|| DailyPhysioRecord::empty(day));
        if existing.sleep_duration_minutes.is_none() {
            existing.sleep_duration_minutes = Some(session.asleep_minutes());
            store.upsert_physio_day(athlete_id, &existing)?;
            filled += 1;
        }
    }
    Ok(filled)
}

fn back(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(date)
}

fn prev_day(date: NaiveDate) -> NaiveDate {
    back(date, 1)
}

/// Pair a present value with a sufficient baseline
fn pair(value: Option<f64>, baseline: &BaselineResult) -> Option<(f64, f64)> {
    match (value, baseline.mean()) {
        (Some(v), Some(mean)) => Some((v, mean)),
        _ => None,
    }
}

fn delta_pct(value: Option<f64>, baseline: &BaselineResult) -> Option<f64> {
    pair(value, baseline)
        .filter(|(_, mean)| *mean != 0.0)
        .map(|(v, mean)| (v - mean) / mean * 100.0)
}

/// Keep only entries up to `date`; a provider may return records past
/// the scoring day
fn bounded(
    daily: BTreeMap<NaiveDate, crate::trimp::DayLoadInputs>,
    date: NaiveDate,
) -> BTreeMap<NaiveDate, crate::trimp::DayLoadInputs> {
    daily.into_iter().filter(|(d, _)| *d <= date).collect()
}

/// UTC instant where the athlete's local day begins
fn day_window_start(date: NaiveDate, tz: chrono::FixedOffset) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_local_timezone(tz)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| DateTime::<Utc>::from_naive_utc_and_offset(
            date.and_hms_opt(0, 0, 0).expect("midnight is a valid time"),
            Utc,
        ))
}

/// UTC instant where the athlete's local day ends
fn day_window_end(date: NaiveDate, tz: chrono::FixedOffset) -> DateTime<Utc> {
    day_window_start(date, tz) + chrono::Duration::days(1) - chrono::Duration::seconds(1)
}
