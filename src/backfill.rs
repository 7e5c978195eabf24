//! Windowed backfill and reconciliation
//!
//! A backfill pass fetches activities from every configured source at
//! once (merged and deduplicated, unlike the daily first-non-empty
//! path), rebuilds the load chain forward from the last persisted day
//! before the window, and refreshes each day's score through the
//! confidence guard. The pass is idempotent: re-running it over the
//! same window writes the same rows.

use chrono::{Days, NaiveDate};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{Result, VeloError};
use crate::models::AthleteProfile;
use crate::pipeline::{merge_sleep_durations, ScoringPipeline};
use crate::pmc::PmcCalculator;
use crate::providers::{dedup_key, ProviderChain};
use crate::store::{Store, WriteOutcome};
use crate::trimp::TrimpCalculator;

/// What one backfill pass did
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackfillReport {
    /// Days in the window
    pub days: usize,
    /// Activities fetched across all sources after dedup
    pub activities: usize,
    /// Scores written
    pub written: usize,
    /// Scores left untouched by the confidence guard
    pub skipped: usize,
    /// Days that could not be scored at all
    pub failed: usize,
}

/// Multi-day reconciliation job
pub struct BackfillJob {
    store: Arc<Mutex<Store>>,
    chain: Arc<ProviderChain>,
    config: EngineConfig,
    athlete: AthleteProfile,
    pipeline: ScoringPipeline,
}

impl BackfillJob {
    pub fn new(
        store: Arc<Mutex<Store>>,
        chain: Arc<ProviderChain>,
        config: EngineConfig,
        athlete: AthleteProfile,
    ) -> Self {
        let pipeline = ScoringPipeline::new(
            Arc::clone(&store),
            Arc::clone(&chain),
            config.clone(),
            athlete.clone(),
        );
        BackfillJob {
            store,
            chain,
            config,
            athlete,
            pipeline,
        }
    }

    /// Backfill the `window_days` days ending at `end` inclusive
    ///
    /// `progress` is called after each scored day with (done, total).
    pub async fn run(
        &self,
        end: NaiveDate,
        window_days: u16,
        force: bool,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<BackfillReport> {
        if window_days == 0 {
            return Ok(BackfillReport::default());
        }
        let start = end
            .checked_sub_days(Days::new(window_days as u64 - 1))
            .ok_or(VeloError::Validation(format!(
                "backfill window of {} days before {} underflows",
                window_days, end
            )))?;

        info!(%start, %end, "Starting backfill");

        // Merged fetch: every source contributes, duplicates collapse on
        // the cross-source key.
        let activities = self.chain.activities_merged(start, end).await?;
        let physio_start = start
            .checked_sub_days(Days::new(self.config.baseline.sleep_window as u64 + 7))
            .unwrap_or(start);
        let physio = match self.chain.physio(physio_start, end).await {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, "Physio fetch failed during backfill; using persisted history");
                Vec::new()
            }
        };
        let sleep_start = start
            .checked_sub_days(Days::new(self.config.baseline.consistency_window as u64))
            .unwrap_or(start);
        let sleep_sessions = match self.chain.sleep(sleep_start, end).await {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, "Sleep fetch failed during backfill; scoring without sessions");
                Vec::new()
            }
        };

        {
            let store = self.store.lock().await;
            store.ensure_athlete(&self.athlete)?;
            for record in &physio {
                store.upsert_physio_day(self.athlete.id, record)?;
            }
            for activity in &activities {
                store.store_activity(self.athlete.id, &dedup_key(activity), activity)?;
            }
            merge_sleep_durations(&store, self.athlete.id, &sleep_sessions, self.config.tz())?;
        }

        self.rebuild_loads(start, end).await?;

        let total = days_between(start, end);
        let mut report = BackfillReport {
            days: total,
            activities: activities.len(),
            ..BackfillReport::default()
        };

        let mut date = start;
        let mut done = 0usize;
        while date <= end {
            match self
                .pipeline
                .score_from_store(date, &sleep_sessions, false, force)
                .await
            {
                Ok(outcome) => match outcome.write {
                    WriteOutcome::Written => report.written += 1,
                    WriteOutcome::SkippedLowerConfidence { .. } => report.skipped += 1,
                },
                Err(err) => {
                    warn!(%date, %err, "Backfill could not score day");
                    report.failed += 1;
                }
            }
            done += 1;
            progress(done, total);
            date = match date.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
        }

        info!(
            days = report.days,
            written = report.written,
            skipped = report.skipped,
            failed = report.failed,
            "Backfill finished"
        );
        Ok(report)
    }

    /// Recompute the load chain and scores from persisted activities
    ///
    /// For retroactive edits (a corrected TSS, a late-arriving ride that
    /// was stored after its day was scored): no fetching, just a forward
    /// rebuild from `from` through `end`.
    pub async fn recompute_from(
        &self,
        from: NaiveDate,
        end: NaiveDate,
        force: bool,
    ) -> Result<BackfillReport> {
        if from > end {
            return Err(VeloError::Validation(format!(
                "recompute range {}..{} is inverted",
                from, end
            )));
        }

        info!(%from, %end, "Recomputing load chain from persisted activities");
        self.rebuild_loads(from, end).await?;

        let mut report = BackfillReport {
            days: days_between(from, end),
            ..BackfillReport::default()
        };

        let mut date = from;
        while date <= end {
            match self.pipeline.score_from_store(date, &[], true, force).await {
                Ok(outcome) => match outcome.write {
                    WriteOutcome::Written => report.written += 1,
                    WriteOutcome::SkippedLowerConfidence { .. } => report.skipped += 1,
                },
                Err(err) => {
                    warn!(%date, %err, "Recompute could not score day");
                    report.failed += 1;
                }
            }
            date = match date.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
        }

        Ok(report)
    }

    /// Rebuild the load chain over `[start, end]` from stored activities
    async fn rebuild_loads(&self, start: NaiveDate, end: NaiveDate) -> Result<()> {
        let tz = self.config.tz();

        // Widen the UTC query by a day on each side so timezone offsets
        // cannot drop an activity at the window edge.
        let utc_start = start
            .checked_sub_days(Days::new(1))
            .unwrap_or(start)
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time")
            .and_utc();
        let utc_end = end
            .checked_add_days(Days::new(1))
            .unwrap_or(end)
            .and_hms_opt(23, 59, 59)
            .expect("end of day is a valid time")
            .and_utc();

        let store = self.store.lock().await;
        store.ensure_athlete(&self.athlete)?;
        let activities = store.activities_range(self.athlete.id, utc_start, utc_end)?;
        let seed = store.last_load_before(self.athlete.id, start)?;
        drop(store);

        let calculator = TrimpCalculator::with_config(self.config.trimp.clone());
        let daily: std::collections::BTreeMap<_, _> = calculator
            .daily_totals(&activities, &self.athlete, tz)
            .into_iter()
            .filter(|(d, _)| *d >= start && *d <= end)
            .collect();

        let pmc = PmcCalculator::with_config(&self.config.pmc);
        let series = pmc.expand_series(&daily, start, end, seed.map(|s| (s.ctl, s.atl)));

        let store = self.store.lock().await;
        for record in &series {
            store.upsert_load_day(self.athlete.id, record)?;
        }
        Ok(())
    }
}

fn days_between(start: NaiveDate, end: NaiveDate) -> usize {
    (end - start).num_days().max(0) as usize + 1
}
