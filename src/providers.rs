//! Data source abstraction and the ordered fallback chain
//!
//! Providers hand the engine already-normalized records; nothing here
//! knows about any vendor's wire format. The chain tries sources in
//! configured priority order with a bounded per-fetch timeout: the first
//! source that returns data wins, a failing or slow source is skipped
//! with a warning, and only a chain where every source failed surfaces
//! an error. Backfill instead merges all sources and deduplicates.

use async_trait::async_trait;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, VeloError};
use crate::models::{ActivityRecord, DailyPhysioRecord, ProviderKind, SleepSession};

/// A source of normalized activity and health data
#[async_trait]
pub trait DataProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Workouts whose local date falls in `[start, end]`
    async fn fetch_activities(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ActivityRecord>>;

    /// Daily physiological samples for `[start, end]`
    async fn fetch_physio(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyPhysioRecord>>;

    /// Sleep sessions waking in `[start, end]`
    async fn fetch_sleep(&self, start: NaiveDate, end: NaiveDate)
        -> Result<Vec<SleepSession>>;
}

/// Stable identity for an activity across sources
///
/// Different platforms report the same ride with different native IDs
/// and sub-minute timing jitter, so the key hashes the start bucketed
/// to two minutes, the duration bucketed to 30 seconds, and the sport.
/// The start bucket is wider than the jitter it absorbs; a per-minute
/// bucket let reports seconds apart straddle a boundary and escape.
pub fn dedup_key(activity: &ActivityRecord) -> String {
    let start_bucket = activity.start_time.timestamp() / 120;
    let duration_bucket = activity.duration_seconds / 30;

    let mut hasher = Sha256::new();
    hasher.update(start_bucket.to_le_bytes());
    hasher.update(duration_bucket.to_le_bytes());
    hasher.update(activity.sport.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Walk the chain in priority order, returning the first non-empty
/// fetch. Every source empty is a valid empty answer; every source
/// failing is an error.
macro_rules! first_nonempty {
    ($chain:expr, $start:expr, $end:expr, $method:ident) => {{
        let mut last_error: Option<VeloError> = None;
        let mut any_succeeded = false;
        let mut found = None;

        for provider in &$chain.providers {
            let kind = provider.kind();
            match tokio::time::timeout($chain.fetch_timeout, provider.$method($start, $end))
                .await
            {
                Ok(Ok(records)) if !records.is_empty() => {
                    debug!(provider = %kind, count = records.len(), "Provider satisfied fetch");
                    found = Some(records);
                    break;
                }
                Ok(Ok(_)) => {
                    any_succeeded = true;
                    debug!(provider = %kind, "Provider returned no data; falling through");
                }
                Ok(Err(err)) => {
                    warn!(provider = %kind, %err, "Provider failed; falling through");
                    last_error = Some(err);
                }
                Err(_) => {
                    warn!(provider = %kind, "Provider timed out; falling through");
                    last_error = Some(VeloError::SourceUnavailable {
                        provider: kind.to_string(),
                        reason: format!("timed out after {:?}", $chain.fetch_timeout),
                    });
                }
            }
        }

        match found {
            Some(records) => Ok(records),
            None if any_succeeded || $chain.providers.is_empty() => Ok(Vec::new()),
            None => Err(last_error.unwrap_or(VeloError::SourceUnavailable {
                provider: "all".to_string(),
                reason: "no providers configured".to_string(),
            })),
        }
    }};
}

/// Ordered provider chain with per-fetch timeouts
pub struct ProviderChain {
    providers: Vec<Arc<dyn DataProvider>>,
    fetch_timeout: Duration,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn DataProvider>>, fetch_timeout: Duration) -> Self {
        ProviderChain {
            providers,
            fetch_timeout,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Activities from the first source that has any
    pub async fn activities(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ActivityRecord>> {
        first_nonempty!(self, start, end, fetch_activities)
    }

    /// Physio records from the first source that has any
    pub async fn physio(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyPhysioRecord>> {
        first_nonempty!(self, start, end, fetch_physio)
    }

    /// Sleep sessions from the first source that has any
    pub async fn sleep(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<SleepSession>> {
        first_nonempty!(self, start, end, fetch_sleep)
    }

    /// Activities from every source, deduplicated
    ///
    /// On a key collision the record from the higher-priority (earlier)
    /// source is kept. Sources that fail are skipped, as in the
    /// first-non-empty path.
    pub async fn activities_merged(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ActivityRecord>> {
        let mut merged: Vec<ActivityRecord> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut any_succeeded = false;

        for provider in &self.providers {
            let fetched = tokio::time::timeout(
                self.fetch_timeout,
                provider.fetch_activities(start, end),
            )
            .await;

            match fetched {
                Ok(Ok(records)) => {
                    any_succeeded = true;
                    for record in records {
                        if seen.insert(dedup_key(&record)) {
                            merged.push(record);
                        } else {
                            debug!(
                                id = %record.id,
                                source = %record.source,
                                "Dropping duplicate activity from lower-priority source"
                            );
                        }
                    }
                }
                Ok(Err(err)) => {
                    warn!(provider = %provider.kind(), %err, "Provider failed; continuing merge");
                }
                Err(_) => {
                    warn!(provider = %provider.kind(), "Provider timed out; continuing merge");
                }
            }
        }

        if !any_succeeded && !self.providers.is_empty() {
            return Err(VeloError::SourceUnavailable {
                provider: "all".to_string(),
                reason: "every provider in the chain failed".to_string(),
            });
        }

        merged.sort_by_key(|a| a.start_time);
        Ok(merged)
    }
}

/// In-memory provider for tests and demos
#[derive(Default)]
pub struct StaticProvider {
    pub kind: Option<ProviderKind>,
    pub activities: Vec<ActivityRecord>,
    pub physio: Vec<DailyPhysioRecord>,
    pub sleep: Vec<SleepSession>,
}

impl StaticProvider {
    pub fn new(kind: ProviderKind) -> Self {
        StaticProvider {
            kind: Some(kind),
            ..Default::default()
        }
    }
}

#[async_trait]
impl DataProvider for StaticProvider {
    fn kind(&self) -> ProviderKind {
        self.kind.unwrap_or(ProviderKind::Intervals)
    }

    async fn fetch_activities(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ActivityRecord>> {
        let tz = chrono::FixedOffset::east_opt(0).expect("UTC offset");
        Ok(self
            .activities
            .iter()
            .filter(|a| {
                let d = a.local_date(tz);
                d >= start && d <= end
            })
            .cloned()
            .collect())
    }

    async fn fetch_physio(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyPhysioRecord>> {
        Ok(self
            .physio
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .cloned()
            .collect())
    }

    async fn fetch_sleep(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SleepSession>> {
        let tz = chrono::FixedOffset::east_opt(0).expect("UTC offset");
        Ok(self
            .sleep
            .iter()
            .filter(|s| {
                let d = s.sleep_date(tz);
                d >= start && d <= end
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sport;
    use chrono::{TimeZone, Utc};

    struct FailingProvider;

    #[async_trait]
    impl DataProvider for FailingProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Strava
        }

        async fn fetch_activities(
            &self,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<ActivityRecord>> {
            Err(VeloError::SourceUnavailable {
                provider: "strava".to_string(),
                reason: "503".to_string(),
            })
        }

        async fn fetch_physio(
            &self,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<DailyPhysioRecord>> {
            Err(VeloError::SourceUnavailable {
                provider: "strava".to_string(),
                reason: "503".to_string(),
            })
        }

        async fn fetch_sleep(
            &self,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<SleepSession>> {
            Err(VeloError::SourceUnavailable {
                provider: "strava".to_string(),
                reason: "503".to_string(),
            })
        }
    }

    fn activity(id: &str, source: ProviderKind, day: u32, hour: u32) -> ActivityRecord {
        ActivityRecord {
            id: id.to_string(),
            source,
            start_time: Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap(),
            duration_seconds: 3600,
            sport: Sport::Cycling,
            avg_heart_rate: None,
            normalized_power: None,
            avg_power: None,
            source_tss: None,
            power_stream: None,
            name: None,
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_first_nonempty_respects_priority() {
        let mut first = StaticProvider::new(ProviderKind::Intervals);
        first.activities = vec![activity("i1", ProviderKind::Intervals, 10, 9)];
        let mut second = StaticProvider::new(ProviderKind::Strava);
        second.activities = vec![activity("s1", ProviderKind::Strava, 10, 9)];

        let chain = ProviderChain::new(vec![Arc::new(first), Arc::new(second)], timeout());
        let result = chain.activities(date(10), date(10)).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "i1");
    }

    #[tokio::test]
    async fn test_failed_provider_falls_through() {
        let mut backup = StaticProvider::new(ProviderKind::HealthKit);
        backup.activities = vec![activity("h1", ProviderKind::HealthKit, 10, 9)];

        let chain = ProviderChain::new(
            vec![Arc::new(FailingProvider), Arc::new(backup)],
            timeout(),
        );
        let result = chain.activities(date(10), date(10)).await.unwrap();
        assert_eq!(result[0].id, "h1");
    }

    #[tokio::test]
    async fn test_all_failed_is_error() {
        let chain = ProviderChain::new(vec![Arc::new(FailingProvider)], timeout());
        let err = chain.activities(date(10), date(10)).await.unwrap_err();
        assert!(matches!(err, VeloError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_all_empty_is_ok_empty() {
        let chain = ProviderChain::new(
            vec![Arc::new(StaticProvider::new(ProviderKind::Intervals))],
            timeout(),
        );
        let result = chain.activities(date(10), date(10)).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_merge_dedups_across_sources() {
        // The same ride reported by both platforms with 20s of timing
        // jitter, plus one ride only the secondary source has.
        let mut primary = StaticProvider::new(ProviderKind::Intervals);
        primary.activities = vec![activity("i1", ProviderKind::Intervals, 10, 9)];
        let mut secondary = StaticProvider::new(ProviderKind::Strava);
        let mut dup = activity("s1", ProviderKind::Strava, 10, 9);
        dup.start_time += chrono::Duration::seconds(20);
        dup.duration_seconds = 3610;
        secondary.activities = vec![dup, activity("s2", ProviderKind::Strava, 11, 9)];

        let chain = ProviderChain::new(vec![Arc::new(primary), Arc::new(secondary)], timeout());
        let merged = chain.activities_merged(date(10), date(11)).await.unwrap();

        assert_eq!(merged.len(), 2);
        assert!(merged.iter().any(|a| a.id == "i1"));
        assert!(merged.iter().any(|a| a.id == "s2"));
        assert!(!merged.iter().any(|a| a.id == "s1"));
    }

    #[test]
    fn test_dedup_key_tolerates_jitter() {
        let a = activity("a", ProviderKind::Intervals, 10, 9);
        let mut b = activity("b", ProviderKind::Strava, 10, 9);
        b.start_time += chrono::Duration::seconds(20);
        b.duration_seconds = 3615;
        assert_eq!(dedup_key(&a), dedup_key(&b));

        let c = activity("c", ProviderKind::Strava, 10, 10);
        assert_ne!(dedup_key(&a), dedup_key(&c));
    }

    #[test]
    fn test_dedup_key_spans_minute_boundary() {
        // 40s of jitter straddling a minute boundary must still collapse.
        let mut a = activity("a", ProviderKind::Intervals, 10, 9);
        a.start_time += chrono::Duration::seconds(50);
        let mut b = activity("b", ProviderKind::Strava, 10, 9);
        b.start_time += chrono::Duration::seconds(90);
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }
}
