use chrono::{Days, NaiveDate, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use veloscore::models::{ActivityRecord, ProviderKind, Sport};
use veloscore::pmc::PmcCalculator;
use veloscore::providers::dedup_key;
use veloscore::recovery::{RecoveryInputs, RecoveryScorer};
use veloscore::trimp::DayLoadInputs;
use veloscore::wellness::{WellnessDetector, WellnessInputs};
use veloscore::zones::{best_effort, FtpEstimator};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn year_of_training() -> BTreeMap<NaiveDate, DayLoadInputs> {
    (0..365u64)
        .filter(|i| i % 7 != 0)
        .map(|i| {
            let date = start().checked_add_days(Days::new(i)).unwrap();
            (
                date,
                DayLoadInputs {
                    date,
                    tss: Decimal::from(40 + (i % 5) * 25),
                    input_count: 1,
                    estimated_inputs: 0,
                },
            )
        })
        .collect()
}

fn power_activities(count: usize) -> Vec<ActivityRecord> {
    (0..count)
        .map(|i| {
            let stream: Vec<u16> = (0..4000)
                .map(|s| 180 + ((s + i) % 120) as u16)
                .collect();
            ActivityRecord {
                id: format!("ride-{}", i),
                source: ProviderKind::Intervals,
                start_time: Utc
                    .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
                    .unwrap()
                    + chrono::Duration::days(i as i64 * 3),
                duration_seconds: 4000,
                sport: Sport::Cycling,
                avg_heart_rate: Some(155),
                normalized_power: Some(230),
                avg_power: Some(215),
                source_tss: None,
                power_stream: Some(stream),
                name: None,
            }
        })
        .collect()
}

fn bench_load_chain(c: &mut Criterion) {
    let daily = year_of_training();
    let end = start().checked_add_days(Days::new(364)).unwrap();
    let pmc = PmcCalculator::new();

    c.bench_function("expand_load_chain_365_days", |b| {
        b.iter(|| pmc.expand_series(black_box(&daily), start(), end, None))
    });
}

fn bench_mean_max(c: &mut Criterion) {
    let stream: Vec<u16> = (0..7200).map(|s| 180 + (s % 150) as u16).collect();

    c.bench_function("best_effort_20min_of_2h", |b| {
        b.iter(|| best_effort(black_box(&stream), 1200))
    });
}

fn bench_ftp_snapshots(c: &mut Criterion) {
    let activities = power_activities(40);
    let estimator = FtpEstimator::new();
    let tz = chrono::FixedOffset::east_opt(0).unwrap();
    let end = start().checked_add_days(Days::new(120)).unwrap();

    c.bench_function("ftp_snapshot_series_120_days", |b| {
        b.iter(|| estimator.snapshot_series(black_box(&activities), start(), end, tz))
    });
}

fn bench_daily_scoring(c: &mut Criterion) {
    let wellness_inputs = WellnessInputs {
        hrv: Some((38.0, 45.0)),
        resting_hr: Some((55.0, 52.0)),
        respiratory_rate: Some((15.5, 15.0)),
        sleep_score: Some((72.0, 84.0)),
        active_minutes: Some((55.0, 60.0)),
        body_temp_delta: Some(0.1),
    };
    let recovery_inputs = RecoveryInputs {
        hrv: Some((38.0, 45.0)),
        sleep_score: Some(72.0),
        resting_hr: Some((55.0, 52.0)),
        respiratory_rate: Some((15.5, 15.0)),
        tsb: Some(-12.0),
    };
    let detector = WellnessDetector::new();
    let scorer = RecoveryScorer::new();

    c.bench_function("wellness_and_recovery_one_day", |b| {
        b.iter(|| {
            let assessment = detector.assess(black_box(&wellness_inputs));
            scorer.score(black_box(&recovery_inputs), &assessment)
        })
    });
}

fn bench_dedup_key(c: &mut Criterion) {
    let activities = power_activities(1);
    c.bench_function("activity_dedup_key", |b| {
        b.iter(|| dedup_key(black_box(&activities[0])))
    });
}

criterion_group!(
    benches,
    bench_load_chain,
    bench_mean_max,
    bench_ftp_snapshots,
    bench_daily_scoring,
    bench_dedup_key
);
criterion_main!(benches);
