//! End-to-end scoring scenarios through the public pipeline API

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use veloscore::config::EngineConfig;
use veloscore::models::{
    ActivityRecord, AthleteProfile, DailyPhysioRecord, IllnessSeverity, ProviderKind,
    ScoreStatus, SleepSession, SleepStage, SleepStageSegment, Sport,
};
use veloscore::pipeline::ScoringPipeline;
use veloscore::providers::{ProviderChain, StaticProvider};
use veloscore::store::Store;

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn utc(d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, d, h, mi, 0).unwrap()
}

fn physio(d: u32) -> DailyPhysioRecord {
    DailyPhysioRecord {
        hrv_rmssd: Some(45.0),
        resting_hr: Some(52.0),
        respiratory_rate: Some(15.0),
        sleep_duration_minutes: Some(460.0),
        active_minutes: Some(60.0),
        body_temp_delta: None,
        ..DailyPhysioRecord::empty(date(d))
    }
}

fn good_session(d: u32) -> SleepSession {
    SleepSession {
        bedtime: utc(d - 1, 23, 0),
        wake_time: utc(d, 7, 0),
        stages: vec![
            SleepStageSegment {
                stage: SleepStage::Core,
                start: utc(d - 1, 23, 0),
                end: utc(d, 2, 30),
            },
            SleepStageSegment {
                stage: SleepStage::Deep,
                start: utc(d, 2, 30),
                end: utc(d, 4, 0),
            },
            SleepStageSegment {
                stage: SleepStage::Rem,
                start: utc(d, 4, 0),
                end: utc(d, 5, 30),
            },
            SleepStageSegment {
                stage: SleepStage::Core,
                start: utc(d, 5, 30),
                end: utc(d, 7, 0),
            },
        ],
    }
}

fn athlete() -> AthleteProfile {
    let mut athlete = AthleteProfile::new("Scenario");
    athlete.ftp = Some(250);
    athlete.max_hr = Some(190);
    athlete.resting_hr = Some(50);
    athlete
}

fn pipeline_with(provider: StaticProvider) -> ScoringPipeline {
    let store = Arc::new(Mutex::new(Store::in_memory().unwrap()));
    let chain = Arc::new(ProviderChain::new(
        vec![Arc::new(provider)],
        Duration::from_secs(5),
    ));
    ScoringPipeline::new(store, chain, EngineConfig::default(), athlete())
}

fn healthy_history(through: u32) -> StaticProvider {
    let mut provider = StaticProvider::new(ProviderKind::Intervals);
    provider.physio = (1..=through).map(physio).collect();
    provider.sleep = (2..=through).map(good_session).collect();
    provider
}

/// An HRV spike after hard training with otherwise healthy signals is
/// super-compensation, not illness: it must not flag or cap the score.
#[tokio::test]
async fn hrv_supercompensation_is_not_illness() {
    let mut provider = healthy_history(12);
    // +111% HRV, everything else at baseline.
    provider.physio.last_mut().unwrap().hrv_rmssd = Some(95.0);

    let outcome = pipeline_with(provider)
        .score_day(date(12), false)
        .await
        .unwrap();

    assert_eq!(outcome.score.illness_severity, IllnessSeverity::None);
    assert_ne!(outcome.score.status, ScoreStatus::IllnessFlagged);
    assert!(outcome.score.recovery.unwrap() >= 80);
}

/// Broad autonomic suppression (HRV down, RHR and respiratory rate up,
/// temperature elevated) is the illness pattern: high severity, recovery
/// capped, day flagged.
#[tokio::test]
async fn illness_pattern_caps_recovery() {
    let mut provider = healthy_history(12);
    let sick = provider.physio.last_mut().unwrap();
    sick.hrv_rmssd = Some(33.0); // -27%
    sick.resting_hr = Some(57.0); // +9.6%
    sick.respiratory_rate = Some(16.8); // +12%
    sick.body_temp_delta = Some(0.6);

    let outcome = pipeline_with(provider)
        .score_day(date(12), false)
        .await
        .unwrap();

    assert_eq!(outcome.score.illness_severity, IllnessSeverity::High);
    assert_eq!(outcome.score.status, ScoreStatus::IllnessFlagged);
    assert!(outcome.score.recovery.unwrap() <= 40);
    assert!(outcome.score.illness_confidence >= 0.6);
    assert!(outcome.summary.guidance.contains("illness"));
}

/// An activity with no source TSS, no power, and no heart rate falls all
/// the way to the duration-only estimate and is marked as such.
#[tokio::test]
async fn duration_only_fallback_estimates_load() {
    let mut provider = healthy_history(12);
    provider.activities = vec![ActivityRecord {
        id: "walk-1".to_string(),
        source: ProviderKind::HealthKit,
        start_time: utc(12, 9, 0),
        duration_seconds: 3523,
        sport: Sport::Walking,
        avg_heart_rate: None,
        normalized_power: None,
        avg_power: None,
        source_tss: None,
        power_stream: None,
        name: None,
    }];

    let outcome = pipeline_with(provider)
        .score_day(date(12), false)
        .await
        .unwrap();

    // 3523s is 58.72 min; at the assumed 0.6 intensity that is ~35.2 TSS.
    let tss = outcome.load.tss.to_f64().unwrap();
    assert!((tss - 35.23).abs() < 0.01, "tss = {}", tss);
    assert_eq!(outcome.load.input_count, 1);
    assert_eq!(outcome.load.estimated_inputs, 1);
}

/// The priority cascade never mixes methods: a source-provided TSS wins
/// even when power and heart rate are also present.
#[tokio::test]
async fn source_tss_wins_over_other_inputs() {
    let mut provider = healthy_history(12);
    provider.activities = vec![ActivityRecord {
        id: "ride-1".to_string(),
        source: ProviderKind::Intervals,
        start_time: utc(12, 9, 0),
        duration_seconds: 3600,
        sport: Sport::Cycling,
        avg_heart_rate: Some(165),
        normalized_power: Some(240),
        avg_power: Some(225),
        source_tss: Some(dec!(92.5)),
        power_stream: None,
        name: None,
    }];

    let outcome = pipeline_with(provider)
        .score_day(date(12), false)
        .await
        .unwrap();

    assert_eq!(outcome.load.tss, dec!(92.5));
    assert_eq!(outcome.load.estimated_inputs, 0);
}

/// Days between scored days are rest days: the chain stays dense and the
/// TSB identity holds on every record.
#[tokio::test]
async fn gap_days_decay_the_chain() {
    let mut provider = healthy_history(20);
    provider.activities = vec![
        ride(10, dec!(100)),
        ride(16, dec!(100)),
    ];

    let pipeline = pipeline_with(provider);
    pipeline.score_day(date(10), false).await.unwrap();
    pipeline.score_day(date(16), false).await.unwrap();

    let loads = pipeline.load_history(date(10), date(16)).await.unwrap();
    assert_eq!(loads.len(), 7);
    for pair in loads.windows(2) {
        assert_eq!(
            pair[1].date,
            pair[0].date.checked_add_days(Days::new(1)).unwrap()
        );
    }
    for load in &loads {
        assert_eq!(load.tsb, load.ctl - load.atl);
    }
    // ATL decayed across the five rest days.
    assert!(loads[5].atl < loads[0].atl);
    assert_eq!(loads[3].tss, rust_decimal::Decimal::ZERO);
}

/// A restless night scores visibly below a sound one.
#[tokio::test]
async fn restless_night_scores_below_sound_one() {
    let sound = pipeline_with(healthy_history(12))
        .score_day(date(12), false)
        .await
        .unwrap();

    let mut provider = healthy_history(12);
    let restless = SleepSession {
        bedtime: utc(11, 23, 30),
        wake_time: utc(12, 5, 30),
        stages: vec![
            SleepStageSegment {
                stage: SleepStage::Core,
                start: utc(11, 23, 30),
                end: utc(12, 1, 0),
            },
            SleepStageSegment {
                stage: SleepStage::Awake,
                start: utc(12, 1, 0),
                end: utc(12, 1, 30),
            },
            SleepStageSegment {
                stage: SleepStage::Core,
                start: utc(12, 1, 30),
                end: utc(12, 3, 0),
            },
            SleepStageSegment {
                stage: SleepStage::Awake,
                start: utc(12, 3, 0),
                end: utc(12, 3, 20),
            },
            SleepStageSegment {
                stage: SleepStage::Core,
                start: utc(12, 3, 20),
                end: utc(12, 5, 30),
            },
        ],
    };
    let last = provider.sleep.len() - 1;
    provider.sleep[last] = restless;

    let rough = pipeline_with(provider)
        .score_day(date(12), false)
        .await
        .unwrap();

    assert!(rough.score.sleep.unwrap() + 15 <= sound.score.sleep.unwrap());
}

fn ride(d: u32, tss: rust_decimal::Decimal) -> ActivityRecord {
    ActivityRecord {
        id: format!("ride-{}", d),
        source: ProviderKind::Intervals,
        start_time: utc(d, 9, 0),
        duration_seconds: 3600,
        sport: Sport::Cycling,
        avg_heart_rate: Some(150),
        normalized_power: None,
        avg_power: None,
        source_tss: Some(tss),
        power_stream: None,
        name: None,
    }
}
