//! Invariant checks over generated inputs

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use veloscore::baseline::BaselineTracker;
use veloscore::models::DailyPhysioRecord;
use veloscore::pmc::PmcCalculator;
use veloscore::strain::strain_from_tss;
use veloscore::trimp::DayLoadInputs;

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn daily_map(tss_values: &[u16]) -> BTreeMap<NaiveDate, DayLoadInputs> {
    tss_values
        .iter()
        .enumerate()
        .map(|(i, &tss)| {
            let date = start_date()
                .checked_add_days(Days::new(i as u64))
                .unwrap();
            (
                date,
                DayLoadInputs {
                    date,
                    tss: Decimal::from(tss),
                    input_count: u16::from(tss > 0),
                    estimated_inputs: 0,
                },
            )
        })
        .collect()
}

proptest! {
    /// Expanding a series in one pass and in two seeded halves must give
    /// byte-identical records: the incremental path is the batch path.
    #[test]
    fn incremental_chain_equals_batch(
        tss in prop::collection::vec(0u16..400, 2..60),
        split_at in 1usize..59,
    ) {
        prop_assume!(split_at < tss.len());

        let daily = daily_map(&tss);
        let end = start_date()
            .checked_add_days(Days::new(tss.len() as u64 - 1))
            .unwrap();
        let split = start_date()
            .checked_add_days(Days::new(split_at as u64 - 1))
            .unwrap();
        let resume = split.checked_add_days(Days::new(1)).unwrap();

        let pmc = PmcCalculator::new();
        let batch = pmc.expand_series(&daily, start_date(), end, None);

        let first = pmc.expand_series(&daily, start_date(), split, None);
        let seed = first.last().map(|r| (r.ctl, r.atl));
        let second = pmc.expand_series(&daily, resume, end, seed);

        let stitched: Vec<_> = first.into_iter().chain(second).collect();
        prop_assert_eq!(batch, stitched);
    }

    /// TSB is the same-day CTL minus ATL on every record.
    #[test]
    fn tsb_identity_holds(tss in prop::collection::vec(0u16..400, 1..60)) {
        let daily = daily_map(&tss);
        let end = start_date()
            .checked_add_days(Days::new(tss.len() as u64 - 1))
            .unwrap();

        let series = PmcCalculator::new().expand_series(&daily, start_date(), end, None);
        prop_assert_eq!(series.len(), tss.len());
        for record in &series {
            prop_assert_eq!(record.tsb, record.ctl - record.atl);
        }
    }

    /// CTL and ATL never go negative and never exceed the largest daily
    /// TSS seen so far.
    #[test]
    fn chain_stays_within_input_range(tss in prop::collection::vec(0u16..400, 1..60)) {
        let daily = daily_map(&tss);
        let end = start_date()
            .checked_add_days(Days::new(tss.len() as u64 - 1))
            .unwrap();

        let series = PmcCalculator::new().expand_series(&daily, start_date(), end, None);
        let max_tss = Decimal::from(*tss.iter().max().unwrap());
        for record in &series {
            prop_assert!(record.ctl >= Decimal::ZERO);
            prop_assert!(record.atl >= Decimal::ZERO);
            prop_assert!(record.ctl <= max_tss);
            prop_assert!(record.atl <= max_tss);
        }
    }

    /// Strain is bounded to [0, 21] and monotone in TSS.
    #[test]
    fn strain_bounded_and_monotone(a in 0u32..20_000, b in 0u32..20_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let s_lo = strain_from_tss(Decimal::from(lo));
        let s_hi = strain_from_tss(Decimal::from(hi));

        prop_assert!((0.0..=21.0).contains(&s_lo));
        prop_assert!((0.0..=21.0).contains(&s_hi));
        prop_assert!(s_lo <= s_hi);
    }

    /// The target day's own value never leaks into its baseline.
    #[test]
    fn baseline_excludes_target_day(
        history in prop::collection::vec(20.0f64..90.0, 3..20),
        target_value in 0.0f64..500.0,
    ) {
        let records: Vec<DailyPhysioRecord> = history
            .iter()
            .enumerate()
            .map(|(i, &hrv)| DailyPhysioRecord {
                hrv_rmssd: Some(hrv),
                ..DailyPhysioRecord::empty(
                    start_date().checked_add_days(Days::new(i as u64)).unwrap(),
                )
            })
            .collect();
        let target = start_date()
            .checked_add_days(Days::new(history.len() as u64))
            .unwrap();

        let tracker = BaselineTracker::new(3);
        let without = tracker.baseline(
            &records,
            veloscore::baseline::Metric::Hrv,
            target,
            30,
        );

        let mut with_target = records.clone();
        with_target.push(DailyPhysioRecord {
            hrv_rmssd: Some(target_value),
            ..DailyPhysioRecord::empty(target)
        });
        let with = tracker.baseline(
            &with_target,
            veloscore::baseline::Metric::Hrv,
            target,
            30,
        );

        prop_assert_eq!(without, with);
    }
}
