//! Smart time partitioning tiers and range properties.

use batch_ingest::plan::partition::Frequency;
use batch_ingest::plan::smart_ranges;
use chrono::{Datelike, NaiveDate};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y%m%d").unwrap()
}

#[test]
fn test_tier_selection_by_span() {
    assert_eq!(
        Frequency::for_span(date("20240101"), date("20240115")),
        Frequency::Single
    );
    assert_eq!(
        Frequency::for_span(date("20240101"), date("20240331")),
        Frequency::Monthly
    );
    assert_eq!(
        Frequency::for_span(date("20100101"), date("20121231")),
        Frequency::Quarterly
    );
    assert_eq!(
        Frequency::for_span(date("20150101"), date("20211231")),
        Frequency::SemiAnnual
    );
    assert_eq!(
        Frequency::for_span(date("20000101"), date("20231231")),
        Frequency::Annual
    );
}

#[test]
fn test_two_week_window_is_one_batch() {
    let ranges = smart_ranges(date("20100101"), date("20100115"));
    assert_eq!(ranges, vec![(date("20100101"), date("20100115"))]);
}

#[test]
fn test_three_year_window_is_twelve_quarters() {
    let ranges = smart_ranges(date("20100101"), date("20121231"));
    assert_eq!(ranges.len(), 12);
    assert_eq!(ranges[0], (date("20100101"), date("20100331")));
    assert_eq!(ranges[11], (date("20121001"), date("20121231")));
}

#[test]
fn test_twenty_four_year_window_is_annual() {
    let ranges = smart_ranges(date("20000101"), date("20231231"));
    assert_eq!(ranges.len(), 24);
    assert!(ranges
        .iter()
        .zip(2000..)
        .all(|((start, _), year)| start.year() == year));
}

#[test]
fn test_ranges_are_contiguous_and_exhaustive() {
    let windows = [
        (date("20240101"), date("20240115")),
        (date("20230601"), date("20240215")),
        (date("20100215"), date("20121110")),
        (date("20120301"), date("20200229")),
        (date("19950701"), date("20231231")),
    ];
    for (start, end) in windows {
        let ranges = smart_ranges(start, end);
        assert_eq!(ranges.first().unwrap().0, start);
        assert_eq!(ranges.last().unwrap().1, end);
        for pair in ranges.windows(2) {
            // Each range starts the day after the previous one ends.
            assert_eq!(pair[0].1.succ_opt().unwrap(), pair[1].0);
        }
        for (s, e) in ranges {
            assert!(s <= e);
        }
    }
}

#[test]
fn test_inverted_window_yields_nothing() {
    assert!(smart_ranges(date("20240115"), date("20240101")).is_empty());
}

#[test]
fn test_mid_month_quarterly_boundaries() {
    // Boundaries follow the window start, not calendar quarters.
    let ranges = smart_ranges(date("20100215"), date("20110214"));
    assert_eq!(ranges[0], (date("20100215"), date("20100514")));
    assert_eq!(ranges[1].0, date("20100515"));
    assert_eq!(ranges.last().unwrap().1, date("20110214"));
}
