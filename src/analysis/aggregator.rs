//! Download series aggregation.
//!
//! This module aligns every package's statistics on a shared date axis
//! and derives the `total` and `delta` metrics the chart plots.

use crate::fetcher::{Fetcher, Result, StatsSource};
use crate::models::{
    Aggregation, Anomaly, ChartData, ChartMetricMap, ChartSeries, Metric, SeriesSummary, Stats,
    StatsMap, SummaryMap,
};
use chrono::Days;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Format used for every date on the axis.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Every calendar day from the earliest start to the latest end, inclusive.
pub fn generate_dates(summary_map: &SummaryMap) -> Vec<String> {
    let start = summary_map.values().map(|s| s.start).min();
    let end = summary_map.values().map(|s| s.end).max();

    let (Some(start), Some(end)) = (start, end) else {
        return Vec::new();
    };

    let mut dates = Vec::new();
    let mut date = start;
    while date <= end {
        dates.push(date.format(DATE_FORMAT).to_string());
        match date.checked_add_days(Days::new(1)) {
            Some(next) => date = next,
            None => break,
        }
    }

    dates
}

/// Turn a package id into a display name: `my-package` -> `My Package`.
pub fn display_name(package_id: &str) -> String {
    package_id
        .split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Derive `total` and `delta` for one package in a single scan over `dates`.
///
/// A negative delta is an anomaly: both metrics are `None` for that date, but
/// the reported value still becomes the baseline for the next delta. Dates
/// without data are `None` and leave the baseline alone. A delta that does
/// not fit in an `i64` is `None`.
pub fn derive_metrics(
    package_id: &str,
    stats: &Stats,
    dates: &[String],
) -> (ChartMetricMap, Vec<Anomaly>) {
    let mut totals = Vec::with_capacity(dates.len());
    let mut deltas = Vec::with_capacity(dates.len());
    let mut anomalies = Vec::new();
    let mut prev: Option<i64> = None;

    for date in dates {
        let curr = stats.get(date).map(|stat| stat.downloads);
        let delta = match (prev, curr) {
            (Some(prev), Some(curr)) => curr.checked_sub(prev),
            _ => None,
        };

        match (delta, prev, curr) {
            (Some(d), Some(previous), Some(current)) if d < 0 => {
                warn!(
                    "Cumulative downloads of {} decreased on {} ({} -> {})",
                    package_id, date, previous, current
                );
                anomalies.push(Anomaly {
                    package: package_id.to_string(),
                    date: date.clone(),
                    previous,
                    current,
                });
                totals.push(None);
                deltas.push(None);
            }
            _ => {
                totals.push(curr);
                deltas.push(delta);
            }
        }

        if curr.is_some() {
            prev = curr;
        }
    }

    let metrics = [(Metric::Total, totals), (Metric::Delta, deltas)]
        .into_iter()
        .collect();

    (metrics, anomalies)
}

/// Build every package's chart series over the shared axis.
pub fn generate_chart_series(
    stats_map: &StatsMap,
    dates: &[String],
) -> (BTreeMap<String, ChartSeries>, Vec<Anomaly>) {
    let mut series = BTreeMap::new();
    let mut anomalies = Vec::new();

    for (package_id, stats) in stats_map {
        let (metrics, found) = derive_metrics(package_id, stats, dates);
        anomalies.extend(found);
        series.insert(
            package_id.clone(),
            ChartSeries {
                name: display_name(package_id),
                metrics,
            },
        );
    }

    (series, anomalies)
}

/// Fetch all statistics for the manifest and turn them into chart data.
pub async fn generate_chart_data<S: StatsSource>(
    fetcher: &Fetcher<S>,
    summary_map: &SummaryMap,
) -> Result<Aggregation> {
    let stats_map = fetcher.fetch_stats_map(summary_map).await?;
    let dates = generate_dates(summary_map);
    let (series, anomalies) = generate_chart_series(&stats_map, &dates);

    info!(
        "Aggregated {} packages over {} days ({} anomalies)",
        series.len(),
        dates.len(),
        anomalies.len()
    );

    Ok(Aggregation {
        chart: ChartData { dates, series },
        anomalies,
    })
}

/// Run a complete aggregation: manifest, statistics, chart data.
pub async fn aggregate<S: StatsSource>(fetcher: &Fetcher<S>) -> Result<Aggregation> {
    let summary_map = fetcher.fetch_summary_map().await?;
    generate_chart_data(fetcher, &summary_map).await
}

/// Summarize each series for tabular reports.
pub fn summarize(chart: &ChartData, anomalies: &[Anomaly]) -> Vec<SeriesSummary> {
    chart
        .series
        .iter()
        .map(|(package_id, series)| {
            let totals = series.metric(Metric::Total);
            let deltas = series.metric(Metric::Delta);

            let reported: Vec<(&String, i64)> = chart
                .dates
                .iter()
                .zip(totals)
                .filter_map(|(date, total)| total.map(|t| (date, t)))
                .collect();

            let peak = chart
                .dates
                .iter()
                .zip(deltas)
                .filter_map(|(date, delta)| delta.map(|d| (date, d)))
                // Earliest date wins ties.
                .fold(None, |best: Option<(&String, i64)>, (date, d)| match best {
                    Some((_, best_d)) if best_d >= d => best,
                    _ => Some((date, d)),
                })
                .map(|(date, d)| (date.clone(), d));

            SeriesSummary {
                package: package_id.clone(),
                name: series.name.clone(),
                first_date: reported.first().map(|(date, _)| (*date).clone()),
                last_date: reported.last().map(|(date, _)| (*date).clone()),
                latest_total: reported.last().map(|(_, total)| *total),
                downloads_in_range: deltas
                    .iter()
                    .flatten()
                    .fold(0i64, |sum, d| sum.saturating_add(*d)),
                peak,
                anomalies: anomalies.iter().filter(|a| &a.package == package_id).count(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::tests::{stats, FakeSource};
    use crate::models::Summary;

    fn summary(start: &str, end: &str) -> Summary {
        Summary {
            start: start.parse().unwrap(),
            end: end.parse().unwrap(),
        }
    }

    fn axis(dates: &[&str]) -> Vec<String> {
        dates.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_generate_dates_spans_all_summaries() {
        let summaries: SummaryMap = [
            ("a".to_string(), summary("2020-12-30", "2021-01-01")),
            ("b".to_string(), summary("2021-01-01", "2021-01-02")),
        ]
        .into_iter()
        .collect();

        let dates = generate_dates(&summaries);

        assert_eq!(
            dates,
            axis(&["2020-12-30", "2020-12-31", "2021-01-01", "2021-01-02"])
        );
    }

    #[test]
    fn test_generate_dates_handles_leap_day() {
        let summaries: SummaryMap = [("a".to_string(), summary("2024-02-28", "2024-03-01"))]
            .into_iter()
            .collect();

        assert_eq!(
            generate_dates(&summaries),
            axis(&["2024-02-28", "2024-02-29", "2024-03-01"])
        );
    }

    #[test]
    fn test_generate_dates_empty_manifest() {
        assert!(generate_dates(&SummaryMap::new()).is_empty());
    }

    #[test]
    fn test_generate_dates_is_contiguous_and_ascending() {
        let summaries: SummaryMap = [
            ("a".to_string(), summary("2019-11-05", "2020-02-01")),
            ("b".to_string(), summary("2020-01-10", "2020-03-15")),
        ]
        .into_iter()
        .collect();

        let dates = generate_dates(&summaries);
        let parsed: Vec<chrono::NaiveDate> = dates
            .iter()
            .map(|d| chrono::NaiveDate::parse_from_str(d, DATE_FORMAT).unwrap())
            .collect();

        assert_eq!(dates.first().unwrap(), "2019-11-05");
        assert_eq!(dates.last().unwrap(), "2020-03-15");
        assert!(parsed.windows(2).all(|w| (w[1] - w[0]).num_days() == 1));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("curse-forge-mod"), "Curse Forge Mod");
        assert_eq!(display_name("my-package"), "My Package");
        assert_eq!(display_name("single"), "Single");
        assert_eq!(display_name("already-Upper"), "Already Upper");
    }

    #[test]
    fn test_derive_metrics_total_and_delta() {
        let stats = stats(&[("d1", 100), ("d2", 110), ("d3", 125)]);
        let (metrics, anomalies) = derive_metrics("foo", &stats, &axis(&["d1", "d2", "d3"]));

        assert_eq!(metrics[&Metric::Total], vec![Some(100), Some(110), Some(125)]);
        assert_eq!(metrics[&Metric::Delta], vec![None, Some(10), Some(15)]);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_negative_delta_is_suppressed_but_becomes_baseline() {
        let stats = stats(&[("d1", 100), ("d2", 90), ("d3", 95)]);
        let (metrics, anomalies) = derive_metrics("foo", &stats, &axis(&["d1", "d2", "d3"]));

        assert_eq!(metrics[&Metric::Total], vec![Some(100), None, Some(95)]);
        assert_eq!(metrics[&Metric::Delta], vec![None, None, Some(5)]);
        assert_eq!(
            anomalies,
            vec![Anomaly {
                package: "foo".to_string(),
                date: "d2".to_string(),
                previous: 100,
                current: 90,
            }]
        );
    }

    #[test]
    fn test_missing_date_is_null_and_keeps_baseline() {
        let stats = stats(&[("d1", 100), ("d3", 130)]);
        let (metrics, anomalies) = derive_metrics("foo", &stats, &axis(&["d1", "d2", "d3"]));

        assert_eq!(metrics[&Metric::Total], vec![Some(100), None, Some(130)]);
        assert_eq!(metrics[&Metric::Delta], vec![None, None, Some(30)]);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_zero_downloads_is_data_not_absence() {
        let stats = stats(&[("d1", 0), ("d2", 0), ("d3", 4)]);
        let (metrics, _) = derive_metrics("foo", &stats, &axis(&["d1", "d2", "d3"]));

        assert_eq!(metrics[&Metric::Total], vec![Some(0), Some(0), Some(4)]);
        assert_eq!(metrics[&Metric::Delta], vec![None, Some(0), Some(4)]);
    }

    #[test]
    fn test_overflowing_delta_is_null() {
        let low = -9_000_000_000_000_000_000;
        let high = 9_000_000_000_000_000_000;
        let stats = stats(&[("d1", low), ("d2", high), ("d3", high)]);
        let (metrics, anomalies) = derive_metrics("foo", &stats, &axis(&["d1", "d2", "d3"]));

        assert_eq!(metrics[&Metric::Total], vec![Some(low), Some(high), Some(high)]);
        assert_eq!(metrics[&Metric::Delta], vec![None, None, Some(0)]);
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_series_lengths_match_axis() {
        let stats_map: StatsMap = [
            ("a-mod".to_string(), stats(&[("2021-01-02", 5)])),
            ("b-mod".to_string(), Stats::new()),
        ]
        .into_iter()
        .collect();
        let dates = axis(&["2021-01-01", "2021-01-02", "2021-01-03"]);

        let (series, _) = generate_chart_series(&stats_map, &dates);

        assert_eq!(series["a-mod"].name, "A Mod");
        for s in series.values() {
            assert_eq!(s.metric(Metric::Total).len(), dates.len());
            assert_eq!(s.metric(Metric::Delta).len(), dates.len());
        }
        assert_eq!(series["b-mod"].metric(Metric::Total), &[None, None, None]);
    }

    fn fake_source() -> FakeSource {
        FakeSource::default()
            .with_package("alpha-mod", "2020-12-30", "2021-01-02")
            .with_package("beta", "2021-01-01", "2021-01-03")
            .with_year("alpha-mod", 2020, &[("2020-12-30", 10), ("2020-12-31", 14)])
            .with_year("alpha-mod", 2021, &[("2021-01-01", 20), ("2021-01-02", 18)])
            .with_year("beta", 2021, &[("2021-01-01", 1), ("2021-01-03", 7)])
    }

    #[tokio::test]
    async fn test_aggregate_end_to_end() {
        let fetcher = Fetcher::new(fake_source(), 2);

        let aggregation = aggregate(&fetcher).await.unwrap();
        let chart = &aggregation.chart;

        assert_eq!(chart.dates.len(), 5);
        assert_eq!(chart.series["alpha-mod"].name, "Alpha Mod");
        assert_eq!(
            chart.series["alpha-mod"].metric(Metric::Delta),
            &[None, Some(4), Some(6), None, None]
        );
        assert_eq!(
            chart.series["beta"].metric(Metric::Total),
            &[None, None, Some(1), None, Some(7)]
        );
        assert_eq!(aggregation.anomalies.len(), 1);
        assert_eq!(aggregation.anomalies[0].date, "2021-01-02");
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let fetcher = Fetcher::new(fake_source(), 2);

        let first = tokio_test::block_on(aggregate(&fetcher)).unwrap();
        let second = tokio_test::block_on(aggregate(&fetcher)).unwrap();

        assert_eq!(first.chart, second.chart);
    }

    #[tokio::test]
    async fn test_aggregate_fails_when_any_package_fails() {
        let mut source = fake_source();
        source.broken = Some("beta".to_string());
        let fetcher = Fetcher::new(source, 2);

        assert!(aggregate(&fetcher).await.is_err());
    }

    #[tokio::test]
    async fn test_summarize() {
        let fetcher = Fetcher::new(fake_source(), 2);
        let aggregation = aggregate(&fetcher).await.unwrap();

        let summaries = summarize(&aggregation.chart, &aggregation.anomalies);
        let alpha = &summaries[0];
        let beta = &summaries[1];

        assert_eq!(alpha.package, "alpha-mod");
        assert_eq!(alpha.first_date.as_deref(), Some("2020-12-30"));
        assert_eq!(alpha.last_date.as_deref(), Some("2021-01-01"));
        assert_eq!(alpha.latest_total, Some(20));
        assert_eq!(alpha.downloads_in_range, 10);
        assert_eq!(alpha.peak, Some(("2021-01-01".to_string(), 6)));
        assert_eq!(alpha.anomalies, 1);

        assert_eq!(beta.latest_total, Some(7));
        assert_eq!(beta.downloads_in_range, 6);
        assert_eq!(beta.anomalies, 0);
    }

    #[test]
    fn test_summarize_saturates_downloads_in_range() {
        let series = ChartSeries {
            name: "Foo".to_string(),
            metrics: [
                (Metric::Total, vec![Some(0), Some(i64::MAX), Some(i64::MAX)]),
                (Metric::Delta, vec![None, Some(i64::MAX), Some(i64::MAX)]),
            ]
            .into_iter()
            .collect(),
        };
        let chart = ChartData {
            dates: axis(&["d1", "d2", "d3"]),
            series: [("foo".to_string(), series)].into_iter().collect(),
        };

        let summaries = summarize(&chart, &[]);

        assert_eq!(summaries[0].downloads_in_range, i64::MAX);
    }
}
