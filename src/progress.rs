// Progress-rate extraction for coverage series.
//
// Coverage only grows, so within a group the rows are ordered by value and
// the successive differences stand in for the yearly increase.
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::types::{IfsRow, ProgressRateRecord};
use crate::util::average;

type GroupKey = (u32, u32, u32, u32);

pub struct ProgressRateExtractor {
    /// Coverage at or above this counts as complete.
    pub threshold: f64,
    /// Year reported for series that never reach the threshold.
    pub never_complete_year: i32,
}

impl ProgressRateExtractor {
    pub fn new(threshold: f64, never_complete_year: i32) -> Self {
        Self {
            threshold,
            never_complete_year,
        }
    }

    /// One record per (indicator, country, jmp_category, value_name) group
    /// that has at least one observed value.
    pub fn extract(&self, rows: &[&IfsRow]) -> Vec<ProgressRateRecord> {
        let mut groups: BTreeMap<GroupKey, Vec<(i32, f64)>> = BTreeMap::new();
        for row in rows {
            let Some(value) = row.value else { continue };
            groups
                .entry((
                    row.indicator_id,
                    row.country_id,
                    row.jmp_category_id,
                    row.value_name_id,
                ))
                .or_default()
                .push((row.year, value));
        }
        groups
            .into_iter()
            .filter_map(|(key, series)| self.reduce(key, series))
            .collect()
    }

    fn reduce(&self, key: GroupKey, mut series: Vec<(i32, f64)>) -> Option<ProgressRateRecord> {
        series.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        let increases: Vec<f64> = series.windows(2).map(|w| w[1].1 - w[0].1).collect();
        let avg_yearly_increase = average(&increases);

        let (indicator_id, country_id, jmp_category_id, value_name_id) = key;
        let (year, value, full_services) = match series.iter().find(|(_, v)| *v >= self.threshold) {
            Some(&(year, value)) => (year, value, true),
            None => {
                let &(_, last) = series.last()?;
                (self.never_complete_year, last, false)
            }
        };
        Some(ProgressRateRecord {
            indicator_id,
            country_id,
            jmp_category_id,
            value_name_id,
            year,
            value,
            avg_yearly_increase,
            full_services,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(country_id: u32, year: i32, value: Option<f64>) -> IfsRow {
        IfsRow {
            indicator_id: 1,
            year,
            country_id,
            unit_id: 1,
            value_name_id: 1,
            jmp_category_id: 1,
            commitment_id: 1,
            value,
            initial_value: None,
            base_value: None,
            jmp_name_ids: "[]".into(),
            milestone_2030: None,
            milestone_2050: None,
        }
    }

    fn extract(rows: &[IfsRow]) -> Vec<ProgressRateRecord> {
        let refs: Vec<&IfsRow> = rows.iter().collect();
        ProgressRateExtractor::new(99.0, 2100).extract(&refs)
    }

    #[test]
    fn completed_series_reports_first_year_at_threshold() {
        let rows: Vec<IfsRow> = [10.0, 30.0, 60.0, 85.0, 99.0]
            .iter()
            .zip(2020..)
            .map(|(v, y)| row(1, y, Some(*v)))
            .collect();
        let out = extract(&rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].year, 2024);
        assert_eq!(out[0].value, 99.0);
        assert!(out[0].full_services);
        assert_eq!(out[0].avg_yearly_increase, Some(22.25));
    }

    #[test]
    fn incomplete_series_reports_sentinel_year_and_last_value() {
        let rows = vec![row(1, 2020, Some(10.0)), row(1, 2021, Some(20.0)), row(1, 2022, Some(30.0))];
        let out = extract(&rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].year, 2100);
        assert_eq!(out[0].value, 30.0);
        assert!(!out[0].full_services);
        assert_eq!(out[0].avg_yearly_increase, Some(10.0));
    }

    #[test]
    fn first_crossing_wins_when_several_rows_are_complete() {
        let rows = vec![
            row(1, 2028, Some(100.0)),
            row(1, 2026, Some(99.5)),
            row(1, 2027, Some(99.5)),
            row(1, 2025, Some(97.0)),
        ];
        let out = extract(&rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].year, 2026);
        assert_eq!(out[0].value, 99.5);
    }

    #[test]
    fn singleton_groups_have_no_increase() {
        let rows = vec![row(1, 2020, Some(50.0)), row(2, 2020, Some(99.0))];
        let out = extract(&rows);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.avg_yearly_increase.is_none()));
        assert!(!out[0].full_services);
        assert!(out[1].full_services);
    }

    #[test]
    fn rows_without_values_are_ignored() {
        let rows = vec![row(1, 2020, None), row(2, 2020, None), row(2, 2021, Some(5.0))];
        let out = extract(&rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].country_id, 2);
    }
}
