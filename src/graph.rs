// Graph table for the milestone chart. Baseline rows are copied under every
// scenario id with `full_wash_coverage = 0`.
use std::collections::BTreeSet;

use tracing::debug;

use crate::keys::UNMATCHED_ID;
use crate::types::{GraphRecord, IfsRow};

/// Milestones at or after `year`: the first is the milestone the year snaps
/// to, the rest are the later views it is repeated under. Empty past the
/// last milestone.
pub fn milestones_from(milestones: &[i32], year: i32) -> &[i32] {
    match milestones.iter().position(|m| *m >= year) {
        Some(first) => &milestones[first..],
        None => &[],
    }
}

pub struct GraphTableBuilder<'a> {
    milestones: &'a [i32],
}

impl<'a> GraphTableBuilder<'a> {
    /// `milestones` must be ascending.
    pub fn new(milestones: &'a [i32]) -> Self {
        Self { milestones }
    }

    pub fn build(&self, rows: &[&IfsRow], baseline_commitment_id: u32) -> Vec<GraphRecord> {
        let rows: Vec<(&IfsRow, f64)> = rows
            .iter()
            .filter_map(|r| r.value.map(|v| (*r, v)))
            .collect();

        let scenarios: BTreeSet<u32> = rows
            .iter()
            .map(|(r, _)| r.commitment_id)
            .filter(|id| *id != baseline_commitment_id && *id != UNMATCHED_ID)
            .collect();

        let mut out = Vec::new();
        let mut beyond_milestones = 0usize;
        for (row, value) in rows {
            let shown_at = milestones_from(self.milestones, row.year);
            if shown_at.is_empty() {
                beyond_milestones += 1;
                continue;
            }
            for milestone in shown_at {
                let record = GraphRecord {
                    indicator_id: row.indicator_id,
                    country_id: row.country_id,
                    unit_id: row.unit_id,
                    value_name_id: row.value_name_id,
                    jmp_category_id: row.jmp_category_id,
                    commitment_id: row.commitment_id,
                    actual_commitment_id: row.commitment_id,
                    actual_year: row.year,
                    year: *milestone,
                    value,
                    milestone_2030: row.milestone_2030,
                    milestone_2050: row.milestone_2050,
                    full_wash_coverage: 1,
                };
                if row.commitment_id == baseline_commitment_id {
                    for scenario in &scenarios {
                        out.push(GraphRecord {
                            commitment_id: *scenario,
                            full_wash_coverage: 0,
                            ..record.clone()
                        });
                    }
                }
                out.push(record);
            }
        }
        debug!(
            rows = out.len(),
            scenarios = scenarios.len(),
            beyond_milestones,
            "graph table built"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASELINE: u32 = 1;

    fn row(commitment_id: u32, year: i32, value: Option<f64>) -> IfsRow {
        IfsRow {
            indicator_id: 4,
            year,
            country_id: 9,
            unit_id: 2,
            value_name_id: 3,
            jmp_category_id: 1,
            commitment_id,
            value,
            initial_value: None,
            base_value: None,
            jmp_name_ids: "[]".into(),
            milestone_2030: None,
            milestone_2050: None,
        }
    }

    fn build(rows: &[IfsRow]) -> Vec<GraphRecord> {
        let refs: Vec<&IfsRow> = rows.iter().collect();
        GraphTableBuilder::new(&[2030, 2050]).build(&refs, BASELINE)
    }

    #[test]
    fn baseline_2030_value_is_shown_on_both_milestones_under_every_scenario() {
        let rows = vec![
            row(BASELINE, 2030, Some(75.0)),
            row(2, 2050, Some(99.0)),
            row(3, 2050, Some(100.0)),
        ];
        let out = build(&rows);
        let baseline: Vec<&GraphRecord> = out
            .iter()
            .filter(|r| r.actual_commitment_id == BASELINE)
            .collect();
        // Two milestones x (original + 2 scenario replicas).
        assert_eq!(baseline.len(), 6);
        for milestone in [2030, 2050] {
            let at: Vec<&&GraphRecord> = baseline.iter().filter(|r| r.year == milestone).collect();
            assert_eq!(at.len(), 3);
            assert!(at.iter().all(|r| r.value == 75.0 && r.actual_year == 2030));
            let original: Vec<_> = at.iter().filter(|r| r.full_wash_coverage == 1).collect();
            assert_eq!(original.len(), 1);
            assert_eq!(original[0].commitment_id, BASELINE);
            let mut replicas: Vec<u32> = at
                .iter()
                .filter(|r| r.full_wash_coverage == 0)
                .map(|r| r.commitment_id)
                .collect();
            replicas.sort();
            assert_eq!(replicas, vec![2, 3]);
        }
    }

    #[test]
    fn milestone_snaps_upwards() {
        let milestones = [2030, 2050];
        assert_eq!(milestones_from(&milestones, 2025), &[2030, 2050]);
        assert_eq!(milestones_from(&milestones, 2030), &[2030, 2050]);
        assert_eq!(milestones_from(&milestones, 2031), &[2050]);
        assert!(milestones_from(&milestones, 2051).is_empty());
    }

    #[test]
    fn years_snap_to_next_milestone() {
        let out = build(&[row(2, 2025, Some(1.0)), row(2, 2031, Some(2.0)), row(2, 2051, Some(3.0))]);
        let years: Vec<(i32, i32)> = out.iter().map(|r| (r.actual_year, r.year)).collect();
        assert_eq!(years, vec![(2025, 2030), (2025, 2050), (2031, 2050)]);
        assert!(out.iter().all(|r| r.full_wash_coverage == 1));
    }

    #[test]
    fn null_values_are_dropped_before_replication() {
        let out = build(&[row(BASELINE, 2030, None), row(2, 2030, None)]);
        assert!(out.is_empty());
    }

    #[test]
    fn unmatched_commitments_are_not_scenarios() {
        let out = build(&[row(BASELINE, 2040, Some(5.0)), row(UNMATCHED_ID, 2040, Some(6.0))]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.full_wash_coverage == 1));
    }
}
