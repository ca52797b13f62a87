// Row derivation rules, run per source file in a fixed order. Rows are
// flagged, never dropped; consumers pick theirs via `DerivedTable::materialize`.
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use tracing::debug;

use crate::config::PipelineConfig;
use crate::types::{LongRecord, RemovalReason};

/// Value name and commitment label of business-as-usual rows.
pub const BASE: &str = "Base";

const BASIC: &str = "Basic";

/// Single-probe hash join over borrowed rows. The first row inserted under a
/// key wins unless built with [`JoinIndex::build_min_by`].
pub struct JoinIndex<'a, K> {
    map: HashMap<K, &'a LongRecord>,
}

impl<'a, K: Eq + Hash> JoinIndex<'a, K> {
    pub fn build<I, F>(rows: I, key: F) -> Self
    where
        I: IntoIterator<Item = &'a LongRecord>,
        F: Fn(&'a LongRecord) -> K,
    {
        let mut map = HashMap::new();
        for row in rows {
            map.entry(key(row)).or_insert(row);
        }
        Self { map }
    }

    /// Keep, per key, the row with the smallest `order` (first one on ties).
    pub fn build_min_by<I, F, O, G>(rows: I, key: F, order: G) -> Self
    where
        I: IntoIterator<Item = &'a LongRecord>,
        F: Fn(&'a LongRecord) -> K,
        O: Ord,
        G: Fn(&LongRecord) -> O,
    {
        let mut map: HashMap<K, &'a LongRecord> = HashMap::new();
        for row in rows {
            map.entry(key(row))
                .and_modify(|kept| {
                    if order(row) < order(*kept) {
                        *kept = row;
                    }
                })
                .or_insert(row);
        }
        Self { map }
    }

    pub fn probe(&self, key: &K) -> Option<&'a LongRecord> {
        self.map.get(key).copied()
    }
}

fn is_safely_managed(secondary: Option<&str>) -> bool {
    secondary.map(|s| s.starts_with("Safely")).unwrap_or(false)
}

/// A Basic row in the SM category, or a safely-managed row in the ALB/BS
/// category. Such rows only arise from decoding the full header product.
fn has_category_conflict(r: &LongRecord) -> bool {
    let basic_as_sm = r.secondary_is(BASIC) && r.category_is("SM");
    let sm_as_basic =
        is_safely_managed(r.secondary.as_deref()) && (r.category_is("ALB") || r.category_is("BS"));
    basic_as_sm || sm_as_basic
}

fn is_artifact(r: &LongRecord) -> bool {
    r.removal == Some(RemovalReason::InconsistentCategory)
}

/// Rule 1: Base rows take their category from the second dimension, then
/// `BS` (basic) is folded into `ALB` (at least basic) everywhere.
pub fn normalize_categories(records: &mut [LongRecord]) {
    for r in records.iter_mut() {
        if r.is_base() {
            r.jmp_category = match r.secondary.as_deref() {
                Some(BASIC) => Some("BS".to_string()),
                s if is_safely_managed(s) => Some("SM".to_string()),
                _ => None,
            };
        }
        if r.category_is("BS") {
            r.jmp_category = Some("ALB".to_string());
        }
    }
}

/// `"FWS"` -> `"Water and Sanitation"`; `None` when neither letter appears.
fn commitment_scope(value_name: &str) -> Option<&'static str> {
    match (value_name.contains('W'), value_name.contains('S')) {
        (true, true) => Some("Water and Sanitation"),
        (true, false) => Some("Water"),
        (false, true) => Some("Sanitation"),
        (false, false) => None,
    }
}

/// Rule 2: Base rows get the `Base` commitment; 2030/2050 scenario rows get
/// a readable `Full … Access in {year}` label.
pub fn rename_commitments(records: &mut [LongRecord]) {
    for r in records.iter_mut() {
        if r.is_base() {
            r.commitment = Some(BASE.to_string());
            continue;
        }
        let year = if r.commitment_mentions(2030) {
            2030
        } else if r.commitment_mentions(2050) {
            2050
        } else {
            continue;
        };
        if let Some(scope) = commitment_scope(&r.value_name) {
            r.commitment = Some(format!("Full {scope} Access in {year}"));
        }
    }
}

type ServiceKey<'a> = (&'a str, i32, &'a str, Option<&'a str>, &'a str);

fn service_key(r: &LongRecord) -> ServiceKey<'_> {
    (
        r.indicator.as_str(),
        r.year,
        r.country.as_str(),
        r.commitment.as_deref(),
        r.value_name.as_str(),
    )
}

/// Rule 3: basic and safely-managed are disjoint bands, so a Basic row's
/// value becomes basic + safely managed for the same
/// (indicator, year, country, commitment, value_name). Unmatched rows keep
/// their value. Rows with a conflicting category take no part on either side.
pub fn aggregate_alb(records: &mut [LongRecord]) {
    let sums: Vec<Option<f64>> = {
        let sm = JoinIndex::build(
            records
                .iter()
                .filter(|r| {
                    is_safely_managed(r.secondary.as_deref())
                        && !has_category_conflict(r)
                        && r.value.is_some()
                }),
            service_key,
        );
        records
            .iter()
            .map(|r| {
                if !r.secondary_is(BASIC) || has_category_conflict(r) {
                    return None;
                }
                let basic = r.value?;
                let extra = sm.probe(&service_key(r)).and_then(|m| m.value)?;
                Some(basic + extra)
            })
            .collect()
    };
    let mut aggregated = 0usize;
    for (r, sum) in records.iter_mut().zip(sums) {
        if let Some(sum) = sum {
            r.value = Some(sum);
            aggregated += 1;
        }
    }
    debug!(aggregated, "at-least-basic rows aggregated");
}

/// Rule 4: rows whose second dimension contradicts their category are
/// flagged.
pub fn flag_inconsistent_categories(records: &mut [LongRecord]) {
    for r in records.iter_mut().filter(|r| r.removal.is_none()) {
        if has_category_conflict(r) {
            r.removal = Some(RemovalReason::InconsistentCategory);
        }
    }
}

/// Rule 5: a 2030 commitment observed after 2030, or a 2050 commitment
/// observed in 2030, is flagged.
pub fn flag_commitment_year_mismatch(records: &mut [LongRecord]) {
    for r in records.iter_mut().filter(|r| r.removal.is_none()) {
        let late_2030 = r.commitment_mentions(2030) && r.year > 2030;
        let early_2050 = r.commitment_mentions(2050) && r.year == 2030;
        if late_2030 || early_2050 {
            r.removal = Some(RemovalReason::CommitmentYearMismatch);
        }
    }
}

type SeriesKey<'a> = (&'a str, &'a str, Option<&'a str>);

fn series_key(r: &LongRecord) -> SeriesKey<'_> {
    (r.indicator.as_str(), r.country.as_str(), r.jmp_category.as_deref())
}

/// Rule 6: rows in one of `years` get the value observed at the earliest year
/// of their (indicator, country, jmp_category) series.
pub fn backfill_initial_values(records: &mut [LongRecord], years: &[i32]) {
    let initial: Vec<Option<f64>> = {
        let earliest = JoinIndex::build_min_by(
            records.iter().filter(|r| !is_artifact(r)),
            series_key,
            |r| r.year,
        );
        records
            .iter()
            .map(|r| {
                if !years.contains(&r.year) {
                    return None;
                }
                earliest.probe(&series_key(r)).and_then(|first| first.value)
            })
            .collect()
    };
    for (r, value) in records.iter_mut().zip(initial) {
        r.initial_value = value;
    }
}

type BaseKey<'a> = (&'a str, &'a str, i32, Option<&'a str>, Option<&'a str>);

fn base_key(r: &LongRecord, with_secondary: bool) -> BaseKey<'_> {
    (
        r.indicator.as_str(),
        r.country.as_str(),
        r.year,
        r.jmp_category.as_deref(),
        if with_secondary {
            r.secondary.as_deref()
        } else {
            None
        },
    )
}

/// Rule 7: scenario rows get the value of their Base sibling with the same
/// (indicator, country, year, jmp_category), plus the second dimension for
/// water/sanitation files.
pub fn backfill_base_values(records: &mut [LongRecord], wash: bool) {
    let base_values: Vec<Option<f64>> = {
        let base = JoinIndex::build(
            records.iter().filter(|r| r.is_base() && !is_artifact(r)),
            |r| base_key(r, wash),
        );
        records
            .iter()
            .map(|r| {
                if r.is_base() {
                    return None;
                }
                base.probe(&base_key(r, wash)).and_then(|b| b.value)
            })
            .collect()
    };
    for (r, value) in records.iter_mut().zip(base_values) {
        r.base_value = value;
    }
}

/// Rule 8: copy the value into the 2030/2050 helper columns when the
/// commitment targets that year and the file spans the full year range.
pub fn extract_milestones(records: &mut [LongRecord], full_range: bool) {
    for r in records.iter_mut() {
        r.milestone_2030 = None;
        r.milestone_2050 = None;
        if !full_range {
            continue;
        }
        if r.commitment_mentions(2030) {
            r.milestone_2030 = r.value;
        }
        if r.commitment_mentions(2050) {
            r.milestone_2050 = r.value;
        }
    }
}

/// Per-file facts that switch rules on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceProfile {
    /// Water/sanitation service file (second dimension is Basic/SafelyManaged).
    pub wash: bool,
    /// Every configured full-range year is present.
    pub full_range: bool,
}

pub struct DerivationEngine<'c> {
    config: &'c PipelineConfig,
}

impl<'c> DerivationEngine<'c> {
    pub fn new(config: &'c PipelineConfig) -> Self {
        Self { config }
    }

    pub fn profile(&self, records: &[LongRecord]) -> SourceProfile {
        let wash = records
            .first()
            .map(|r| self.config.is_wash(&r.indicator))
            .unwrap_or(false);
        let years: HashSet<i32> = records.iter().map(|r| r.year).collect();
        let full_range = !records.is_empty()
            && self.config.full_range_years.iter().all(|y| years.contains(y));
        SourceProfile { wash, full_range }
    }

    /// Run every rule over the records of one source file.
    pub fn derive(&self, mut records: Vec<LongRecord>) -> DerivedTable {
        let profile = self.profile(&records);
        normalize_categories(&mut records);
        rename_commitments(&mut records);
        if profile.wash {
            aggregate_alb(&mut records);
        }
        flag_inconsistent_categories(&mut records);
        flag_commitment_year_mismatch(&mut records);
        if profile.wash {
            backfill_initial_values(&mut records, &self.config.full_range_years);
        }
        backfill_base_values(&mut records, profile.wash);
        extract_milestones(&mut records, profile.full_range);
        debug!(
            rows = records.len(),
            wash = profile.wash,
            full_range = profile.full_range,
            "derivation finished"
        );
        DerivedTable::new(records)
    }
}

/// Which rows a consumer sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Unflagged rows with a value, stably ordered by year.
    Normalized,
    /// Everything except decoding artifacts; keeps commitment/year mismatches.
    Graph,
    All,
}

/// Superset table produced by derivation, each row carrying its removal flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedTable {
    records: Vec<LongRecord>,
}

impl DerivedTable {
    pub fn new(records: Vec<LongRecord>) -> Self {
        Self { records }
    }

    pub fn append(&mut self, other: DerivedTable) {
        self.records.extend(other.records);
    }

    pub fn records(&self) -> &[LongRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn materialize(&self, view: View) -> Vec<&LongRecord> {
        match view {
            View::Normalized => {
                let mut rows: Vec<&LongRecord> = self
                    .records
                    .iter()
                    .filter(|r| r.removal.is_none() && r.value.is_some())
                    .collect();
                rows.sort_by_key(|r| r.year);
                rows
            }
            View::Graph => self.records.iter().filter(|r| !is_artifact(r)).collect(),
            View::All => self.records.iter().collect(),
        }
    }

    pub fn count_removed(&self, reason: RemovalReason) -> usize {
        self.records
            .iter()
            .filter(|r| r.removal == Some(reason))
            .count()
    }
}
