use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::util::display_opt_f64;

/// Why a derived row is excluded from the normalized output.
///
/// Rows are flagged rather than dropped so that later derivations and the
/// graph view can still see them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// The second dimension and the JMP category contradict each other.
    InconsistentCategory,
    /// A 2030 commitment observed after 2030, or a 2050 commitment in 2030.
    CommitmentYearMismatch,
}

/// One decoded IFs observation, mutated in place by the derivation rules.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LongRecord {
    pub indicator: String,
    pub year: i32,
    pub country: String,
    /// Second header dimension (e.g. `Basic`, `SafelyManaged`).
    pub secondary: Option<String>,
    pub unit: Option<String>,
    pub value_name: String,
    pub jmp_category: Option<String>,
    pub commitment: Option<String>,
    pub value: Option<f64>,
    pub initial_value: Option<f64>,
    pub base_value: Option<f64>,
    pub milestone_2030: Option<f64>,
    pub milestone_2050: Option<f64>,
    pub removal: Option<RemovalReason>,
}

impl LongRecord {
    pub fn is_base(&self) -> bool {
        self.value_name == "Base"
    }

    pub fn secondary_is(&self, dim: &str) -> bool {
        self.secondary.as_deref() == Some(dim)
    }

    pub fn category_is(&self, cat: &str) -> bool {
        self.jmp_category.as_deref() == Some(cat)
    }

    pub fn commitment_mentions(&self, year: i32) -> bool {
        self.commitment
            .as_deref()
            .map(|c| c.contains(&year.to_string()))
            .unwrap_or(false)
    }
}

/// One melted JMP household-survey observation.
#[derive(Debug, Clone, PartialEq)]
pub struct JmpRecord {
    pub country: String,
    pub year: i32,
    pub jmp_name: Option<String>,
    pub value_type: String,
    pub jmp_category: String,
    pub value: Option<f64>,
}

/// One row of a key table (`id`, `value`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub id: u32,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct JmpRow {
    pub country_id: u32,
    pub year: i32,
    pub jmp_name_id: u32,
    pub jmp_category_id: u32,
    pub value_type_id: u32,
    #[tabled(display_with = "display_opt_f64")]
    pub value: Option<f64>,
}

/// An IFs record with every categorical column replaced by its surrogate id.
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct IfsRow {
    pub indicator_id: u32,
    pub year: i32,
    pub country_id: u32,
    pub unit_id: u32,
    pub value_name_id: u32,
    pub jmp_category_id: u32,
    pub commitment_id: u32,
    #[tabled(display_with = "display_opt_f64")]
    pub value: Option<f64>,
    #[tabled(display_with = "display_opt_f64")]
    pub initial_value: Option<f64>,
    #[tabled(display_with = "display_opt_f64")]
    pub base_value: Option<f64>,
    pub jmp_name_ids: String,
    // Graph-only helpers, not part of the normalized table.
    #[serde(skip)]
    #[tabled(skip)]
    pub milestone_2030: Option<f64>,
    #[serde(skip)]
    #[tabled(skip)]
    pub milestone_2050: Option<f64>,
}

/// Year at which a coverage series first reaches completion, or the sentinel
/// year with the last observed value when it never does.
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct ProgressRateRecord {
    pub indicator_id: u32,
    pub country_id: u32,
    pub jmp_category_id: u32,
    pub value_name_id: u32,
    pub year: i32,
    pub value: f64,
    #[tabled(display_with = "display_opt_f64")]
    pub avg_yearly_increase: Option<f64>,
    pub full_services: bool,
}

/// A charted row: `year` is snapped to a milestone, `actual_year` keeps the
/// observation year, and baseline rows are replicated under every scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Tabled)]
pub struct GraphRecord {
    pub indicator_id: u32,
    pub country_id: u32,
    pub unit_id: u32,
    pub value_name_id: u32,
    pub jmp_category_id: u32,
    pub commitment_id: u32,
    pub actual_commitment_id: u32,
    pub actual_year: i32,
    pub year: i32,
    pub value: f64,
    #[tabled(display_with = "display_opt_f64")]
    pub milestone_2030: Option<f64>,
    #[tabled(display_with = "display_opt_f64")]
    pub milestone_2050: Option<f64>,
    pub full_wash_coverage: u8,
}
