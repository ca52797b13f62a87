// Pipeline configuration. Every field has a default, so an empty or absent
// TOML file works.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Categorical columns a JMP record can be keyed on.
pub const JMP_CATEGORICAL_COLUMNS: &[&str] = &["country", "jmp_name", "jmp_category", "value_type"];

/// Categorical columns an IFs record can be keyed on.
pub const IFS_CATEGORICAL_COLUMNS: &[&str] = &[
    "indicator",
    "unit",
    "value_name",
    "jmp_category",
    "commitment",
    "country",
];

/// IFs spellings mapped onto the JMP (UN M49) country names.
static BUILTIN_COUNTRY_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Congo Dem. Republic of the", "Democratic Republic of the Congo"),
        ("Congo Rep. of", "Congo"),
        ("Korea Dem. People's Rep. of", "Democratic People's Republic of Korea"),
        ("Korea Rep. of", "Republic of Korea"),
        ("Iran", "Iran (Islamic Republic of)"),
        ("Lao People's Dem. Rep.", "Lao People's Democratic Republic"),
        ("Laos", "Lao People's Democratic Republic"),
        ("Micronesia Fed. Sts.", "Micronesia (Federated States of)"),
        ("Tanzania", "United Republic of Tanzania"),
        ("Vietnam", "Viet Nam"),
        ("Bolivia", "Bolivia (Plurinational State of)"),
        ("Venezuela", "Venezuela (Bolivarian Republic of)"),
        ("Syria", "Syrian Arab Republic"),
        ("Moldova", "Republic of Moldova"),
        ("Russia", "Russian Federation"),
        ("Cote d'Ivoire", "Côte d'Ivoire"),
        ("Cote d Ivoire", "Côte d'Ivoire"),
        ("Gambia The", "Gambia"),
        ("Macedonia", "North Macedonia"),
        ("Cape Verde", "Cabo Verde"),
        ("Swaziland", "Eswatini"),
        ("Turkey", "Türkiye"),
        ("East Timor", "Timor-Leste"),
        ("Yemen Rep. of", "Yemen"),
        ("Egypt Arab Rep.", "Egypt"),
        ("Palestine", "State of Palestine"),
    ])
});

/// Where each header level sits in a wide IFs file (0-based line numbers).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeaderLayout {
    pub country_row: usize,
    /// `None` for layouts without a second dimension.
    pub secondary_row: Option<usize>,
    pub unit_row: usize,
    pub value_type_row: usize,
}

impl Default for HeaderLayout {
    fn default() -> Self {
        Self {
            country_row: 1,
            secondary_row: Some(3),
            unit_row: 4,
            value_type_row: 5,
        }
    }
}

impl HeaderLayout {
    /// First line holding yearly data.
    pub fn data_start(&self) -> usize {
        let rows = [
            Some(self.country_row),
            self.secondary_row,
            Some(self.unit_row),
            Some(self.value_type_row),
        ];
        rows.iter().flatten().copied().max().unwrap_or(0) + 1
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Columns of the JMP table that receive surrogate keys.
    pub key_columns_jmp: Vec<String>,
    /// Columns of the IFs table that receive surrogate keys.
    pub key_columns_ifs: Vec<String>,
    /// Extra aliases, consulted before the built-in table.
    pub country_aliases: BTreeMap<String, String>,
    pub milestone_years: Vec<i32>,
    /// Years a file must contain to count as covering the full range; also the
    /// years receiving an initial-value backfill.
    pub full_range_years: Vec<i32>,
    pub completion_threshold: f64,
    pub never_complete_year: i32,
    /// Substrings identifying water/sanitation service indicators.
    pub wash_indicator_markers: Vec<String>,
    /// Coverage (percent of population) indicators fed to the progress table.
    pub coverage_indicators: Vec<String>,
    /// Indicators charted in the graph table.
    pub graph_indicators: Vec<String>,
    /// Per key table, internal code -> label written to disk.
    pub display_labels: BTreeMap<String, BTreeMap<String, String>>,
    pub header: HeaderLayout,
    /// Explicit IFs file list; empty means every `*.csv` in the directory.
    pub ifs_files: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let coverage = vec![
            "Sanitation Services, Access, percent of population".to_string(),
            "Water Services, Access, percent of population".to_string(),
        ];
        let mut display_labels = BTreeMap::new();
        display_labels.insert(
            "jmp_category".to_string(),
            BTreeMap::from([
                ("ALB".to_string(), "At Least Basic".to_string()),
                ("SM".to_string(), "Safely Managed".to_string()),
            ]),
        );
        display_labels.insert(
            "commitment".to_string(),
            BTreeMap::from([("Base".to_string(), "Business-as-usual".to_string())]),
        );
        Self {
            key_columns_jmp: JMP_CATEGORICAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            key_columns_ifs: IFS_CATEGORICAL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            country_aliases: BTreeMap::new(),
            milestone_years: vec![2030, 2050],
            full_range_years: vec![2022, 2030, 2050],
            completion_threshold: 99.0,
            never_complete_year: 2100,
            wash_indicator_markers: vec![
                "Sanitation Services".to_string(),
                "Water Services".to_string(),
            ],
            graph_indicators: coverage.clone(),
            coverage_indicators: coverage,
            display_labels,
            header: HeaderLayout::default(),
            ifs_files: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file, or use the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                debug!(path = %path.display(), "loading pipeline config");
                let raw = std::fs::read_to_string(path)?;
                toml::from_str::<PipelineConfig>(&raw)?
            }
            None => PipelineConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_columns("key_columns_jmp", &self.key_columns_jmp, JMP_CATEGORICAL_COLUMNS)?;
        check_columns("key_columns_ifs", &self.key_columns_ifs, IFS_CATEGORICAL_COLUMNS)?;
        if self.milestone_years.is_empty() {
            return Err(PipelineError::Config("milestone_years must not be empty".into()));
        }
        if self.milestone_years.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PipelineError::Config(
                "milestone_years must be strictly ascending".into(),
            ));
        }
        for (column, labels) in &self.display_labels {
            let mut seen = HashSet::new();
            for label in labels.values() {
                if !seen.insert(label.as_str()) {
                    return Err(PipelineError::Config(format!(
                        "display label '{label}' is used twice for key table '{column}'"
                    )));
                }
            }
            // A label equal to another internal code would be reversed into it on load.
            for (code, label) in labels {
                if code != label && labels.contains_key(label) {
                    return Err(PipelineError::Config(format!(
                        "display label '{label}' for key table '{column}' collides with an internal code"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Apply the alias table; unmapped names pass through unchanged.
    pub fn normalize_country(&self, name: &str) -> String {
        let name = name.trim();
        if let Some(alias) = self.country_aliases.get(name) {
            return alias.clone();
        }
        BUILTIN_COUNTRY_ALIASES
            .get(name)
            .map(|alias| alias.to_string())
            .unwrap_or_else(|| name.to_string())
    }

    pub fn is_wash(&self, indicator: &str) -> bool {
        self.wash_indicator_markers
            .iter()
            .any(|marker| indicator.contains(marker.as_str()))
    }

    pub fn display_label<'a>(&'a self, column: &str, value: &'a str) -> &'a str {
        self.display_labels
            .get(column)
            .and_then(|labels| labels.get(value))
            .map(|s| s.as_str())
            .unwrap_or(value)
    }

    /// Inverse of [`display_label`](Self::display_label).
    pub fn internal_value<'a>(&'a self, column: &str, label: &'a str) -> &'a str {
        self.display_labels
            .get(column)
            .and_then(|labels| labels.iter().find(|(_, l)| l.as_str() == label))
            .map(|(code, _)| code.as_str())
            .unwrap_or(label)
    }
}

fn check_columns(field: &str, columns: &[String], known: &[&str]) -> Result<()> {
    for column in columns {
        if !known.contains(&column.as_str()) {
            return Err(PipelineError::Config(format!(
                "{field}: unknown categorical column '{column}' (expected one of {known:?})"
            )));
        }
    }
    Ok(())
}
