// Run driver. Stages run in sequence and each table is written as soon as
// its stage completes, so a failing stage leaves earlier outputs on disk.
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::decoder::{decode_wide, melt_jmp};
use crate::derive::{DerivationEngine, DerivedTable, View, BASE};
use crate::error::Result;
use crate::graph::GraphTableBuilder;
use crate::keys::{KeyRegistry, UNMATCHED_ID};
use crate::loader::{list_ifs_files, read_grid};
use crate::output::{write_csv, write_json};
use crate::progress::ProgressRateExtractor;
use crate::types::{GraphRecord, IfsRow, JmpRecord, JmpRow, LongRecord, ProgressRateRecord, RemovalReason};

pub const JMP_OUTPUT_FILE: &str = "table_jmp.csv";
pub const IFS_OUTPUT_FILE: &str = "table_ifs.csv";
pub const GRAPH_OUTPUT_FILE: &str = "table_graph.csv";
pub const PROGRESS_OUTPUT_FILE: &str = "table_progress_rate.csv";
pub const SUMMARY_OUTPUT_FILE: &str = "summary.json";

#[derive(Debug, Clone)]
pub struct PipelineInputs {
    pub jmp_file: PathBuf,
    pub ifs_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub files_processed: Vec<String>,
    pub jmp_rows: usize,
    pub derived_rows: usize,
    pub ifs_rows: usize,
    pub graph_rows: usize,
    pub progress_rows: usize,
    pub removed_inconsistent_category: usize,
    pub removed_commitment_year: usize,
    pub key_tables: BTreeMap<String, usize>,
    /// IFs countries with no JMP counterpart after alias normalization.
    pub unmatched_countries: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub jmp: Vec<JmpRow>,
    pub ifs: Vec<IfsRow>,
    pub graph: Vec<GraphRecord>,
    pub progress: Vec<ProgressRateRecord>,
    pub summary: RunSummary,
}

fn jmp_value<'r>(r: &'r JmpRecord, column: &str) -> Option<&'r str> {
    match column {
        "country" => Some(r.country.as_str()),
        "jmp_name" => r.jmp_name.as_deref(),
        "jmp_category" => Some(r.jmp_category.as_str()),
        "value_type" => Some(r.value_type.as_str()),
        _ => None,
    }
}

fn ifs_value<'r>(r: &'r LongRecord, column: &str) -> Option<&'r str> {
    match column {
        "indicator" => Some(r.indicator.as_str()),
        "unit" => r.unit.as_deref(),
        "value_name" => Some(r.value_name.as_str()),
        "jmp_category" => r.jmp_category.as_deref(),
        "commitment" => r.commitment.as_deref(),
        "country" => Some(r.country.as_str()),
        _ => None,
    }
}

/// Read and melt the JMP household-survey file.
pub fn load_jmp(path: &Path, config: &PipelineConfig) -> Result<Vec<JmpRecord>> {
    let grid = read_grid(path)?;
    let records = melt_jmp(&grid, config);
    info!(file = %grid.source_id, rows = records.len(), "JMP file melted");
    Ok(records)
}

/// Decode and derive every IFs file, concatenating the per-file tables.
pub fn load_ifs(dir: &Path, config: &PipelineConfig) -> Result<(DerivedTable, Vec<String>)> {
    let engine = DerivationEngine::new(config);
    let mut table = DerivedTable::default();
    let mut sources = Vec::new();
    for path in list_ifs_files(dir, config)? {
        let grid = read_grid(&path)?;
        info!(file = %grid.source_id, "processing IFs file");
        let records = decode_wide(&grid, config)?;
        table.append(engine.derive(records));
        sources.push(grid.source_id);
    }
    Ok((table, sources))
}

pub struct Pipeline<'c> {
    config: &'c PipelineConfig,
}

impl<'c> Pipeline<'c> {
    pub fn new(config: &'c PipelineConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, inputs: &PipelineInputs) -> Result<RunOutput> {
        let config = self.config;
        std::fs::create_dir_all(&inputs.output_dir)?;
        let out = |name: &str| inputs.output_dir.join(name);

        let jmp_records = load_jmp(&inputs.jmp_file, config)?;
        let (derived, files_processed) = load_ifs(&inputs.ifs_dir, config)?;

        let mut registry = KeyRegistry::open(&inputs.output_dir, config);

        // JMP is keyed first so shared tables (country, jmp_category) keep
        // their JMP ids when IFs adds values.
        for column in &config.key_columns_jmp {
            registry.register(column, jmp_records.iter().filter_map(|r| jmp_value(r, column)))?;
        }
        let jmp = join_jmp(&jmp_records, &registry);
        write_csv(&out(JMP_OUTPUT_FILE), &jmp)?;

        let keyed_rows = derived.materialize(View::Graph);
        for column in &config.key_columns_ifs {
            registry.register(column, keyed_rows.iter().filter_map(|r| ifs_value(r, column)))?;
        }
        let jmp_name_ids = JmpNameIds::resolve(&registry);

        let ifs: Vec<IfsRow> = derived
            .materialize(View::Normalized)
            .into_iter()
            .map(|r| join_ifs(r, &registry, &jmp_name_ids))
            .collect();
        write_csv(&out(IFS_OUTPUT_FILE), &ifs)?;

        let baseline_id = registry.id("commitment", Some(BASE));
        if baseline_id == UNMATCHED_ID {
            warn!("no baseline commitment registered; graph and progress tables will be empty");
        }

        let graph_ids = self.indicator_ids(&registry, &config.graph_indicators);
        let graph_input: Vec<IfsRow> = keyed_rows
            .iter()
            .map(|r| join_ifs(r, &registry, &jmp_name_ids))
            .filter(|r| graph_ids.contains(&r.indicator_id))
            .collect();
        let graph_refs: Vec<&IfsRow> = graph_input.iter().collect();
        let graph = GraphTableBuilder::new(&config.milestone_years).build(&graph_refs, baseline_id);
        write_csv(&out(GRAPH_OUTPUT_FILE), &graph)?;

        let coverage_ids = self.indicator_ids(&registry, &config.coverage_indicators);
        let baseline_coverage: Vec<&IfsRow> = ifs
            .iter()
            .filter(|r| coverage_ids.contains(&r.indicator_id) && r.commitment_id == baseline_id)
            .collect();
        let progress = ProgressRateExtractor::new(config.completion_threshold, config.never_complete_year)
            .extract(&baseline_coverage);
        write_csv(&out(PROGRESS_OUTPUT_FILE), &progress)?;

        let unmatched_countries = unmatched_countries(&jmp_records, &keyed_rows);
        for country in &unmatched_countries {
            warn!(country = %country, "IFs country has no JMP counterpart; check the alias table");
        }

        let summary = RunSummary {
            generated_at: Utc::now(),
            files_processed,
            jmp_rows: jmp.len(),
            derived_rows: derived.len(),
            ifs_rows: ifs.len(),
            graph_rows: graph.len(),
            progress_rows: progress.len(),
            removed_inconsistent_category: derived.count_removed(RemovalReason::InconsistentCategory),
            removed_commitment_year: derived.count_removed(RemovalReason::CommitmentYearMismatch),
            key_tables: registry
                .tables()
                .map(|t| (t.column().to_string(), t.len()))
                .collect(),
            unmatched_countries,
        };
        write_json(&out(SUMMARY_OUTPUT_FILE), &summary)?;
        info!(
            ifs_rows = summary.ifs_rows,
            graph_rows = summary.graph_rows,
            progress_rows = summary.progress_rows,
            "run complete"
        );

        Ok(RunOutput {
            jmp,
            ifs,
            graph,
            progress,
            summary,
        })
    }

    fn indicator_ids(&self, registry: &KeyRegistry, names: &[String]) -> HashSet<u32> {
        let mut ids = HashSet::new();
        for name in names {
            match registry.id("indicator", Some(name.as_str())) {
                UNMATCHED_ID => warn!(indicator = %name, "configured indicator not present in this run"),
                id => {
                    ids.insert(id);
                }
            }
        }
        ids
    }
}

/// Ids of the `Water` and `Sanitation` JMP names, implied by the `W`/`S`
/// letters of an IFs value name.
struct JmpNameIds {
    water: u32,
    sanitation: u32,
}

impl JmpNameIds {
    fn resolve(registry: &KeyRegistry) -> Self {
        Self {
            water: registry.id("jmp_name", Some("Water")),
            sanitation: registry.id("jmp_name", Some("Sanitation")),
        }
    }

    fn for_value_name(&self, value_name: &str) -> String {
        let mut ids = Vec::new();
        if value_name.contains('W') && self.water != UNMATCHED_ID {
            ids.push(self.water);
        }
        if value_name.contains('S') && self.sanitation != UNMATCHED_ID {
            ids.push(self.sanitation);
        }
        serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string())
    }
}

fn join_jmp(records: &[JmpRecord], registry: &KeyRegistry) -> Vec<JmpRow> {
    records
        .iter()
        .map(|r| JmpRow {
            country_id: registry.id("country", jmp_value(r, "country")),
            year: r.year,
            jmp_name_id: registry.id("jmp_name", jmp_value(r, "jmp_name")),
            jmp_category_id: registry.id("jmp_category", jmp_value(r, "jmp_category")),
            value_type_id: registry.id("value_type", jmp_value(r, "value_type")),
            value: r.value,
        })
        .collect()
}

fn join_ifs(r: &LongRecord, registry: &KeyRegistry, jmp_names: &JmpNameIds) -> IfsRow {
    IfsRow {
        indicator_id: registry.id("indicator", ifs_value(r, "indicator")),
        year: r.year,
        country_id: registry.id("country", ifs_value(r, "country")),
        unit_id: registry.id("unit", ifs_value(r, "unit")),
        value_name_id: registry.id("value_name", ifs_value(r, "value_name")),
        jmp_category_id: registry.id("jmp_category", ifs_value(r, "jmp_category")),
        commitment_id: registry.id("commitment", ifs_value(r, "commitment")),
        value: r.value,
        initial_value: r.initial_value,
        base_value: r.base_value,
        jmp_name_ids: jmp_names.for_value_name(&r.value_name),
        milestone_2030: r.milestone_2030,
        milestone_2050: r.milestone_2050,
    }
}

fn unmatched_countries(jmp: &[JmpRecord], ifs: &[&LongRecord]) -> Vec<String> {
    if jmp.is_empty() {
        return Vec::new();
    }
    let known: HashSet<&str> = jmp.iter().map(|r| r.country.as_str()).collect();
    let unmatched: BTreeSet<&str> = ifs
        .iter()
        .map(|r| r.country.as_str())
        .filter(|c| !known.contains(c))
        .collect();
    unmatched.into_iter().map(str::to_string).collect()
}
