// Entry point and high-level CLI flow.
//
// One run loads the JMP and IFs inputs, writes every normalized table and
// key table to the output directory, then prints a short preview of each
// table and the run summary.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wash_etl::output::preview_table;
use wash_etl::pipeline::{
    GRAPH_OUTPUT_FILE, IFS_OUTPUT_FILE, JMP_OUTPUT_FILE, PROGRESS_OUTPUT_FILE, SUMMARY_OUTPUT_FILE,
};
use wash_etl::util::format_int;
use wash_etl::{Pipeline, PipelineConfig, PipelineInputs, RunOutput};

/// Normalize the JMP and IFs WASH datasets into keyed tables.
#[derive(Parser, Debug)]
#[command(name = "wash-etl")]
#[command(version)]
struct Args {
    /// JMP household-survey CSV
    #[arg(long, default_value = "input_data/JMP/jmp.csv", env = "WASH_ETL_JMP_FILE")]
    jmp_file: PathBuf,

    /// Directory holding the IFs forecasting CSVs
    #[arg(long, default_value = "input_data/IFs", env = "WASH_ETL_IFS_DIR")]
    ifs_dir: PathBuf,

    /// Directory receiving tables, key tables and summary.json
    #[arg(short, long, default_value = "output_data", env = "WASH_ETL_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Optional TOML configuration overriding the built-in defaults
    #[arg(short, long, env = "WASH_ETL_CONFIG")]
    config: Option<PathBuf>,

    /// Rows shown per table preview (0 disables previews)
    #[arg(long, default_value_t = 3)]
    preview_rows: usize,
}

fn print_report(output: &RunOutput, preview_rows: usize) {
    let s = &output.summary;
    println!(
        "Processed {} IFs files ({} derived rows, {} flagged as inconsistent, {} as commitment/year mismatches)\n",
        format_int(s.files_processed.len()),
        format_int(s.derived_rows),
        format_int(s.removed_inconsistent_category),
        format_int(s.removed_commitment_year)
    );
    let note = |rows: usize, file: &str| format!("{} rows, exported to {}", format_int(rows), file);
    preview_table("JMP table", Some(note(s.jmp_rows, JMP_OUTPUT_FILE).as_str()), &output.jmp, preview_rows);
    preview_table("IFs table", Some(note(s.ifs_rows, IFS_OUTPUT_FILE).as_str()), &output.ifs, preview_rows);
    preview_table(
        "Graph table",
        Some(note(s.graph_rows, GRAPH_OUTPUT_FILE).as_str()),
        &output.graph,
        preview_rows,
    );
    preview_table(
        "Progress rate table",
        Some(note(s.progress_rows, PROGRESS_OUTPUT_FILE).as_str()),
        &output.progress,
        preview_rows,
    );
    for (column, size) in &s.key_tables {
        println!("key_{}.csv: {} values", column, format_int(*size));
    }
    if !s.unmatched_countries.is_empty() {
        println!(
            "\nWarning: {} IFs countries have no JMP counterpart: {}",
            format_int(s.unmatched_countries.len()),
            s.unmatched_countries.join(", ")
        );
    }
    println!("\nSummary written to {}", SUMMARY_OUTPUT_FILE);
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wash_etl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = PipelineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    info!(
        jmp = %args.jmp_file.display(),
        ifs = %args.ifs_dir.display(),
        output = %args.output_dir.display(),
        "starting run"
    );

    let inputs = PipelineInputs {
        jmp_file: args.jmp_file,
        ifs_dir: args.ifs_dir,
        output_dir: args.output_dir,
    };
    let output = Pipeline::new(&config)
        .run(&inputs)
        .with_context(|| format!("Pipeline failed writing to {}", inputs.output_dir.display()))?;

    print_report(&output, args.preview_rows);
    Ok(())
}
