use std::fs;
use std::path::Path;

use wash_etl::pipeline::{GRAPH_OUTPUT_FILE, IFS_OUTPUT_FILE, JMP_OUTPUT_FILE, PROGRESS_OUTPUT_FILE, SUMMARY_OUTPUT_FILE};
use wash_etl::{DecodeError, Pipeline, PipelineConfig, PipelineError, PipelineInputs, RunOutput};

const WATER_FILE: &str =
    "17. Water Services, Access, percent of population (2nd Dimension = Basic + Safely Managed).csv";
const POPULATION_FILE: &str = "21. Population - Millions.csv";

const JMP_CSV: &str = "\
Country,Year,Service,Total ALB,Rate ALB,Total SM,Rate SM,Manual SM,Manual ALB
Kenya,2020,Water,62,1.1,28,0.5,,
Democratic Republic of the Congo,2020,Sanitation,15,0.2,,,,
";

const WATER_CSV: &str = "\
Water Services Access
,Kenya,Kenya,Kenya,Kenya
,
,Basic,SafelyManaged,Basic,SafelyManaged
,Percent,Percent,Percent,Percent
,Base,Base,FW_ALB_2030,FW_SM_2030
2019,40,10,40,10
2022,50,15,55,20
2030,60,20,79,21
2050,70,29,80,20
";

const POPULATION_CSV: &str = "\
Population
,Kenya,Congo Dem. Republic of the
,
,,
,Millions 2017,Millions
,Base,Base
2020,53.8,99.0
2021,55,101
";

fn write_inputs(root: &Path, population_csv: &str) -> PipelineInputs {
    let ifs_dir = root.join("IFs");
    fs::create_dir_all(&ifs_dir).unwrap();
    fs::write(root.join("jmp.csv"), JMP_CSV).unwrap();
    fs::write(ifs_dir.join(WATER_FILE), WATER_CSV).unwrap();
    fs::write(ifs_dir.join(POPULATION_FILE), population_csv).unwrap();
    PipelineInputs {
        jmp_file: root.join("jmp.csv"),
        ifs_dir,
        output_dir: root.join("out"),
    }
}

fn run(inputs: &PipelineInputs) -> RunOutput {
    let config = PipelineConfig::default();
    Pipeline::new(&config).run(inputs).unwrap()
}

fn key_file(inputs: &PipelineInputs, column: &str) -> String {
    fs::read_to_string(inputs.output_dir.join(format!("key_{column}.csv"))).unwrap()
}

#[test]
fn writes_every_table() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(dir.path(), POPULATION_CSV);
    run(&inputs);
    for name in [
        JMP_OUTPUT_FILE,
        IFS_OUTPUT_FILE,
        GRAPH_OUTPUT_FILE,
        PROGRESS_OUTPUT_FILE,
        SUMMARY_OUTPUT_FILE,
    ] {
        assert!(inputs.output_dir.join(name).is_file(), "{name} missing");
    }
    for column in ["country", "jmp_name", "jmp_category", "value_type", "indicator", "unit", "value_name", "commitment"] {
        assert!(inputs.output_dir.join(format!("key_{column}.csv")).is_file());
    }
    let header = fs::read_to_string(inputs.output_dir.join(IFS_OUTPUT_FILE)).unwrap();
    assert!(header.starts_with(
        "indicator_id,year,country_id,unit_id,value_name_id,jmp_category_id,commitment_id,value,initial_value,base_value,jmp_name_ids\n"
    ));
}

#[test]
fn key_tables_use_display_labels_and_shared_ids() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(dir.path(), POPULATION_CSV);
    let output = run(&inputs);

    assert_eq!(
        key_file(&inputs, "country"),
        "id,value\n1,Democratic Republic of the Congo\n2,Kenya\n"
    );
    assert_eq!(
        key_file(&inputs, "jmp_category"),
        "id,value\n1,At Least Basic\n2,Safely Managed\n"
    );
    assert_eq!(
        key_file(&inputs, "commitment"),
        "id,value\n1,Business-as-usual\n2,Full Water Access in 2030\n"
    );
    assert_eq!(key_file(&inputs, "unit"), "id,value\n1,Millions\n2,Percent\n");
    assert!(output.summary.unmatched_countries.is_empty());
}

#[test]
fn normalized_ifs_rows_carry_derived_values() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(dir.path(), POPULATION_CSV);
    let output = run(&inputs);

    // 16 water rows minus two 2030-commitment rows observed in 2050, plus 4 population rows.
    assert_eq!(output.ifs.len(), 18);
    assert_eq!(output.summary.removed_commitment_year, 2);
    assert_eq!(output.summary.removed_inconsistent_category, 0);
    assert!(output.ifs.windows(2).all(|w| w[0].year <= w[1].year));

    // Scenario at-least-basic row in 2030: 79 + 21, Base sibling 60 + 20, series starts at 40 + 10.
    let fw_2030 = output
        .ifs
        .iter()
        .find(|r| r.year == 2030 && r.commitment_id == 2 && r.jmp_category_id == 1)
        .unwrap();
    assert_eq!(fw_2030.value, Some(100.0));
    assert_eq!(fw_2030.base_value, Some(80.0));
    assert_eq!(fw_2030.initial_value, Some(50.0));
    // jmp_name ids: Sanitation = 1, Water = 2.
    assert_eq!(fw_2030.jmp_name_ids, "[2]");

    // Population rows have no category and no WASH backfills.
    let congo = output
        .ifs
        .iter()
        .find(|r| r.country_id == 1 && r.year == 2021)
        .unwrap();
    assert_eq!(congo.jmp_category_id, 0);
    assert_eq!(congo.commitment_id, 1);
    assert_eq!(congo.value, Some(101.0));
    assert_eq!(congo.initial_value, None);
}

#[test]
fn progress_table_has_one_record_per_baseline_series() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(dir.path(), POPULATION_CSV);
    let output = run(&inputs);

    assert_eq!(output.progress.len(), 2);
    let alb = output.progress.iter().find(|r| r.jmp_category_id == 1).unwrap();
    assert!(alb.full_services);
    assert_eq!(alb.year, 2050);
    assert_eq!(alb.value, 99.0);

    let sm = output.progress.iter().find(|r| r.jmp_category_id == 2).unwrap();
    assert!(!sm.full_services);
    assert_eq!(sm.year, 2100);
    assert_eq!(sm.value, 29.0);
}

#[test]
fn graph_replicates_baseline_across_milestones_and_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(dir.path(), POPULATION_CSV);
    let output = run(&inputs);

    // Per series: 2019, 2022 and 2030 appear under both milestones, 2050 once.
    // Two baseline series (x2 for the scenario replica) and two scenario series.
    assert_eq!(output.graph.len(), 7 * 2 * 2 + 7 * 2);
    assert!(output.graph.iter().all(|r| r.indicator_id != 0));

    let baseline_2030: Vec<_> = output
        .graph
        .iter()
        .filter(|r| r.actual_year == 2030 && r.actual_commitment_id == 1 && r.jmp_category_id == 1)
        .collect();
    assert_eq!(baseline_2030.len(), 4);
    for milestone in [2030, 2050] {
        let original = baseline_2030
            .iter()
            .find(|r| r.year == milestone && r.full_wash_coverage == 1)
            .unwrap();
        assert_eq!(original.commitment_id, 1);
        assert_eq!(original.value, 80.0);
        let replica = baseline_2030
            .iter()
            .find(|r| r.year == milestone && r.full_wash_coverage == 0)
            .unwrap();
        assert_eq!(replica.commitment_id, 2);
    }

    // The 2030 commitment observed in 2050 is kept for the chart.
    assert!(output
        .graph
        .iter()
        .any(|r| r.commitment_id == 2 && r.actual_year == 2050 && r.full_wash_coverage == 1));
}

#[test]
fn rerun_keeps_ids_and_appends_new_values() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = write_inputs(dir.path(), POPULATION_CSV);
    run(&inputs);
    let first_countries = key_file(&inputs, "country");
    let first_indicators = key_file(&inputs, "indicator");

    run(&inputs);
    assert_eq!(key_file(&inputs, "country"), first_countries);
    assert_eq!(key_file(&inputs, "indicator"), first_indicators);

    let with_benin = "\
Population
,Kenya,Congo Dem. Republic of the,Benin
,
,,,
,Millions,Millions,Millions
,Base,Base,Base
2020,53.8,99.0,12.1
";
    let inputs = write_inputs(dir.path(), with_benin);
    let output = run(&inputs);
    let countries = key_file(&inputs, "country");
    assert!(countries.starts_with(&first_countries));
    assert_eq!(countries, format!("{first_countries}3,Benin\n"));
    assert_eq!(output.summary.unmatched_countries, vec!["Benin"]);
}

#[test]
fn header_without_year_axis_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let broken = "\
Population
Country,Kenya
,
Dim,
Unit,Millions
Type,Base
2020,53.8
";
    let inputs = write_inputs(dir.path(), broken);
    let config = PipelineConfig::default();
    let err = Pipeline::new(&config).run(&inputs).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Decode(DecodeError::MissingYearAxis { ref source_id }) if source_id == POPULATION_FILE
    ));
}
