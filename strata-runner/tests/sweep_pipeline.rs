//! Integration tests for the runner pipeline: config file → data → sweep →
//! artifacts on disk.

use std::path::Path;

use chrono::NaiveDate;
use strata_core::strategy::Params;
use strata_core::ConfigError as EngineConfigError;
use strata_runner::{
    build_runner, export_history_csv, generate_synthetic, load_artifacts, load_data,
    ordered_windows, save_sweep, write_csv, ConfigError, DataConfig, ParamSweep, SweepConfig,
};

const BARS: usize = 120;

fn write_fixture_csv(dir: &Path) -> std::path::PathBuf {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let bars = generate_synthetic(&["AAA", "BBB"], BARS, 11, start);
    let path = dir.join("prices.csv");
    let file = std::fs::File::create(&path).unwrap();
    write_csv(&bars, file).unwrap();
    path
}

fn write_config(dir: &Path, csv: &Path, grid: &str, parallelism: usize) -> std::path::PathBuf {
    let text = format!(
        r#"
[data]
source = "csv"
path = "{}"

[book]
name = "Main"
cash = "100000"

[batch]
parallelism = {parallelism}

[strategy]
name = "sma_crossover"
size = "50"

[strategy.grid]
{grid}
"#,
        csv.display().to_string().replace('\\', "/")
    );
    let path = dir.join("sweep.toml");
    std::fs::write(&path, text).unwrap();
    path
}

fn sweep_from(config: &SweepConfig) -> strata_runner::SweepResults {
    let data = load_data(&config.data).unwrap();
    let runner = build_runner(config, &data).unwrap();
    let sets = config.param_grid().expand_where(ordered_windows);
    ParamSweep::new(runner)
        .with_parallelism(config.batch.parallelism)
        .sweep(&sets)
        .unwrap()
}

#[test]
fn csv_config_sweep_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_fixture_csv(dir.path());
    let config_path = write_config(
        dir.path(),
        &csv,
        "days_short = [3, 5, 10]\ndays_long = [10, 20]",
        2,
    );

    let config = SweepConfig::from_file(&config_path).unwrap();
    assert!(matches!(config.data, DataConfig::Csv { .. }));

    let data = load_data(&config.data).unwrap();
    assert_eq!(data.assets, vec!["AAA", "BBB"]);
    assert_eq!(data.table.len(), BARS);
    assert!(!data.has_synthetic);

    let results = sweep_from(&config);
    // (10, 10) is dropped by the window filter.
    assert_eq!(results.len(), 5);
    assert_eq!(results.failure_count(), 0);

    let ranked = results.ranked();
    for pair in ranked.windows(2) {
        assert!(pair[0].final_total() >= pair[1].final_total());
    }

    let out = dir.path().join("out");
    let best_dir = save_sweep(&results, &data.dataset_hash, data.has_synthetic, &out)
        .unwrap()
        .unwrap();

    let summary = std::fs::read_to_string(out.join("summary.csv")).unwrap();
    assert_eq!(summary.lines().count(), 1 + results.len());
    assert!(summary.lines().skip(1).all(|l| l.contains(",ok,")));

    for name in ["result.json", "history.csv", "trades.csv", "orders.csv"] {
        assert!(best_dir.join(name).exists(), "missing {name}");
    }

    let artifact = load_artifacts(&best_dir).unwrap();
    assert_eq!(artifact.dataset_hash, data.dataset_hash);
    assert_eq!(&artifact.result, results.best().unwrap());
}

#[test]
fn sweep_is_deterministic_across_parallelism() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_fixture_csv(dir.path());
    let grid = "days_short = [2, 4, 8]\ndays_long = [12, 24]";

    let seq = SweepConfig::from_file(&write_config(dir.path(), &csv, grid, 1)).unwrap();
    let par = SweepConfig::from_file(&write_config(dir.path(), &csv, grid, 4)).unwrap();

    let a = sweep_from(&seq);
    let b = sweep_from(&par);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.all().iter().zip(b.all()) {
        assert_eq!(x.as_ref().unwrap(), y.as_ref().unwrap());
    }
}

#[test]
fn invalid_grid_values_fail_before_any_run() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_fixture_csv(dir.path());
    let config_path = write_config(dir.path(), &csv, "days_short = [0, 3]\ndays_long = [15]", 2);
    let config = SweepConfig::from_file(&config_path).unwrap();

    let data = load_data(&config.data).unwrap();
    let runner = build_runner(&config, &data).unwrap();
    let sets = config.param_grid().expand_where(ordered_windows);
    assert_eq!(sets.len(), 2);

    let err = ParamSweep::new(runner)
        .with_parallelism(config.batch.parallelism)
        .sweep(&sets)
        .unwrap_err();
    match err {
        EngineConfigError::InvalidParams { params, .. } => {
            assert_eq!(params.get_int("days_short").unwrap(), 0);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn strategy_asset_typo_is_caught_when_building_the_runner() {
    let config = SweepConfig::from_toml(
        r#"
[data]
source = "synthetic"
assets = ["AAA", "BBB"]
bars = 30

[strategy]
name = "sma_crossover"
assets = ["AAB"]
"#,
    )
    .unwrap();
    let data = load_data(&config.data).unwrap();
    let err = build_runner(&config, &data).err().unwrap();
    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::UnknownAsset { section, asset }) => {
            assert_eq!(*section, "strategy.assets");
            assert_eq!(asset, "AAB");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn synthetic_config_runs_and_exports_history() {
    let config = SweepConfig::from_toml(
        r#"
[data]
source = "synthetic"
assets = ["AAA"]
bars = 60
seed = 5

[strategy]
name = "buy_and_hold"
size = "10"
"#,
    )
    .unwrap();
    let data = load_data(&config.data).unwrap();
    assert!(data.has_synthetic);

    let runner = build_runner(&config, &data).unwrap();
    let result = runner.run(&Params::new()).unwrap();
    assert_eq!(result.bar_count, 60);
    assert_eq!(result.trades().count(), 1);

    let csv = export_history_csv(&result).unwrap();
    let mut lines = csv.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("timestamp,Main.cash"));
    assert!(header.contains("Main.position.AAA"));
    assert!(header.ends_with("Main.mtm,Main.total"));
    assert_eq!(lines.count(), 60);
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SweepConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
