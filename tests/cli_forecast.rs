use std::fs;
use std::path::Path;
use std::process::Command;

use tadpole::config::{ForecastConfig, StrategyKind};
use tempfile::tempdir;

/// Subject 23 was seen twice, subject 45 only once.
const VISITS: &str = "\
RID,EXAMDATE,AGE,DX,ADAS13,Ventricles,ICV_bl,LB2
23,2010-01-01,70.0,MCI,20,30000,1500000,1
23,2010-07-02,70.0,MCI,22,31500,1500000,1
45,2009-03-15,66.5,NL,9.67,25000,1600000,1
";

fn tadpole(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_tadpole"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run tadpole cli")
}

#[test]
fn config_command_writes_a_loadable_default() {
    let tmp = tempdir().expect("temporary directory");
    let output = tadpole(tmp.path(), &["config"]);
    assert!(output.status.success(), "CLI exited with {:?}", output.status);

    let loaded = ForecastConfig::load(tmp.path().join("forecast.toml").to_str().unwrap())
        .expect("load written configuration");
    assert_eq!(loaded, ForecastConfig::default());
}

#[test]
fn forecast_then_evaluate_with_flag_overrides() {
    let tmp = tempdir().expect("temporary directory");
    fs::write(tmp.path().join("visits.csv"), VISITS).expect("write visits");
    fs::write(
        tmp.path().join("truth.csv"),
        "RID,CognitiveAssessmentDate,Diagnosis,ADAS13,ScanDate,Ventricles\n\
         23,2010-06-15,,24,2010-06-15,0.0215\n",
    )
    .expect("write truth");

    let forecast = tadpole(
        tmp.path(),
        &[
            "forecast",
            "visits.csv",
            "--strategy",
            "linear-trend",
            "--horizon",
            "3",
            "--skip-failures",
        ],
    );
    assert!(forecast.status.success(), "forecast exited with {:?}", forecast.status);
    let stdout = String::from_utf8_lossy(&forecast.stdout);
    assert!(stdout.contains("Forecasting 3 months from 2010-05-01 with the linear-trend strategy"));
    assert!(stdout.contains("Skipped subject 45"));

    let submission = fs::read_to_string(tmp.path().join("submission.csv")).expect("read submission");
    let rows: Vec<&str> = submission.lines().skip(1).collect();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| row.starts_with("23,")));

    let evaluate = tadpole(
        tmp.path(),
        &["evaluate", "submission.csv", "--truth", "truth.csv", "--output", "scores.toml"],
    );
    assert!(evaluate.status.success(), "evaluate exited with {:?}", evaluate.status);
    assert!(String::from_utf8_lossy(&evaluate.stdout).contains("ADAS13 (1 items)"));
    let scores = fs::read_to_string(tmp.path().join("scores.toml")).expect("read scores");
    assert!(scores.contains("[adas13]"));
    assert!(scores.contains("[ventricles]"));
    assert!(scores.contains("count = 1"));
    assert!(!scores.contains("[diagnosis]"));
}

#[test]
fn forecast_without_skip_stops_on_single_visit_subject() {
    let tmp = tempdir().expect("temporary directory");
    fs::write(tmp.path().join("visits.csv"), VISITS).expect("write visits");

    let config = ForecastConfig {
        strategy: StrategyKind::LinearTrend,
        horizon_months: 2,
        ..ForecastConfig::default()
    };
    config
        .save(tmp.path().join("forecast.toml").to_str().unwrap())
        .expect("save configuration");

    let output = tadpole(tmp.path(), &["forecast", "visits.csv", "--config", "forecast.toml"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("Error:"));
    assert!(!tmp.path().join("submission.csv").exists());
}
