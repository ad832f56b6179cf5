#![forbid(unsafe_code)]

use mpx_conformance::scenario_log::set_scenario_log_path;
use mpx_conformance::{
    HarnessConfig, SCENARIOS, ScenarioSpec, SuiteReport, find_scenario, run_reference_scenarios,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize)]
struct GateSummary {
    status: &'static str,
    solver: String,
    driver: String,
    scenario_log: String,
    suite: String,
    case_count: usize,
    pass_count: usize,
    skipped: Option<String>,
    failures: Vec<String>,
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("run_reference_gate failed: {err}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<bool, String> {
    let mut log_path: Option<PathBuf> = None;
    let mut selected: Vec<ScenarioSpec> = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--log-path" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--log-path requires a value".to_string())?;
                log_path = Some(PathBuf::from(value));
            }
            "--scenario" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--scenario requires a value".to_string())?;
                let scenario =
                    find_scenario(&value).ok_or_else(|| format!("unknown scenario: {value}"))?;
                selected.push(scenario);
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p mpx-conformance --bin run_reference_gate -- [--log-path <path>] [--scenario <name>]..."
                );
                for scenario in SCENARIOS {
                    println!("  {:<10} {}", scenario.name, scenario.description);
                }
                return Ok(true);
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    let ts_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis());
    let log_path = log_path.unwrap_or_else(|| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../artifacts/logs")
            .join(format!("reference_gate_{ts_millis}.jsonl"))
    });
    set_scenario_log_path(Some(log_path.clone()));

    let cfg = HarnessConfig::from_env();
    let scenarios = if selected.is_empty() {
        SCENARIOS
    } else {
        selected.as_slice()
    };
    let report = run_reference_scenarios(&cfg, scenarios)?;

    let summary = summarize(&cfg, &report, &log_path);
    let passed = summary.status != "fail";
    let summary_json = serde_json::to_string_pretty(&summary)
        .map_err(|err| format!("failed serializing summary: {err}"))?;
    println!("{summary_json}");
    Ok(passed)
}

fn summarize(cfg: &HarnessConfig, report: &SuiteReport, log_path: &std::path::Path) -> GateSummary {
    let status = if report.is_skipped() {
        "skipped"
    } else if report.all_passed() {
        "pass"
    } else {
        "fail"
    };
    GateSummary {
        status,
        solver: cfg.solver.name.clone(),
        driver: cfg.driver.clone(),
        scenario_log: log_path.display().to_string(),
        suite: report.suite.to_string(),
        case_count: report.case_count,
        pass_count: report.pass_count,
        skipped: report.skipped.clone(),
        failures: report.failures.clone(),
    }
}
