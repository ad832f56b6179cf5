#![forbid(unsafe_code)]

pub mod capability;
pub mod scenario_log;
pub mod solve;

use crate::capability::{SuiteGate, probe_capabilities};
use crate::scenario_log::{ScenarioLogEntry, append_scenario_log, file_digest};
use crate::solve::{SolveInvocation, SolveOutcome, execute_solve};
use mpx_results::{ComparisonSummary, Tolerance, compare_objectives, load_objectives};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const REFERENCE_SUITE_ID: &str = "mpec_reference";
pub const RESULT_FILE_NAME: &str = "result.yml";
pub const REFERENCE_EXTENSION: &str = "txt";
pub const PROBLEM_EXTENSION: &str = "py";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverSpec {
    /// Name handed to the driver as `--solver=`.
    pub name: String,
    /// Binary the driver launches for this solver; probed before a suite runs.
    pub executable: String,
    pub options: String,
}

impl SolverSpec {
    #[must_use]
    pub fn path_solver() -> Self {
        Self {
            name: "path".to_string(),
            executable: "pathampl".to_string(),
            options: "lemke_start=automatic output_options=yes".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
    pub problem_root: PathBuf,
    pub work_root: PathBuf,
    pub driver: String,
    pub solver: SolverSpec,
    pub tolerance: Tolerance,
    pub debug_solver: bool,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        let repo_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
            problem_root: repo_root.join("models/mpec"),
            work_root: repo_root.join("artifacts/runs"),
            driver: "pyomo".to_string(),
            solver: SolverSpec::path_solver(),
            tolerance: Tolerance::default(),
            debug_solver: false,
        }
    }

    /// Default paths with `MPX_*` environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default_paths();
        if let Some(value) = env_override("MPX_FIXTURE_ROOT") {
            cfg.fixture_root = PathBuf::from(value);
        }
        if let Some(value) = env_override("MPX_PROBLEM_ROOT") {
            cfg.problem_root = PathBuf::from(value);
        }
        if let Some(value) = env_override("MPX_WORK_ROOT") {
            cfg.work_root = PathBuf::from(value);
        }
        if let Some(value) = env_override("MPX_DRIVER") {
            cfg.driver = value;
        }
        if let Some(value) = env_override("MPX_SOLVER") {
            cfg.solver.executable.clone_from(&value);
            cfg.solver.name = value;
        }
        if let Some(value) = env_override("MPX_SOLVER_EXECUTABLE") {
            cfg.solver.executable = value;
        }
        if let Some(value) = env_override("MPX_SOLVER_OPTIONS") {
            cfg.solver.options = value;
        }
        if let Some(value) = env_override("MPX_DEBUG_SOLVER") {
            cfg.debug_solver = value == "1" || value.eq_ignore_ascii_case("true");
        }
        cfg
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioSpec {
    pub name: &'static str,
    pub description: &'static str,
}

impl ScenarioSpec {
    #[must_use]
    pub fn test_id(&self) -> String {
        format!("test_{}", self.name)
    }

    #[must_use]
    pub fn problem_path(&self, config: &HarnessConfig) -> PathBuf {
        config
            .problem_root
            .join(format!("{}.{PROBLEM_EXTENSION}", self.name))
    }

    #[must_use]
    pub fn reference_path(&self, config: &HarnessConfig) -> PathBuf {
        config
            .fixture_root
            .join(format!("{}.{REFERENCE_EXTENSION}", self.name))
    }

    #[must_use]
    pub fn work_dir(&self, config: &HarnessConfig) -> PathBuf {
        config.work_root.join(self.name)
    }

    #[must_use]
    pub fn result_path(&self, config: &HarnessConfig) -> PathBuf {
        self.work_dir(config).join(RESULT_FILE_NAME)
    }
}

pub const SCENARIOS: &[ScenarioSpec] = &[
    ScenarioSpec {
        name: "munson1a",
        description: "three complementarity pairs, variable bound first",
    },
    ScenarioSpec {
        name: "munson1b",
        description: "three complementarity pairs, expression first",
    },
    ScenarioSpec {
        name: "munson1c",
        description: "complementarity pairs written with lower bounds on the left",
    },
    ScenarioSpec {
        name: "munson1d",
        description: "complementarity pairs with constants folded into the expressions",
    },
];

#[must_use]
pub fn find_scenario(name: &str) -> Option<ScenarioSpec> {
    SCENARIOS
        .iter()
        .find(|scenario| scenario.name == name)
        .copied()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioOutcome {
    Passed(ComparisonSummary),
    Failed { reason_code: String, detail: String },
    Skipped(String),
}

impl ScenarioOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed(_) => "pass",
            Self::Failed { .. } => "fail",
            Self::Skipped(_) => "skipped",
        }
    }

    fn failed(reason_code: &str, detail: impl Into<String>) -> Self {
        Self::Failed {
            reason_code: reason_code.to_string(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub scenario: ScenarioSpec,
    pub solve: Option<SolveOutcome>,
    pub outcome: ScenarioOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteReport {
    pub suite: &'static str,
    pub case_count: usize,
    pub pass_count: usize,
    pub failures: Vec<String>,
    pub skipped: Option<String>,
}

impl SuiteReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.case_count == self.pass_count && self.failures.is_empty()
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }
}

/// Solves one scenario and compares its objectives against the stored
/// reference. Only logging failures surface as `Err`.
pub fn run_scenario(config: &HarnessConfig, scenario: ScenarioSpec) -> Result<ScenarioRun, String> {
    let invocation = SolveInvocation::for_scenario(config, scenario);

    let (solve, outcome) = match execute_solve(&config.driver, &invocation) {
        Ok(solve) => {
            let outcome = check_against_reference(config, scenario, &solve);
            (Some(solve), outcome)
        }
        Err(err) => (
            None,
            ScenarioOutcome::failed(err.reason_code(), err.to_string()),
        ),
    };

    let run = ScenarioRun {
        scenario,
        solve,
        outcome,
    };
    log_scenario_run(config, &run)?;
    Ok(run)
}

fn check_against_reference(
    config: &HarnessConfig,
    scenario: ScenarioSpec,
    solve: &SolveOutcome,
) -> ScenarioOutcome {
    let reference = match load_objectives(&scenario.reference_path(config)) {
        Ok(reference) => reference,
        Err(err) => return ScenarioOutcome::failed(err.reason_code(), err.to_string()),
    };
    let candidate = match load_objectives(&scenario.result_path(config)) {
        Ok(candidate) => candidate,
        Err(err) => {
            return ScenarioOutcome::failed(
                err.reason_code(),
                format!("{err} (driver exit code {})", solve.exit_code),
            );
        }
    };

    match compare_objectives(&reference, &candidate, config.tolerance) {
        Ok(summary) => ScenarioOutcome::Passed(summary),
        Err(mismatch) => ScenarioOutcome::failed(
            mismatch.reason_code(),
            format!("{mismatch} (driver exit code {})", solve.exit_code),
        ),
    }
}

/// Probes once, then runs every registered scenario.
pub fn run_reference_suite(config: &HarnessConfig) -> Result<SuiteReport, String> {
    run_reference_scenarios(config, SCENARIOS)
}

pub fn run_reference_scenarios(
    config: &HarnessConfig,
    scenarios: &[ScenarioSpec],
) -> Result<SuiteReport, String> {
    let mut report = SuiteReport {
        suite: REFERENCE_SUITE_ID,
        case_count: 0,
        pass_count: 0,
        failures: Vec::new(),
        skipped: None,
    };

    let capabilities = probe_capabilities(config);
    if let SuiteGate::Unavailable(missing) = capabilities.gate() {
        let reason = missing.skip_reason(config);
        for &scenario in scenarios {
            let run = ScenarioRun {
                scenario,
                solve: None,
                outcome: ScenarioOutcome::Skipped(reason.clone()),
            };
            log_scenario_run(config, &run)?;
        }
        report.skipped = Some(reason);
        return Ok(report);
    }

    for &scenario in scenarios {
        let run = run_scenario(config, scenario)?;
        record_run(&mut report, &run);
    }
    Ok(report)
}

fn record_run(report: &mut SuiteReport, run: &ScenarioRun) {
    report.case_count += 1;
    match &run.outcome {
        ScenarioOutcome::Passed(_) => report.pass_count += 1,
        ScenarioOutcome::Failed {
            reason_code,
            detail,
        } => report.failures.push(format!(
            "{}: reason_code={reason_code} {detail}",
            run.scenario.test_id()
        )),
        ScenarioOutcome::Skipped(reason) => report
            .failures
            .push(format!("{}: unexpectedly skipped: {reason}", run.scenario.test_id())),
    }
}

fn log_scenario_run(config: &HarnessConfig, run: &ScenarioRun) -> Result<(), String> {
    let (reason_code, detail) = match &run.outcome {
        ScenarioOutcome::Passed(summary) => (
            "ok".to_string(),
            format!(
                "compared {} values across {} solutions, max_abs_error={}",
                summary.values_compared, summary.solutions, summary.max_abs_error
            ),
        ),
        ScenarioOutcome::Failed {
            reason_code,
            detail,
        } => (reason_code.clone(), detail.clone()),
        ScenarioOutcome::Skipped(reason) => ("capability_unavailable".to_string(), reason.clone()),
    };

    let entry = ScenarioLogEntry {
        suite_id: REFERENCE_SUITE_ID.to_string(),
        scenario_id: run.scenario.test_id(),
        solver: config.solver.name.clone(),
        command_line: run
            .solve
            .as_ref()
            .map(|solve| solve.command_line.clone())
            .unwrap_or_default(),
        exit_code: run.solve.as_ref().map(|solve| solve.exit_code),
        outcome: run.outcome.label().to_string(),
        reason_code,
        detail,
        reference_digest: file_digest(&run.scenario.reference_path(config)),
        result_digest: run
            .solve
            .as_ref()
            .and_then(|_| file_digest(&run.scenario.result_path(config))),
        duration_ms: run.solve.as_ref().map_or(0, |solve| solve.duration_ms),
        ts_unix_ms: now_unix_ms(),
    };
    append_scenario_log(&entry)
}

/// `path` anchored at the harness's own working directory. The driver runs
/// from a scenario directory, so every path handed to it must be absolute.
#[must_use]
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

#[cfg(test)]
mod tests {
    use super::{
        HarnessConfig, SCENARIOS, ScenarioOutcome, ScenarioRun, SuiteReport, find_scenario,
        record_run,
    };
    use mpx_results::ComparisonSummary;
    use std::collections::BTreeSet;

    #[test]
    fn scenario_registry_is_unique_and_described() {
        let names: BTreeSet<_> = SCENARIOS.iter().map(|scenario| scenario.name).collect();
        assert_eq!(names.len(), SCENARIOS.len());
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["munson1a", "munson1b", "munson1c", "munson1d"]
        );
        assert!(SCENARIOS.iter().all(|scenario| !scenario.description.is_empty()));
    }

    #[test]
    fn scenario_paths_follow_naming_rules() {
        let cfg = HarnessConfig::default_paths();
        let scenario = find_scenario("munson1c").expect("registered scenario");
        assert_eq!(scenario.test_id(), "test_munson1c");
        assert!(scenario.reference_path(&cfg).ends_with("fixtures/munson1c.txt"));
        assert!(scenario.problem_path(&cfg).ends_with("models/mpec/munson1c.py"));
        assert!(scenario.result_path(&cfg).ends_with("munson1c/result.yml"));
        assert!(find_scenario("munson2").is_none());
    }

    #[test]
    fn result_paths_are_distinct_per_scenario() {
        let cfg = HarnessConfig::default_paths();
        let paths: BTreeSet<_> = SCENARIOS
            .iter()
            .map(|scenario| scenario.result_path(&cfg))
            .collect();
        assert_eq!(paths.len(), SCENARIOS.len());
    }

    #[test]
    fn default_config_targets_path_solver() {
        let cfg = HarnessConfig::default_paths();
        assert_eq!(cfg.driver, "pyomo");
        assert_eq!(cfg.solver.name, "path");
        assert_eq!(cfg.tolerance.decimal_places(), 2);
        assert!(!cfg.debug_solver);
    }

    #[test]
    fn suite_report_counts_passes_and_failures() {
        let mut report = SuiteReport {
            suite: "unit",
            case_count: 0,
            pass_count: 0,
            failures: Vec::new(),
            skipped: None,
        };
        record_run(
            &mut report,
            &ScenarioRun {
                scenario: SCENARIOS[0],
                solve: None,
                outcome: ScenarioOutcome::Passed(ComparisonSummary {
                    solutions: 1,
                    values_compared: 1,
                    max_abs_error: 0.0,
                }),
            },
        );
        assert!(report.all_passed());

        record_run(
            &mut report,
            &ScenarioRun {
                scenario: SCENARIOS[1],
                solve: None,
                outcome: ScenarioOutcome::Failed {
                    reason_code: "objective_missing".to_string(),
                    detail: "objective `o` missing from solution 0".to_string(),
                },
            },
        );
        assert_eq!(report.case_count, 2);
        assert_eq!(report.pass_count, 1);
        assert!(!report.all_passed());
        assert!(report.failures[0].starts_with("test_munson1b: reason_code=objective_missing"));
    }
}
