#![forbid(unsafe_code)]

use crate::{HarnessConfig, RESULT_FILE_NAME, ScenarioSpec, SolverSpec, absolute_path};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

pub const RESULTS_FORMAT: &str = "yaml";
pub const FILE_DETERMINISM: u8 = 2;
const SCRATCH_DIR_NAME: &str = "scratch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveAction {
    Solve,
    Convert,
}

impl SolveAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Solve => "solve",
            Self::Convert => "convert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveInvocation {
    pub action: SolveAction,
    pub solver: SolverSpec,
    pub output_path: PathBuf,
    pub work_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub debug: bool,
    pub trailing_args: Vec<String>,
}

impl SolveInvocation {
    /// Every path is absolute, since the driver runs from `work_dir`.
    #[must_use]
    pub fn for_scenario(config: &HarnessConfig, scenario: ScenarioSpec) -> Self {
        let work_dir = absolute_path(&scenario.work_dir(config));
        let problem_path = absolute_path(&scenario.problem_path(config));
        Self {
            action: SolveAction::Solve,
            solver: config.solver.clone(),
            output_path: work_dir.join(RESULT_FILE_NAME),
            scratch_dir: work_dir.join(SCRATCH_DIR_NAME),
            work_dir,
            debug: config.debug_solver,
            trailing_args: vec![problem_path.display().to_string()],
        }
    }

    #[must_use]
    pub fn with_action(mut self, action: SolveAction) -> Self {
        self.action = action;
        self
    }

    /// Driver arguments: action-specific flags, the common flags, optional
    /// debug flags, then the trailing arguments.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.action.as_str().to_string()];
        if self.action == SolveAction::Solve {
            args.push(format!("--solver={}", self.solver.name));
            args.push(format!("--save-results={}", self.output_path.display()));
            args.push(format!("--results-format={RESULTS_FORMAT}"));
            args.push(format!("--solver-options=\"{}\"", self.solver.options));
        }
        args.push("-c".to_string());
        args.push("--symbolic-solver-labels".to_string());
        args.push(format!("--file-determinism={FILE_DETERMINISM}"));

        if self.debug {
            args.push("--stream-solver".to_string());
            args.push(format!("--tempdir={}", self.scratch_dir.display()));
            args.push("--keepfiles".to_string());
            args.push("--logging=debug".to_string());
        }

        args.extend(self.trailing_args.iter().cloned());
        args
    }

    #[must_use]
    pub fn command_line(&self, driver: &str) -> String {
        let mut parts = vec![driver.to_string()];
        parts.extend(self.args());
        parts.join(" ")
    }
}

/// A driver run that exited on its own, with any exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveOutcome {
    pub command_line: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl SolveOutcome {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Both captured streams, trimmed, for failure messages. Solver errors
    /// often only reach stdout.
    #[must_use]
    pub fn diagnostics(&self) -> String {
        format!(
            "stdout={} stderr={}",
            self.stdout.trim(),
            self.stderr.trim()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    WorkDir(String),
    Spawn { program: String, message: String },
    Terminated { command_line: String, stderr: String },
}

impl SolveError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::WorkDir(_) => "solve_workdir_failed",
            Self::Spawn { .. } => "solve_spawn_failed",
            Self::Terminated { .. } => "solve_terminated",
        }
    }
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkDir(msg) => write!(f, "{msg}"),
            Self::Spawn { program, message } => {
                write!(f, "failed to invoke driver '{program}': {message}")
            }
            Self::Terminated {
                command_line,
                stderr,
            } => write!(
                f,
                "driver terminated without an exit status: {command_line} stderr={}",
                stderr.trim()
            ),
        }
    }
}

impl std::error::Error for SolveError {}

/// Removes the scratch directory when the solve scope ends, on every path out
/// of [`execute_solve`]. Debug runs keep it for inspection.
struct ScratchCleanup<'a> {
    dir: &'a Path,
    keep: bool,
}

impl Drop for ScratchCleanup<'_> {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(self.dir);
        }
    }
}

/// Runs the driver synchronously from the invocation's work directory.
pub fn execute_solve(driver: &str, invocation: &SolveInvocation) -> Result<SolveOutcome, SolveError> {
    create_dir(&invocation.work_dir)?;
    let _cleanup = ScratchCleanup {
        dir: &invocation.scratch_dir,
        keep: invocation.debug,
    };
    create_dir(&invocation.scratch_dir)?;
    remove_stale_output(&invocation.output_path)?;

    let command_line = invocation.command_line(driver);
    let program = resolve_program(driver);
    let start = Instant::now();
    let output = Command::new(&program)
        .args(invocation.args())
        .current_dir(&invocation.work_dir)
        .env("TMPDIR", &invocation.scratch_dir)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| SolveError::Spawn {
            program: driver.to_string(),
            message: err.to_string(),
        })?;
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let Some(exit_code) = output.status.code() else {
        return Err(SolveError::Terminated {
            command_line,
            stderr,
        });
    };

    Ok(SolveOutcome {
        command_line,
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr,
        duration_ms,
    })
}

/// A bare name is left for `PATH` lookup; anything path-like is anchored to
/// the harness's directory, not the child's.
fn resolve_program(driver: &str) -> PathBuf {
    let path = Path::new(driver);
    if path.components().count() > 1 {
        absolute_path(path)
    } else {
        path.to_path_buf()
    }
}

fn create_dir(dir: &Path) -> Result<(), SolveError> {
    fs::create_dir_all(dir)
        .map_err(|err| SolveError::WorkDir(format!("failed creating {}: {err}", dir.display())))
}

fn remove_stale_output(path: &Path) -> Result<(), SolveError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SolveError::WorkDir(format!(
            "failed removing stale output {}: {err}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        SolveAction, SolveError, SolveInvocation, SolveOutcome, execute_solve, resolve_program,
    };
    use crate::{HarnessConfig, SCENARIOS};
    use std::fs;
    use std::path::{Path, PathBuf};

    fn temp_root(name: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        std::env::temp_dir().join(format!("mpx_{name}_{ts}"))
    }

    fn config_in(root: &Path) -> HarnessConfig {
        let mut cfg = HarnessConfig::default_paths();
        cfg.work_root = root.join("runs");
        cfg.problem_root = PathBuf::from("/models");
        cfg
    }

    #[test]
    fn solve_args_follow_driver_contract() {
        let cfg = config_in(Path::new("/tmp/mpx"));
        let invocation = SolveInvocation::for_scenario(&cfg, SCENARIOS[0]);
        assert_eq!(
            invocation.args(),
            vec![
                "solve".to_string(),
                "--solver=path".to_string(),
                "--save-results=/tmp/mpx/runs/munson1a/result.yml".to_string(),
                "--results-format=yaml".to_string(),
                "--solver-options=\"lemke_start=automatic output_options=yes\"".to_string(),
                "-c".to_string(),
                "--symbolic-solver-labels".to_string(),
                "--file-determinism=2".to_string(),
                "/models/munson1a.py".to_string(),
            ]
        );
        assert!(invocation.command_line("pyomo").starts_with("pyomo solve --solver=path "));
    }

    #[test]
    fn convert_omits_solver_flags() {
        let cfg = config_in(Path::new("/tmp/mpx"));
        let invocation =
            SolveInvocation::for_scenario(&cfg, SCENARIOS[1]).with_action(SolveAction::Convert);
        assert_eq!(
            invocation.args(),
            vec![
                "convert".to_string(),
                "-c".to_string(),
                "--symbolic-solver-labels".to_string(),
                "--file-determinism=2".to_string(),
                "/models/munson1b.py".to_string(),
            ]
        );
    }

    #[test]
    fn debug_flags_precede_trailing_args() {
        let mut cfg = config_in(Path::new("/tmp/mpx"));
        cfg.debug_solver = true;
        let args = SolveInvocation::for_scenario(&cfg, SCENARIOS[2]).args();
        let tail: Vec<_> = args.iter().rev().take(5).rev().cloned().collect();
        assert_eq!(
            tail,
            vec![
                "--stream-solver".to_string(),
                "--tempdir=/tmp/mpx/runs/munson1c/scratch".to_string(),
                "--keepfiles".to_string(),
                "--logging=debug".to_string(),
                "/models/munson1c.py".to_string(),
            ]
        );
    }

    #[test]
    fn relative_roots_become_absolute_paths() {
        let mut cfg = config_in(Path::new("target/mpx"));
        cfg.problem_root = PathBuf::from("models/mpec");
        let invocation = SolveInvocation::for_scenario(&cfg, SCENARIOS[0]);

        assert!(invocation.work_dir.is_absolute());
        assert!(invocation.output_path.is_absolute());
        assert!(invocation.scratch_dir.is_absolute());
        assert!(invocation.output_path.ends_with("target/mpx/runs/munson1a/result.yml"));
        let problem = PathBuf::from(&invocation.trailing_args[0]);
        assert!(problem.is_absolute());
        assert!(problem.ends_with("models/mpec/munson1a.py"));

        assert!(resolve_program("./bin/pyomo").is_absolute());
        assert_eq!(resolve_program("pyomo"), PathBuf::from("pyomo"));
    }

    #[test]
    fn missing_driver_is_a_spawn_error_and_still_cleans_up() {
        let root = temp_root("spawn_error");
        let cfg = config_in(&root);
        let invocation = SolveInvocation::for_scenario(&cfg, SCENARIOS[0]);

        let err = execute_solve("mpx-driver-that-does-not-exist", &invocation)
            .expect_err("spawn should fail");
        assert!(matches!(err, SolveError::Spawn { .. }));
        assert_eq!(err.reason_code(), "solve_spawn_failed");
        assert!(invocation.work_dir.exists());
        assert!(!invocation.scratch_dir.exists());
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_is_an_ordinary_completion() {
        let root = temp_root("nonzero_exit");
        let cfg = config_in(&root);
        let invocation = SolveInvocation::for_scenario(&cfg, SCENARIOS[0]);
        fs::create_dir_all(&invocation.work_dir).expect("work dir");
        fs::write(&invocation.output_path, "Solution: []\n").expect("stale output");

        let outcome = execute_solve("false", &invocation).expect("exit status is not a fault");
        assert_eq!(outcome.exit_code, 1);
        assert!(!outcome.success());
        assert!(!invocation.output_path.exists(), "stale output must be removed");
        assert!(!invocation.scratch_dir.exists());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn diagnostics_carry_both_streams() {
        let outcome = SolveOutcome {
            command_line: "pyomo solve munson1a.py".to_string(),
            exit_code: 1,
            stdout: "PATH: license not found\n".to_string(),
            stderr: "  \n".to_string(),
            duration_ms: 0,
        };
        assert_eq!(
            outcome.diagnostics(),
            "stdout=PATH: license not found stderr="
        );
    }

    #[cfg(unix)]
    #[test]
    fn captured_stdout_reaches_diagnostics() {
        let root = temp_root("stdout_capture");
        let cfg = config_in(&root);
        let invocation = SolveInvocation::for_scenario(&cfg, SCENARIOS[1]);

        let outcome = execute_solve("echo", &invocation).expect("echo exits cleanly");
        assert!(outcome.stdout.starts_with("solve --solver=path"));
        assert!(outcome.diagnostics().contains("--results-format=yaml"));
        let _ = fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[test]
    fn debug_runs_keep_scratch_files() {
        let root = temp_root("keep_scratch");
        let mut cfg = config_in(&root);
        cfg.debug_solver = true;
        let invocation = SolveInvocation::for_scenario(&cfg, SCENARIOS[3]);

        let outcome = execute_solve("true", &invocation).expect("true exits cleanly");
        assert!(outcome.success());
        assert!(invocation.scratch_dir.exists());
        let _ = fs::remove_dir_all(root);
    }
}
