#![forbid(unsafe_code)]

use crate::HarnessConfig;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Yaml,
    Solver,
    Driver,
}

impl Capability {
    #[must_use]
    pub fn skip_reason(self, config: &HarnessConfig) -> String {
        match self {
            Self::Yaml => "YAML is not available".to_string(),
            Self::Solver => format!(
                "The '{}' executable is not available",
                config.solver.name
            ),
            Self::Driver => format!("The '{}' driver is not available", config.driver),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteGate {
    Unavailable(Capability),
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityReport {
    pub yaml_available: bool,
    pub driver: Option<PathBuf>,
    pub solver: Option<PathBuf>,
}

impl CapabilityReport {
    /// YAML is gated first, then the solver, then the driver.
    #[must_use]
    pub fn gate(&self) -> SuiteGate {
        if !self.yaml_available {
            SuiteGate::Unavailable(Capability::Yaml)
        } else if self.solver.is_none() {
            SuiteGate::Unavailable(Capability::Solver)
        } else if self.driver.is_none() {
            SuiteGate::Unavailable(Capability::Driver)
        } else {
            SuiteGate::Ready
        }
    }
}

#[must_use]
pub fn probe_capabilities(config: &HarnessConfig) -> CapabilityReport {
    CapabilityReport {
        yaml_available: mpx_results::yaml_available(),
        driver: locate_executable(&config.driver),
        solver: locate_executable(&config.solver.executable),
    }
}

/// Resolves `program` against `PATH`, or checks it directly when it already
/// names a path.
#[must_use]
pub fn locate_executable(program: &str) -> Option<PathBuf> {
    let program_path = Path::new(program);
    if program_path.components().count() > 1 {
        return is_executable(program_path).then(|| program_path.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    locate_in_search_path(program, &path_var)
}

#[must_use]
pub fn locate_in_search_path(program: &str, search_path: &OsStr) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    std::env::split_paths(search_path).find_map(|dir| resolve_in_dir(&dir, program))
}

fn resolve_in_dir(dir: &Path, program: &str) -> Option<PathBuf> {
    let candidate = dir.join(program);
    if is_executable(&candidate) {
        return Some(candidate);
    }
    #[cfg(windows)]
    {
        for ext in ["exe", "cmd", "bat"] {
            let candidate = dir.join(format!("{program}.{ext}"));
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
