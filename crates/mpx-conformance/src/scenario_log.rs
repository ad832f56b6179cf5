#![forbid(unsafe_code)]

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

pub const SCENARIO_LOG_ENV: &str = "MPX_SCENARIO_LOG_PATH";

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioLogEntry {
    pub suite_id: String,
    pub scenario_id: String,
    pub solver: String,
    pub command_line: String,
    pub exit_code: Option<i32>,
    pub outcome: String,
    pub reason_code: String,
    pub detail: String,
    pub reference_digest: Option<String>,
    pub result_digest: Option<String>,
    pub duration_ms: u64,
    pub ts_unix_ms: u128,
}

static SCENARIO_LOG_PATH: OnceLock<Mutex<Option<PathBuf>>> = OnceLock::new();
static SCENARIO_LOG_REQUIRED: OnceLock<Mutex<bool>> = OnceLock::new();

pub fn set_scenario_log_path(path: Option<PathBuf>) {
    let cell = SCENARIO_LOG_PATH.get_or_init(|| Mutex::new(None));
    if let Ok(mut slot) = cell.lock() {
        *slot = path;
    }
}

pub fn set_scenario_log_required(required: bool) {
    let cell = SCENARIO_LOG_REQUIRED.get_or_init(|| Mutex::new(false));
    if let Ok(mut slot) = cell.lock() {
        *slot = required;
    }
}

fn scenario_log_required() -> bool {
    SCENARIO_LOG_REQUIRED
        .get()
        .and_then(|cell| cell.lock().ok().map(|slot| *slot))
        .unwrap_or(false)
}

fn resolve_scenario_log_path() -> Result<Option<PathBuf>, String> {
    let configured = SCENARIO_LOG_PATH
        .get()
        .and_then(|cell| cell.lock().ok())
        .and_then(|slot| slot.clone());
    let from_env = std::env::var_os(SCENARIO_LOG_ENV).map(PathBuf::from);
    let Some(path) = configured.or(from_env) else {
        if scenario_log_required() {
            return Err(format!(
                "scenario log path is required but unset; configure --log-path or {SCENARIO_LOG_ENV}"
            ));
        }
        return Ok(None);
    };
    Ok(Some(path))
}

/// Appends `entry` as one JSON line when a log path is configured.
pub fn append_scenario_log(entry: &ScenarioLogEntry) -> Result<(), String> {
    let Some(path) = resolve_scenario_log_path()? else {
        return Ok(());
    };
    append_jsonl(&path, entry)
}

pub fn append_jsonl(path: &Path, entry: &ScenarioLogEntry) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| format!("failed opening {}: {err}", path.display()))?;
    let line = serde_json::to_string(entry)
        .map_err(|err| format!("failed serializing scenario log entry: {err}"))?;
    let mut payload = line.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)
        .map_err(|err| format!("failed appending scenario log {}: {err}", path.display()))
}

/// `sha256:<hex>` of the file contents, or `None` when it cannot be read.
#[must_use]
pub fn file_digest(path: &Path) -> Option<String> {
    fs::read(path).ok().map(|bytes| sha256_digest(&bytes))
}

#[must_use]
pub fn sha256_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256:");
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}
