#![forbid(unsafe_code)]

use mpx_conformance::capability::{SuiteGate, probe_capabilities};
use mpx_conformance::solve::{SolveInvocation, execute_solve};
use mpx_conformance::{HarnessConfig, find_scenario};
use mpx_results::{load_result_document, write_result_document};

fn main() {
    if let Err(err) = run() {
        eprintln!("capture_reference failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut scenario_name: Option<String> = None;
    let mut force = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--scenario" => {
                scenario_name = Some(
                    args.next()
                        .ok_or_else(|| "--scenario requires a value".to_string())?,
                );
            }
            "--force" => force = true,
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p mpx-conformance --bin capture_reference -- --scenario <name> [--force]"
                );
                return Ok(());
            }
            unknown => return Err(format!("unknown argument: {unknown}")),
        }
    }

    let name = scenario_name.ok_or_else(|| "--scenario is required".to_string())?;
    let scenario = find_scenario(&name).ok_or_else(|| format!("unknown scenario: {name}"))?;
    let cfg = HarnessConfig::from_env();

    if let SuiteGate::Unavailable(missing) = probe_capabilities(&cfg).gate() {
        return Err(missing.skip_reason(&cfg));
    }

    let reference_path = scenario.reference_path(&cfg);
    if reference_path.exists() && !force {
        return Err(format!(
            "{} already exists; pass --force to replace it",
            reference_path.display()
        ));
    }

    let invocation = SolveInvocation::for_scenario(&cfg, scenario);
    println!("***");
    println!("{}", invocation.command_line(&cfg.driver));
    let outcome = execute_solve(&cfg.driver, &invocation).map_err(|err| err.to_string())?;
    println!("***");
    if !outcome.success() {
        return Err(format!(
            "driver exited with {}; refusing to capture: {}",
            outcome.exit_code,
            outcome.diagnostics()
        ));
    }

    let document =
        load_result_document(&invocation.output_path).map_err(|err| err.to_string())?;
    write_result_document(&reference_path, &document).map_err(|err| err.to_string())?;
    println!(
        "captured {} solutions for {}",
        document.len(),
        scenario.test_id()
    );
    println!("wrote {}", reference_path.display());
    Ok(())
}
