// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use labwired_intc_config::{builtin_profile, resolve_profile, ScenarioScript, BUILTIN_PROFILES};
use labwired_intc_core::snapshot::SystemSnapshot;
use labwired_intc_core::Profile;

mod runner;

use runner::{RunReport, ScenarioRunner, StepFailure};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "LabWired Interrupt Controller Simulator",
    long_about = None
)]
struct Cli {
    /// Enable debug logging of controller events
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario script (YAML) and check its expectations.
    Run(RunArgs),

    /// List the built-in controller profiles.
    Profiles,

    /// Print a profile and its decoded register map.
    Show(ShowArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the scenario script
    #[arg(short, long)]
    script: PathBuf,

    /// Directory for result.json
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ShowArgs {
    /// Built-in profile name or path to a profile YAML
    #[arg(short, long)]
    profile: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScenarioResult {
    result_schema_version: String,
    status: String,
    steps_executed: usize,
    guest_errors: usize,
    failures: Vec<StepFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    script_hash: String,
    config: RunConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot: Option<SystemSnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunConfig {
    script: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with appropriate level based on --trace flag
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_scenario(args),
        Commands::Profiles => list_profiles(),
        Commands::Show(args) => show_profile(args),
    }
}

fn script_hash(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            format!("{:x}", hasher.finalize())
        }
        Err(_) => String::new(),
    }
}

fn run_scenario(args: RunArgs) -> ExitCode {
    let hash = script_hash(&args.script);
    let mut result = ScenarioResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        steps_executed: 0,
        guest_errors: 0,
        failures: Vec::new(),
        message: None,
        script_hash: hash,
        config: RunConfig {
            script: args.script.clone(),
            profile: None,
            system: None,
        },
        snapshot: None,
    };

    let script = match ScenarioScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            result.message = Some(msg);
            write_result(&args, &result);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    result.config.profile = script.profile.clone();
    result.config.system = script.system.clone();
    if let Some(name) = &script.name {
        info!("Running scenario '{}'", name);
    }

    let mut runner = match ScenarioRunner::for_script(&script, &args.script) {
        Ok(r) => r,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            result.message = Some(msg);
            write_result(&args, &result);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let report = runner.run(&script.steps);
    result.snapshot = Some(runner.snapshot());
    result.guest_errors = runner.guest_errors();

    let code = match report {
        Ok(report) => {
            print_summary(&report, script.steps.len());
            result.steps_executed = report.steps_executed;
            if report.passed() {
                result.status = "pass".to_string();
                EXIT_PASS
            } else {
                result.status = "fail".to_string();
                result.failures = report.failures;
                EXIT_ASSERT_FAIL
            }
        }
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            result.message = Some(msg);
            EXIT_RUNTIME_ERROR
        }
    };

    write_result(&args, &result);
    ExitCode::from(code)
}

fn print_summary(report: &RunReport, total: usize) {
    for f in &report.failures {
        println!("FAIL step {}: {}", f.step, f.message);
    }
    println!(
        "{} steps, {} failed expectations, {} guest errors",
        total,
        report.failures.len(),
        report.guest_errors
    );
}

fn write_result(args: &RunArgs, result: &ScenarioResult) {
    let Some(output_dir) = &args.output_dir else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {:?}: {}", output_dir, e);
        return;
    }

    let result_path = output_dir.join("result.json");
    match std::fs::File::create(&result_path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, result) {
                error!("Failed to write result.json: {}", e);
            }
        }
        Err(e) => error!("Failed to create result.json: {}", e),
    }
}

fn list_profiles() -> ExitCode {
    for name in BUILTIN_PROFILES {
        if let Some(p) = builtin_profile(name) {
            println!(
                "{:<16} id {}  {} inputs -> {} outputs  {}",
                p.name,
                p.id,
                p.num_inpins,
                p.num_outpins,
                p.description.as_deref().unwrap_or("")
            );
        }
    }
    ExitCode::from(EXIT_PASS)
}

fn show_profile(args: ShowArgs) -> ExitCode {
    let desc = match resolve_profile(&args.profile, Path::new(".")) {
        Ok(d) => d,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let profile = match Profile::from_descriptor(&desc) {
        Ok(p) => p,
        Err(e) => {
            error!("Invalid profile '{}': {}", args.profile, e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match serde_yaml::to_string(&desc) {
        Ok(yaml) => print!("{}", yaml),
        Err(e) => {
            error!("Failed to render profile: {}", e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    }

    println!();
    println!(
        "# register map ({:#x} bytes decoded, {:#x} mapped)",
        profile.reg_size(),
        profile.mem_size()
    );
    for route in profile.routes() {
        let outputs = route.outpins();
        println!(
            "# {:<16} inpin {:>2}  enable {:#06x}  status {:#06x}  outputs {}..{}",
            route.label(),
            route.inpin,
            route.enable_addr << 2,
            route.status_addr << 2,
            outputs.start,
            outputs.end
        );
    }
    ExitCode::from(EXIT_PASS)
}
