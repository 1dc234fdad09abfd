use clap::{Parser, Subcommand};
use gminfer::diagnostics::{render_error, CompileError};
use gminfer::scenario::{self, Scenario};
use gminfer::typeck::CheckReport;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gminfer", version, about = "Generic type and multiplicity inference over scenario files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run inference and print the bindings of every call site
    Check {
        /// Scenario file path (.toml)
        file: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run inference with the tracing observer writing to stderr
    Trace {
        /// Scenario file path (.toml)
        file: PathBuf,
    },
}

fn init_tracing(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .with_env_filter(filter)
        .init();
}

fn load_or_exit(file: &Path) -> Scenario {
    match scenario::load(file) {
        Ok(scenario) => scenario,
        Err(err) => {
            eprintln!("error [{}]: {err}", file.display());
            std::process::exit(1);
        }
    }
}

fn fail(scenario: &Scenario, err: &CompileError) -> ! {
    let filename = scenario.path.to_string_lossy();
    render_error(&scenario.source, &filename, err);
    std::process::exit(1);
}

fn print_report(report: &CheckReport) {
    for site in &report.call_sites {
        let types: Vec<String> = site.types.iter().map(|b| format!("{} = {}", b.name, b.value)).collect();
        let muls: Vec<String> = site.multiplicities.iter().map(|b| format!("{} = {}", b.name, b.value)).collect();
        let owner = site.owner.as_deref().map(|o| format!(" in {o}")).unwrap_or_default();
        println!(
            "{}{owner} @ {}: [{}] / [{}] -> {}",
            site.function,
            site.span,
            types.join(", "),
            muls.join(", "),
            site.return_type
        );
    }
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { file, json } => {
            let mut scenario = load_or_exit(&file);
            let fallback = if scenario.options.trace { "debug" } else { "warn" };
            let directive = scenario.options.log_level.clone().unwrap_or_else(|| fallback.to_string());
            init_tracing(&directive);
            let report = match gminfer::run_scenario_with_options(&mut scenario) {
                Ok(report) => report,
                Err(err) => fail(&scenario, &err),
            };
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(text) => println!("{text}"),
                    Err(e) => {
                        eprintln!("error: could not serialize report: {e}");
                        std::process::exit(1);
                    }
                }
            } else {
                print_report(&report);
            }
        }
        Commands::Trace { file } => {
            let mut scenario = load_or_exit(&file);
            let directive = scenario.options.log_level.clone().unwrap_or_else(|| "debug".to_string());
            init_tracing(&directive);
            scenario.options.trace = true;
            match gminfer::run_scenario_with_options(&mut scenario) {
                Ok(report) => print_report(&report),
                Err(err) => fail(&scenario, &err),
            }
        }
    }
}
