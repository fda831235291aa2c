//! # Cardiac CLI
//!
//! Command-line interface for single-cell pacing experiments.

use anyhow::{ensure, Context};
use cardiac_core::SolverOptions;
use cardiac_experiments::{CellModelKind, RestitutionConfig, RestitutionProgress, SteadyStateConfig};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cardiac")]
#[command(author = "Yatrogenesis")]
#[command(version = "0.1.0")]
#[command(about = "Single-cell cardiac electrophysiology experiments", long_about = None)]
struct Cli {
    /// JSON file with adaptive solver options
    #[arg(long, global = true, value_name = "FILE")]
    solver: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pace a cell and report measurements on the last beat
    SteadyState {
        /// Cell model (see `cardiac list`)
        model: CellModelKind,
        /// Cell type supported by the model
        cell_type: String,
        /// Number of stimuli
        num_cycles: usize,
        /// Spacing between stimuli (ms)
        cycle_length: f64,
        /// Repolarisation percentages to measure
        #[arg(long = "apd", value_delimiter = ',', default_values_t = [30u32, 50, 90])]
        apd_percents: Vec<u32>,
        /// Existing directory to write the JSON report to
        #[arg(short, long)]
        outdir: Option<PathBuf>,
    },

    /// S1-S2 action potential restitution
    Restitution {
        /// Cell model (see `cardiac list`)
        model: CellModelKind,
        /// Cell type supported by the model
        cell_type: String,
        /// Minimum diastolic interval (ms)
        min_di: f64,
        /// Maximum diastolic interval (ms, exclusive)
        max_di: f64,
        /// Diastolic interval increment (ms)
        di_step: f64,
        /// Cycle length of the S1 stimuli (ms)
        #[arg(long = "s1-cl", default_value_t = 1000.0)]
        s1_cycle_length: f64,
        /// Number of S1 stimuli needed to reach steady state
        #[arg(long, default_value_t = 50)]
        steady_state_steps: usize,
        /// Existing directory to write the JSON curve to
        #[arg(short, long)]
        outdir: Option<PathBuf>,
    },

    /// Print the parameters of a cell type as JSON
    Params {
        model: CellModelKind,
        cell_type: String,
    },

    /// List the available models and their cell types
    List,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::SteadyState {
            model,
            cell_type,
            num_cycles,
            cycle_length,
            apd_percents,
            outdir,
        } => {
            let config = SteadyStateConfig {
                cell_type,
                num_cycles,
                cycle_length,
                apd_percents,
                solver: load_solver(cli.solver.as_deref())?,
            };
            if let Some(dir) = &outdir {
                check_outdir(dir)?;
            }

            println!(
                "{} {} ({}), {} cycles of {} ms",
                "Steady state:".green().bold(),
                model.to_string().cyan(),
                config.cell_type,
                num_cycles,
                cycle_length
            );
            let bar = progress_bar(num_cycles as u64)?;
            let report = model
                .steady_state(&config, |_| bar.inc(1))
                .with_context(|| format!("steady-state experiment on {} failed", model))?;
            bar.finish_and_clear();

            for (percent, apd) in &report.apd {
                println!("  APD{:<3} {:>8.2} ms", percent, apd);
            }
            println!("  Peak   {:>8.2} mV", report.peak_voltage);
            println!("  Rest   {:>8.2} mV", report.resting_voltage);

            if let Some(dir) = outdir {
                write_json(&dir, &report.file_stem(), &report)?;
            }
        }

        Commands::Restitution {
            model,
            cell_type,
            min_di,
            max_di,
            di_step,
            s1_cycle_length,
            steady_state_steps,
            outdir,
        } => {
            let config = RestitutionConfig {
                cell_type,
                min_di,
                max_di,
                di_step,
                s1_cycle_length,
                steady_state_cycles: steady_state_steps,
                solver: load_solver(cli.solver.as_deref())?,
                ..Default::default()
            };
            if let Some(dir) = &outdir {
                check_outdir(dir)?;
            }

            println!(
                "{} {} ({}), S1 {} ms x {}",
                "Restitution:".green().bold(),
                model.to_string().cyan(),
                config.cell_type,
                s1_cycle_length,
                steady_state_steps
            );
            let total = steady_state_steps + config.diastolic_intervals().len();
            let bar = progress_bar(total as u64)?;
            let curve = model
                .restitution(&config, |event| {
                    if let RestitutionProgress::Point(point) = event {
                        bar.set_message(format!("DI {} ms", point.di));
                    }
                    bar.inc(1);
                })
                .with_context(|| format!("restitution experiment on {} failed", model))?;
            bar.finish_and_clear();

            println!("  Steady-state APD90 {:.2} ms", curve.steady_state_apd90);
            println!("  {:>10} {:>10}", "DI (ms)".bold(), "APD90 (ms)".bold());
            for point in &curve.points {
                println!("  {:>10.1} {:>10.2}", point.di, point.apd90);
            }

            if let Some(dir) = outdir {
                write_json(&dir, &format!("{}_restitution_curve", curve.file_stem()), &curve)?;
            }
        }

        Commands::Params { model, cell_type } => {
            let params = model.parameters_json(&cell_type)?;
            println!("{}", serde_json::to_string_pretty(&params)?);
        }

        Commands::List => {
            println!("{}", "Available cell models:".green().bold());
            println!();
            for model in CellModelKind::ALL {
                println!(
                    "  {} - cell types: {}",
                    model.key().cyan(),
                    model.cell_types().join(", ")
                );
            }
        }
    }

    Ok(())
}

fn load_solver(path: Option<&Path>) -> anyhow::Result<SolverOptions> {
    let Some(path) = path else {
        return Ok(SolverOptions::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read solver options from {}", path.display()))?;
    let options: SolverOptions = serde_json::from_str(&text)
        .with_context(|| format!("invalid solver options in {}", path.display()))?;
    options.validate()?;
    info!(path = %path.display(), ?options, "solver options loaded");
    Ok(options)
}

fn check_outdir(dir: &Path) -> anyhow::Result<()> {
    ensure!(dir.is_dir(), "output directory {} does not exist", dir.display());
    Ok(())
}

fn progress_bar(len: u64) -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("  {bar:40.cyan/blue} {pos}/{len} cycles {msg}")?
            .progress_chars("=> "),
    );
    Ok(bar)
}

fn write_json<T: Serialize>(dir: &Path, stem: &str, value: &T) -> anyhow::Result<()> {
    let path = dir.join(format!("{}.json", stem));
    let file = File::create(&path).with_context(|| format!("cannot create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("cannot write {}", path.display()))?;
    info!(path = %path.display(), "report written");
    println!("{} {}", "Saved".green(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_restitution() {
        let cli = Cli::try_parse_from([
            "cardiac", "restitution", "MINIMAL_MODEL", "endo", "100", "500", "50", "--s1-cl", "800", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Restitution {
                model,
                s1_cycle_length,
                steady_state_steps,
                ..
            } => {
                assert_eq!(model, CellModelKind::Minimal);
                assert_eq!(s1_cycle_length, 800.0);
                assert_eq!(steady_state_steps, 50);
            }
            _ => panic!("expected the restitution subcommand"),
        }
    }

    #[test]
    fn test_parse_steady_state_defaults() {
        let cli = Cli::try_parse_from(["cardiac", "steady-state", "minimal", "epi", "10", "1000"]).unwrap();
        match cli.command {
            Commands::SteadyState { apd_percents, outdir, .. } => {
                assert_eq!(apd_percents, vec![30, 50, 90]);
                assert!(outdir.is_none());
            }
            _ => panic!("expected the steady-state subcommand"),
        }
    }

    #[test]
    fn test_unknown_model_rejected() {
        assert!(Cli::try_parse_from(["cardiac", "params", "luo_rudy", "endo"]).is_err());
    }

    #[test]
    fn test_default_solver_without_file() {
        assert_eq!(load_solver(None).unwrap(), SolverOptions::default());
        assert!(load_solver(Some(Path::new("/nonexistent/solver.json"))).is_err());
    }
}
