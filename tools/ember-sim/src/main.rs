//! Ember Simulator
//!
//! Boots the Ember kernel on a loopback UART and drives scripted processes
//! through it, printing the order in which the dispatcher ran them.
//!
//! Usage:
//!   ember-sim run demos/round_robin.toml --cycles 30
//!   ember-sim show-config [demos/echo.toml]

mod script;
mod sim;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ember_kernel::KernelConfig;

use crate::script::SimFile;
use crate::sim::Simulation;

#[derive(Parser, Debug)]
#[command(name = "ember-sim")]
#[command(about = "Run scripted processes on the Ember kernel", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boot the kernel and run a simulation file
    Run {
        /// Simulation file (TOML)
        file: PathBuf,

        /// Number of traps to perform before shutting down
        #[arg(long, default_value_t = 50)]
        cycles: usize,
    },

    /// Print the kernel configuration a file resolves to
    ShowConfig {
        /// Simulation file; the built-in defaults when omitted
        file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Run { file, cycles } => run(file, cycles),
        Command::ShowConfig { file } => show_config(file),
    }
}

fn run(file: PathBuf, cycles: usize) -> Result<()> {
    let sim = SimFile::load(&file)?;
    log::info!("Simulation: {} ({} scripts)", file.display(), sim.scripts.len());

    let report = Simulation::new(sim)?.run(cycles)?;

    println!("Run order:");
    for (cycle, name) in report.order.iter().enumerate() {
        println!("  {:>4}  {}", cycle, name);
    }
    println!();
    println!("Context switches: {}", report.switches);
    if report.returned_home {
        println!("Kernel returned to the boot context before the cycle limit");
    }
    if !report.transmitted.is_empty() {
        println!("Serial output:    {:?}", String::from_utf8_lossy(&report.transmitted));
    }
    for read in &report.reads {
        match read.buffer.error() {
            Some(code) => println!("Read by {:<20} failed ({})", read.process, code),
            None => println!(
                "Read by {:<20} {:?}",
                read.process,
                String::from_utf8_lossy(&read.buffer.contents())
            ),
        }
    }
    Ok(())
}

fn show_config(file: Option<PathBuf>) -> Result<()> {
    let config = match file {
        Some(path) => SimFile::load(&path)?.kernel,
        None => KernelConfig::default(),
    };
    let text = toml::to_string_pretty(&config).context("Failed to render config")?;
    print!("{}", text);
    Ok(())
}
