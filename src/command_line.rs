use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::optimization::SolverMethod;

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Options {
    /// Increase verbosity, and can be used multiple times
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Session configuration (anchors, path-loss parameters, solver)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the solver method from the configuration
    #[arg(short, long, value_parser = parse_solver_method)]
    pub method: Option<SolverMethod>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Locate every device in a JSON measurement feed
    Locate {
        #[arg(short, long)]
        feed: PathBuf,
    },
    /// Synthesize the readings for a device at a known position
    Simulate {
        #[arg(short, long, allow_negative_numbers = true)]
        x: f64,
        #[arg(short, long, allow_negative_numbers = true)]
        y: f64,
        /// Seed for the shadowing noise
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
    },
    /// Print every reading of one device per sensor, with estimated distances
    Series {
        #[arg(short, long)]
        feed: PathBuf,
        #[arg(short, long)]
        device: String,
    },
    /// Refit the path-loss model from known distance/RSSI samples
    Calibrate {
        #[arg(short, long)]
        samples: PathBuf,
    },
}

fn parse_solver_method(s: &str) -> Result<SolverMethod, String> {
    match s {
        "gauss-newton" => Ok(SolverMethod::GaussNewton),
        "nelder-mead" => Ok(SolverMethod::NelderMead),
        _ => Err(format!(
            "unknown solver method '{s}', expected gauss-newton or nelder-mead"
        )),
    }
}

pub fn parse() -> Options {
    let opts = Options::parse();

    let debug_level = match opts.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(debug_level)
        .with_writer(std::io::stderr)
        .init();

    opts
}
