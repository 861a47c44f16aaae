//! Event-passing simulator CLI
//!
//! Runs the fixed-step event-passing benchmark across in-process ranks.
//!
//! # Example
//!
//! ```bash
//! # Four ranks, eight cell groups each, neighbor exchange
//! eventpass-sim --ranks 4 --cell-groups 8 --simtime 200 --protocol neighbor
//!
//! # Overlap the exchange with computation and dump JSON
//! eventpass-sim --non-blocking --update-phase --json
//! ```

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use eventpass_environment::GeneratorKind;
use eventpass_pool::PoolConfig;
use eventpass_queueing::MailboxStrategy;
use eventpass_simulator::{Simulator, SimulatorConfig, SimulatorError};
use eventpass_spike::{ExchangeMode, ProtocolKind};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit code for `--help` and `--version`.
const EXIT_INFO: u8 = 3;

/// Exit code for argument and configuration errors.
const EXIT_USAGE: u8 = 2;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProtocolArg {
    Global,
    Neighbor,
}

impl From<ProtocolArg> for ProtocolKind {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Global => ProtocolKind::Global,
            ProtocolArg::Neighbor => ProtocolKind::Neighbor,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MailboxArg {
    Locked,
    LockFree,
}

impl From<MailboxArg> for MailboxStrategy {
    fn from(arg: MailboxArg) -> Self {
        match arg {
            MailboxArg::Locked => MailboxStrategy::Locked,
            MailboxArg::LockFree => MailboxStrategy::LockFree,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GeneratorArg {
    Fixed,
    Poisson,
    Uniform,
}

impl From<GeneratorArg> for GeneratorKind {
    fn from(arg: GeneratorArg) -> Self {
        match arg {
            GeneratorArg::Fixed => GeneratorKind::FixedProbability,
            GeneratorArg::Poisson => GeneratorKind::Poisson,
            GeneratorArg::Uniform => GeneratorKind::Uniform,
        }
    }
}

/// Event-passing simulator
///
/// Every rank runs a pool of cell-group threads that generate local,
/// inter-thread and spike events, and exchange spikes once per min_delay
/// window.
#[derive(Parser, Debug)]
#[command(name = "eventpass-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of ranks
    #[arg(short = 'r', long, default_value = "4")]
    ranks: u32,

    /// Cell groups (worker threads) per rank
    #[arg(short = 'c', long, default_value = "8")]
    cell_groups: u32,

    /// Last simulated step
    #[arg(short = 't', long, default_value = "100")]
    simtime: u64,

    /// Steps per exchange window
    #[arg(long, default_value = "5")]
    min_delay: u64,

    /// Events per cell group per step
    #[arg(short = 'e', long, default_value = "10")]
    events_per_step: u32,

    /// Percentage of events sent to another cell group
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u32).range(0..=100))]
    percent_ite: u32,

    /// Percentage of events sent as spikes
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u32).range(0..=100))]
    percent_spike: u32,

    /// Output gids per rank
    #[arg(long, default_value = "4")]
    num_out: u32,

    /// Input gids per rank
    #[arg(long, default_value = "12")]
    num_in: u32,

    /// Cell groups each input gid feeds
    #[arg(long, default_value = "5")]
    netcons_per_input: u32,

    /// Spike exchange protocol
    #[arg(long, value_enum, default_value = "global")]
    protocol: ProtocolArg,

    /// Overlap the exchange with the last step of each window
    #[arg(long)]
    non_blocking: bool,

    /// Inter-thread mailbox implementation
    #[arg(long, value_enum, default_value = "locked")]
    mailbox: MailboxArg,

    /// Event generator
    #[arg(long, value_enum, default_value = "fixed")]
    generator: GeneratorArg,

    /// Poisson arrivals per cell group per step
    #[arg(long, default_value = "1.0")]
    lambda: f64,

    /// Steps between firings of the uniform generator
    #[arg(long, default_value = "10")]
    firing_interval: u64,

    /// Run the per-step compute kernel
    #[arg(long)]
    update_phase: bool,

    /// Random seed for reproducible results
    #[arg(long, default_value = "12345")]
    seed: u64,

    /// Collective timeout in milliseconds
    #[arg(long, default_value = "30000")]
    timeout_ms: u64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn into_config(self) -> SimulatorConfig {
        let mode = if self.non_blocking {
            ExchangeMode::NonBlocking
        } else {
            ExchangeMode::Blocking
        };
        let pool = PoolConfig::new(self.cell_groups, self.simtime)
            .with_min_delay(self.min_delay)
            .with_events_per_step(self.events_per_step)
            .with_percentages(self.percent_ite, self.percent_spike)
            .with_connectivity(self.num_out, self.num_in, self.netcons_per_input)
            .with_protocol(self.protocol.into())
            .with_mode(mode)
            .with_mailbox(self.mailbox.into())
            .with_generator(self.generator.into())
            .with_poisson_lambda(self.lambda)
            .with_firing_interval(self.firing_interval)
            .with_update_phase(self.update_phase)
            .with_seed(self.seed);
        SimulatorConfig::new(self.ranks, pool).with_timeout(Duration::from_millis(self.timeout_ms))
    }
}

fn run(config: SimulatorConfig, json: bool) -> Result<(), SimulatorError> {
    let report = Simulator::new(config)?.run()?;
    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => EXIT_INFO,
                _ => EXIT_USAGE,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(ranks = args.ranks, seed = args.seed, "Parsed arguments");
    let json = args.json;
    match run(args.into_config(), json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Simulation failed");
            ExitCode::from(e.exit_code())
        }
    }
}
