use clap::Parser;
use std::collections::BTreeSet;
use std::error::Error;
use two_phase_commit_sim::logger::{self, LogFormat};
use two_phase_commit_sim::two_phase_commit::{FaultOverride, FaultPlan};
use two_phase_commit_sim::{Simulation, SimulationConfig, Timing};

/// Simulate the two-phase distributed commit protocol with failure scenarios.
#[derive(Parser, Debug)]
#[command(name = "two-phase-commit-sim")]
struct Args {
    /// Participant ids eligible to vote YES (also the ones registered)
    #[arg(long, num_args = 1.., required = true, env = "TWO_PC_CLIENTS", value_delimiter = ',')]
    clients: Vec<u32>,

    /// Number of participants to instantiate
    #[arg(long, default_value_t = 2, env = "TWO_PC_PARTICIPANT_COUNT")]
    participant_count: u32,

    /// Transaction ids, each run as an independent round
    #[arg(long, num_args = 1.., required = true, env = "TWO_PC_TRANSACTION_IDS", value_delimiter = ',')]
    transaction_ids: Vec<u64>,

    /// How long the coordinator waits for each acknowledged vote, in time units
    #[arg(long, default_value_t = 5, env = "TWO_PC_TIMEOUT")]
    timeout: u32,

    /// How long to wait for transactions to finish, in time units
    #[arg(long, default_value_t = 15, env = "TWO_PC_SLEEP_TIME")]
    sleep_time: u32,

    /// Every participant votes NO before preparing
    #[arg(long, overrides_with = "no_fail_before_prepare")]
    fail_before_prepare: bool,

    #[arg(long, overrides_with = "fail_before_prepare")]
    no_fail_before_prepare: bool,

    /// Participant 1 stalls past the vote timeout after voting YES
    #[arg(long, overrides_with = "no_fail_after_one_commit")]
    fail_after_one_commit: bool,

    #[arg(long, overrides_with = "fail_after_one_commit")]
    no_fail_after_one_commit: bool,

    /// Per-participant fault, e.g. `2=refuse-before-prepare` or `1=stall-after-yes`
    #[arg(long = "fault", value_name = "ID=BEHAVIOR")]
    faults: Vec<FaultOverride>,

    /// Register all participants, not only the clients
    #[arg(long)]
    register_all: bool,

    /// Probability that an eligible participant votes YES
    #[arg(long, default_value_t = 0.8)]
    success_probability: f64,

    /// Seed for reproducible runs
    #[arg(long, env = "TWO_PC_SEED")]
    seed: Option<u64>,

    /// Length of one time unit in milliseconds
    #[arg(long, default_value_t = 1000, env = "TWO_PC_TIME_UNIT_MS")]
    time_unit_ms: u64,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    report: bool,
}

impl Args {
    fn into_config(self) -> SimulationConfig {
        let mut faults = FaultPlan::new(
            self.fail_before_prepare && !self.no_fail_before_prepare,
            self.fail_after_one_commit && !self.no_fail_after_one_commit,
        );
        faults.extend(self.faults);

        SimulationConfig {
            clients: self.clients.into_iter().collect::<BTreeSet<_>>(),
            participant_count: self.participant_count,
            transaction_ids: self.transaction_ids,
            timeout_units: self.timeout,
            sleep_time_units: self.sleep_time,
            faults,
            register_all: self.register_all,
            success_probability: self.success_probability,
            seed: self.seed,
            timing: Timing::from_millis(self.time_unit_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    logger::init_logger(args.log_format);
    let print_report = args.report;

    let simulation = Simulation::new(args.into_config())?;
    let report = simulation.run().await?;

    for outcome in &report.outcomes {
        match outcome.abort_reason() {
            None => tracing::info!(transaction_id = outcome.transaction_id, "COMMITTED"),
            Some(reason) => {
                tracing::info!(transaction_id = outcome.transaction_id, %reason, "ABORTED")
            }
        }
    }

    if print_report {
        println!("{}", report.to_json()?);
    }

    Ok(())
}
