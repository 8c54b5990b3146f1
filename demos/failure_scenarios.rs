// Walks through the happy path and each failure injection with a fast clock.

use std::collections::BTreeSet;
use std::sync::Arc;
use two_phase_commit_sim::two_phase_commit::{FaultBehavior, FaultPlan, FixedChance};
use two_phase_commit_sim::{Simulation, SimulationConfig, Timing};

fn config(clients: &[u32], faults: FaultPlan, register_all: bool) -> SimulationConfig {
    SimulationConfig {
        clients: clients.iter().copied().collect::<BTreeSet<_>>(),
        participant_count: 2,
        transaction_ids: vec![1, 2],
        timeout_units: 5,
        sleep_time_units: 30,
        faults,
        register_all,
        timing: Timing::from_millis(50),
        ..SimulationConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let scenarios = [
        ("A: all participants vote YES", config(&[1, 2], FaultPlan::default(), false)),
        ("B: fail before prepare", config(&[1, 2], FaultPlan::new(true, false), false)),
        ("C: participant 2 not eligible", config(&[1], FaultPlan::default(), true)),
        ("D: sentinel stalls after YES", config(&[1, 2], FaultPlan::new(false, true), false)),
        (
            "E: only participant 2 refuses",
            config(
                &[1, 2],
                FaultPlan::default().with_override(2, FaultBehavior::RefuseBeforePrepare),
                false,
            ),
        ),
    ];

    for (name, config) in scenarios {
        println!("\n{}", "=".repeat(60));
        println!("Scenario {}", name);

        let simulation = Simulation::with_chance(config, Arc::new(FixedChance::always()))?;
        let report = simulation.run().await?;

        for outcome in &report.outcomes {
            match outcome.abort_reason() {
                None => println!("  transaction {}: COMMITTED", outcome.transaction_id),
                Some(reason) => println!(
                    "  transaction {}: ABORTED ({})",
                    outcome.transaction_id, reason
                ),
            }
        }
        for id in &report.unfinished {
            println!("  transaction {}: still running", id);
        }
    }

    Ok(())
}
