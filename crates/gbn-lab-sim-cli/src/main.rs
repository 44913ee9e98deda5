use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use gbn_lab_abstract::{
    Entity, HostConfig, HostConfigOverride, SimConfig, SimConfigOverride, TestScenario,
};
use gbn_lab_host::gbn_pair;
use gbn_lab_simulator::{SimulationReport, Simulator, scenario_runner};

#[derive(Parser, Debug)]
#[command(author, version, about = "Go-Back-N reliable transfer simulator")]
struct Args {
    /// Load a scenario from disk and check its assertions.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Sender window size in packets.
    #[arg(long)]
    window_size: Option<u32>,

    /// Retransmission timeout in ms.
    #[arg(long)]
    timer_interval: Option<u64>,

    #[arg(long)]
    loss_rate: Option<f64>,
    #[arg(long)]
    corrupt_rate: Option<f64>,
    #[arg(long)]
    duplicate_rate: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,

    /// Messages each side sends in the default simulation.
    #[arg(long, default_value_t = 10)]
    messages: u32,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt::init();
    info!("gbn-lab-sim starting…");

    let report = if let Some(path) = &args.scenario {
        let mut scenario = scenario_runner::load_scenario(path)?;
        args.apply_overrides(&mut scenario.config, &mut scenario.host);
        run_scenario(&scenario)?
    } else {
        run_default_sim(&args)?
    };

    log_summary(&report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

impl Args {
    /// Command-line flags win over whatever the scenario file set.
    fn apply_overrides(&self, sim: &mut SimConfigOverride, host: &mut HostConfigOverride) {
        if self.loss_rate.is_some() {
            sim.loss_rate = self.loss_rate;
        }
        if self.corrupt_rate.is_some() {
            sim.corrupt_rate = self.corrupt_rate;
        }
        if self.duplicate_rate.is_some() {
            sim.duplicate_rate = self.duplicate_rate;
        }
        if self.seed.is_some() {
            sim.seed = self.seed;
        }
        if self.window_size.is_some() {
            host.window_size = self.window_size;
        }
        if self.timer_interval.is_some() {
            host.timer_interval = self.timer_interval;
        }
    }
}

fn run_scenario(scenario: &TestScenario) -> Result<SimulationReport> {
    let (host_a, host_b) = gbn_pair(scenario.host_config()).context("Invalid host config")?;
    scenario_runner::run_scenario(scenario, host_a, host_b)
}

fn run_default_sim(args: &Args) -> Result<SimulationReport> {
    let mut sim = build_default_sim(args)?;
    info!("Starting default headless simulation…");
    sim.run_until_complete();
    info!("Simulation complete.");
    Ok(sim.export_report())
}

fn build_default_sim(args: &Args) -> Result<Simulator> {
    let mut sim_overrides = SimConfigOverride::default();
    let mut host_overrides = HostConfigOverride::default();
    args.apply_overrides(&mut sim_overrides, &mut host_overrides);

    let mut config = SimConfig {
        loss_rate: 0.1,
        corrupt_rate: 0.05,
        min_latency: 100,
        max_latency: 500,
        seed: 42,
        max_time: Some(3_600_000),
        ..Default::default()
    };
    sim_overrides.apply_to(&mut config);
    let mut host_config = HostConfig::default();
    host_overrides.apply_to(&mut host_config);

    let (host_a, host_b) = gbn_pair(host_config).context("Invalid host config")?;
    let mut sim = Simulator::new(config, host_a, host_b)?;
    for i in 0..u64::from(args.messages) {
        sim.schedule_app_send(i * 100, Entity::A, format!("Packet {} from A", i + 1));
        sim.schedule_app_send(i * 150 + 50, Entity::B, format!("Packet {} from B", i + 1));
    }
    Ok(sim)
}

fn log_summary(report: &SimulationReport) {
    for (entity, stats) in &report.entities {
        info!(
            "[{:?}] frames sent: {} (data {}, acks {}) | deliveries: {}",
            entity,
            stats.frames_sent,
            stats.data_frames_sent,
            stats.acks_sent,
            stats.delivered.len()
        );
    }
    info!(
        "Simulation duration: {} ms{}",
        report.duration_ms,
        if report.truncated {
            " (stopped at max_time)"
        } else {
            ""
        }
    );
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
