use anyhow::{Context, Result, ensure};
use gbn_lab_abstract::{ReliableHost, TestAction, TestAssertion, TestScenario};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::engine::Simulator;
use crate::trace::SimulationReport;

pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    parse_scenario(&content)
        .with_context(|| format!("Failed to parse scenario file {}", path.display()))
}

pub fn parse_scenario(content: &str) -> Result<TestScenario> {
    toml::from_str(content).context("Invalid scenario TOML")
}

pub fn configure_actions(sim: &mut Simulator, actions: &[TestAction]) {
    for action in actions {
        match action {
            TestAction::AppSend { time, entity, data } => {
                sim.schedule_app_send(*time, *entity, data.clone());
            }
            TestAction::DropNextData { entity, seq } => {
                sim.add_drop_data_once(*entity, *seq);
            }
            TestAction::DropNextAck { entity, ack } => {
                sim.add_drop_ack_once(*entity, *ack);
            }
        }
    }
}

/// Build a simulator with the scenario's channel settings and actions queued.
pub fn build_simulator(
    scenario: &TestScenario,
    host_a: Box<dyn ReliableHost>,
    host_b: Box<dyn ReliableHost>,
) -> Result<Simulator> {
    let mut sim = Simulator::new(scenario.sim_config(), host_a, host_b)?;
    configure_actions(&mut sim, &scenario.actions);
    Ok(sim)
}

/// Run a scenario to completion and check every assertion.
pub fn run_scenario(
    scenario: &TestScenario,
    host_a: Box<dyn ReliableHost>,
    host_b: Box<dyn ReliableHost>,
) -> Result<SimulationReport> {
    let mut sim = build_simulator(scenario, host_a, host_b)?;
    info!("Running scenario '{}': {}", scenario.name, scenario.description);
    sim.run_until_complete();

    let report = sim.export_report();
    evaluate(&report, &scenario.assertions)
        .with_context(|| format!("Scenario '{}' failed", scenario.name))?;
    info!(
        "Scenario '{}' passed {} assertions in {} ms",
        scenario.name,
        scenario.assertions.len(),
        report.duration_ms
    );
    Ok(report)
}

pub fn evaluate(report: &SimulationReport, assertions: &[TestAssertion]) -> Result<()> {
    for assertion in assertions {
        check(report, assertion)?;
    }
    Ok(())
}

fn check(report: &SimulationReport, assertion: &TestAssertion) -> Result<()> {
    match assertion {
        TestAssertion::DataDelivered { entity, data } => {
            ensure!(
                report
                    .delivered(*entity)
                    .iter()
                    .any(|d| d.as_slice() == data.as_bytes()),
                "{entity:?} never received {data:?}"
            );
        }
        TestAssertion::DeliveredInOrder { entity, messages } => {
            let actual: Vec<String> = report
                .delivered(*entity)
                .iter()
                .map(|d| String::from_utf8_lossy(d).into_owned())
                .collect();
            ensure!(
                &actual == messages,
                "{entity:?} expected {messages:?} in order, got {actual:?}"
            );
        }
        TestAssertion::PacketCount { entity, min, max } => {
            let sent = report.stats(*entity).map_or(0, |s| s.frames_sent);
            ensure!(
                sent >= *min,
                "{entity:?} sent {sent} frames, expected at least {min}"
            );
            if let Some(max) = max {
                ensure!(
                    sent <= *max,
                    "{entity:?} sent {sent} frames, expected at most {max}"
                );
            }
        }
        TestAssertion::MaxDuration { ms } => {
            ensure!(
                report.duration_ms <= *ms,
                "simulation took {} ms, limit {ms} ms",
                report.duration_ms
            );
        }
    }
    Ok(())
}
