use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use tracing::{info, warn};

use myftp_abstract::{SimConfig, TestAction, TestAssertion, TestScenario, TransferConfig};

use crate::engine::Simulation;
use crate::trace::SimulationReport;

pub struct ScenarioResult {
    pub report: SimulationReport,
    /// One message per assertion that did not hold.
    pub failures: Vec<String>,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario: TestScenario =
        toml::from_str(&content).context("Failed to parse scenario file")?;
    Ok(scenario)
}

pub fn build_simulation(scenario: &TestScenario, transfer: TransferConfig) -> Simulation {
    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);

    let mut sim = Simulation::new(config, transfer).named(scenario.name.clone());
    for action in &scenario.actions {
        match action {
            TestAction::DropNextFromSenderSeq { seq } => sim.add_drop_sender_seq_once(*seq),
            TestAction::DropNextFromReceiverAck { ack } => sim.add_drop_receiver_ack_once(*ack),
        }
    }
    sim
}

pub async fn run_scenario(
    scenario: &TestScenario,
    transfer: TransferConfig,
) -> Result<ScenarioResult> {
    info!("Running Scenario: {}", scenario.name);
    if !scenario.description.is_empty() {
        info!("Description: {}", scenario.description);
    }

    let sim = build_simulation(scenario, transfer);
    let outcome = sim.run(Bytes::from(scenario.payload.bytes())).await?;
    let failures = check_assertions(&scenario.assertions, &outcome.report);

    if failures.is_empty() {
        info!("Test Scenario Passed!");
    }
    for failure in &failures {
        warn!(scenario = %scenario.name, "{failure}");
    }
    Ok(ScenarioResult {
        report: outcome.report,
        failures,
    })
}

fn check_range(what: &str, value: u32, min: u32, max: Option<u32>) -> Option<String> {
    if value < min {
        return Some(format!(
            "Assertion Failed: {what} was {value}, expected min {min}"
        ));
    }
    match max {
        Some(max) if value > max => Some(format!(
            "Assertion Failed: {what} was {value}, expected max {max}"
        )),
        _ => None,
    }
}

pub fn check_assertions(assertions: &[TestAssertion], report: &SimulationReport) -> Vec<String> {
    let mut failures = Vec::new();
    for assertion in assertions {
        let failure = match assertion {
            TestAssertion::DataDelivered => (!report.delivered_intact).then(|| {
                "Assertion Failed: receiver did not reassemble the payload".to_string()
            }),
            TestAssertion::SenderPacketCount { min, max } => check_range(
                "sender datagram count",
                report.sender.datagrams_sent,
                *min,
                *max,
            ),
            TestAssertion::SenderWindowMax { min, max } => check_range(
                "sender window max",
                report.sender.max_burst(),
                *min,
                *max,
            ),
            TestAssertion::Retransmissions { min, max } => check_range(
                "retransmissions",
                report.sender.retransmissions,
                *min,
                *max,
            ),
            TestAssertion::MaxDuration { ms } => (report.duration_ms > *ms).then(|| {
                format!(
                    "Assertion Failed: run took {} ms, expected at most {ms}",
                    report.duration_ms
                )
            }),
        };
        failures.extend(failure);
    }
    failures
}
