//! Mock ACP agent binary, spawned as a subprocess by the integration tests
//! to simulate a real ACP agent over stdio.
//!
//! Usage: mock-acp-agent [--scenario text|tick|permission|crash] [--protocol-version <n>]

use std::env;

#[path = "../support/mock_stdio_agent.rs"]
mod mock_stdio_agent;

use mock_stdio_agent::{MockStdioAgent, MockStdioAgentConfig, Scenario};

fn main() {
    let args: Vec<String> = env::args().collect();
    let mut config = MockStdioAgentConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--scenario" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("missing value for --scenario");
                    std::process::exit(1);
                };
                config.scenario = match value.as_str() {
                    "text" => Scenario::TextStream,
                    "tick" => Scenario::TickStream,
                    "permission" => Scenario::Permission,
                    "crash" => Scenario::Crash,
                    other => {
                        eprintln!("unknown scenario: {other}");
                        std::process::exit(1);
                    }
                };
                i += 2;
            }
            "--protocol-version" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("missing value for --protocol-version");
                    std::process::exit(1);
                };
                config.protocol_version = value.parse().unwrap_or(1);
                i += 2;
            }
            other => {
                eprintln!("unknown argument: {other}");
                std::process::exit(1);
            }
        }
    }

    let mut agent = MockStdioAgent::new(config);
    if let Err(e) = agent.run() {
        eprintln!("mock agent error: {e}");
        std::process::exit(1);
    }
}
