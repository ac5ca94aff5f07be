//! Test support utilities for ACP integration tests.

pub mod mock_stdio_agent;

pub use mock_stdio_agent::{MockStdioAgent, MockStdioAgentConfig, Scenario};
