//! Engine configuration
//!
//! Defaults suit an interactive deployment; every knob can be overridden
//! from the environment.

use std::time::Duration;

use crate::turn::RetryPolicy;

/// What `start` does while another run is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunAdmission {
    /// Cancel the active run and take its place
    #[default]
    Supersede,
    /// Refuse to start
    Reject,
}

/// Configuration for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard cap on model turns per run
    pub max_turns: u32,
    /// Retries after the first attempt to open a model stream
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further retry
    pub initial_backoff: Duration,
    /// Blocking tool calls allowed to run at once
    pub tool_workers: usize,
    /// Policy for concurrent `start` calls
    pub admission: RunAdmission,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: 30,
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            tool_workers: 8,
            admission: RunAdmission::Supersede,
        }
    }
}

impl EngineConfig {
    /// Build from `AGENT_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source, falling back to defaults
    /// for anything missing or unparsable
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |name: &str, default: u64| -> u64 {
            lookup(name)
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(default)
        };

        let reject = lookup("AGENT_REJECT_CONCURRENT_RUNS")
            .and_then(|raw| parse_flag(&raw))
            .unwrap_or(false);

        Self {
            max_turns: number("AGENT_MAX_TURNS", defaults.max_turns as u64).max(1) as u32,
            max_retries: number("AGENT_MAX_RETRIES", defaults.max_retries as u64) as u32,
            initial_backoff: Duration::from_millis(number(
                "AGENT_RETRY_BACKOFF_MS",
                defaults.initial_backoff.as_millis() as u64,
            )),
            tool_workers: number("AGENT_TOOL_WORKERS", defaults.tool_workers as u64).max(1)
                as usize,
            admission: if reject {
                RunAdmission::Reject
            } else {
                RunAdmission::Supersede
            },
        }
    }

    /// Backoff policy for opening model streams
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: self.initial_backoff,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
