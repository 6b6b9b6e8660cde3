//! Runtime configuration for one orchestrator instance.
//!
//! Everything here deserializes from JSON so deployments can tune timeouts
//! and selector lists without a rebuild. Every blocking wait in the pipeline
//! is bounded by one of these values; there is no unbounded wait anywhere.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::selectors::SelectorSet;

/// Webmail inbox URL the compose driver navigates to.
fn default_inbox_url() -> String {
    "https://mail.google.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Waiting for the debug port to accept connections after spawn.
    pub launch_ms: u64,
    /// Waiting for the inbox landmark after navigation.
    pub landmark_ms: u64,
    /// Per-candidate budget during selector resolution.
    pub candidate_ms: u64,
    /// Waiting for the sent-confirmation signal.
    pub confirmation_ms: u64,
    /// Hard ceiling on everything after the browser is up.
    pub overall_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            launch_ms: 15_000,
            landmark_ms: 20_000,
            candidate_ms: 2_000,
            confirmation_ms: 8_000,
            overall_ms: 120_000,
        }
    }
}

impl Timeouts {
    pub fn launch(&self) -> Duration {
        Duration::from_millis(self.launch_ms)
    }
    pub fn landmark(&self) -> Duration {
        Duration::from_millis(self.landmark_ms)
    }
    pub fn candidate(&self) -> Duration {
        Duration::from_millis(self.candidate_ms)
    }
    pub fn confirmation(&self) -> Duration {
        Duration::from_millis(self.confirmation_ms)
    }
    pub fn overall(&self) -> Duration {
        Duration::from_millis(self.overall_ms)
    }
}

/// Debug-port selection policy: try `base`, then probe the next `span` ports.
/// A crashed prior instance may still hold `base`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub base: u16,
    pub span: u16,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self { base: 9222, span: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub inbox_url: String,
    pub timeouts: Timeouts,
    pub ports: PortConfig,
    pub selectors: SelectorSet,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inbox_url: default_inbox_url(),
            timeouts: Timeouts::default(),
            ports: PortConfig::default(),
            selectors: SelectorSet::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = OrchestratorConfig::default();
        assert!(cfg.inbox_url.starts_with("https://"));
        assert_eq!(cfg.ports.base, 9222);
        assert!(cfg.ports.span > 0);
        assert!(cfg.timeouts.candidate() < cfg.timeouts.landmark());
        assert!(cfg.timeouts.overall() > cfg.timeouts.launch());
    }

    #[test]
    fn json_overrides_only_what_it_names() {
        let json = r#"{
            "inbox_url": "https://mail.example.test",
            "timeouts": { "candidate_ms": 500 },
            "ports": { "base": 9333 }
        }"#;
        let cfg: OrchestratorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.inbox_url, "https://mail.example.test");
        assert_eq!(cfg.timeouts.candidate(), Duration::from_millis(500));
        assert_eq!(cfg.timeouts.launch_ms, Timeouts::default().launch_ms);
        assert_eq!(cfg.ports.base, 9333);
        assert_eq!(cfg.ports.span, PortConfig::default().span);
    }
}
