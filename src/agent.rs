//! AI-agent orchestrator (spec §6 "External collaborators"): a pluggable
//! sidecar the Room Actor starts on a room's `0 → 1` participant transition
//! and stops once the room empties (spec §4.5 `join`/`leave`/`close`). The
//! orchestrator itself is out of core scope per spec §1 ("the optional
//! AI-agent sidecar"); this crate owns only the lifecycle trigger, the same
//! pluggable-trait-with-permissive-default shape as `PaymentVerifier` (C4)
//! and `SettlementSubmitter` (C6).

use anyhow::Result;

/// `start(channel) -> agent_id` / `stop(agent_id)`, both idempotent from the
/// core's perspective (spec §6).
pub trait AgentOrchestrator: Send + Sync {
    fn start(&self, channel: &str) -> Result<String>;
    fn stop(&self, agent_id: &str) -> Result<()>;
}

/// No sidecar configured: `start` returns an empty agent id and logs,
/// `stop` is a no-op. The default until a real orchestrator is wired in.
pub struct NoopAgentOrchestrator;

impl AgentOrchestrator for NoopAgentOrchestrator {
    fn start(&self, channel: &str) -> Result<String> {
        tracing::debug!(channel, "no AI-agent orchestrator configured, skipping start");
        Ok(String::new())
    }

    fn stop(&self, agent_id: &str) -> Result<()> {
        if !agent_id.is_empty() {
            tracing::debug!(agent_id, "no AI-agent orchestrator configured, skipping stop");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct CountingOrchestrator {
        pub starts: AtomicUsize,
        pub stops: AtomicUsize,
    }

    impl AgentOrchestrator for CountingOrchestrator {
        fn start(&self, _channel: &str) -> Result<String> {
            let n = self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(format!("agent-{n}"))
        }

        fn stop(&self, _agent_id: &str) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn noop_orchestrator_returns_an_empty_agent_id() {
        let orchestrator = NoopAgentOrchestrator;
        assert_eq!(orchestrator.start("channel-1").unwrap(), "");
        assert!(orchestrator.stop("").is_ok());
    }
}
