use std::collections::BTreeMap;
use std::io::Write;

use gossip_store::{MarketStats, MetricsSnapshot};
use serde::Serialize;

/// Emit a JSONL event to stdout (flushed immediately for piped output).
pub fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{json}");
        let _ = lock.flush();
    }
}

// ── Session events ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventStarted {
    pub event: &'static str,
    pub nodes: usize,
    pub legacy: usize,
    pub trades: usize,
    pub seed: u64,
}

#[derive(Serialize)]
pub struct EventNodeReady {
    pub event: &'static str,
    pub node: String,
    pub capabilities: Vec<u32>,
    pub restored: usize,
}

// ── Publication events ──────────────────────────────────────────

#[derive(Serialize)]
pub struct EventTradePublished {
    pub event: &'static str,
    pub trade: usize,
    pub market: String,
    pub taker: String,
    pub maker: String,
    pub taker_outcome: String,
    pub maker_outcome: String,
}

// ── Convergence / expiry ────────────────────────────────────────

#[derive(Serialize)]
pub struct EventConverged {
    pub event: &'static str,
    pub converged: bool,
    pub rounds: u32,
    pub elapsed_ms: u64,
}

#[derive(Serialize)]
pub struct EventSwept {
    pub event: &'static str,
    pub node: String,
    pub advanced_days: u64,
    pub removed: usize,
    pub remaining: usize,
}

// ── Summary ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventNodeSummary {
    pub event: &'static str,
    pub node: String,
    pub entries: usize,
    pub expected: usize,
    pub metrics: MetricsSnapshot,
    pub markets: BTreeMap<String, MarketStats>,
    pub lagged: u64,
}

#[derive(Serialize)]
pub struct EventFinished {
    pub event: &'static str,
    pub converged: bool,
    pub elapsed_ms: u64,
}
