//! Cumulative usage and cost accounting.
//!
//! One ledger lives on the application state and is shared by every stream
//! driver. Each finalized response records its usage once; the resulting
//! snapshot is written to a small JSON status file other tools can poll.
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::UsageConfig;
use crate::protocol::anthropic::Usage;

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    input_tokens: u64,
    output_tokens: u64,
    total_cost: f64,
}

/// Persisted view of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub context_window: u64,
    pub context_left_percent: f64,
    pub updated_at: String,
}

#[derive(Debug)]
pub struct UsageLedger {
    totals: Mutex<Totals>,
    status_path: PathBuf,
    context_window: u64,
    input_cost_per_million: f64,
    output_cost_per_million: f64,
}

impl UsageLedger {
    /// Ledger writing to `<status_dir>/messages-relay-<port>.json`.
    #[must_use]
    pub fn new(config: &UsageConfig, port: u16) -> Self {
        Self {
            totals: Mutex::new(Totals::default()),
            status_path: config
                .status_dir
                .join(format!("messages-relay-{port}.json")),
            context_window: config.context_window,
            input_cost_per_million: config.input_cost_per_million,
            output_cost_per_million: config.output_cost_per_million,
        }
    }

    #[must_use]
    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    /// Fold one response's usage in: input is replaced (it reflects the
    /// current context size), output is summed, cost is added.
    pub fn record(&self, usage: Usage) -> UsageSnapshot {
        let totals = {
            let mut totals = self.totals.lock();
            totals.input_tokens = usage.input_tokens;
            totals.output_tokens = totals.output_tokens.saturating_add(usage.output_tokens);
            totals.total_cost += self.cost_of(usage);
            *totals
        };
        self.snapshot_of(totals)
    }

    /// [`record`](Self::record) then write the status file.
    pub async fn record_and_persist(&self, usage: Usage) -> UsageSnapshot {
        let snapshot = self.record(usage);
        self.persist(&snapshot).await;
        snapshot
    }

    #[must_use]
    pub fn snapshot(&self) -> UsageSnapshot {
        let totals = *self.totals.lock();
        self.snapshot_of(totals)
    }

    /// Write `snapshot` to the status file. Failures are logged and dropped.
    pub async fn persist(&self, snapshot: &UsageSnapshot) {
        let body = match serde_json::to_vec_pretty(snapshot) {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!("failed to serialize usage snapshot: {err}");
                return;
            }
        };
        if let Err(err) = tokio::fs::write(&self.status_path, body).await {
            tracing::debug!(
                path = %self.status_path.display(),
                "failed to write usage status file: {err}"
            );
        }
    }

    fn cost_of(&self, usage: Usage) -> f64 {
        (usage.input_tokens as f64) * self.input_cost_per_million / TOKENS_PER_MILLION
            + (usage.output_tokens as f64) * self.output_cost_per_million / TOKENS_PER_MILLION
    }

    fn snapshot_of(&self, totals: Totals) -> UsageSnapshot {
        let used = totals.input_tokens.min(self.context_window);
        let left = self.context_window - used;
        let context_left_percent = if self.context_window == 0 {
            0.0
        } else {
            (left as f64) * 100.0 / (self.context_window as f64)
        };
        UsageSnapshot {
            input_tokens: totals.input_tokens,
            output_tokens: totals.output_tokens,
            total_tokens: totals.input_tokens + totals.output_tokens,
            total_cost: totals.total_cost,
            context_window: self.context_window,
            context_left_percent,
            updated_at: httpdate::fmt_http_date(SystemTime::now()),
        }
    }
}
