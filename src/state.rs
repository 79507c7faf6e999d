use std::sync::Arc;

use crate::config::AppConfig;
use crate::observability::usage::UsageLedger;
use crate::transport::{HttpTransport, PreparedUpstream};

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub upstream: PreparedUpstream,
    /// Cumulative usage across every finalized response.
    pub ledger: Arc<UsageLedger>,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        let upstream = PreparedUpstream::new(&config.upstream);
        let ledger = Arc::new(UsageLedger::new(&config.usage, config.server.port));
        tracing::debug!(
            provider = %upstream.provider(),
            status_file = %ledger.status_path().display(),
            "application state ready"
        );
        Self {
            config,
            transport,
            upstream,
            ledger,
        }
    }
}
