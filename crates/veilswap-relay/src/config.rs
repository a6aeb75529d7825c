//! swap client configuration

use serde::{Deserialize, Serialize};

/// endpoints and limits for one swap client
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// prover oracle endpoint
    pub prover_endpoint: String,
    /// relayer endpoint
    pub relayer_endpoint: String,
    /// ledger rpc endpoint (deposits, balances, account lookups)
    pub ledger_endpoint: String,
    /// bound on a single proving call; proving dominates latency
    pub prover_timeout_secs: u64,
    /// http timeout for ledger and relay calls
    pub request_timeout_secs: u64,
    /// retries for idempotent reads (balances, account lookups) only;
    /// deposits and relay submissions are never blindly retried
    pub read_retry_attempts: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            prover_endpoint: "http://localhost:8700".into(),
            relayer_endpoint: "http://localhost:8710".into(),
            ledger_endpoint: "http://localhost:8899".into(),
            prover_timeout_secs: 120,
            request_timeout_secs: 30,
            read_retry_attempts: 3,
        }
    }
}

impl RelayConfig {
    /// everything on localhost defaults
    pub fn local() -> Self {
        Self::default()
    }
}
