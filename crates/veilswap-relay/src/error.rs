//! error taxonomy for the swap protocol
//!
//! every failure is scoped to one swap attempt; nothing here is
//! process-fatal. client-recoverable errors never mutate persisted state

use thiserror::Error;
use veilswap_accumulator::TreeError;

/// a live eligibility check failed; recoverable, nothing was mutated
#[derive(Debug, Error)]
pub enum EligibilityError {
    #[error("balance below requirement: have {have}, need {need}")]
    BelowThreshold { have: u64, need: u64 },

    #[error("gating asset {mint} below requirement: have {have}, need {need}")]
    MissingGatingAsset { mint: String, have: u64, need: u64 },

    #[error("balance lookup failed: {0}")]
    BalanceUnavailable(String),
}

/// prover oracle failures
///
/// tool problems and genuine witness failures are distinguished; neither
/// is auto-retried
#[derive(Debug, Error)]
pub enum ProverError {
    #[error("proving tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("circuit {0} not compiled")]
    CircuitNotCompiled(String),

    #[error("witness rejected: {0}")]
    Witness(String),

    #[error("proving timed out after {0}s")]
    Timeout(u64),
}

/// ledger submission failures
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    #[error("deposit rejected: {0}")]
    DepositRejected(String),

    #[error("swap rejected: {0}")]
    SwapRejected(String),
}

/// relay failures, reported with ledger logs where available
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay rejected request: {reason}")]
    Rejected { reason: String, logs: Vec<String> },

    #[error("relay submission failed: {0}")]
    Submission(String),
}

/// umbrella for one swap attempt
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("ineligible: {0}")]
    Eligibility(#[from] EligibilityError),

    #[error(transparent)]
    Prover(#[from] ProverError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("hash error: {0}")]
    Core(#[from] veilswap_core::CoreError),

    #[error("note already spent")]
    NoteSpent,
}

pub type Result<T> = std::result::Result<T, SwapError>;
