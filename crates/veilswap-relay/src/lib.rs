//! veilswap relay
//!
//! the swap protocol around the shielded pool: live eligibility checks
//! and all-or-nothing proof batches, spend output decoding, guard address
//! derivation, the client-side swap orchestrator, and the relayer-side
//! re-verification service
//!
//! # protocol
//!
//! ```text
//! intent ─> eligibility checks ─> note mint ─> deposit ─> tree insert
//!        ─> path ─> spend proof ─> relay bundle ─> relayer re-verifies
//!        ─> ledger settles, guard address initialized, note spent
//! ```
//!
//! every step records its output on the attempt, so a failed swap resumes
//! from the last completed step with the same note

pub mod config;
pub mod eligibility;
pub mod error;
pub mod oracle;
pub mod outputs;
pub mod relayer;
pub mod swap;

pub use config::RelayConfig;
pub use eligibility::{
    CheckOutcome, EligibilityAggregator, EligibilityProof, EligibilityProofSet,
    EligibilityRequirement, RequirementKind, RequirementState, RequirementStatus,
};
pub use error::{
    EligibilityError, LedgerError, ProverError, RelayError, Result, SwapError,
};
pub use oracle::{
    BalanceOracle, DepositReceipt, HttpBalanceOracle, HttpLedger, HttpProver, HttpRelayer,
    LedgerClient, ProofBundle, ProverOracle, RelayAccounts, RelayEndpoint, RelayRequest,
    RelayResponse, SwapDirection, SwapInstruction,
};
pub use outputs::{
    decode_spend_outputs, guard_address, resolve_guard_address, OutputsDecoder, SpendOutputs,
};
pub use relayer::{ProofVerifier, RelayService};
pub use swap::{SpendArtifacts, SwapAttempt, SwapIntent, SwapOrchestrator, SwapPhase};

/// circuit id of the spend proof
pub const SPEND_CIRCUIT: &str = "spend_note";
/// circuit ids of the eligibility predicates
pub const MIN_BALANCE_CIRCUIT: &str = "eligibility_min_balance";
pub const TOKEN_HOLDER_CIRCUIT: &str = "eligibility_token_holder";
pub const EXCLUSION_CIRCUIT: &str = "eligibility_exclusion";
