//! external collaborator seams
//!
//! the prover, balance source, ledger and relayer are opaque services.
//! everything here marshals requests, bounds latency and classifies
//! failures; nothing proves or settles locally

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use veilswap_core::FieldElement;

use crate::eligibility::EligibilityProof;
use crate::error::{EligibilityError, LedgerError, ProverError, RelayError};

/// proof plus the public inputs the verifier consumes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    #[serde(with = "serde_bytes")]
    pub proof: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub public_inputs: Vec<u8>,
}

/// swap direction through the paired reserves
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapDirection {
    AToB,
    BToA,
}

/// instruction payload the ledger's private-swap entrypoint consumes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SwapInstruction {
    pub pool: String,
    pub amount_in: u64,
    /// slippage bound the ledger enforces
    pub min_out: u64,
    pub direction: SwapDirection,
    pub nullifier: FieldElement,
    /// double-spend guard account, canonical unless the caller resolved it
    pub guard_address: String,
}

/// accounts resolved for the relayed transaction
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayAccounts {
    pub pool: String,
    pub recipient: String,
    pub relayer_fee_account: Option<String>,
}

/// the bundle a relayer accepts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayRequest {
    pub spend_proof: ProofBundle,
    pub instruction: SwapInstruction,
    pub eligibility_proofs: Vec<EligibilityProof>,
    pub accounts: RelayAccounts,
}

/// relayer verdict
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayResponse {
    pub success: bool,
    pub signature: Option<String>,
    pub error: Option<String>,
    pub logs: Option<Vec<String>>,
}

impl RelayResponse {
    pub fn rejected(reason: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            success: false,
            signature: None,
            error: Some(reason.into()),
            logs: Some(logs),
        }
    }
}

/// receipt for a deposit credited to the shielded vault
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub pool: String,
    pub commitment: FieldElement,
    pub amount: u64,
    /// absent when the deposit was found already recorded on-ledger
    pub signature: Option<String>,
}

/// opaque proving toolchain
pub trait ProverOracle {
    /// generate one proof; seconds-scale, bounded by the implementation
    fn generate_proof(
        &self,
        circuit_id: &str,
        private_inputs: &Value,
        public_inputs: &Value,
    ) -> impl std::future::Future<Output = std::result::Result<ProofBundle, ProverError>> + Send;
}

/// observed balances on the ledger
pub trait BalanceOracle {
    /// `None` means the account does not exist
    fn balance(
        &self,
        owner: &str,
        mint: &str,
    ) -> impl std::future::Future<Output = std::result::Result<Option<u64>, EligibilityError>> + Send;
}

/// the ledger program boundary
pub trait LedgerClient {
    /// move `amount` into pool custody against `commitment`
    fn submit_deposit(
        &self,
        pool: &str,
        amount: u64,
        commitment: &FieldElement,
    ) -> impl std::future::Future<Output = std::result::Result<DepositReceipt, LedgerError>> + Send;

    /// whether a deposit for `commitment` is already credited; consulted
    /// before any deposit retry so funds are never double-credited
    fn deposit_recorded(
        &self,
        pool: &str,
        commitment: &FieldElement,
    ) -> impl std::future::Future<Output = std::result::Result<bool, LedgerError>> + Send;

    /// whether the double-spend guard account exists already
    fn guard_initialized(
        &self,
        guard_address: &str,
    ) -> impl std::future::Future<Output = std::result::Result<bool, LedgerError>> + Send;

    /// forward the private-swap payload; relayer-side only
    fn submit_swap(
        &self,
        request: &RelayRequest,
    ) -> impl std::future::Future<Output = std::result::Result<String, LedgerError>> + Send;
}

/// third party that signs and pays fees for the settlement
pub trait RelayEndpoint {
    fn submit(
        &self,
        request: &RelayRequest,
    ) -> impl std::future::Future<Output = std::result::Result<RelayResponse, RelayError>> + Send;
}

// ---------------------------------------------------------------------------
// http implementations
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ProveHttpRequest<'a> {
    circuit_id: &'a str,
    private_inputs: &'a Value,
    public_inputs: &'a Value,
}

#[derive(Deserialize)]
struct ProveHttpResponse {
    status: String,
    #[serde(with = "serde_bytes", default)]
    proof: Vec<u8>,
    #[serde(with = "serde_bytes", default)]
    public_inputs: Vec<u8>,
    #[serde(default)]
    error: Option<String>,
}

/// http prover oracle
pub struct HttpProver {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpProver {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl ProverOracle for HttpProver {
    async fn generate_proof(
        &self,
        circuit_id: &str,
        private_inputs: &Value,
        public_inputs: &Value,
    ) -> std::result::Result<ProofBundle, ProverError> {
        let request = ProveHttpRequest {
            circuit_id,
            private_inputs,
            public_inputs,
        };
        let started = Instant::now();

        // cancellation on timeout leaves the local note intact for retry
        let exchange = async {
            let response = self
                .client
                .post(format!("{}/prove", self.endpoint))
                .json(&request)
                .send()
                .await
                .map_err(|e| ProverError::ToolUnavailable(e.to_string()))?;
            response
                .json::<ProveHttpResponse>()
                .await
                .map_err(|e| ProverError::ToolUnavailable(e.to_string()))
        };
        let body = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ProverError::Timeout(self.timeout.as_secs()))??;

        match body.status.as_str() {
            "ok" => {
                info!(
                    "proof for {} generated in {:.2}s",
                    circuit_id,
                    started.elapsed().as_secs_f64()
                );
                Ok(ProofBundle {
                    proof: body.proof,
                    public_inputs: body.public_inputs,
                })
            }
            "circuit_not_compiled" => Err(ProverError::CircuitNotCompiled(circuit_id.to_string())),
            "witness_error" => Err(ProverError::Witness(body.error.unwrap_or_default())),
            other => Err(ProverError::ToolUnavailable(format!(
                "unexpected prover status {other:?}: {}",
                body.error.unwrap_or_default()
            ))),
        }
    }
}

#[derive(Deserialize)]
struct BalanceHttpResponse {
    amount: u64,
}

/// http balance oracle; lookups are idempotent reads and retried
pub struct HttpBalanceOracle {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    retries: u32,
}

impl HttpBalanceOracle {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64, retries: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(timeout_secs),
            retries,
        }
    }
}

impl BalanceOracle for HttpBalanceOracle {
    async fn balance(
        &self,
        owner: &str,
        mint: &str,
    ) -> std::result::Result<Option<u64>, EligibilityError> {
        let url = format!("{}/balance/{}/{}", self.endpoint, owner, mint);
        let mut last_error = String::new();
        for attempt in 0..=self.retries {
            if attempt > 0 {
                warn!("balance lookup retry {attempt} for {owner}");
            }
            match self.client.get(&url).timeout(self.timeout).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                    return Ok(None);
                }
                Ok(response) => match response.json::<BalanceHttpResponse>().await {
                    Ok(body) => return Ok(Some(body.amount)),
                    Err(e) => last_error = e.to_string(),
                },
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(EligibilityError::BalanceUnavailable(last_error))
    }
}

#[derive(Serialize)]
struct DepositHttpRequest<'a> {
    pool: &'a str,
    amount: u64,
    commitment: &'a FieldElement,
}

#[derive(Deserialize)]
struct SignatureHttpResponse {
    signature: String,
}

/// http ledger client
pub struct HttpLedger {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpLedger {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl LedgerClient for HttpLedger {
    async fn submit_deposit(
        &self,
        pool: &str,
        amount: u64,
        commitment: &FieldElement,
    ) -> std::result::Result<DepositReceipt, LedgerError> {
        let request = DepositHttpRequest {
            pool,
            amount,
            commitment,
        };
        let response = self
            .client
            .post(format!("{}/deposit", self.endpoint))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(LedgerError::DepositRejected(reason));
        }
        let body: SignatureHttpResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;
        Ok(DepositReceipt {
            pool: pool.to_string(),
            commitment: *commitment,
            amount,
            signature: Some(body.signature),
        })
    }

    async fn deposit_recorded(
        &self,
        pool: &str,
        commitment: &FieldElement,
    ) -> std::result::Result<bool, LedgerError> {
        let url = format!("{}/deposit/{}/{}", self.endpoint, pool, commitment);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;
        Ok(response.status().is_success())
    }

    async fn guard_initialized(
        &self,
        guard_address: &str,
    ) -> std::result::Result<bool, LedgerError> {
        let url = format!("{}/account/{}", self.endpoint, guard_address);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;
        Ok(response.status().is_success())
    }

    async fn submit_swap(
        &self,
        request: &RelayRequest,
    ) -> std::result::Result<String, LedgerError> {
        let response = self
            .client
            .post(format!("{}/swap", self.endpoint))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;
        if !response.status().is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(LedgerError::SwapRejected(reason));
        }
        let body: SignatureHttpResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;
        Ok(body.signature)
    }
}

/// http relayer client
pub struct HttpRelayer {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpRelayer {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl RelayEndpoint for HttpRelayer {
    async fn submit(
        &self,
        request: &RelayRequest,
    ) -> std::result::Result<RelayResponse, RelayError> {
        let response = self
            .client
            .post(format!("{}/relay", self.endpoint))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| RelayError::Submission(e.to_string()))?;
        response
            .json::<RelayResponse>()
            .await
            .map_err(|e| RelayError::Submission(e.to_string()))
    }
}
