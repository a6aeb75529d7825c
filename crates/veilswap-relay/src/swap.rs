//! swap orchestration
//!
//! sequences eligibility checks, note minting, deposit, tree insertion,
//! path retrieval, spend proving and relay submission. every step records
//! its output on the attempt, so a failed swap resumes from the last
//! completed step with the same note instead of forcing a fresh deposit

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rand::rngs::OsRng;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use veilswap_accumulator::Accumulator;
use veilswap_core::{encode, mint, FieldElement, ShieldedNote};

use crate::eligibility::{EligibilityAggregator, EligibilityProofSet, EligibilityRequirement};
use crate::error::{EligibilityError, Result, SwapError};
use crate::oracle::{
    BalanceOracle, DepositReceipt, LedgerClient, ProofBundle, ProverOracle, RelayAccounts,
    RelayEndpoint, RelayRequest, SwapDirection, SwapInstruction,
};
use crate::outputs::{decode_spend_outputs, resolve_guard_address, OutputsDecoder, SpendOutputs};
use crate::SPEND_CIRCUIT;

/// protocol phases of one swap attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapPhase {
    Idle,
    Checking,
    Ineligible,
    ProofsReady,
    Depositing,
    Committed,
    PathFetched,
    SpendProving,
    Relaying,
    Confirmed,
    Failed,
}

/// immutable parameters of one swap
#[derive(Clone, Debug)]
pub struct SwapIntent {
    pub pool_id: String,
    pub owner: String,
    pub recipient: String,
    pub mint_in: String,
    pub amount_in: u64,
    pub min_out: u64,
    pub direction: SwapDirection,
    /// guard address the caller already resolved against the ledger, if any
    pub guard_address: Option<String>,
    pub requirements: Vec<EligibilityRequirement>,
}

/// spend proof artifacts kept for relay assembly
#[derive(Clone, Debug)]
pub struct SpendArtifacts {
    pub bundle: ProofBundle,
    pub outputs: SpendOutputs,
    pub decoder: OutputsDecoder,
}

/// resumable state of one swap attempt
#[derive(Debug)]
pub struct SwapAttempt {
    pub intent: SwapIntent,
    pub phase: SwapPhase,
    pub note: Option<ShieldedNote>,
    pub eligibility: Option<EligibilityProofSet>,
    pub deposit: Option<DepositReceipt>,
    pub spend: Option<SpendArtifacts>,
    pub relay_signature: Option<String>,
    pub last_error: Option<String>,
}

impl SwapAttempt {
    fn new(intent: SwapIntent) -> Self {
        Self {
            intent,
            phase: SwapPhase::Idle,
            note: None,
            eligibility: None,
            deposit: None,
            spend: None,
            relay_signature: None,
            last_error: None,
        }
    }
}

pub struct SwapOrchestrator<P, B, L, R> {
    prover: P,
    balances: B,
    ledger: L,
    relayer: R,
    accumulator: Arc<Accumulator>,
    /// nullifiers of notes confirmed spent; never resubmitted
    spent: Mutex<HashSet<FieldElement>>,
}

impl<P, B, L, R> SwapOrchestrator<P, B, L, R>
where
    P: ProverOracle,
    B: BalanceOracle,
    L: LedgerClient,
    R: RelayEndpoint,
{
    pub fn new(prover: P, balances: B, ledger: L, relayer: R, accumulator: Arc<Accumulator>) -> Self {
        Self {
            prover,
            balances,
            ledger,
            relayer,
            accumulator,
            spent: Mutex::new(HashSet::new()),
        }
    }

    /// validate an intent and open an attempt for it
    pub fn begin(&self, intent: SwapIntent) -> Result<SwapAttempt> {
        if intent.pool_id.is_empty() {
            return Err(SwapError::Validation("empty pool id".into()));
        }
        if intent.amount_in == 0 {
            return Err(SwapError::Validation("swap amount must be positive".into()));
        }
        if intent.recipient.is_empty() {
            return Err(SwapError::Validation("empty recipient".into()));
        }
        Ok(SwapAttempt::new(intent))
    }

    /// whether a nullifier was confirmed spent by this client
    pub fn is_spent(&self, nullifier: &FieldElement) -> bool {
        self.spent
            .lock()
            .map(|set| set.contains(nullifier))
            .unwrap_or(false)
    }

    fn mark_spent(&self, nullifier: FieldElement) {
        if let Ok(mut set) = self.spent.lock() {
            set.insert(nullifier);
        }
    }

    /// drive the attempt until confirmed or failed
    ///
    /// re-invoking after a failure resumes from the last completed step;
    /// recorded artifacts (note, deposit, spend proof) are reused, never
    /// regenerated
    pub async fn run(&self, attempt: &mut SwapAttempt) -> Result<()> {
        if attempt.phase == SwapPhase::Confirmed {
            debug!("attempt already confirmed, nothing to do");
            return Ok(());
        }

        let outcome = self.drive(attempt).await;
        if let Err(e) = &outcome {
            attempt.last_error = Some(e.to_string());
            if attempt.phase != SwapPhase::Ineligible {
                attempt.phase = SwapPhase::Failed;
            }
            warn!("swap attempt halted at {:?}: {}", attempt.phase, e);
        }
        outcome
    }

    async fn drive(&self, attempt: &mut SwapAttempt) -> Result<()> {
        let intent = attempt.intent.clone();

        // 1. live eligibility checks, then the all-or-nothing proof batch
        if attempt.eligibility.is_none() {
            attempt.phase = SwapPhase::Checking;
            let mut aggregator = EligibilityAggregator::new(intent.requirements.clone());
            if let Err(e) = aggregator
                .check_all(&self.balances, &intent.owner, intent.amount_in, &intent.mint_in)
                .await
            {
                attempt.phase = SwapPhase::Ineligible;
                return Err(SwapError::Eligibility(e));
            }
            match aggregator
                .generate_all(
                    &self.prover,
                    &self.balances,
                    &intent.owner,
                    intent.amount_in,
                    &intent.mint_in,
                )
                .await?
            {
                Some(set) => attempt.eligibility = Some(set),
                None => {
                    // a balance moved between check and proof
                    attempt.phase = SwapPhase::Ineligible;
                    return Err(SwapError::Eligibility(EligibilityError::BalanceUnavailable(
                        "eligibility changed during proof generation".into(),
                    )));
                }
            }
        }
        attempt.phase = SwapPhase::ProofsReady;

        // 2. mint the note once; retries keep it
        if attempt.note.is_none() {
            let mint_field = encode(&intent.mint_in);
            let pool_field = encode(&intent.pool_id);
            let note = mint(intent.amount_in, mint_field, pool_field, &mut OsRng)?;
            debug!("minted note with commitment {}", note.commitment);
            attempt.note = Some(note);
        }

        // 3. deposit into pool custody, then the accumulator learns the
        //    commitment out of band
        if attempt.deposit.is_none() {
            attempt.phase = SwapPhase::Depositing;
            let commitment = self.note_commitment(attempt)?;
            // a previous attempt may have landed; never double-credit
            if self.ledger.deposit_recorded(&intent.pool_id, &commitment).await? {
                debug!("deposit already recorded for {}", commitment);
                attempt.deposit = Some(DepositReceipt {
                    pool: intent.pool_id.clone(),
                    commitment,
                    amount: intent.amount_in,
                    signature: None,
                });
            } else {
                let receipt = self
                    .ledger
                    .submit_deposit(&intent.pool_id, intent.amount_in, &commitment)
                    .await?;
                info!("deposit submitted for pool {}", intent.pool_id);
                attempt.deposit = Some(receipt);
            }
        }
        if self.note_index(attempt).is_none() {
            let commitment = self.note_commitment(attempt)?;
            let insertion = self.accumulator.insert(&intent.pool_id, commitment)?;
            if let Some(note) = attempt.note.as_mut() {
                note.index = Some(insertion.index);
            }
            debug!("commitment at leaf {}", insertion.index);
        }
        attempt.phase = SwapPhase::Committed;

        // 4-5. fresh path, then the spend proof over it
        if attempt.spend.is_none() {
            let index = self
                .note_index(attempt)
                .ok_or_else(|| SwapError::Validation("note has no leaf index".into()))?;
            let path = self.accumulator.path(&intent.pool_id, index)?;
            attempt.phase = SwapPhase::PathFetched;

            attempt.phase = SwapPhase::SpendProving;
            let note = attempt
                .note
                .as_ref()
                .ok_or_else(|| SwapError::Validation("attempt has no note".into()))?;
            let (private_inputs, public_inputs) = spend_inputs(note, &path, &intent);
            let bundle = self
                .prover
                .generate_proof(SPEND_CIRCUIT, &private_inputs, &public_inputs)
                .await?;

            let (outputs, decoder) = decode_spend_outputs(&bundle.public_inputs)?;
            debug!("spend outputs decoded via {:?}", decoder);
            if outputs.nullifier.is_zero() {
                return Err(SwapError::Validation("spend proof revealed zero nullifier".into()));
            }
            if outputs.amount != intent.amount_in {
                return Err(SwapError::Validation(format!(
                    "spend proof claims amount {}, expected {}",
                    outputs.amount, intent.amount_in
                )));
            }
            attempt.spend = Some(SpendArtifacts {
                bundle,
                outputs,
                decoder,
            });
        }

        // 6-7. guard derivation and relay submission
        if attempt.relay_signature.is_none() {
            attempt.phase = SwapPhase::Relaying;
            let spend = attempt
                .spend
                .as_ref()
                .ok_or_else(|| SwapError::Validation("attempt has no spend proof".into()))?;
            let nullifier = spend.outputs.nullifier;
            if self.is_spent(&nullifier) {
                return Err(SwapError::NoteSpent);
            }

            let guard = resolve_guard_address(
                intent.guard_address.as_deref(),
                &intent.pool_id,
                &nullifier,
            );
            if self.ledger.guard_initialized(&guard).await? {
                // the ledger already recorded this spend; treat as settled
                info!("guard {} already initialized, note is spent", guard);
                self.mark_spent(nullifier);
                attempt.phase = SwapPhase::Confirmed;
                return Ok(());
            }

            let eligibility = attempt
                .eligibility
                .as_ref()
                .ok_or_else(|| SwapError::Validation("attempt has no eligibility proofs".into()))?;
            let request = RelayRequest {
                spend_proof: spend.bundle.clone(),
                instruction: SwapInstruction {
                    pool: intent.pool_id.clone(),
                    amount_in: intent.amount_in,
                    min_out: intent.min_out,
                    direction: intent.direction,
                    nullifier,
                    guard_address: guard,
                },
                eligibility_proofs: eligibility.proofs.clone(),
                accounts: RelayAccounts {
                    pool: intent.pool_id.clone(),
                    recipient: intent.recipient.clone(),
                    relayer_fee_account: None,
                },
            };

            let response = self.relayer.submit(&request).await?;
            if !response.success {
                return Err(SwapError::Relay(crate::error::RelayError::Rejected {
                    reason: response.error.unwrap_or_else(|| "relay failed".into()),
                    logs: response.logs.unwrap_or_default(),
                }));
            }
            attempt.relay_signature = response.signature;
        }

        // 8. the note is spent for good
        if let Some(spend) = &attempt.spend {
            self.mark_spent(spend.outputs.nullifier);
        }
        attempt.phase = SwapPhase::Confirmed;
        info!(
            "swap confirmed{}",
            attempt
                .relay_signature
                .as_deref()
                .map(|s| format!(": {s}"))
                .unwrap_or_default()
        );
        Ok(())
    }

    fn note_commitment(&self, attempt: &SwapAttempt) -> Result<FieldElement> {
        attempt
            .note
            .as_ref()
            .map(|note| note.commitment)
            .ok_or_else(|| SwapError::Validation("attempt has no note".into()))
    }

    fn note_index(&self, attempt: &SwapAttempt) -> Option<u64> {
        attempt.note.as_ref().and_then(|note| note.index)
    }
}

/// marshal the spend circuit's witness
fn spend_inputs(
    note: &ShieldedNote,
    path: &veilswap_accumulator::MerklePath,
    intent: &SwapIntent,
) -> (Value, Value) {
    let private = json!({
        "amount": note.amount,
        "secret": note.secret,
        "nullifier": note.nullifier,
        "siblings": path.siblings,
        "path_indices": path.path_indices,
    });
    let public = json!({
        "root": path.root,
        "nullifier": note.nullifier,
        "amount": note.amount,
        "recipient": encode(&intent.recipient),
        "mint": encode(&intent.mint_in),
        "pool": encode(&intent.pool_id),
    });
    (private, public)
}
