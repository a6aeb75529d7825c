//! eligibility requirements and the all-or-nothing proof batch
//!
//! the aggregator only marshals prover inputs and tracks per-requirement
//! status; proving itself belongs to the external oracle

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use veilswap_core::{encode, FieldElement};

use crate::error::{EligibilityError, ProverError};
use crate::oracle::{BalanceOracle, ProofBundle, ProverOracle};
use crate::{EXCLUSION_CIRCUIT, MIN_BALANCE_CIRCUIT, TOKEN_HOLDER_CIRCUIT};

/// predicate gating a swap
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EligibilityRequirement {
    /// prove balance of the swapped asset at or above a floor
    MinBalance { threshold: u64 },
    /// prove holdings of a separate gating asset
    TokenHolder { mint: String, min_required: u64 },
    /// prove non-membership in a blacklist
    Exclusion { blacklist_root: FieldElement },
}

impl EligibilityRequirement {
    pub fn kind(&self) -> RequirementKind {
        match self {
            Self::MinBalance { .. } => RequirementKind::MinBalance,
            Self::TokenHolder { .. } => RequirementKind::TokenHolder,
            Self::Exclusion { .. } => RequirementKind::Exclusion,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequirementKind {
    MinBalance,
    TokenHolder,
    Exclusion,
}

impl RequirementKind {
    pub fn circuit_id(&self) -> &'static str {
        match self {
            Self::MinBalance => MIN_BALANCE_CIRCUIT,
            Self::TokenHolder => TOKEN_HOLDER_CIRCUIT,
            Self::Exclusion => EXCLUSION_CIRCUIT,
        }
    }
}

impl fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MinBalance => "min-balance",
            Self::TokenHolder => "token-holder",
            Self::Exclusion => "exclusion",
        };
        f.write_str(name)
    }
}

/// one generated eligibility proof
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EligibilityProof {
    pub kind: RequirementKind,
    pub proof: ProofBundle,
}

/// the whole batch; the first requirement's proof is primary
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EligibilityProofSet {
    pub proofs: Vec<EligibilityProof>,
}

impl EligibilityProofSet {
    pub fn primary(&self) -> Option<&EligibilityProof> {
        self.proofs.first()
    }
}

/// outcome of one live pre-check
#[derive(Clone, Debug)]
pub struct CheckOutcome {
    pub met: bool,
    pub user_value: Option<u64>,
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RequirementState {
    #[default]
    Pending,
    Checking,
    Met,
    Unmet,
    Errored,
}

/// tracked status per requirement
#[derive(Clone, Debug, Default)]
pub struct RequirementStatus {
    pub state: RequirementState,
    pub user_value: Option<u64>,
    pub error: Option<String>,
    pub proof: Option<EligibilityProof>,
}

pub struct EligibilityAggregator {
    requirements: Vec<EligibilityRequirement>,
    statuses: Vec<RequirementStatus>,
}

impl EligibilityAggregator {
    pub fn new(requirements: Vec<EligibilityRequirement>) -> Self {
        let statuses = vec![RequirementStatus::default(); requirements.len()];
        Self {
            requirements,
            statuses,
        }
    }

    pub fn requirements(&self) -> &[EligibilityRequirement] {
        &self.requirements
    }

    pub fn statuses(&self) -> &[RequirementStatus] {
        &self.statuses
    }

    /// live pre-check of one requirement against observed balances
    pub async fn check<B: BalanceOracle>(
        &mut self,
        index: usize,
        balances: &B,
        owner: &str,
        swap_amount: u64,
        swap_mint: &str,
    ) -> CheckOutcome {
        self.statuses[index].state = RequirementState::Checking;
        let outcome = match &self.requirements[index] {
            EligibilityRequirement::MinBalance { threshold } => {
                // the floor can never be below the amount being swapped
                let need = (*threshold).max(swap_amount);
                match balances.balance(owner, swap_mint).await {
                    Ok(have) => {
                        let have = have.unwrap_or(0);
                        CheckOutcome {
                            met: have >= need,
                            user_value: Some(have),
                            error: None,
                        }
                    }
                    Err(e) => CheckOutcome {
                        met: false,
                        user_value: None,
                        error: Some(e.to_string()),
                    },
                }
            }
            EligibilityRequirement::TokenHolder { mint, min_required } => {
                match balances.balance(owner, mint).await {
                    Ok(have) => {
                        let have = have.unwrap_or(0);
                        CheckOutcome {
                            met: have >= *min_required,
                            user_value: Some(have),
                            error: None,
                        }
                    }
                    Err(e) => CheckOutcome {
                        met: false,
                        user_value: None,
                        error: Some(e.to_string()),
                    },
                }
            }
            // non-membership is only established at proof time
            EligibilityRequirement::Exclusion { .. } => CheckOutcome {
                met: true,
                user_value: None,
                error: None,
            },
        };

        let status = &mut self.statuses[index];
        status.user_value = outcome.user_value;
        status.error = outcome.error.clone();
        status.state = if outcome.error.is_some() {
            RequirementState::Errored
        } else if outcome.met {
            RequirementState::Met
        } else {
            RequirementState::Unmet
        };
        outcome
    }

    /// check every requirement in order; the first failure aborts
    pub async fn check_all<B: BalanceOracle>(
        &mut self,
        balances: &B,
        owner: &str,
        swap_amount: u64,
        swap_mint: &str,
    ) -> std::result::Result<(), EligibilityError> {
        for index in 0..self.requirements.len() {
            let outcome = self.check(index, balances, owner, swap_amount, swap_mint).await;
            if outcome.met {
                continue;
            }
            if let Some(reason) = outcome.error {
                return Err(EligibilityError::BalanceUnavailable(reason));
            }
            let have = outcome.user_value.unwrap_or(0);
            return Err(match &self.requirements[index] {
                EligibilityRequirement::MinBalance { threshold } => {
                    EligibilityError::BelowThreshold {
                        have,
                        need: (*threshold).max(swap_amount),
                    }
                }
                EligibilityRequirement::TokenHolder { mint, min_required } => {
                    EligibilityError::MissingGatingAsset {
                        mint: mint.clone(),
                        have,
                        need: *min_required,
                    }
                }
                EligibilityRequirement::Exclusion { .. } => {
                    EligibilityError::BalanceUnavailable("exclusion pre-check failed".into())
                }
            });
        }
        Ok(())
    }

    /// generate the whole batch or nothing
    ///
    /// fixed iteration order; an unmet prerequisite returns `None` before
    /// any further prover call, a proof failure aborts with the error, and
    /// both discard proofs already produced
    pub async fn generate_all<P, B>(
        &mut self,
        prover: &P,
        balances: &B,
        owner: &str,
        swap_amount: u64,
        swap_mint: &str,
    ) -> std::result::Result<Option<EligibilityProofSet>, ProverError>
    where
        P: ProverOracle,
        B: BalanceOracle,
    {
        let mut proofs = Vec::with_capacity(self.requirements.len());
        for index in 0..self.requirements.len() {
            let outcome = self.check(index, balances, owner, swap_amount, swap_mint).await;
            if !outcome.met {
                debug!(
                    "requirement {} unmet, discarding {} proofs",
                    self.requirements[index].kind(),
                    proofs.len()
                );
                self.discard_proofs();
                return Ok(None);
            }

            let requirement = self.requirements[index].clone();
            let (private_inputs, public_inputs) =
                proof_inputs(&requirement, owner, swap_amount, swap_mint, outcome.user_value);
            let bundle = match prover
                .generate_proof(requirement.kind().circuit_id(), &private_inputs, &public_inputs)
                .await
            {
                Ok(bundle) => bundle,
                Err(e) => {
                    self.statuses[index].error = Some(e.to_string());
                    self.statuses[index].state = RequirementState::Errored;
                    self.discard_proofs();
                    return Err(e);
                }
            };

            let proof = EligibilityProof {
                kind: requirement.kind(),
                proof: bundle,
            };
            self.statuses[index].proof = Some(proof.clone());
            proofs.push(proof);
        }
        Ok(Some(EligibilityProofSet { proofs }))
    }

    fn discard_proofs(&mut self) {
        for status in &mut self.statuses {
            status.proof = None;
        }
    }
}

/// marshal prover inputs for one requirement
fn proof_inputs(
    requirement: &EligibilityRequirement,
    owner: &str,
    swap_amount: u64,
    swap_mint: &str,
    user_value: Option<u64>,
) -> (Value, Value) {
    let owner_field = encode(owner);
    match requirement {
        EligibilityRequirement::MinBalance { threshold } => (
            json!({
                "owner": owner_field,
                "balance": user_value.unwrap_or(0),
            }),
            json!({
                "threshold": (*threshold).max(swap_amount),
                "mint": encode(swap_mint),
            }),
        ),
        EligibilityRequirement::TokenHolder { mint, min_required } => (
            json!({
                "owner": owner_field,
                "balance": user_value.unwrap_or(0),
            }),
            json!({
                "min_required": min_required,
                "mint": encode(mint),
            }),
        ),
        EligibilityRequirement::Exclusion { blacklist_root } => (
            json!({
                "owner": owner_field,
            }),
            json!({
                "blacklist_root": blacklist_root,
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticBalances(HashMap<(String, String), u64>);

    impl StaticBalances {
        fn new(entries: &[(&str, &str, u64)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(owner, mint, amount)| {
                        ((owner.to_string(), mint.to_string()), *amount)
                    })
                    .collect(),
            )
        }
    }

    impl BalanceOracle for StaticBalances {
        async fn balance(
            &self,
            owner: &str,
            mint: &str,
        ) -> std::result::Result<Option<u64>, EligibilityError> {
            Ok(self.0.get(&(owner.to_string(), mint.to_string())).copied())
        }
    }

    #[derive(Default)]
    struct CountingProver {
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    impl ProverOracle for CountingProver {
        async fn generate_proof(
            &self,
            circuit_id: &str,
            _private_inputs: &Value,
            _public_inputs: &Value,
        ) -> std::result::Result<ProofBundle, ProverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(circuit_id) {
                return Err(ProverError::Witness("assertion failed".into()));
            }
            Ok(ProofBundle {
                proof: vec![1, 2, 3],
                public_inputs: vec![],
            })
        }
    }

    #[tokio::test]
    async fn test_min_balance_uses_swap_amount_floor() {
        let balances = StaticBalances::new(&[("alice", "USDC", 500)]);
        let mut aggregator = EligibilityAggregator::new(vec![
            EligibilityRequirement::MinBalance { threshold: 100 },
        ]);

        // threshold 100 but swapping 600: the floor is 600
        let outcome = aggregator.check(0, &balances, "alice", 600, "USDC").await;
        assert!(!outcome.met);
        assert_eq!(outcome.user_value, Some(500));

        let outcome = aggregator.check(0, &balances, "alice", 400, "USDC").await;
        assert!(outcome.met);
    }

    #[tokio::test]
    async fn test_token_holder_checks_gating_mint() {
        let balances = StaticBalances::new(&[("alice", "USDC", 10_000), ("alice", "GATE", 3)]);
        let mut aggregator = EligibilityAggregator::new(vec![EligibilityRequirement::TokenHolder {
            mint: "GATE".into(),
            min_required: 5,
        }]);

        let outcome = aggregator.check(0, &balances, "alice", 100, "USDC").await;
        assert!(!outcome.met);
        assert_eq!(outcome.user_value, Some(3));
    }

    #[tokio::test]
    async fn test_exclusion_precheck_always_met() {
        // documents current behavior: non-membership is only validated at
        // proof time, the pre-check reports met no matter the blacklist
        let balances = StaticBalances::new(&[]);
        let mut aggregator = EligibilityAggregator::new(vec![EligibilityRequirement::Exclusion {
            blacklist_root: FieldElement::from_u64(999),
        }]);
        let outcome = aggregator.check(0, &balances, "anyone", 1, "USDC").await;
        assert!(outcome.met);
    }

    #[tokio::test]
    async fn test_generate_all_aborts_before_prover_on_unmet() {
        let balances = StaticBalances::new(&[("alice", "USDC", 50)]);
        let prover = CountingProver::default();
        let mut aggregator = EligibilityAggregator::new(vec![
            EligibilityRequirement::MinBalance { threshold: 100 },
            EligibilityRequirement::Exclusion {
                blacklist_root: FieldElement::from_u64(1),
            },
        ]);

        let result = aggregator
            .generate_all(&prover, &balances, "alice", 10, "USDC")
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(prover.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generate_all_discards_batch_on_prover_failure() {
        let balances = StaticBalances::new(&[("alice", "USDC", 1_000), ("alice", "GATE", 10)]);
        let prover = CountingProver {
            calls: AtomicUsize::new(0),
            fail_on: Some(TOKEN_HOLDER_CIRCUIT),
        };
        let mut aggregator = EligibilityAggregator::new(vec![
            EligibilityRequirement::MinBalance { threshold: 100 },
            EligibilityRequirement::TokenHolder {
                mint: "GATE".into(),
                min_required: 5,
            },
        ]);

        let result = aggregator
            .generate_all(&prover, &balances, "alice", 10, "USDC")
            .await;
        assert!(matches!(result, Err(ProverError::Witness(_))));
        // the first proof was produced, then discarded with the batch
        assert_eq!(prover.calls.load(Ordering::SeqCst), 2);
        assert!(aggregator.statuses().iter().all(|s| s.proof.is_none()));
    }

    #[tokio::test]
    async fn test_generate_all_marks_first_proof_primary() {
        let balances = StaticBalances::new(&[("alice", "USDC", 1_000), ("alice", "GATE", 10)]);
        let prover = CountingProver::default();
        let mut aggregator = EligibilityAggregator::new(vec![
            EligibilityRequirement::MinBalance { threshold: 100 },
            EligibilityRequirement::TokenHolder {
                mint: "GATE".into(),
                min_required: 5,
            },
        ]);

        let set = aggregator
            .generate_all(&prover, &balances, "alice", 10, "USDC")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(set.proofs.len(), 2);
        assert_eq!(set.primary().unwrap().kind, RequirementKind::MinBalance);
    }
}
