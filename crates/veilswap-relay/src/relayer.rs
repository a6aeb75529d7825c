//! relayer-side protocol handling
//!
//! the relayer signs and pays fees, so it trusts nothing in the bundle:
//! every eligibility proof is re-verified and the spend root checked
//! against the pool's history before the payload is forwarded. transport
//! and routing live elsewhere; this is the handler logic only

use std::sync::Arc;

use tracing::{debug, info, warn};
use veilswap_accumulator::Accumulator;

use crate::oracle::{LedgerClient, ProofBundle, RelayRequest, RelayResponse};
use crate::outputs::{decode_spend_outputs, guard_address};
use crate::SPEND_CIRCUIT;

/// proof verification seam; the verifier keys live with the deployment
pub trait ProofVerifier {
    fn verify(&self, circuit_id: &str, proof: &ProofBundle) -> bool;
}

pub struct RelayService<V, L> {
    verifier: V,
    ledger: L,
    accumulator: Arc<Accumulator>,
}

impl<V, L> RelayService<V, L>
where
    V: ProofVerifier,
    L: LedgerClient,
{
    pub fn new(verifier: V, ledger: L, accumulator: Arc<Accumulator>) -> Self {
        Self {
            verifier,
            ledger,
            accumulator,
        }
    }

    /// re-verify the bundle and forward it; any failure rejects the whole
    /// request before fees are paid
    pub async fn handle(&self, request: &RelayRequest) -> RelayResponse {
        // every eligibility proof, independently of the submitter's claims
        for proof in &request.eligibility_proofs {
            if !self.verifier.verify(proof.kind.circuit_id(), &proof.proof) {
                warn!("eligibility proof {} failed re-verification", proof.kind);
                return RelayResponse::rejected(
                    format!("eligibility proof {} failed re-verification", proof.kind),
                    vec![],
                );
            }
        }

        if !self.verifier.verify(SPEND_CIRCUIT, &request.spend_proof) {
            return RelayResponse::rejected("spend proof failed verification", vec![]);
        }

        let (outputs, decoder) = match decode_spend_outputs(&request.spend_proof.public_inputs) {
            Ok(decoded) => decoded,
            Err(e) => return RelayResponse::rejected(e.to_string(), vec![]),
        };
        debug!("spend outputs decoded via {:?}", decoder);

        if outputs.amount != request.instruction.amount_in {
            return RelayResponse::rejected(
                format!(
                    "instruction amount {} does not match proven amount {}",
                    request.instruction.amount_in, outputs.amount
                ),
                vec![],
            );
        }

        // the proven root must still be within the pool's bounded history
        match self
            .accumulator
            .is_known_root(&request.instruction.pool, &outputs.root)
        {
            Ok(true) => {}
            Ok(false) => {
                return RelayResponse::rejected(
                    format!("unknown root for pool {}", request.instruction.pool),
                    vec![],
                )
            }
            Err(e) => return RelayResponse::rejected(e.to_string(), vec![]),
        }

        // the guard must match the canonical derivation the ledger performs
        let expected_guard = guard_address(&request.instruction.pool, &outputs.nullifier);
        if request.instruction.guard_address != expected_guard {
            return RelayResponse::rejected("guard address mismatch", vec![]);
        }
        match self.ledger.guard_initialized(&expected_guard).await {
            Ok(false) => {}
            Ok(true) => {
                return RelayResponse::rejected("nullifier already spent", vec![]);
            }
            Err(e) => return RelayResponse::rejected(e.to_string(), vec![]),
        }

        match self.ledger.submit_swap(request).await {
            Ok(signature) => {
                info!("relayed swap settled: {}", signature);
                RelayResponse {
                    success: true,
                    signature: Some(signature),
                    error: None,
                    logs: None,
                }
            }
            Err(e) => RelayResponse::rejected(e.to_string(), vec![format!("ledger: {e}")]),
        }
    }
}
