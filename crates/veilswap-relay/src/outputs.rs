//! spend proof public outputs
//!
//! the spend circuit exposes six 32-byte big-endian fields in fixed order
//! [root, nullifier, amount, recipient, mint, pool]; some prover
//! toolchains prepend a 12-byte witness header, others emit a
//! self-describing json object instead. decoding reports which decoder
//! accepted the bytes instead of swallowing mismatches

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use veilswap_core::FieldElement;

use crate::error::SwapError;

/// field count of the spend circuit's public outputs
pub const SPEND_OUTPUT_FIELDS: usize = 6;
/// witness header some toolchains prepend
const PROVER_HEADER_LEN: usize = 12;

/// seed tag for the ledger's double-spend guard accounts
const GUARD_SEED: &[u8] = b"veilswap.nullifier.guard.v1";

/// decoded public outputs of a spend proof
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpendOutputs {
    pub root: FieldElement,
    pub nullifier: FieldElement,
    pub amount: u64,
    pub recipient: FieldElement,
    pub mint: FieldElement,
    pub pool: FieldElement,
}

/// which decoder accepted the bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputsDecoder {
    /// self-describing json witness
    Schema,
    /// fixed 32-byte field layout
    FixedLayout,
}

/// decode spend outputs, trying the schema form before the fixed layout
pub fn decode_spend_outputs(
    bytes: &[u8],
) -> Result<(SpendOutputs, OutputsDecoder), SwapError> {
    if let Ok(outputs) = serde_json::from_slice::<SpendOutputs>(bytes) {
        return Ok((outputs, OutputsDecoder::Schema));
    }
    decode_fixed(bytes).map(|outputs| (outputs, OutputsDecoder::FixedLayout))
}

fn decode_fixed(bytes: &[u8]) -> Result<SpendOutputs, SwapError> {
    let header = match bytes.len() % 32 {
        0 => 0,
        r if r == PROVER_HEADER_LEN => PROVER_HEADER_LEN,
        _ => {
            return Err(SwapError::Validation(format!(
                "public outputs length {} fits neither layout",
                bytes.len()
            )))
        }
    };
    if bytes.len() < header + SPEND_OUTPUT_FIELDS * 32 {
        return Err(SwapError::Validation(format!(
            "public outputs truncated: {} bytes for {} fields",
            bytes.len(),
            SPEND_OUTPUT_FIELDS
        )));
    }

    let field = |index: usize| {
        let start = header + index * 32;
        FieldElement::from_be_bytes(&bytes[start..start + 32])
    };
    let amount = field_to_u64(&bytes[header + 2 * 32..header + 3 * 32])?;

    Ok(SpendOutputs {
        root: field(0),
        nullifier: field(1),
        amount,
        recipient: field(3),
        mint: field(4),
        pool: field(5),
    })
}

/// big-endian u64 in the last 8 bytes; the rest must be zero
fn field_to_u64(field: &[u8]) -> Result<u64, SwapError> {
    if field[..24].iter().any(|b| *b != 0) {
        return Err(SwapError::Validation("amount field exceeds u64".into()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&field[24..32]);
    Ok(u64::from_be_bytes(buf))
}

/// canonical double-spend guard address for a revealed nullifier
///
/// consumes the nullifier's big-endian field bytes, exactly as the ledger's
/// seed derivation does
pub fn guard_address(pool: &str, nullifier: &FieldElement) -> String {
    let mut hasher = Sha256::new();
    hasher.update(GUARD_SEED);
    hasher.update(pool.as_bytes());
    hasher.update(nullifier.to_be_bytes());
    bs58::encode(hasher.finalize()).into_string()
}

/// prefer a caller-resolved guard address, else derive canonically
pub fn resolve_guard_address(
    supplied: Option<&str>,
    pool: &str,
    nullifier: &FieldElement,
) -> String {
    match supplied {
        Some(address) => address.to_string(),
        None => guard_address(pool, nullifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_layout(header: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; header];
        for value in [11u64, 22, 33, 44, 55, 66] {
            bytes.extend_from_slice(&FieldElement::from_u64(value).to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_fixed_layout_without_header() {
        let (outputs, decoder) = decode_spend_outputs(&fixed_layout(0)).unwrap();
        assert_eq!(decoder, OutputsDecoder::FixedLayout);
        assert_eq!(outputs.root, FieldElement::from_u64(11));
        assert_eq!(outputs.nullifier, FieldElement::from_u64(22));
        assert_eq!(outputs.amount, 33);
        assert_eq!(outputs.pool, FieldElement::from_u64(66));
    }

    #[test]
    fn test_fixed_layout_with_witness_header() {
        let (outputs, decoder) = decode_spend_outputs(&fixed_layout(12)).unwrap();
        assert_eq!(decoder, OutputsDecoder::FixedLayout);
        assert_eq!(outputs.nullifier, FieldElement::from_u64(22));
        assert_eq!(outputs.amount, 33);
    }

    #[test]
    fn test_schema_decode_wins_when_json() {
        let outputs = SpendOutputs {
            root: FieldElement::from_u64(1),
            nullifier: FieldElement::from_u64(2),
            amount: 3,
            recipient: FieldElement::from_u64(4),
            mint: FieldElement::from_u64(5),
            pool: FieldElement::from_u64(6),
        };
        let bytes = serde_json::to_vec(&outputs).unwrap();
        let (decoded, decoder) = decode_spend_outputs(&bytes).unwrap();
        assert_eq!(decoder, OutputsDecoder::Schema);
        assert_eq!(decoded, outputs);
    }

    #[test]
    fn test_odd_length_is_rejected() {
        let bytes = vec![0u8; 6 * 32 + 5];
        assert!(decode_spend_outputs(&bytes).is_err());
    }

    #[test]
    fn test_amount_wider_than_u64_is_rejected() {
        let mut bytes = fixed_layout(0);
        // poison a high byte of the amount field
        bytes[2 * 32] = 1;
        assert!(decode_spend_outputs(&bytes).is_err());
    }

    #[test]
    fn test_guard_address_is_canonical() {
        let nullifier = FieldElement::from_u64(777);
        let a = guard_address("P1", &nullifier);
        let b = guard_address("P1", &nullifier);
        assert_eq!(a, b);
        assert_ne!(a, guard_address("P2", &nullifier));
        assert_ne!(a, guard_address("P1", &FieldElement::from_u64(778)));
    }

    #[test]
    fn test_caller_supplied_guard_wins() {
        let nullifier = FieldElement::from_u64(777);
        assert_eq!(
            resolve_guard_address(Some("ResolvedElsewhere"), "P1", &nullifier),
            "ResolvedElsewhere"
        );
        assert_eq!(
            resolve_guard_address(None, "P1", &nullifier),
            guard_address("P1", &nullifier)
        );
    }
}
