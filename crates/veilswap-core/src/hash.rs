//! poseidon hashing over bn254
//!
//! the one hash primitive shared by note commitments and the accumulator
//! tree; the spend circuit re-derives both, so nothing here may diverge
//! from the circom parameterization

use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonHasher};

use crate::error::Result;
use crate::field::FieldElement;

/// hash a fixed-width tuple of field elements
pub fn hash_fields(inputs: &[FieldElement]) -> Result<FieldElement> {
    let frs: Vec<Fr> = inputs.iter().map(|f| f.as_fr()).collect();
    let mut hasher = Poseidon::<Fr>::new_circom(frs.len())?;
    let out = hasher.hash(&frs)?;
    Ok(FieldElement::from_fr(out))
}

/// hash one tree level pair
pub fn hash_pair(left: &FieldElement, right: &FieldElement) -> Result<FieldElement> {
    hash_fields(&[*left, *right])
}
