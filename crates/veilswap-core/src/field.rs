//! bn254 field elements and the address encoder
//!
//! field elements travel as decimal strings; the byte form is 32-byte
//! big-endian

use std::fmt;

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};

/// how many raw address bytes survive encoding
///
/// 16 bytes keeps the value well inside the field while preserving real
/// entropy; only the depositor needs the exact pre-image to spend
const ADDRESS_PREFIX_BYTES: usize = 16;

/// element of the bn254 scalar field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldElement(Fr);

impl FieldElement {
    pub fn zero() -> Self {
        Self(Fr::from(0u64))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Fr::from(0u64)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Fr::from(value))
    }

    /// parse a decimal numeral, reduced into the field
    pub fn from_decimal(s: &str) -> Result<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidField(format!(
                "not a decimal numeral: {s:?}"
            )));
        }
        match BigUint::parse_bytes(s.as_bytes(), 10) {
            Some(n) => Ok(Self::from_biguint(n)),
            None => Err(CoreError::InvalidField(format!(
                "not a decimal numeral: {s:?}"
            ))),
        }
    }

    /// decimal transport form
    pub fn to_decimal(&self) -> String {
        BigUint::from(self.0.into_bigint()).to_str_radix(10)
    }

    /// interpret big-endian bytes of any length, reduced into the field
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Self(Fr::from_be_bytes_mod_order(bytes))
    }

    /// canonical 32-byte big-endian form
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let repr = self.0.into_bigint().to_bytes_be();
        let mut out = [0u8; 32];
        out.copy_from_slice(&repr);
        out
    }

    pub fn from_biguint(n: BigUint) -> Self {
        Self(Fr::from_be_bytes_mod_order(&n.to_bytes_be()))
    }

    /// the field modulus p
    pub fn modulus() -> BigUint {
        BigUint::from(Fr::MODULUS)
    }

    pub(crate) fn as_fr(&self) -> Fr {
        self.0
    }

    pub(crate) fn from_fr(fr: Fr) -> Self {
        Self(fr)
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FieldElement::from_decimal(&s).map_err(D::Error::custom)
    }
}

/// map an opaque ledger address to one field element
///
/// total and deterministic: decimal numerals pass through unchanged, hex
/// and base58 addresses keep their first 16 bytes big-endian, anything
/// else goes through a rolling string hash
pub fn encode(address: &str) -> FieldElement {
    if !address.is_empty() && address.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(field) = FieldElement::from_decimal(address) {
            return field;
        }
    }
    if let Some(hex_part) = address.strip_prefix("0x") {
        if let Ok(raw) = hex::decode(hex_part) {
            return FieldElement::from_be_bytes(&raw[..raw.len().min(ADDRESS_PREFIX_BYTES)]);
        }
    }
    if let Ok(raw) = bs58::decode(address).into_vec() {
        return FieldElement::from_be_bytes(&raw[..raw.len().min(ADDRESS_PREFIX_BYTES)]);
    }
    fold_string(address)
}

/// 32-bit rolling hash fallback, folded non-negative
fn fold_string(address: &str) -> FieldElement {
    let mut h: i32 = 0;
    for c in address.chars() {
        h = h.wrapping_mul(31).wrapping_add(c as i32);
    }
    FieldElement::from_u64(u64::from(h.unsigned_abs()))
}
