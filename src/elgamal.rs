//! ElGamal public-key contract
//!
//! ElGamal is a collaborator of the comparison engine, not part of it;
//! only the key-material contract lives here. The homomorphism mode is an
//! immutable property of the key value, fixed by the constructor.

use std::fmt;

use num_bigint::BigUint;
use num_traits::One;
use serde::{Deserialize, Serialize};

use crate::error::{HomomorphicError, Result};

/// ElGamal public key `(p, g, h)` plus its fixed homomorphism mode
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElGamalPublicKey {
    pub(crate) p: BigUint,
    pub(crate) g: BigUint,
    pub(crate) h: BigUint,
    pub(crate) additive: bool,
}

impl ElGamalPublicKey {
    /// Key for the standard multiplicative scheme
    pub fn new_multiplicative(p: BigUint, g: BigUint, h: BigUint) -> Self {
        ElGamalPublicKey { p, g, h, additive: false }
    }

    /// Key for the exponential (additive) scheme
    pub fn new_additive(p: BigUint, g: BigUint, h: BigUint) -> Self {
        ElGamalPublicKey { p, g, h, additive: true }
    }

    /// Get the prime modulus
    pub fn modulus(&self) -> &BigUint {
        &self.p
    }

    /// Get the generator
    pub fn generator(&self) -> &BigUint {
        &self.g
    }

    /// Get the public component g^x mod p
    pub fn public_component(&self) -> &BigUint {
        &self.h
    }

    /// Whether plaintexts ride in the exponent (additive homomorphism)
    pub fn is_additive(&self) -> bool {
        self.additive
    }

    /// Get the bit size of the modulus
    pub fn bit_size(&self) -> u64 {
        self.p.bits()
    }

    /// Validate the public key
    pub fn validate(&self) -> Result<()> {
        if self.p <= BigUint::from(2u32) {
            return Err(HomomorphicError::KeyParamInvalid(
                "modulus p must be > 2".to_string(),
            ));
        }
        if self.g <= BigUint::one() || self.g >= self.p {
            return Err(HomomorphicError::KeyParamInvalid(
                "generator g must be in (1, p)".to_string(),
            ));
        }
        if self.h <= BigUint::one() || self.h >= self.p {
            return Err(HomomorphicError::KeyParamInvalid(
                "public component h must be in (1, p)".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ElGamalPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.additive { "additive" } else { "multiplicative" };
        write!(f, "ElGamalPublicKey({} bits, {mode})", self.bit_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::ToBigUint;

    fn sample() -> (BigUint, BigUint, BigUint) {
        (
            23u32.to_biguint().unwrap(),
            5u32.to_biguint().unwrap(),
            8u32.to_biguint().unwrap(),
        )
    }

    #[test]
    fn test_mode_is_fixed_by_constructor() {
        let (p, g, h) = sample();
        let mult = ElGamalPublicKey::new_multiplicative(p.clone(), g.clone(), h.clone());
        let add = ElGamalPublicKey::new_additive(p, g, h);

        assert!(!mult.is_additive());
        assert!(add.is_additive());
        assert_ne!(mult, add);
    }

    #[test]
    fn test_validation() {
        let (p, g, h) = sample();
        assert!(ElGamalPublicKey::new_multiplicative(p, g, h).validate().is_ok());

        let invalid = ElGamalPublicKey::new_multiplicative(
            2u32.to_biguint().unwrap(),
            BigUint::one(),
            BigUint::one(),
        );
        assert!(invalid.validate().is_err());
    }
}
