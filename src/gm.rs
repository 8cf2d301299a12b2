//! Goldwasser-Micali key contract
//!
//! Like ElGamal, a collaborator rather than part of the comparison core;
//! the engine only needs the key material to round-trip through key files.

use std::fmt;

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::error::{HomomorphicError, Result};
use crate::utils::is_probable_prime;

/// Goldwasser-Micali public key: the modulus `n = p * q`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmPublicKey {
    pub(crate) n: BigUint,
}

impl GmPublicKey {
    pub fn new(n: BigUint) -> Self {
        GmPublicKey { n }
    }

    /// Get the modulus n
    pub fn modulus(&self) -> &BigUint {
        &self.n
    }

    /// Validate the public key
    pub fn validate(&self) -> Result<()> {
        if self.n <= BigUint::one() || self.n.is_even() {
            return Err(HomomorphicError::KeyParamInvalid(
                "modulus n must be an odd composite".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for GmPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GmPublicKey({} bits)", self.n.bits())
    }
}

/// Goldwasser-Micali private key: the factorization of `n`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmPrivateKey {
    pub(crate) p: BigUint,
    pub(crate) q: BigUint,
    pub(crate) n: BigUint,
}

impl GmPrivateKey {
    pub fn new(p: BigUint, q: BigUint) -> Self {
        let n = &p * &q;
        GmPrivateKey { p, q, n }
    }

    /// Public half derived from this key
    pub fn public_key(&self) -> GmPublicKey {
        GmPublicKey::new(self.n.clone())
    }

    /// Validate the factorization: both factors must be Blum primes
    pub fn validate(&self) -> Result<()> {
        if &self.p * &self.q != self.n {
            return Err(HomomorphicError::KeyParamInvalid(
                "p * q does not match the modulus".to_string(),
            ));
        }
        for factor in [&self.p, &self.q] {
            if !is_probable_prime(factor, 20) {
                return Err(HomomorphicError::KeyParamInvalid(
                    "modulus factor is not prime".to_string(),
                ));
            }
            if (factor % 4u32).to_u8() != Some(3) {
                return Err(HomomorphicError::KeyParamInvalid(
                    "modulus factor is not congruent to 3 mod 4".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for GmPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secret parameters stay out of log output
        write!(f, "GmPrivateKey({} bits)", self.n.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::ToBigUint;

    #[test]
    fn test_validation() {
        // 7 and 11 are Blum primes
        let sk = GmPrivateKey::new(7u32.to_biguint().unwrap(), 11u32.to_biguint().unwrap());
        assert!(sk.validate().is_ok());
        assert!(sk.public_key().validate().is_ok());
        assert_eq!(sk.public_key().modulus(), &77u32.to_biguint().unwrap());

        // 13 = 1 mod 4 is rejected
        let bad = GmPrivateKey::new(7u32.to_biguint().unwrap(), 13u32.to_biguint().unwrap());
        assert!(bad.validate().is_err());
    }
}
