//! Paillier cryptosystem: additively homomorphic arithmetic over `Z_n`
//!
//! Carries the wide-plaintext half of the protocol suite; ciphertexts live
//! in `Z_{n^2}*` with the standard generator `g = n + 1`.

use std::fmt;

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{HomomorphicError, Result};
use crate::types::PaillierParams;
use crate::utils::{mod_exp, mod_inverse, random_coprime, random_prime};

/// Paillier public key `(key_size, n, n^2, g)`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaillierPublicKey {
    pub(crate) key_size: u32,
    pub(crate) n: BigUint,
    pub(crate) n_squared: BigUint,
    pub(crate) g: BigUint,
}

impl PaillierPublicKey {
    /// Assemble a public key from its parameters
    pub fn new(key_size: u32, n: BigUint, n_squared: BigUint, g: BigUint) -> Self {
        PaillierPublicKey { key_size, n, n_squared, g }
    }

    /// Get the value n
    pub fn n(&self) -> &BigUint {
        &self.n
    }

    /// Get the ciphertext modulus n^2
    pub fn modulus(&self) -> &BigUint {
        &self.n_squared
    }

    /// Get the bit size of n
    pub fn key_size(&self) -> u32 {
        self.key_size
    }

    /// Encrypt a plaintext `m` in `[0, n)`
    pub fn encrypt(&self, m: &BigUint) -> Result<BigUint> {
        if m >= &self.n {
            return Err(HomomorphicError::PlaintextOutOfRange {
                value: m.to_string(),
                bound: self.n.to_string(),
            });
        }

        // Fast form for g = n + 1: g^m = 1 + m*n (mod n^2)
        let g_m = (BigUint::one() + m * &self.n) % &self.n_squared;
        let r = random_coprime(&self.n);
        Ok(g_m * mod_exp(&r, &self.n, &self.n_squared) % &self.n_squared)
    }

    /// Encryption of zero with fresh randomness
    pub fn encrypt_zero(&self) -> BigUint {
        let r = random_coprime(&self.n);
        mod_exp(&r, &self.n, &self.n_squared)
    }

    /// Homomorphic addition: decrypts to `(m1 + m2) mod n`
    pub fn add(&self, c1: &BigUint, c2: &BigUint) -> BigUint {
        c1 * c2 % &self.n_squared
    }

    /// Add a plaintext constant without fresh randomness; callers that
    /// expose the result re-randomize it
    pub fn add_plain(&self, c: &BigUint, m: &BigUint) -> BigUint {
        let g_m = (BigUint::one() + (m % &self.n) * &self.n) % &self.n_squared;
        c * g_m % &self.n_squared
    }

    /// Homomorphic subtraction: decrypts to `(m1 - m2) mod n`
    pub fn subtract(&self, c1: &BigUint, c2: &BigUint) -> BigUint {
        let neg = self.scalar_mul(c2, &(&self.n - BigUint::one()));
        c1 * neg % &self.n_squared
    }

    /// Homomorphic scalar multiplication: decrypts to `(k * m) mod n`
    pub fn scalar_mul(&self, c: &BigUint, k: &BigUint) -> BigUint {
        mod_exp(c, &(k % &self.n), &self.n_squared)
    }

    /// Fresh encryption of the same plaintext
    pub fn rerandomize(&self, c: &BigUint) -> BigUint {
        c * self.encrypt_zero() % &self.n_squared
    }

    /// Sanity-check the parameter set
    pub fn validate(&self) -> Result<()> {
        if self.n <= BigUint::one() || self.key_size == 0 {
            return Err(HomomorphicError::KeyParamInvalid(
                "Paillier modulus must be nontrivial".to_string(),
            ));
        }
        if self.n_squared != &self.n * &self.n {
            return Err(HomomorphicError::KeyParamInvalid(
                "ciphertext modulus is not n^2".to_string(),
            ));
        }
        if self.g != &self.n + BigUint::one() {
            return Err(HomomorphicError::KeyParamInvalid(
                "generator must be n + 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for PaillierPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaillierPublicKey({} bits)", self.key_size)
    }
}

/// Paillier private key; adds `lambda`, `mu` and the `alpha`/`rho` pair
/// for the precomputed decryption path
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaillierPrivateKey {
    pub(crate) key_size: u32,
    pub(crate) n: BigUint,
    pub(crate) n_squared: BigUint,
    pub(crate) lambda: BigUint,
    pub(crate) mu: BigUint,
    pub(crate) g: BigUint,
    pub(crate) alpha: BigUint,
    pub(crate) rho: BigUint,
}

impl PaillierPrivateKey {
    /// Construct a private key, recomputing `rho` from the other
    /// parameters. A stored `rho` that disagrees with the recomputation is
    /// rejected rather than trusted.
    pub fn new(
        key_size: u32,
        n: BigUint,
        n_squared: BigUint,
        lambda: BigUint,
        mu: BigUint,
        g: BigUint,
        alpha: BigUint,
        stored_rho: Option<&BigUint>,
    ) -> Result<Self> {
        let l_g_lambda = l_function(&mod_exp(&g, &lambda, &n_squared), &n);
        let rho = mod_inverse(&l_g_lambda, &n_squared).ok_or_else(|| {
            HomomorphicError::KeyParamInvalid("L(g^lambda) is not invertible mod n^2".to_string())
        })?;
        if let Some(stored) = stored_rho {
            if stored != &rho {
                return Err(HomomorphicError::KeyParamInvalid(
                    "stored rho is inconsistent with lambda and g".to_string(),
                ));
            }
        }

        Ok(PaillierPrivateKey { key_size, n, n_squared, lambda, mu, g, alpha, rho })
    }

    /// Public half derived from this key
    pub fn public_key(&self) -> PaillierPublicKey {
        PaillierPublicKey::new(
            self.key_size,
            self.n.clone(),
            self.n_squared.clone(),
            self.g.clone(),
        )
    }

    /// Standard decryption: `L(c^lambda mod n^2) * mu mod n`
    pub fn decrypt(&self, c: &BigUint) -> Result<BigUint> {
        self.check_ciphertext(c)?;
        let l = l_function(&mod_exp(c, &self.lambda, &self.n_squared), &self.n);
        Ok(l * &self.mu % &self.n)
    }

    /// Decryption through the precomputed `alpha`/`rho` pair
    pub fn decrypt_fast(&self, c: &BigUint) -> Result<BigUint> {
        self.check_ciphertext(c)?;
        let l = l_function(&mod_exp(c, &self.alpha, &self.n_squared), &self.n);
        Ok(l * &self.rho % &self.n_squared % &self.n)
    }

    fn check_ciphertext(&self, c: &BigUint) -> Result<()> {
        if c.is_zero() || c >= &self.n_squared || !c.gcd(&self.n_squared).is_one() {
            return Err(HomomorphicError::CiphertextMalformed(
                "ciphertext is not in the multiplicative group of n^2".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for PaillierPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secret parameters stay out of log output
        write!(f, "PaillierPrivateKey({} bits)", self.key_size)
    }
}

/// Paillier key pair owning both halves
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaillierKeyPair {
    pub public_key: PaillierPublicKey,
    pub private_key: PaillierPrivateKey,
}

impl PaillierKeyPair {
    /// Generate a key pair with the given parameters
    ///
    /// With the standard generator `g = n + 1` the only exponent that
    /// decrypts every ciphertext is `lambda` itself, so `alpha = lambda`
    /// and the fast path differs only in its precomputed inverse.
    pub fn generate(params: &PaillierParams) -> Result<Self> {
        let key_size = params.key_size;
        if key_size < 64 || key_size % 2 != 0 {
            return Err(HomomorphicError::KeyParamInvalid(format!(
                "Paillier key size {key_size} must be an even number of bits, at least 64"
            )));
        }

        let half = (key_size / 2) as u64;
        let (p, q, n) = loop {
            let p = random_prime(half)?;
            let q = random_prime(half)?;
            if p == q {
                continue;
            }
            let n = &p * &q;
            if n.bits() == key_size as u64 {
                break (p, q, n);
            }
        };

        let n_squared = &n * &n;
        let g = &n + BigUint::one();
        let one = BigUint::one();
        let lambda = (&p - &one).lcm(&(&q - &one));

        let l_g_lambda = l_function(&mod_exp(&g, &lambda, &n_squared), &n);
        let mu = mod_inverse(&l_g_lambda, &n).ok_or_else(|| {
            HomomorphicError::InternalInvariant(
                "L(g^lambda) is not invertible mod n".to_string(),
            )
        })?;

        let alpha = lambda.clone();
        let private_key = PaillierPrivateKey::new(
            key_size,
            n.clone(),
            n_squared.clone(),
            lambda,
            mu,
            g.clone(),
            alpha,
            None,
        )?;
        let public_key = PaillierPublicKey::new(key_size, n, n_squared, g);

        Ok(PaillierKeyPair { public_key, private_key })
    }

    /// Reduced parameters for fast unit tests; not for production use
    pub fn generate_for_testing() -> Result<Self> {
        PaillierKeyPair::generate(&PaillierParams { key_size: 512, use_fast_variant: false })
    }

    /// Get the bit size of the keys
    pub fn bit_size(&self) -> u32 {
        self.public_key.key_size
    }
}

impl fmt::Display for PaillierKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PaillierKeyPair({} bits)", self.bit_size())
    }
}

/// Paillier decryption helper `L(x) = (x - 1) / n`
fn l_function(x: &BigUint, n: &BigUint) -> BigUint {
    (x - BigUint::one()) / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::ToBigUint;

    #[test]
    fn test_encryption_decryption() {
        let keypair = PaillierKeyPair::generate_for_testing().unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;

        for m in [0u64, 1, 42, 1_000_000, u64::MAX] {
            let m = m.to_biguint().unwrap();
            let c = pk.encrypt(&m).unwrap();
            assert_eq!(sk.decrypt(&c).unwrap(), m);
        }
    }

    #[test]
    fn test_fast_variant_matches_standard() {
        let keypair = PaillierKeyPair::generate_for_testing().unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;

        let m = 987_654_321u64.to_biguint().unwrap();
        let c = pk.encrypt(&m).unwrap();
        assert_eq!(sk.decrypt(&c).unwrap(), sk.decrypt_fast(&c).unwrap());
    }

    #[test]
    fn test_plaintext_range_rejected() {
        let keypair = PaillierKeyPair::generate_for_testing().unwrap();
        let n = keypair.public_key.n().clone();
        assert!(matches!(
            keypair.public_key.encrypt(&n),
            Err(HomomorphicError::PlaintextOutOfRange { .. })
        ));
    }

    #[test]
    fn test_homomorphic_addition_and_subtraction() {
        let keypair = PaillierKeyPair::generate_for_testing().unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;

        let m1 = 1000u32.to_biguint().unwrap();
        let m2 = 234u32.to_biguint().unwrap();
        let c1 = pk.encrypt(&m1).unwrap();
        let c2 = pk.encrypt(&m2).unwrap();

        assert_eq!(sk.decrypt(&pk.add(&c1, &c2)).unwrap(), &m1 + &m2);
        assert_eq!(sk.decrypt(&pk.subtract(&c1, &c2)).unwrap(), &m1 - &m2);

        // Subtraction wraps modulo n
        let wrapped = sk.decrypt(&pk.subtract(&c2, &c1)).unwrap();
        assert_eq!(wrapped, pk.n() - &m1 + &m2);
    }

    #[test]
    fn test_scalar_multiplication() {
        let keypair = PaillierKeyPair::generate_for_testing().unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;

        let m = 1000u32.to_biguint().unwrap();
        let c = pk.encrypt(&m).unwrap();

        for k in [2u32, 3, 50] {
            let k = k.to_biguint().unwrap();
            assert_eq!(sk.decrypt(&pk.scalar_mul(&c, &k)).unwrap(), &m * &k);
        }
    }

    #[test]
    fn test_add_plain() {
        let keypair = PaillierKeyPair::generate_for_testing().unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;

        let c = pk.encrypt(&500u32.to_biguint().unwrap()).unwrap();
        let shifted = pk.add_plain(&c, &1500u32.to_biguint().unwrap());
        assert_eq!(sk.decrypt(&shifted).unwrap(), 2000u32.to_biguint().unwrap());
    }

    #[test]
    fn test_rerandomization_preserves_plaintext() {
        let keypair = PaillierKeyPair::generate_for_testing().unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;

        let m = 777u32.to_biguint().unwrap();
        let c1 = pk.encrypt(&m).unwrap();
        let c2 = pk.rerandomize(&c1);

        assert_ne!(c1, c2);
        assert_eq!(sk.decrypt(&c1).unwrap(), m);
        assert_eq!(sk.decrypt(&c2).unwrap(), m);
    }

    #[test]
    fn test_malformed_ciphertext_rejected() {
        let keypair = PaillierKeyPair::generate_for_testing().unwrap();
        let sk = &keypair.private_key;

        assert!(matches!(
            sk.decrypt(&BigUint::zero()),
            Err(HomomorphicError::CiphertextMalformed(_))
        ));
        assert!(matches!(
            sk.decrypt(keypair.public_key.modulus()),
            Err(HomomorphicError::CiphertextMalformed(_))
        ));
    }

    #[test]
    fn test_inconsistent_rho_rejected() {
        let keypair = PaillierKeyPair::generate_for_testing().unwrap();
        let sk = &keypair.private_key;

        let bad_rho = &sk.rho + BigUint::one();
        let result = PaillierPrivateKey::new(
            sk.key_size,
            sk.n.clone(),
            sk.n_squared.clone(),
            sk.lambda.clone(),
            sk.mu.clone(),
            sk.g.clone(),
            sk.alpha.clone(),
            Some(&bad_rho),
        );
        assert!(matches!(result, Err(HomomorphicError::KeyParamInvalid(_))));
    }
}
