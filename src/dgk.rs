//! DGK (Damgard-Geisler-Kroigaard) cryptosystem: key generation, lookup
//! tables, and the additively homomorphic cipher operations
//!
//! DGK plaintexts live in `Z_u` for a small prime `u`, which keeps
//! ciphertexts compact and makes decryption a table lookup. The scheme is
//! the bitwise engine underneath the two-party comparison protocols.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, ToPrimitive, Zero};
use rand::thread_rng;

use crate::error::{HomomorphicError, Result};
use crate::types::DgkParams;
use crate::utils::{is_probable_prime, mod_exp, random_bits, random_prime};

/// Largest subgroup order for which the lookup tables are built; guards
/// against absurd `u` values arriving from an untrusted key file.
const MAX_TABLE_ORDER: u64 = 1 << 26;

/// DGK public key `(n, g, h, u, l, t, k)`
///
/// `g` generates a subgroup of order `u * vp * vq`; `h` one of order
/// `vp * vq`. The `h` table (powers `h^(2^i)`) is built at construction
/// since every encryption uses it; the `g` table is optional and built at
/// most once through [`DgkPublicKey::build_lookup_tables`].
#[derive(Clone)]
pub struct DgkPublicKey {
    pub(crate) n: BigUint,
    pub(crate) g: BigUint,
    pub(crate) h: BigUint,
    pub(crate) u: BigUint,
    pub(crate) l: u32,
    pub(crate) t: u32,
    pub(crate) k: u32,
    h_lut: Vec<BigUint>,
    g_lut: OnceLock<Vec<BigUint>>,
}

impl DgkPublicKey {
    /// Assemble a public key from its parameters and precompute the
    /// re-randomization table
    pub fn new(n: BigUint, g: BigUint, h: BigUint, u: BigUint, l: u32, t: u32, k: u32) -> Self {
        let mut h_lut = Vec::with_capacity(2 * t as usize);
        let mut power = h.clone();
        for _ in 0..2 * t {
            h_lut.push(power.clone());
            power = &power * &power % &n;
        }

        DgkPublicKey { n, g, h, u, l, t, k, h_lut, g_lut: OnceLock::new() }
    }

    /// Get the modulus n
    pub fn modulus(&self) -> &BigUint {
        &self.n
    }

    /// Get the plaintext-space order u
    pub fn plaintext_order(&self) -> &BigUint {
        &self.u
    }

    /// Get the plaintext bit length
    pub fn plaintext_bits(&self) -> u32 {
        self.l
    }

    /// Get the security parameter t
    pub fn security_parameter(&self) -> u32 {
        self.t
    }

    /// Get the bit size of the modulus
    pub fn key_size(&self) -> u32 {
        self.k
    }

    /// Build the `g^i mod n` table for `i` in `[0, u)`. Idempotent; later
    /// encryptions use the table instead of a modular exponentiation.
    pub fn build_lookup_tables(&self) {
        self.g_lut.get_or_init(|| {
            let entries = self.u.to_u64().unwrap_or(0) as usize;
            let mut table = Vec::with_capacity(entries);
            let mut current = BigUint::one();
            for _ in 0..entries {
                table.push(current.clone());
                current = current * &self.g % &self.n;
            }
            table
        });
    }

    /// `g^m mod n`, through the lookup table when it has been built
    fn g_pow(&self, m: &BigUint) -> BigUint {
        if let Some(table) = self.g_lut.get() {
            if let Some(i) = m.to_usize() {
                if i < table.len() {
                    return table[i].clone();
                }
            }
        }
        mod_exp(&self.g, m, &self.n)
    }

    /// `h^r mod n` for `r < 2^(2t)`, assembled from the precomputed
    /// `h^(2^i)` powers
    fn h_pow(&self, r: &BigUint) -> BigUint {
        let mut acc = BigUint::one();
        for (i, power) in self.h_lut.iter().enumerate() {
            if ((r >> i) & BigUint::one()).is_one() {
                acc = acc * power % &self.n;
            }
        }
        acc
    }

    /// Encrypt a plaintext `m` in `[0, u)`
    pub fn encrypt(&self, m: &BigUint) -> Result<BigUint> {
        if m >= &self.u {
            return Err(HomomorphicError::PlaintextOutOfRange {
                value: m.to_string(),
                bound: self.u.to_string(),
            });
        }

        let r = random_bits(2 * self.t as u64);
        Ok(self.g_pow(m) * self.h_pow(&r) % &self.n)
    }

    /// Encryption of zero with fresh randomness
    pub fn encrypt_zero(&self) -> BigUint {
        let r = random_bits(2 * self.t as u64);
        self.h_pow(&r)
    }

    /// Homomorphic addition: decrypts to `(m1 + m2) mod u`
    pub fn add(&self, c1: &BigUint, c2: &BigUint) -> BigUint {
        c1 * c2 % &self.n
    }

    /// Add a plaintext constant without fresh randomness; callers that
    /// expose the result re-randomize it
    pub fn add_plain(&self, c: &BigUint, m: &BigUint) -> BigUint {
        c * self.g_pow(&(m % &self.u)) % &self.n
    }

    /// Homomorphic subtraction: decrypts to `(m1 - m2) mod u`
    pub fn subtract(&self, c1: &BigUint, c2: &BigUint) -> BigUint {
        let neg = self.scalar_mul(c2, &(&self.u - BigUint::one()));
        c1 * neg % &self.n
    }

    /// Homomorphic scalar multiplication: decrypts to `(k * m) mod u`
    pub fn scalar_mul(&self, c: &BigUint, k: &BigUint) -> BigUint {
        mod_exp(c, &(k % &self.u), &self.n)
    }

    /// Fresh encryption of the same plaintext
    pub fn rerandomize(&self, c: &BigUint) -> BigUint {
        c * self.encrypt_zero() % &self.n
    }

    /// Sanity-check the parameter set
    pub fn validate(&self) -> Result<()> {
        if self.n.is_zero() {
            return Err(HomomorphicError::KeyParamInvalid(
                "DGK modulus must be nonzero".to_string(),
            ));
        }
        check_parameter_bounds(self.l, self.t, self.k)?;
        if self.g <= BigUint::one() || self.g >= self.n {
            return Err(HomomorphicError::KeyParamInvalid(
                "generator g must be in (1, n)".to_string(),
            ));
        }
        if self.h <= BigUint::one() || self.h >= self.n {
            return Err(HomomorphicError::KeyParamInvalid(
                "generator h must be in (1, n)".to_string(),
            ));
        }
        let u_bits = self.u.bits();
        if u_bits <= self.l as u64 + 2 || u_bits > self.l as u64 + 3 {
            return Err(HomomorphicError::KeyParamInvalid(format!(
                "u must have exactly {} bits, got {}",
                self.l + 3,
                u_bits
            )));
        }
        if self.u.to_u64().map_or(true, |u| u > MAX_TABLE_ORDER) {
            return Err(HomomorphicError::KeyParamInvalid(
                "subgroup order u is too large for table-based decryption".to_string(),
            ));
        }
        if !is_probable_prime(&self.u, 20) {
            return Err(HomomorphicError::KeyParamInvalid(
                "subgroup order u must be prime".to_string(),
            ));
        }
        Ok(())
    }
}

impl PartialEq for DgkPublicKey {
    fn eq(&self, other: &Self) -> bool {
        // Structural equality on the canonical parameter tuple; the lookup
        // tables are derived data
        self.n == other.n
            && self.g == other.g
            && self.h == other.h
            && self.u == other.u
            && self.l == other.l
            && self.t == other.t
            && self.k == other.k
    }
}

impl Eq for DgkPublicKey {}

impl fmt::Debug for DgkPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DgkPublicKey")
            .field("n", &self.n)
            .field("g", &self.g)
            .field("h", &self.h)
            .field("u", &self.u)
            .field("l", &self.l)
            .field("t", &self.t)
            .field("k", &self.k)
            .finish()
    }
}

impl fmt::Display for DgkPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DgkPublicKey({} bits, l={}, t={})", self.k, self.l, self.t)
    }
}

/// DGK private key: the factorization of `n`, the hidden subgroup orders,
/// and the decryption lookup table
///
/// Holds its own copy of the public parameters, so a key pair has no
/// internal back-references.
#[derive(Clone)]
pub struct DgkPrivateKey {
    pub(crate) p: BigUint,
    pub(crate) q: BigUint,
    pub(crate) vp: BigUint,
    pub(crate) vq: BigUint,
    /// `vp * vq`
    pub(crate) v: BigUint,
    public: DgkPublicKey,
    dec_lut: HashMap<BigUint, u64>,
}

impl DgkPrivateKey {
    /// Construct the private key and build the decryption table
    /// `(g^vp)^i mod p -> i` for `i` in `[0, u)`
    pub fn new(
        p: BigUint,
        q: BigUint,
        vp: BigUint,
        vq: BigUint,
        public: DgkPublicKey,
    ) -> Result<Self> {
        public.validate()?;
        if &p * &q != public.n {
            return Err(HomomorphicError::KeyParamInvalid(
                "p * q does not match the public modulus".to_string(),
            ));
        }

        let u = public.u.to_u64().ok_or_else(|| {
            HomomorphicError::KeyParamInvalid("subgroup order u overflows u64".to_string())
        })?;

        let base = mod_exp(&public.g, &vp, &p);
        let mut dec_lut = HashMap::with_capacity(u as usize);
        let mut current = BigUint::one();
        for i in 0..u {
            dec_lut.insert(current.clone(), i);
            current = current * &base % &p;
        }

        let v = &vp * &vq;
        Ok(DgkPrivateKey { p, q, vp, vq, v, public, dec_lut })
    }

    /// The public half this key decrypts for
    pub fn public_key(&self) -> &DgkPublicKey {
        &self.public
    }

    /// The order `vp * vq` of the hidden subgroup generated by `h`
    pub fn hidden_order(&self) -> &BigUint {
        &self.v
    }

    /// Decrypt a ciphertext; constant time in the table, not in the
    /// exponentiation
    pub fn decrypt(&self, c: &BigUint) -> Result<BigUint> {
        if c.is_zero() || c >= &self.public.n {
            return Err(HomomorphicError::CiphertextMalformed(
                "ciphertext is not in the multiplicative group of n".to_string(),
            ));
        }

        let reduced = mod_exp(c, &self.vp, &self.p);
        match self.dec_lut.get(&reduced) {
            Some(&m) => Ok(BigUint::from(m)),
            None => Err(HomomorphicError::CiphertextMalformed(
                "decryption lookup miss".to_string(),
            )),
        }
    }
}

impl PartialEq for DgkPrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.p == other.p
            && self.q == other.q
            && self.vp == other.vp
            && self.vq == other.vq
            && self.public == other.public
    }
}

impl Eq for DgkPrivateKey {}

impl fmt::Debug for DgkPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secret parameters stay out of log output
        write!(f, "DgkPrivateKey({} bits)", self.public.k)
    }
}

/// DGK key pair owning both halves
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DgkKeyPair {
    pub public_key: DgkPublicKey,
    pub private_key: DgkPrivateKey,
}

impl DgkKeyPair {
    /// Generate a key pair with the given parameters
    pub fn generate(params: &DgkParams) -> Result<Self> {
        let DgkParams { l, t, k } = *params;
        check_parameter_bounds(l, t, k)?;
        let u_bits = l as u64 + 3;

        let u = random_prime(u_bits)?;
        let vp = random_prime(t as u64)?;
        let vq = loop {
            let candidate = random_prime(t as u64)?;
            if candidate != vp {
                break candidate;
            }
        };

        let p = prime_with_factor(&(&u * &vp), (k / 2) as u64)?;
        let q = prime_with_factor(&vq, (k / 2) as u64)?;
        let n = &p * &q;

        let one = BigUint::one();
        let p_minus_1 = &p - &one;
        let q_minus_1 = &q - &one;
        let g_order = &u * &vp * &vq;
        let h_order = &vp * &vq;

        // g = x^((p-1)/(u*vp) * (q-1)/vq) has order dividing u*vp*vq;
        // partial-power checks pin the order down exactly
        let g_exp = (&p_minus_1 / (&u * &vp)) * (&q_minus_1 / &vq);
        let g = find_element_of_order(&n, &g_exp, &g_order, &[&u, &vp, &vq])?;

        let h_exp = (&p_minus_1 / &vp) * (&q_minus_1 / &vq);
        let h = find_element_of_order(&n, &h_exp, &h_order, &[&vp, &vq])?;

        let public_key = DgkPublicKey::new(n, g, h, u, l, t, k);
        let private_key = DgkPrivateKey::new(p, q, vp, vq, public_key.clone())?;

        Ok(DgkKeyPair { public_key, private_key })
    }

    /// Reduced parameters for fast unit tests; not for production use
    pub fn generate_for_testing() -> Result<Self> {
        DgkKeyPair::generate(&DgkParams { l: 8, t: 80, k: 512 })
    }

    /// Get the bit size of the keys
    pub fn bit_size(&self) -> u32 {
        self.public_key.k
    }
}

impl fmt::Display for DgkKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DgkKeyPair({} bits)", self.bit_size())
    }
}

/// Reject parameter sets the scheme cannot support; loaded key files go
/// through the same bounds before any table is built
pub(crate) fn check_parameter_bounds(l: u32, t: u32, k: u32) -> Result<()> {
    if !(4..=22).contains(&l) {
        return Err(HomomorphicError::KeyParamInvalid(format!(
            "plaintext bit length l={l} outside the supported range [4, 22]"
        )));
    }
    if !(8..=2048).contains(&t) {
        return Err(HomomorphicError::KeyParamInvalid(format!(
            "security parameter t={t} outside the supported range [8, 2048]"
        )));
    }
    // Both prime searches need headroom above the fixed factors
    if k > 16384 || (k / 2) as u64 <= l as u64 + 3 + t as u64 + 16 {
        return Err(HomomorphicError::KeyParamInvalid(format!(
            "key size k={k} incompatible with l={l}, t={t}"
        )));
    }
    Ok(())
}

/// Search for a prime of exactly `bits` bits congruent to 1 mod `factor`
fn prime_with_factor(factor: &BigUint, bits: u64) -> Result<BigUint> {
    let factor_bits = factor.bits();
    if bits <= factor_bits + 1 {
        return Err(HomomorphicError::KeyParamInvalid(
            "prime size leaves no room for the random cofactor".to_string(),
        ));
    }

    let mut rng = thread_rng();
    let cofactor_bits = bits - factor_bits;
    let max_iterations = 200_000;
    let mut iterations = 0;

    loop {
        iterations += 1;
        if iterations > max_iterations {
            return Err(HomomorphicError::KeyParamInvalid(format!(
                "failed to find a {bits}-bit prime with the required subgroup"
            )));
        }

        let cofactor = rng.gen_biguint(cofactor_bits) | (BigUint::one() << (cofactor_bits - 1));
        let candidate = factor * &cofactor + BigUint::one();
        if candidate.bits() != bits {
            continue;
        }
        if is_probable_prime(&candidate, 20) {
            return Ok(candidate);
        }
    }
}

/// Raise random elements to `exp` until the result has exactly the order
/// `order` modulo `n`, verified by partial-power checks against every
/// prime factor
fn find_element_of_order(
    n: &BigUint,
    exp: &BigUint,
    order: &BigUint,
    prime_factors: &[&BigUint],
) -> Result<BigUint> {
    let one = BigUint::one();
    let two = BigUint::from(2u32);
    let mut rng = thread_rng();
    let max_iterations = 10_000;

    'search: for _ in 0..max_iterations {
        let x = rng.gen_biguint_range(&two, n);
        let candidate = mod_exp(&x, exp, n);
        if candidate.is_one() {
            continue;
        }
        if !mod_exp(&candidate, order, n).is_one() {
            continue;
        }
        for factor in prime_factors {
            if mod_exp(&candidate, &(order / *factor), n) == one {
                continue 'search;
            }
        }
        return Ok(candidate);
    }

    Err(HomomorphicError::InternalInvariant(
        "element-of-order search did not converge".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::posmod;
    use num_bigint::{BigInt, ToBigUint};

    #[test]
    fn test_encryption_decryption() {
        let keypair = DgkKeyPair::generate_for_testing().unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;

        for m in [0u32, 1, 2, 42, 200, 255] {
            let m = m.to_biguint().unwrap();
            let c = pk.encrypt(&m).unwrap();
            assert_eq!(sk.decrypt(&c).unwrap(), m);
        }
    }

    #[test]
    fn test_plaintext_range_rejected() {
        let keypair = DgkKeyPair::generate_for_testing().unwrap();
        let u = keypair.public_key.plaintext_order().clone();
        assert!(matches!(
            keypair.public_key.encrypt(&u),
            Err(HomomorphicError::PlaintextOutOfRange { .. })
        ));
    }

    #[test]
    fn test_homomorphic_addition_and_subtraction() {
        let keypair = DgkKeyPair::generate_for_testing().unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;
        let u = pk.plaintext_order();

        let m1 = 150u32.to_biguint().unwrap();
        let m2 = 97u32.to_biguint().unwrap();
        let c1 = pk.encrypt(&m1).unwrap();
        let c2 = pk.encrypt(&m2).unwrap();

        let sum = sk.decrypt(&pk.add(&c1, &c2)).unwrap();
        assert_eq!(sum, (&m1 + &m2) % u);

        let diff = sk.decrypt(&pk.subtract(&c1, &c2)).unwrap();
        assert_eq!(diff, (&m1 - &m2) % u);

        // Subtraction wraps modulo u
        let wrapped = sk.decrypt(&pk.subtract(&c2, &c1)).unwrap();
        let expected = posmod(
            &(BigInt::from(97) - BigInt::from(150)),
            u,
        );
        assert_eq!(wrapped, expected);
    }

    #[test]
    fn test_scalar_multiplication() {
        let keypair = DgkKeyPair::generate_for_testing().unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;
        let u = pk.plaintext_order();

        let m = 7u32.to_biguint().unwrap();
        let c = pk.encrypt(&m).unwrap();

        for k in [0u32, 1, 5, 300] {
            let k = k.to_biguint().unwrap();
            let scaled = sk.decrypt(&pk.scalar_mul(&c, &k)).unwrap();
            assert_eq!(scaled, (&m * &k) % u);
        }
    }

    #[test]
    fn test_add_plain() {
        let keypair = DgkKeyPair::generate_for_testing().unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;

        let c = pk.encrypt(&10u32.to_biguint().unwrap()).unwrap();
        let shifted = pk.add_plain(&c, &25u32.to_biguint().unwrap());
        assert_eq!(sk.decrypt(&shifted).unwrap(), 35u32.to_biguint().unwrap());
    }

    #[test]
    fn test_rerandomization_preserves_plaintext() {
        let keypair = DgkKeyPair::generate_for_testing().unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;

        let m = 123u32.to_biguint().unwrap();
        let c1 = pk.encrypt(&m).unwrap();
        let c2 = pk.rerandomize(&c1);

        assert_ne!(c1, c2);
        assert_eq!(sk.decrypt(&c1).unwrap(), m);
        assert_eq!(sk.decrypt(&c2).unwrap(), m);
    }

    #[test]
    fn test_g_lookup_table_matches_direct_path() {
        let keypair = DgkKeyPair::generate_for_testing().unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;

        pk.build_lookup_tables();
        let m = 77u32.to_biguint().unwrap();
        let c = pk.encrypt(&m).unwrap();
        assert_eq!(sk.decrypt(&c).unwrap(), m);
    }

    #[test]
    fn test_malformed_ciphertext_rejected() {
        let keypair = DgkKeyPair::generate_for_testing().unwrap();
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
    fn test_structural_equality() {
        let keypair = DgkKeyPair::generate_for_testing().unwrap();
        let clone = keypair.public_key.clone();
        assert_eq!(keypair.public_key, clone);

        let other = DgkKeyPair::generate_for_testing().unwrap();
        assert_ne!(keypair.public_key, other.public_key);
    }

    // Default parameters (k=1024, l=16, t=160): the shape used in
    // production deployments
    #[test]
    fn test_default_parameters_arithmetic() {
        let keypair = DgkKeyPair::generate(&DgkParams::default()).unwrap();
        let pk = &keypair.public_key;
        let sk = &keypair.private_key;

        let c10 = pk.encrypt(&10u32.to_biguint().unwrap()).unwrap();
        let c20 = pk.encrypt(&20u32.to_biguint().unwrap()).unwrap();
        assert_eq!(
            sk.decrypt(&pk.add(&c10, &c20)).unwrap(),
            30u32.to_biguint().unwrap()
        );

        let c7 = pk.encrypt(&7u32.to_biguint().unwrap()).unwrap();
        assert_eq!(
            sk.decrypt(&pk.scalar_mul(&c7, &5u32.to_biguint().unwrap())).unwrap(),
            35u32.to_biguint().unwrap()
        );
    }
}
