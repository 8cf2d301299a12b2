//! Client half of the two-party comparison suite
//!
//! Alice drives every sub-protocol. She holds the public keys only; each
//! operation is a fixed request/response script against the key holder on
//! the other end of the channel. Message flows follow the DGK comparison
//! family: blind, round-trip through the decrypting peer, unblind.

use std::io::{Read, Write};

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng};

use crate::dgk::DgkPublicKey;
use crate::error::{HomomorphicError, Result};
use crate::paillier::PaillierPublicKey;
use crate::transport::{Channel, Opcode};
use crate::types::{ComparisonVariant, ProtocolConfig, ProtocolMode};
use crate::utils::{posmod, random_bits, random_coprime};

/// The client role: public keys, one duplex channel, session mode and
/// comparison variant
pub struct Alice<R: Read, W: Write> {
    channel: Channel<R, W>,
    paillier_public: PaillierPublicKey,
    dgk_public: DgkPublicKey,
    mode: ProtocolMode,
    variant: ComparisonVariant,
}

impl<R: Read, W: Write> Alice<R, W> {
    /// Build a session from already-distributed public keys
    pub fn new(
        reader: R,
        writer: W,
        paillier_public: PaillierPublicKey,
        dgk_public: DgkPublicKey,
        config: &ProtocolConfig,
    ) -> Self {
        Alice {
            channel: Channel::new(reader, writer),
            paillier_public,
            dgk_public,
            mode: config.mode,
            variant: config.variant,
        }
    }

    /// Build a session by receiving the public keys from the key holder
    pub fn connect(reader: R, writer: W, config: &ProtocolConfig) -> Result<Self> {
        let mut channel = Channel::new(reader, writer);
        let dgk_public = DgkPublicKey::from_der(&channel.recv_bytes()?)?;
        let paillier_public = PaillierPublicKey::from_der(&channel.recv_bytes()?)?;
        Ok(Alice {
            channel,
            paillier_public,
            dgk_public,
            mode: config.mode,
            variant: config.variant,
        })
    }

    /// Switch the ciphertext mode for subsequent sub-protocols
    pub fn set_mode(&mut self, mode: ProtocolMode) {
        self.mode = mode;
    }

    /// Switch the comparison variant for subsequent sub-protocols
    pub fn set_variant(&mut self, variant: ComparisonVariant) {
        self.variant = variant;
    }

    pub fn paillier_public_key(&self) -> &PaillierPublicKey {
        &self.paillier_public
    }

    pub fn dgk_public_key(&self) -> &DgkPublicKey {
        &self.dgk_public
    }

    // ---- mode-generic cipher helpers ----

    fn space(&self) -> &BigUint {
        match self.mode {
            ProtocolMode::Dgk => self.dgk_public.plaintext_order(),
            ProtocolMode::Paillier => self.paillier_public.n(),
        }
    }

    fn enc(&self, m: &BigUint) -> Result<BigUint> {
        match self.mode {
            ProtocolMode::Dgk => self.dgk_public.encrypt(m),
            ProtocolMode::Paillier => self.paillier_public.encrypt(m),
        }
    }

    fn add_plain(&self, c: &BigUint, m: &BigUint) -> BigUint {
        match self.mode {
            ProtocolMode::Dgk => self.dgk_public.add_plain(c, m),
            ProtocolMode::Paillier => self.paillier_public.add_plain(c, m),
        }
    }

    fn sub_plain(&self, c: &BigUint, m: &BigUint) -> BigUint {
        let neg = posmod(&-BigInt::from(m % self.space()), self.space());
        self.add_plain(c, &neg)
    }

    fn subtract(&self, c1: &BigUint, c2: &BigUint) -> BigUint {
        match self.mode {
            ProtocolMode::Dgk => self.dgk_public.subtract(c1, c2),
            ProtocolMode::Paillier => self.paillier_public.subtract(c1, c2),
        }
    }

    fn scalar_mul(&self, c: &BigUint, k: &BigUint) -> BigUint {
        match self.mode {
            ProtocolMode::Dgk => self.dgk_public.scalar_mul(c, k),
            ProtocolMode::Paillier => self.paillier_public.scalar_mul(c, k),
        }
    }

    fn rerandomize(&self, c: &BigUint) -> BigUint {
        match self.mode {
            ProtocolMode::Dgk => self.dgk_public.rerandomize(c),
            ProtocolMode::Paillier => self.paillier_public.rerandomize(c),
        }
    }

    // ---- session plumbing ----

    fn send_header(&mut self, opcode: Opcode) -> Result<()> {
        self.channel.send_small_int(opcode.as_wire())?;
        self.channel.send_small_int(self.mode.as_wire())?;
        self.channel.send_small_int(self.variant.as_wire())?;
        Ok(())
    }

    fn check_dgk_mode_supported(&self, operation: &str) -> Result<()> {
        if self.mode == ProtocolMode::Dgk && self.variant == ComparisonVariant::Original {
            return Err(HomomorphicError::UnsupportedCombination(format!(
                "{operation} is not available for the ORIGINAL variant in DGK mode"
            )));
        }
        Ok(())
    }

    /// Reveal the plaintext bit inside `enc_bit` without showing it to the
    /// peer: mask with a random bit, let the key holder decrypt, unmask
    fn reveal_bit(&mut self, enc_bit: &BigUint, dgk_cipher: bool) -> Result<bool> {
        let one = BigUint::one();
        let rho: bool = thread_rng().gen();
        let masked = if rho {
            // E(1 - b)
            if dgk_cipher {
                let minus_one = self.dgk_public.plaintext_order() - &one;
                let neg = self.dgk_public.scalar_mul(enc_bit, &minus_one);
                self.dgk_public.add_plain(&neg, &one)
            } else {
                let minus_one = self.space() - &one;
                let neg = self.scalar_mul(enc_bit, &minus_one);
                self.add_plain(&neg, &one)
            }
        } else {
            enc_bit.clone()
        };
        let masked = if dgk_cipher {
            self.dgk_public.rerandomize(&masked)
        } else {
            self.rerandomize(&masked)
        };
        self.channel.send_biguint(&masked)?;
        let revealed = self.channel.recv_bool()?;
        Ok(revealed ^ rho)
    }

    // ---- sub-protocols ----

    /// Outsourced multiplication: from `E(x)` and `E(y)`, obtain `E(x*y)`
    pub fn multiplication(&mut self, cx: &BigUint, cy: &BigUint) -> Result<BigUint> {
        self.send_header(Opcode::Multiplication)?;

        let space = self.space().clone();
        let mut rng = thread_rng();
        let rx = rng.gen_biguint_below(&space);
        let ry = rng.gen_biguint_below(&space);

        let blinded_x = self.rerandomize(&self.add_plain(cx, &rx));
        let blinded_y = self.rerandomize(&self.add_plain(cy, &ry));
        self.channel.send_biguint_array(&[blinded_x, blinded_y])?;

        // E((x+rx)(y+ry)) - ry*E(x) - rx*E(y) - E(rx*ry) = E(xy)
        let blinded_product = self.channel.recv_biguint()?;
        let mut result = self.subtract(&blinded_product, &self.scalar_mul(cx, &ry));
        result = self.subtract(&result, &self.scalar_mul(cy, &rx));
        result = self.sub_plain(&result, &(rx * ry % &space));
        Ok(self.rerandomize(&result))
    }

    /// Outsourced division by a public divisor: from `E(x)`, obtain
    /// `E(floor(x / d))`
    pub fn division(&mut self, cx: &BigUint, d: u64) -> Result<BigUint> {
        let l = self.dgk_public.plaintext_bits() as u64;
        if d == 0 || d >= (1u64 << l) {
            return Err(HomomorphicError::PlaintextOutOfRange {
                value: d.to_string(),
                bound: format!("(0, 2^{l})"),
            });
        }

        self.send_header(Opcode::Division)?;
        self.channel.send_small_int(d as i64)?;

        let r = match self.mode {
            ProtocolMode::Paillier => random_bits(l + self.dgk_public.security_parameter() as u64),
            ProtocolMode::Dgk => random_bits(l),
        };
        let blinded = self.rerandomize(&self.add_plain(cx, &r));
        self.channel.send_biguint(&blinded)?;

        // E(floor((x+r)/d)), to be corrected for the blind and the borrow
        let blinded_quotient = self.channel.recv_biguint()?;

        let d_big = BigUint::from(d);
        let alpha = &r % &d_big;
        let le = self.protocol1_core(&alpha)?;
        let borrow = if le { BigUint::zero() } else { BigUint::one() };

        let correction = &r / &d_big + borrow;
        let result = self.sub_plain(&blinded_quotient, &correction);
        Ok(self.rerandomize(&result))
    }

    /// DGK bitwise comparison. Alice holds `x`, the peer holds `y`; the
    /// return value is `[x <= y]` and only Alice learns it.
    pub fn protocol1(&mut self, x: &BigUint) -> Result<bool> {
        let l = self.dgk_public.plaintext_bits() as u64;
        if x.bits() > l {
            return Err(HomomorphicError::PlaintextOutOfRange {
                value: x.to_string(),
                bound: format!("2^{l}"),
            });
        }
        self.send_header(Opcode::Protocol1)?;
        self.protocol1_core(x)
    }

    /// Comparison over the bit encryptions, without the session header;
    /// also invoked from inside Protocol 2 and division
    fn protocol1_core(&mut self, x: &BigUint) -> Result<bool> {
        let dgk = &self.dgk_public;
        let l = dgk.plaintext_bits() as usize;
        let u = dgk.plaintext_order().clone();
        let u_minus_1 = &u - BigUint::one();
        let one = BigUint::one();
        let three = BigUint::from(3u32);

        let enc_y_bits = self.channel.recv_biguint_array()?;
        if enc_y_bits.len() != l {
            return Err(HomomorphicError::ProtocolMismatch(format!(
                "expected {l} bit encryptions, received {}",
                enc_y_bits.len()
            )));
        }

        // E(x_i XOR y_i) from Alice's plaintext bits:
        // x_i = 0 -> E(y_i); x_i = 1 -> E(1 - y_i)
        let mut xor_bits = Vec::with_capacity(l);
        for (i, enc_y) in enc_y_bits.iter().enumerate() {
            let x_i = ((x >> i) & BigUint::one()).is_one();
            let w = if x_i {
                dgk.add_plain(&dgk.scalar_mul(enc_y, &u_minus_1), &one)
            } else {
                enc_y.clone()
            };
            xor_bits.push(w);
        }

        let mut rng = thread_rng();
        let delta_a = match self.variant {
            ComparisonVariant::Veugen => rng.gen(),
            _ => false,
        };

        // Scan entries; exactly one decrypts to zero when the variant's
        // test relation holds
        let mut entries = Vec::with_capacity(l + 1);
        let mut sum_above = BigUint::one(); // multiplicative identity = E(0)
        for i in (0..l).rev() {
            let x_i = ((x >> i) & BigUint::one()).is_one();
            let scan = dgk.scalar_mul(&sum_above, &three);
            let entry = match self.variant {
                ComparisonVariant::Original => {
                    // y_i - x_i + 1 + 3*sum: zero here means y < x
                    let c = if x_i { BigUint::zero() } else { one.clone() };
                    dgk.add(&dgk.add_plain(&scan, &c), &enc_y_bits[i])
                }
                ComparisonVariant::Veugen | ComparisonVariant::Joye => {
                    // x_i - y_i + s + 3*sum with s = 1 - 2*delta_a
                    let s: i64 = if delta_a { -1 } else { 1 };
                    let c = posmod(&BigInt::from(x_i as i64 + s), &u);
                    let neg_y = dgk.scalar_mul(&enc_y_bits[i], &u_minus_1);
                    dgk.add(&dgk.add_plain(&scan, &c), &neg_y)
                }
            };
            entries.push(entry);
            sum_above = dgk.add(&sum_above, &xor_bits[i]);
        }

        // Equality slot: zero exactly when x == y, suppressed when the
        // scan polarity is flipped
        if self.variant != ComparisonVariant::Original {
            let slot = if delta_a {
                dgk.add_plain(&sum_above, &one)
            } else {
                sum_above.clone()
            };
            entries.push(slot);
        }

        // Value-blind, re-randomize and shuffle before the peer decrypts
        for entry in entries.iter_mut() {
            let blind = rng.gen_biguint_range(&one, &u);
            *entry = dgk.rerandomize(&dgk.scalar_mul(entry, &blind));
        }
        entries.shuffle(&mut rng);
        self.channel.send_biguint_array(&entries)?;

        // delta_b = [some entry decrypted to zero], as a DGK ciphertext
        let enc_delta_b = self.channel.recv_biguint()?;
        let enc_delta = match self.variant {
            ComparisonVariant::Original => {
                // delta = 1 - delta_b
                let neg = dgk.scalar_mul(&enc_delta_b, &u_minus_1);
                dgk.add_plain(&neg, &one)
            }
            ComparisonVariant::Veugen => {
                if delta_a {
                    let neg = dgk.scalar_mul(&enc_delta_b, &u_minus_1);
                    dgk.add_plain(&neg, &one)
                } else {
                    enc_delta_b
                }
            }
            ComparisonVariant::Joye => enc_delta_b,
        };

        self.reveal_bit(&enc_delta, true)
    }

    /// Encrypted comparison. From `E(x)` and `E(y)` Alice learns
    /// `[x >= y]` (`[x > y]` for VEUGEN in DGK mode); the peer learns
    /// nothing.
    pub fn protocol2(&mut self, cx: &BigUint, cy: &BigUint) -> Result<bool> {
        self.check_dgk_mode_supported("Protocol 2")?;
        self.send_header(Opcode::Protocol2)?;
        self.protocol2_core(cx, cy)
    }

    fn protocol2_core(&mut self, cx: &BigUint, cy: &BigUint) -> Result<bool> {
        let l = self.dgk_public.plaintext_bits() as u64;
        let t = self.dgk_public.security_parameter() as u64;
        let two_l = BigUint::one() << l;

        // z = 2^l + x - y turns the comparison into a quotient bit;
        // the strict variant shifts by one
        let strict = self.mode == ProtocolMode::Dgk && self.variant == ComparisonVariant::Veugen;
        let shift = if strict { &two_l - BigUint::one() } else { two_l.clone() };
        let z = self.add_plain(&self.subtract(cx, cy), &shift);

        let r = match self.mode {
            ProtocolMode::Paillier => {
                if l + t + 2 >= self.paillier_public.key_size() as u64 {
                    return Err(HomomorphicError::KeyParamInvalid(
                        "Paillier modulus too small for the comparison blind".to_string(),
                    ));
                }
                random_bits(l + t)
            }
            ProtocolMode::Dgk => random_bits(l),
        };
        let blinded = self.rerandomize(&self.add_plain(&z, &r));
        self.channel.send_biguint(&blinded)?;

        // E(floor((z + r) / 2^l)) from the key holder
        let quotient = self.channel.recv_biguint()?;

        let alpha = &r % &two_l;
        let le = self.protocol1_core(&alpha)?;
        let borrow = if le { BigUint::zero() } else { BigUint::one() };

        // [x >= y] = quotient - floor(r / 2^l) - borrow
        let correction = (&r >> l) + borrow;
        let enc_result = self.sub_plain(&quotient, &correction);
        self.reveal_bit(&enc_result, false)
    }

    /// Top-K selection over encrypted values: the `k` smallest (or
    /// largest) elements, re-randomized, in sorted plaintext order
    pub fn get_k_values(
        &mut self,
        values: &[BigUint],
        k: usize,
        ascending: bool,
    ) -> Result<Vec<BigUint>> {
        self.check_dgk_mode_supported("Top-K selection")?;
        if k > values.len() {
            return Err(HomomorphicError::ProtocolMismatch(format!(
                "requested {k} values from an array of {}",
                values.len()
            )));
        }

        self.send_header(Opcode::TopK)?;
        self.channel.send_small_int(values.len() as i64)?;
        self.channel.send_small_int(k as i64)?;
        self.channel.send_bool(ascending)?;

        let mut candidates = values.to_vec();
        let mut selected = Vec::with_capacity(k);
        for _ in 0..k {
            let mut best = 0;
            for j in 1..candidates.len() {
                let current = candidates[best].clone();
                let challenger = candidates[j].clone();
                let ge = self.protocol2_core(&current, &challenger)?;
                if ge == ascending {
                    best = j;
                }
            }
            selected.push(self.rerandomize(&candidates[best]));
            candidates.swap_remove(best);
        }
        Ok(selected)
    }

    /// Private equality: Alice holds `m_a`, the peer holds its own value;
    /// Alice learns only whether they match
    pub fn private_equals(&mut self, m_a: &BigUint) -> Result<bool> {
        self.check_dgk_mode_supported("private equality")?;
        self.send_header(Opcode::PrivateEquals)?;

        let enc_b = self.channel.recv_biguint()?;
        let enc_a = self.enc(m_a)?;

        let forward = self.protocol2_core(&enc_a, &enc_b)?;
        let backward = self.protocol2_core(&enc_b, &enc_a)?;

        let strict = self.mode == ProtocolMode::Dgk && self.variant == ComparisonVariant::Veugen;
        Ok(if strict {
            // Neither strictly greater
            !forward && !backward
        } else {
            forward && backward
        })
    }

    /// Encrypted equality: one blinded zero-test of `E(a - b)`
    pub fn encrypted_equals(&mut self, ca: &BigUint, cb: &BigUint) -> Result<bool> {
        self.send_header(Opcode::EncryptedEquals)?;

        let diff = self.subtract(ca, cb);
        let blind = match self.mode {
            ProtocolMode::Dgk => {
                thread_rng().gen_biguint_range(&BigUint::one(), self.dgk_public.plaintext_order())
            }
            ProtocolMode::Paillier => random_coprime(self.paillier_public.n()),
        };
        let blinded = self.rerandomize(&self.scalar_mul(&diff, &blind));
        self.channel.send_biguint(&blinded)?;
        self.channel.recv_bool()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dgk::DgkKeyPair;
    use crate::paillier::PaillierKeyPair;

    fn offline_alice(
        mode: ProtocolMode,
        variant: ComparisonVariant,
    ) -> Alice<std::io::Empty, std::io::Sink> {
        let dgk = DgkKeyPair::generate_for_testing().unwrap();
        let paillier = PaillierKeyPair::generate_for_testing().unwrap();
        let config = ProtocolConfig { mode, variant, ..ProtocolConfig::default() };
        Alice::new(
            std::io::empty(),
            std::io::sink(),
            paillier.public_key,
            dgk.public_key,
            &config,
        )
    }

    #[test]
    fn test_legacy_dgk_mode_combinations_refused() {
        let mut alice = offline_alice(ProtocolMode::Dgk, ComparisonVariant::Original);
        let c = alice.dgk_public_key().encrypt(&BigUint::from(5u32)).unwrap();

        assert!(matches!(
            alice.protocol2(&c.clone(), &c.clone()),
            Err(HomomorphicError::UnsupportedCombination(_))
        ));
        assert!(matches!(
            alice.get_k_values(&[c.clone()], 1, true),
            Err(HomomorphicError::UnsupportedCombination(_))
        ));
        assert!(matches!(
            alice.private_equals(&BigUint::from(5u32)),
            Err(HomomorphicError::UnsupportedCombination(_))
        ));
    }

    #[test]
    fn test_division_rejects_bad_divisor() {
        let mut alice = offline_alice(ProtocolMode::Paillier, ComparisonVariant::Original);
        let c = alice
            .paillier_public_key()
            .encrypt(&BigUint::from(100u32))
            .unwrap();

        assert!(matches!(
            alice.division(&c, 0),
            Err(HomomorphicError::PlaintextOutOfRange { .. })
        ));
        assert!(matches!(
            alice.division(&c, 1 << 20),
            Err(HomomorphicError::PlaintextOutOfRange { .. })
        ));
    }

    #[test]
    fn test_protocol1_rejects_wide_input() {
        let mut alice = offline_alice(ProtocolMode::Paillier, ComparisonVariant::Original);
        let wide = BigUint::one() << 40;
        assert!(matches!(
            alice.protocol1(&wide),
            Err(HomomorphicError::PlaintextOutOfRange { .. })
        ));
    }

    #[test]
    fn test_top_k_rejects_oversized_request() {
        let mut alice = offline_alice(ProtocolMode::Paillier, ComparisonVariant::Original);
        let c = alice
            .paillier_public_key()
            .encrypt(&BigUint::from(1u32))
            .unwrap();
        assert!(matches!(
            alice.get_k_values(&[c], 2, true),
            Err(HomomorphicError::ProtocolMismatch(_))
        ));
    }
}
