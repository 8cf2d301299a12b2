//! Key-holder half of the two-party comparison suite
//!
//! Bob owns both private keys, ships the public halves to the client, and
//! answers each sub-protocol in lockstep. He only ever decrypts blinded
//! intermediate values; the comparison outcomes stay with the client.

use std::io::{Read, Write};

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::dgk::DgkKeyPair;
use crate::error::{HomomorphicError, Result};
use crate::paillier::PaillierKeyPair;
use crate::transport::{Channel, Opcode};
use crate::types::{ComparisonVariant, ProtocolConfig, ProtocolMode};

/// The responder role: both key pairs, one duplex channel, session mode
/// and comparison variant
pub struct Bob<R: Read, W: Write> {
    channel: Channel<R, W>,
    paillier: PaillierKeyPair,
    dgk: DgkKeyPair,
    mode: ProtocolMode,
    variant: ComparisonVariant,
    use_fast_decryption: bool,
}

impl<R: Read, W: Write> Bob<R, W> {
    pub fn new(
        reader: R,
        writer: W,
        paillier: PaillierKeyPair,
        dgk: DgkKeyPair,
        config: &ProtocolConfig,
    ) -> Self {
        Bob {
            channel: Channel::new(reader, writer),
            paillier,
            dgk,
            mode: config.mode,
            variant: config.variant,
            use_fast_decryption: config.paillier_params.use_fast_variant,
        }
    }

    /// Ship both public keys to the client, DER-encoded
    pub fn send_public_keys(&mut self) -> Result<()> {
        let dgk_der = self.dgk.public_key.to_der();
        let paillier_der = self.paillier.public_key.to_der();
        self.channel.send_bytes(&dgk_der)?;
        self.channel.send_bytes(&paillier_der)?;
        Ok(())
    }

    /// Switch the ciphertext mode for subsequent sub-protocols
    pub fn set_mode(&mut self, mode: ProtocolMode) {
        self.mode = mode;
    }

    /// Switch the comparison variant for subsequent sub-protocols
    pub fn set_variant(&mut self, variant: ComparisonVariant) {
        self.variant = variant;
    }

    // ---- mode-generic cipher helpers ----

    fn space(&self) -> &BigUint {
        match self.mode {
            ProtocolMode::Dgk => self.dgk.public_key.plaintext_order(),
            ProtocolMode::Paillier => self.paillier.public_key.n(),
        }
    }

    fn enc(&self, m: &BigUint) -> Result<BigUint> {
        match self.mode {
            ProtocolMode::Dgk => self.dgk.public_key.encrypt(m),
            ProtocolMode::Paillier => self.paillier.public_key.encrypt(m),
        }
    }

    fn dec(&self, c: &BigUint) -> Result<BigUint> {
        match self.mode {
            ProtocolMode::Dgk => self.dgk.private_key.decrypt(c),
            ProtocolMode::Paillier => {
                if self.use_fast_decryption {
                    self.paillier.private_key.decrypt_fast(c)
                } else {
                    self.paillier.private_key.decrypt(c)
                }
            }
        }
    }

    // ---- session plumbing ----

    fn expect_header(&mut self, expected: Opcode) -> Result<()> {
        let raw = self.channel.recv_small_int()?;
        let opcode = Opcode::from_wire(raw).ok_or_else(|| {
            HomomorphicError::ProtocolMismatch(format!("unknown sub-protocol tag {raw}"))
        })?;
        if opcode != expected {
            return Err(HomomorphicError::ProtocolMismatch(format!(
                "peer opened {opcode:?} while this side runs {expected:?}"
            )));
        }

        let raw = self.channel.recv_small_int()?;
        let mode = ProtocolMode::from_wire(raw).ok_or_else(|| {
            HomomorphicError::ProtocolMismatch(format!("unknown mode tag {raw}"))
        })?;
        if mode != self.mode {
            return Err(HomomorphicError::ProtocolMismatch(format!(
                "peer mode {mode}, local mode {}",
                self.mode
            )));
        }

        let raw = self.channel.recv_small_int()?;
        let variant = ComparisonVariant::from_wire(raw).ok_or_else(|| {
            HomomorphicError::ProtocolMismatch(format!("unknown variant tag {raw}"))
        })?;
        if variant != self.variant {
            return Err(HomomorphicError::ProtocolMismatch(format!(
                "peer variant {variant}, local variant {}",
                self.variant
            )));
        }
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

    /// Decrypt the client's masked result bit and return the plaintext;
    /// the mask keeps the actual outcome hidden from this side
    fn respond_reveal(&mut self, dgk_cipher: bool) -> Result<()> {
        let masked = self.channel.recv_biguint()?;
        let value = if dgk_cipher {
            self.dgk.private_key.decrypt(&masked)?
        } else {
            self.dec(&masked)?
        };
        let bit = if value.is_zero() {
            false
        } else if value.is_one() {
            true
        } else {
            return Err(HomomorphicError::CiphertextMalformed(
                "masked comparison bit decrypted outside {0, 1}".to_string(),
            ));
        };
        self.channel.send_bool(bit)
    }

    // ---- sub-protocols ----

    /// Responder for outsourced multiplication
    pub fn multiplication(&mut self) -> Result<()> {
        self.expect_header(Opcode::Multiplication)?;

        let blinded = self.channel.recv_biguint_array()?;
        if blinded.len() != 2 {
            return Err(HomomorphicError::ProtocolMismatch(format!(
                "multiplication expects 2 ciphertexts, received {}",
                blinded.len()
            )));
        }

        let a = self.dec(&blinded[0])?;
        let b = self.dec(&blinded[1])?;
        let product = a * b % self.space();
        let enc_product = self.enc(&product)?;
        self.channel.send_biguint(&enc_product)
    }

    /// Responder for outsourced division
    pub fn division(&mut self) -> Result<()> {
        self.expect_header(Opcode::Division)?;

        let divisor = self.channel.recv_small_int()?;
        let l = self.dgk.public_key.plaintext_bits() as u64;
        if divisor <= 0 || (divisor as u64) >= (1u64 << l) {
            return Err(HomomorphicError::ProtocolMismatch(format!(
                "peer sent divisor {divisor} outside (0, 2^{l})"
            )));
        }
        let divisor = BigUint::from(divisor as u64);

        let blinded = self.channel.recv_biguint()?;
        let value = self.dec(&blinded)?;

        let quotient = &value / &divisor;
        let enc_quotient = self.enc(&quotient)?;
        self.channel.send_biguint(&enc_quotient)?;

        // Borrow correction runs over the residues
        self.protocol1_core(&(value % &divisor))
    }

    /// Responder for the DGK bitwise comparison; Bob holds `y`
    pub fn protocol1(&mut self, y: &BigUint) -> Result<()> {
        let l = self.dgk.public_key.plaintext_bits() as u64;
        if y.bits() > l {
            return Err(HomomorphicError::PlaintextOutOfRange {
                value: y.to_string(),
                bound: format!("2^{l}"),
            });
        }
        self.expect_header(Opcode::Protocol1)?;
        self.protocol1_core(y)
    }

    fn protocol1_core(&mut self, y: &BigUint) -> Result<()> {
        let l = self.dgk.public_key.plaintext_bits() as usize;

        // Bit encryptions of y, least significant first
        let mut bits = Vec::with_capacity(l);
        for i in 0..l {
            let bit = (y >> i) & BigUint::one();
            bits.push(self.dgk.public_key.encrypt(&bit)?);
        }
        self.channel.send_biguint_array(&bits)?;

        let entries = self.channel.recv_biguint_array()?;
        let expected = match self.variant {
            ComparisonVariant::Original => l,
            ComparisonVariant::Veugen | ComparisonVariant::Joye => l + 1,
        };
        if entries.len() != expected {
            return Err(HomomorphicError::ProtocolMismatch(format!(
                "expected {expected} scan entries, received {}",
                entries.len()
            )));
        }

        let mut delta_b = false;
        for entry in &entries {
            if self.dgk.private_key.decrypt(entry)?.is_zero() {
                delta_b = true;
            }
        }

        let enc_delta_b = self.dgk.public_key.encrypt(&BigUint::from(delta_b as u8))?;
        self.channel.send_biguint(&enc_delta_b)?;

        self.respond_reveal(true)
    }

    /// Responder for the encrypted comparison
    pub fn protocol2(&mut self) -> Result<()> {
        self.check_dgk_mode_supported("Protocol 2")?;
        self.expect_header(Opcode::Protocol2)?;
        self.protocol2_core()
    }

    fn protocol2_core(&mut self) -> Result<()> {
        let l = self.dgk.public_key.plaintext_bits() as u64;
        let two_l = BigUint::one() << l;

        let blinded = self.channel.recv_biguint()?;
        let value = self.dec(&blinded)?;

        let beta = &value % &two_l;
        let quotient = &value >> l;
        let enc_quotient = self.enc(&quotient)?;
        self.channel.send_biguint(&enc_quotient)?;

        self.protocol1_core(&beta)?;
        self.respond_reveal(false)
    }

    /// Responder for Top-K selection
    pub fn get_k_values(&mut self) -> Result<()> {
        self.check_dgk_mode_supported("Top-K selection")?;
        self.expect_header(Opcode::TopK)?;

        let len = self.channel.recv_small_int()?;
        let k = self.channel.recv_small_int()?;
        let _ascending = self.channel.recv_bool()?;
        if len < 0 || k < 0 || k > len {
            return Err(HomomorphicError::ProtocolMismatch(format!(
                "inconsistent selection counts k={k}, len={len}"
            )));
        }

        let mut remaining = len as usize;
        for _ in 0..k as usize {
            for _ in 1..remaining {
                self.protocol2_core()?;
            }
            remaining -= 1;
        }
        Ok(())
    }

    /// Responder for private equality; Bob holds `m_b`
    pub fn private_equals(&mut self, m_b: &BigUint) -> Result<()> {
        self.check_dgk_mode_supported("private equality")?;
        self.expect_header(Opcode::PrivateEquals)?;

        let enc_b = self.enc(m_b)?;
        self.channel.send_biguint(&enc_b)?;

        self.protocol2_core()?;
        self.protocol2_core()
    }

    /// Responder for encrypted equality; the zero-test outcome is also
    /// visible to this side
    pub fn encrypted_equals(&mut self) -> Result<bool> {
        self.expect_header(Opcode::EncryptedEquals)?;

        let blinded = self.channel.recv_biguint()?;
        let equal = self.dec(&blinded)?.is_zero();
        self.channel.send_bool(equal)?;
        Ok(equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_bob(mode: ProtocolMode, variant: ComparisonVariant) -> Bob<std::io::Empty, std::io::Sink> {
        let dgk = DgkKeyPair::generate_for_testing().unwrap();
        let paillier = PaillierKeyPair::generate_for_testing().unwrap();
        let config = ProtocolConfig { mode, variant, ..ProtocolConfig::default() };
        Bob::new(std::io::empty(), std::io::sink(), paillier, dgk, &config)
    }

    #[test]
    fn test_legacy_dgk_mode_combinations_refused() {
        let mut bob = offline_bob(ProtocolMode::Dgk, ComparisonVariant::Original);

        assert!(matches!(
            bob.protocol2(),
            Err(HomomorphicError::UnsupportedCombination(_))
        ));
        assert!(matches!(
            bob.get_k_values(),
            Err(HomomorphicError::UnsupportedCombination(_))
        ));
        assert!(matches!(
            bob.private_equals(&BigUint::from(5u32)),
            Err(HomomorphicError::UnsupportedCombination(_))
        ));
    }

    #[test]
    fn test_protocol1_rejects_wide_input() {
        let mut bob = offline_bob(ProtocolMode::Paillier, ComparisonVariant::Original);
        let wide = BigUint::one() << 40;
        assert!(matches!(
            bob.protocol1(&wide),
            Err(HomomorphicError::PlaintextOutOfRange { .. })
        ));
    }
}
