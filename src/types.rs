//! Core protocol types and configuration

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which cryptosystem carries the ciphertexts flowing through a protocol session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolMode {
    /// DGK ciphertexts over `Z_u` (small plaintext domain, compact)
    Dgk,
    /// Paillier ciphertexts over `Z_n` (full-width plaintexts)
    Paillier,
}

impl fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolMode::Dgk => write!(f, "DGK"),
            ProtocolMode::Paillier => write!(f, "Paillier"),
        }
    }
}

/// Published refinements of the DGK comparison protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonVariant {
    /// The 2007 DGK paper semantics
    Original,
    /// Veugen's hardening: random polarity flip plus an equality slot,
    /// so the responder's zero-observation is masked
    Veugen,
    /// Joye-style scan with the opposite polarity
    Joye,
}

impl fmt::Display for ComparisonVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonVariant::Original => write!(f, "ORIGINAL"),
            ComparisonVariant::Veugen => write!(f, "VEUGEN"),
            ComparisonVariant::Joye => write!(f, "JOYE"),
        }
    }
}

/// DGK key-generation parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DgkParams {
    /// Supported plaintext bit length
    pub l: u32,
    /// Security parameter: bit length of the hidden subgroup orders
    pub t: u32,
    /// Bit length of the modulus n
    pub k: u32,
}

impl Default for DgkParams {
    fn default() -> Self {
        DgkParams { l: 16, t: 160, k: 1024 }
    }
}

/// Paillier key-generation parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaillierParams {
    /// Bit length of the modulus n
    pub key_size: u32,
    /// Decrypt through the precomputed alpha/rho path
    pub use_fast_variant: bool,
}

impl Default for PaillierParams {
    fn default() -> Self {
        PaillierParams { key_size: 1024, use_fast_variant: false }
    }
}

/// Configuration recognized by the comparison engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub mode: ProtocolMode,
    pub variant: ComparisonVariant,
    pub dgk_params: DgkParams,
    pub paillier_params: PaillierParams,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            mode: ProtocolMode::Paillier,
            variant: ComparisonVariant::Original,
            dgk_params: DgkParams::default(),
            paillier_params: PaillierParams::default(),
        }
    }
}

impl ProtocolMode {
    pub(crate) fn as_wire(self) -> i64 {
        match self {
            ProtocolMode::Dgk => 0,
            ProtocolMode::Paillier => 1,
        }
    }

    pub(crate) fn from_wire(v: i64) -> Option<Self> {
        match v {
            0 => Some(ProtocolMode::Dgk),
            1 => Some(ProtocolMode::Paillier),
            _ => None,
        }
    }
}

impl ComparisonVariant {
    pub(crate) fn as_wire(self) -> i64 {
        match self {
            ComparisonVariant::Original => 0,
            ComparisonVariant::Veugen => 1,
            ComparisonVariant::Joye => 2,
        }
    }

    pub(crate) fn from_wire(v: i64) -> Option<Self> {
        match v {
            0 => Some(ComparisonVariant::Original),
            1 => Some(ComparisonVariant::Veugen),
            2 => Some(ComparisonVariant::Joye),
            _ => None,
        }
    }
}
