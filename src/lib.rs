//! # CipherCraft
//!
//! Partially homomorphic public-key cryptosystems and secure two-party
//! comparison protocols built on top of them:
//!
//! - **Paillier** for additive homomorphic arithmetic over `Z_n`
//! - **DGK** with table-based decryption for bitwise work on small domains
//! - A **comparison suite** between two roles, *Alice* (the client) and
//!   *Bob* (the key holder): outsourced multiplication and division, the
//!   DGK bitwise comparison and its encrypted-input counterpart (in the
//!   ORIGINAL, VEUGEN and JOYE refinements), Top-K selection, and
//!   private/encrypted equality tests
//! - PEM/DER key files and a fixed, length-prefixed wire format
//!
//! ElGamal and Goldwasser-Micali appear as key-material contracts only.
//!
//! ## Example
//!
//! ```no_run
//! use ciphercraft::{
//!     Alice, Bob, DgkKeyPair, PaillierKeyPair, ProtocolConfig,
//! };
//! use num_bigint::BigUint;
//! use std::net::{TcpListener, TcpStream};
//!
//! # fn main() -> ciphercraft::Result<()> {
//! let config = ProtocolConfig::default();
//!
//! // Key holder side
//! let dgk = DgkKeyPair::generate(&config.dgk_params)?;
//! let paillier = PaillierKeyPair::generate(&config.paillier_params)?;
//! let listener = TcpListener::bind("127.0.0.1:9200")?;
//! let (stream, _) = listener.accept()?;
//! let mut bob = Bob::new(stream.try_clone()?, stream, paillier, dgk, &config);
//! bob.send_public_keys()?;
//!
//! // Client side (normally another process)
//! let stream = TcpStream::connect("127.0.0.1:9200")?;
//! let mut alice = Alice::connect(stream.try_clone()?, stream, &config)?;
//!
//! let ca = alice.paillier_public_key().encrypt(&BigUint::from(25u32))?;
//! let cb = alice.paillier_public_key().encrypt(&BigUint::from(50u32))?;
//! let x_ge_y = alice.protocol2(&ca, &cb)?; // false: 25 < 50
//! # let _ = x_ge_y;
//! # Ok(())
//! # }
//! ```

pub mod alice;
mod asn1;
pub mod bob;
pub mod dgk;
pub mod elgamal;
pub mod error;
pub mod gm;
pub mod paillier;
pub mod pem;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use alice::Alice;
pub use bob::Bob;
pub use dgk::{DgkKeyPair, DgkPrivateKey, DgkPublicKey};
pub use elgamal::ElGamalPublicKey;
pub use error::{HomomorphicError, Result};
pub use gm::{GmPrivateKey, GmPublicKey};
pub use paillier::{PaillierKeyPair, PaillierPrivateKey, PaillierPublicKey};
pub use transport::{Channel, Message};
pub use types::{ComparisonVariant, DgkParams, PaillierParams, ProtocolConfig, ProtocolMode};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_basic_workflow() {
        let keypair = PaillierKeyPair::generate_for_testing().unwrap();
        let m = num_bigint::BigUint::from(42u32);
        let c = keypair.public_key.encrypt(&m).unwrap();
        assert_eq!(keypair.private_key.decrypt(&c).unwrap(), m);
    }
}
