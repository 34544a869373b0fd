//! Private keys and key generation.

use std::fmt;

use rcgen::KeyPair;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use serde::Serialize;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{DEFAULT_MIN_RSA_BITS, MAX_RSA_BITS};
use crate::error::{Error, Result};
use crate::pem;

/// Public key algorithm of a [`PrivateKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyAlgorithm {
    /// RSA, signing with SHA-256.
    Rsa,
    /// ECDSA over P-256.
    EcdsaP256,
    /// ECDSA over P-384.
    EcdsaP384,
    /// Ed25519.
    Ed25519,
}

impl KeyAlgorithm {
    fn of(key_pair: &KeyPair) -> Result<Self> {
        let alg = key_pair.algorithm();
        if alg == &rcgen::PKCS_RSA_SHA256 {
            Ok(Self::Rsa)
        } else if alg == &rcgen::PKCS_ECDSA_P256_SHA256 {
            Ok(Self::EcdsaP256)
        } else if alg == &rcgen::PKCS_ECDSA_P384_SHA384 {
            Ok(Self::EcdsaP384)
        } else if alg == &rcgen::PKCS_ED25519 {
            Ok(Self::Ed25519)
        } else {
            Err(Error::Parse(format!("unsupported key algorithm: {alg:?}")))
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rsa => "RSA",
            Self::EcdsaP256 => "ECDSA P-256",
            Self::EcdsaP384 => "ECDSA P-384",
            Self::Ed25519 => "Ed25519",
        };
        f.write_str(name)
    }
}

/// A private key with secure memory handling.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    /// PKCS#8 DER-encoded private key bytes.
    der: Vec<u8>,
    #[zeroize(skip)]
    algorithm: KeyAlgorithm,
}

impl PrivateKey {
    /// Creates a private key from PKCS#8 DER bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the bytes are not a supported PKCS#8 key.
    pub fn from_pkcs8_der(der: Vec<u8>) -> Result<Self> {
        let key_pair = KeyPair::try_from(der.as_slice())
            .map_err(|e| Error::Parse(format!("failed to parse private key: {e}")))?;
        let algorithm = KeyAlgorithm::of(&key_pair)?;
        Ok(Self { der, algorithm })
    }

    /// Parses a private key from PEM text.
    ///
    /// Accepts PKCS#8 (`PRIVATE KEY`) and PKCS#1 (`RSA PRIVATE KEY`) blocks;
    /// PKCS#1 keys are converted to PKCS#8. `origin` names the input in
    /// error messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if no PEM block is present and
    /// [`Error::Parse`] if the block does not hold a usable key.
    pub fn from_pem(text: &str, origin: &str) -> Result<Self> {
        let block = pem::decode(text).map_err(|e| Error::Decode(format!("{origin}: {e}")))?;
        match block.label() {
            pem::PRIVATE_KEY => Self::from_pkcs8_der(block.into_der()),
            pem::RSA_PRIVATE_KEY => {
                let rsa = RsaPrivateKey::from_pkcs1_der(block.der())
                    .map_err(|e| Error::Parse(format!("{origin}: invalid PKCS#1 key: {e}")))?;
                let der = rsa
                    .to_pkcs8_der()
                    .map_err(|e| Error::Parse(format!("{origin}: cannot convert key: {e}")))?;
                Self::from_pkcs8_der(der.as_bytes().to_vec())
            }
            other => Err(Error::Parse(format!(
                "{origin}: expected a private key, found '{other}' block"
            ))),
        }
    }

    /// Returns the PKCS#8 DER-encoded private key bytes.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the key algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Returns the PEM-encoded private key.
    #[must_use]
    pub fn pem(&self) -> String {
        pem::encode(pem::PRIVATE_KEY, &self.der)
    }

    /// Loads the key into an rcgen key pair for signing.
    pub(crate) fn key_pair(&self) -> Result<KeyPair> {
        KeyPair::try_from(self.der.as_slice())
            .map_err(|e| Error::Signing(format!("failed to load signing key: {e}")))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm)
            .field("der", &"[REDACTED]")
            .finish()
    }
}

impl Clone for PrivateKey {
    fn clone(&self) -> Self {
        Self {
            der: self.der.clone(),
            algorithm: self.algorithm,
        }
    }
}

/// Generates private keys.
pub trait KeyProvider {
    /// Generates a fresh private key.
    fn generate(&self) -> Result<PrivateKey>;
}

/// Generates RSA keys of a fixed size.
#[derive(Debug, Clone, Copy)]
pub struct RsaKeyProvider {
    bits: usize,
}

impl RsaKeyProvider {
    /// Creates a provider for `bits`-bit keys, enforcing the default minimum.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyGen`] if `bits` is below the minimum.
    pub fn new(bits: usize) -> Result<Self> {
        Self::with_minimum(bits, DEFAULT_MIN_RSA_BITS)
    }

    /// Creates a provider for `bits`-bit keys, enforcing `min_bits`.
    ///
    /// `min_bits` can raise the floor but never lower it below
    /// [`DEFAULT_MIN_RSA_BITS`]; smaller keys cannot be loaded for signing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyGen`] if `bits` is below the effective minimum or
    /// above [`MAX_RSA_BITS`].
    pub fn with_minimum(bits: usize, min_bits: usize) -> Result<Self> {
        let min_bits = min_bits.max(DEFAULT_MIN_RSA_BITS);
        if bits < min_bits {
            return Err(Error::KeyGen(format!(
                "RSA key size {bits} is below the minimum of {min_bits} bits"
            )));
        }
        if bits > MAX_RSA_BITS {
            return Err(Error::KeyGen(format!(
                "RSA key size {bits} is above the maximum of {MAX_RSA_BITS} bits"
            )));
        }
        Ok(Self { bits })
    }

    /// Returns the key size in bits.
    #[must_use]
    pub const fn bits(&self) -> usize {
        self.bits
    }
}

impl KeyProvider for RsaKeyProvider {
    fn generate(&self) -> Result<PrivateKey> {
        debug!(bits = self.bits, "generating RSA key");
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, self.bits)
            .map_err(|e| Error::KeyGen(format!("failed to generate RSA key: {e}")))?;
        let der = key
            .to_pkcs8_der()
            .map_err(|e| Error::KeyGen(format!("failed to encode RSA key: {e}")))?;
        let key = PrivateKey::from_pkcs8_der(der.as_bytes().to_vec())
            .map_err(|e| Error::KeyGen(format!("generated RSA key is unusable: {e}")))?;
        info!(bits = self.bits, "generated RSA private key");
        Ok(key)
    }
}

/// Generates ECDSA P-256 keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaKeyProvider;

impl KeyProvider for EcdsaKeyProvider {
    fn generate(&self) -> Result<PrivateKey> {
        let key_pair = KeyPair::generate()
            .map_err(|e| Error::KeyGen(format!("failed to generate key pair: {e}")))?;
        PrivateKey::from_pkcs8_der(key_pair.serialize_der())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPrivateKey;
    use rsa::pkcs8::DecodePrivateKey;

    #[test]
    fn rsa_below_minimum_rejected() {
        let result = RsaKeyProvider::new(1024);
        assert!(matches!(result, Err(Error::KeyGen(_))));
    }

    #[test]
    fn custom_minimum_cannot_go_below_signing_floor() {
        let result = RsaKeyProvider::with_minimum(1024, 1024);
        assert!(matches!(result, Err(Error::KeyGen(msg)) if msg.contains("2048")));
    }

    #[test]
    fn custom_minimum_raises_floor() {
        let result = RsaKeyProvider::with_minimum(2048, 3072);
        assert!(matches!(result, Err(Error::KeyGen(msg)) if msg.contains("3072")));
        assert_eq!(RsaKeyProvider::with_minimum(3072, 3072).unwrap().bits(), 3072);
    }

    #[test]
    fn rsa_above_maximum_rejected() {
        let result = RsaKeyProvider::new(MAX_RSA_BITS + 1);
        assert!(matches!(result, Err(Error::KeyGen(msg)) if msg.contains("maximum")));
    }

    #[test]
    fn ecdsa_key_round_trips_through_pem() {
        let key = EcdsaKeyProvider.generate().unwrap();
        assert_eq!(key.algorithm(), KeyAlgorithm::EcdsaP256);

        let pem = key.pem();
        assert!(pem.contains("BEGIN PRIVATE KEY"));

        let loaded = PrivateKey::from_pem(&pem, "key.pem").unwrap();
        assert_eq!(loaded.der(), key.der());
    }

    #[test]
    fn rsa_key_generation_and_pkcs1_import() {
        let provider = RsaKeyProvider::new(2048).unwrap();
        let key = provider.generate().unwrap();
        assert!(key.key_pair().is_ok());
        assert_eq!(key.algorithm(), KeyAlgorithm::Rsa);

        let rsa = RsaPrivateKey::from_pkcs8_der(key.der()).unwrap();
        let pkcs1 = rsa.to_pkcs1_der().unwrap();
        let text = pem::encode(pem::RSA_PRIVATE_KEY, pkcs1.as_bytes());

        let loaded = PrivateKey::from_pem(&text, "legacy.pem").unwrap();
        assert_eq!(loaded.algorithm(), KeyAlgorithm::Rsa);
    }

    #[test]
    fn non_key_block_rejected() {
        let text = pem::encode(pem::CERTIFICATE, b"not a key");
        let result = PrivateKey::from_pem(&text, "cert.pem");
        assert!(matches!(result, Err(Error::Parse(msg)) if msg.contains("cert.pem")));
    }

    #[test]
    fn missing_block_is_decode_error() {
        let result = PrivateKey::from_pem("garbage", "key.pem");
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn debug_redacts_key() {
        let key = EcdsaKeyProvider.generate().unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
    }
}
