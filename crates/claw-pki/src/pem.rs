//! PEM codec boundary.
//!
//! Thin wrapper over the `pem` crate that fixes the output format (LF line
//! endings, 64-column body) and maps failures into [`Error::Decode`].

use ::pem::{EncodeConfig, LineEnding, Pem};

use crate::error::{Error, Result};

/// Label of an X.509 certificate block.
pub const CERTIFICATE: &str = "CERTIFICATE";
/// Label of a PKCS#10 certificate request block.
pub const CERTIFICATE_REQUEST: &str = "CERTIFICATE REQUEST";
/// Label of a PKCS#8 private key block.
pub const PRIVATE_KEY: &str = "PRIVATE KEY";
/// Label of a PKCS#1 RSA private key block.
pub const RSA_PRIVATE_KEY: &str = "RSA PRIVATE KEY";

const ENCODE_CONFIG: EncodeConfig = EncodeConfig::new().set_line_ending(LineEnding::LF);

/// A decoded PEM block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemBlock {
    label: String,
    der: Vec<u8>,
}

impl PemBlock {
    /// Creates a block from a label and DER bytes.
    #[must_use]
    pub fn new(label: impl Into<String>, der: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            der,
        }
    }

    /// Returns the block label, e.g. `CERTIFICATE`.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the DER payload.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Consumes the block, returning the DER payload.
    #[must_use]
    pub fn into_der(self) -> Vec<u8> {
        self.der
    }

    /// Re-encodes the block as PEM text.
    #[must_use]
    pub fn encode(&self) -> String {
        encode(&self.label, &self.der)
    }
}

impl From<Pem> for PemBlock {
    fn from(pem: Pem) -> Self {
        Self {
            label: pem.tag().to_string(),
            der: pem.into_contents(),
        }
    }
}

/// Encodes DER bytes as a PEM block with the given label.
#[must_use]
pub fn encode(label: &str, der: &[u8]) -> String {
    ::pem::encode_config(&Pem::new(label, der.to_vec()), ENCODE_CONFIG)
}

/// Decodes the first PEM block in `text`.
///
/// # Errors
///
/// Returns [`Error::Decode`] if no well-formed block is present.
pub fn decode(text: &str) -> Result<PemBlock> {
    ::pem::parse(text)
        .map(PemBlock::from)
        .map_err(|e| Error::Decode(format!("no PEM block found: {e}")))
}

/// Decodes every PEM block in `text`, in order.
///
/// # Errors
///
/// Returns [`Error::Decode`] if a block is malformed.
pub fn decode_all(text: &str) -> Result<Vec<PemBlock>> {
    ::pem::parse_many(text)
        .map(|blocks| blocks.into_iter().map(PemBlock::from).collect())
        .map_err(|e| Error::Decode(format!("malformed PEM content: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_wraps_at_64_columns() {
        let text = encode(CERTIFICATE, &[0xAB; 100]);
        assert!(text.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(text.ends_with("-----END CERTIFICATE-----\n"));
        assert!(!text.contains('\r'));
        assert!(text.lines().all(|line| line.len() <= 64));
    }

    #[test]
    fn decode_reads_first_block() {
        let text = format!(
            "{}{}",
            encode(CERTIFICATE, b"first"),
            encode(CERTIFICATE, b"second")
        );
        let block = decode(&text).unwrap();
        assert_eq!(block.label(), CERTIFICATE);
        assert_eq!(block.der(), b"first");
    }

    #[test]
    fn decode_without_block_fails() {
        let result = decode("this is not PEM");
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn decode_all_keeps_order() {
        let text = format!(
            "junk before\n{}{}",
            encode(CERTIFICATE, b"one"),
            encode(PRIVATE_KEY, b"two")
        );
        let blocks = decode_all(&text).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].der(), b"one");
        assert_eq!(blocks[1].label(), PRIVATE_KEY);
    }

    proptest! {
        #[test]
        fn canonical_blocks_survive_decode_encode(
            der in proptest::collection::vec(any::<u8>(), 1..512),
            label in prop::sample::select(vec![CERTIFICATE, CERTIFICATE_REQUEST, PRIVATE_KEY]),
        ) {
            let text = encode(label, &der);
            let block = decode(&text).unwrap();
            prop_assert_eq!(block.der(), der.as_slice());
            prop_assert_eq!(block.encode(), text);
        }
    }
}
