//! DER certificate and PKCS#8 key wrappers.
//!
//! Both types are checked when built, so holding one means the bytes parse.

use std::fmt;

use pkcs8::PrivateKeyInfo;
use zeroize::Zeroize;

use crate::cert::error::{CertificateError, PrivateKeyError};
use crate::cert::parsing::{
    extract_single_spiffe_id_from_uri_san, parse_der_encoded_bytes_as_x509_certificate,
};
use crate::spiffe_id::SpiffeId;

pub mod error;
pub(crate) mod parsing;

/// One DER-encoded X.509 certificate.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Certificate(Vec<u8>);

impl Certificate {
    fn from_der(der: Vec<u8>) -> Result<Self, CertificateError> {
        parse_der_encoded_bytes_as_x509_certificate(&der)?;
        Ok(Self(der))
    }

    /// The DER bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The SPIFFE ID carried in the certificate's only URI SAN.
    ///
    /// # Errors
    ///
    /// [`CertificateError::MissingUriSan`], [`CertificateError::MultipleUriSans`]
    /// or [`CertificateError::InvalidSpiffeId`] when the SAN is not a single
    /// SPIFFE ID.
    pub fn spiffe_id(&self) -> Result<SpiffeId, CertificateError> {
        extract_single_spiffe_id_from_uri_san(&parse_der_encoded_bytes_as_x509_certificate(
            &self.0,
        )?)
    }
}

impl AsRef<[u8]> for Certificate {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl TryFrom<Vec<u8>> for Certificate {
    type Error = CertificateError;

    fn try_from(der: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_der(der)
    }
}

impl TryFrom<&[u8]> for Certificate {
    type Error = CertificateError;

    fn try_from(der: &[u8]) -> Result<Self, Self::Error> {
        Self::from_der(der.to_vec())
    }
}

/// A PKCS#8 DER private key. Wiped from memory on drop.
#[derive(Clone, Eq, PartialEq, Zeroize)]
#[zeroize(drop)]
pub struct PrivateKey(Vec<u8>);

impl PrivateKey {
    /// The DER bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for PrivateKey {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl TryFrom<&[u8]> for PrivateKey {
    type Error = PrivateKeyError;

    fn try_from(der: &[u8]) -> Result<Self, Self::Error> {
        match PrivateKeyInfo::try_from(der) {
            Ok(_) => Ok(Self(der.to_vec())),
            Err(e) => Err(PrivateKeyError::DecodePkcs8(e)),
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({} bytes)", self.0.len())
    }
}
