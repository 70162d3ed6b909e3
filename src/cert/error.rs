//! Errors from decoding certificates and private keys.

use crate::spiffe_id::SpiffeIdError;
use x509_parser::error::X509Error;

/// A DER certificate could not be parsed or lacks what an SVID needs.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum CertificateError {
    /// A required extension, named by OID, is absent.
    #[error("required X.509 extension {0} is absent")]
    MissingX509Extension(String),

    /// The extension is present but its value does not decode.
    #[error("cannot decode the {0} extension")]
    UnparseableExtension(&'static str),

    /// The bytes are not a DER X.509 certificate.
    #[error("invalid DER X.509 certificate")]
    ParseX509Certificate(#[from] X509Error),

    /// No URI in the subject alternative names.
    #[error("certificate has no URI SAN")]
    MissingUriSan,

    /// An SVID carries exactly one URI SAN; this one has several.
    #[error("certificate has several URI SANs")]
    MultipleUriSans,

    /// The URI SAN does not parse as a SPIFFE ID.
    #[error("URI SAN is not a SPIFFE ID: {0}")]
    InvalidSpiffeId(#[from] SpiffeIdError),

    /// An SVID chain holds more certificates than allowed.
    #[error("SVID chain longer than {max} certificates")]
    TooManyCertificates {
        /// Chain length limit.
        max: usize,
    },
}

/// A private key is not PKCS#8 DER.
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum PrivateKeyError {
    /// Decoding error from the `pkcs8` crate.
    #[error("invalid PKCS#8 private key")]
    DecodePkcs8(pkcs8::Error),
}
