//! X.509-SVID types and chain verification.

mod validations;
pub mod verify;

use std::sync::Arc;

use crate::bundle::x509::X509Bundle;
use crate::bundle::BundleSource;
use crate::cert::error::{CertificateError, PrivateKeyError};
use crate::cert::parsing::to_certificate_vec;
use crate::cert::{Certificate, PrivateKey};
use crate::spiffe_id::SpiffeId;
use crate::svid::x509::validations::{validate_leaf_certificate, validate_signing_certificates};
pub use crate::svid::x509::verify::{verify, X509VerifyError};

/// A [SPIFFE X509-SVID](https://github.com/spiffe/spiffe/blob/main/standards/X509-SVID.md).
///
/// Holds the [`SpiffeId`], the certificate chain (leaf first) and the leaf's
/// private key as PKCS#8 DER. The Workload API may attach an operator `hint`
/// used to tell several SVIDs apart.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct X509Svid {
    spiffe_id: SpiffeId,
    cert_chain: Vec<Certificate>,
    private_key: PrivateKey,
    hint: Option<Arc<str>>,
}

/// Why a DER chain and key were refused as an [`X509Svid`].
#[derive(Debug, thiserror::Error, PartialEq)]
#[non_exhaustive]
pub enum X509SvidError {
    /// The chain holds no certificate.
    #[error("certificate chain is empty")]
    EmptyChain,

    /// The leaf is marked as a CA.
    #[error("leaf certificate is a CA")]
    LeafCertificateHasCaFlag,

    /// The leaf may sign CRLs.
    #[error("leaf certificate has the cRLSign key usage")]
    LeafCertificateHasCrlSign,

    /// The leaf may sign certificates.
    #[error("leaf certificate has the keyCertSign key usage")]
    LeafCertificateHasKeyCertSign,

    /// The leaf cannot sign.
    #[error("leaf certificate lacks the digitalSignature key usage")]
    LeafCertificateMissingDigitalSignature,

    /// An intermediate is not marked as a CA.
    #[error("intermediate certificate is not a CA")]
    SigningCertificateMissingCaFlag,

    /// An intermediate may not sign certificates.
    #[error("intermediate certificate lacks the keyCertSign key usage")]
    SigningCertificateMissingKeyCertSign,

    /// A certificate in the chain did not decode.
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// The key did not decode.
    #[error(transparent)]
    PrivateKey(#[from] PrivateKeyError),
}

impl X509Svid {
    /// Builds an SVID from concatenated DER certificates (leaf first) and the
    /// leaf's PKCS#8 DER key.
    ///
    /// # Errors
    ///
    /// Fails when the chain is empty or too long, a certificate does not
    /// decode, the leaf or an intermediate breaks the SVID profile, or the key
    /// is not PKCS#8.
    pub fn parse_from_der(
        cert_chain_der: &[u8],
        private_key_der: &[u8],
    ) -> Result<Self, X509SvidError> {
        let cert_chain = to_certificate_vec(cert_chain_der)?;

        let leaf = cert_chain.first().ok_or(X509SvidError::EmptyChain)?;

        let spiffe_id = validate_leaf_certificate(leaf)?;
        validate_signing_certificates(&cert_chain[1..])?;
        let private_key = PrivateKey::try_from(private_key_der)?;

        Ok(Self {
            spiffe_id,
            cert_chain,
            private_key,
            hint: None,
        })
    }

    /// Like [`X509Svid::parse_from_der`], attaching a non-empty Workload API hint.
    ///
    /// # Errors
    ///
    /// Same as [`X509Svid::parse_from_der`].
    pub fn parse_from_der_with_hint(
        cert_chain_der: &[u8],
        private_key_der: &[u8],
        hint: &str,
    ) -> Result<Self, X509SvidError> {
        let mut svid = Self::parse_from_der(cert_chain_der, private_key_der)?;
        if !hint.is_empty() {
            svid.hint = Some(Arc::from(hint));
        }
        Ok(svid)
    }

    /// Verifies this SVID's chain against the bundle of its trust domain.
    ///
    /// # Errors
    ///
    /// See [`verify`].
    pub fn verify<B>(&self, bundle_source: &B) -> Result<bool, X509VerifyError>
    where
        B: BundleSource<Item = X509Bundle>,
    {
        verify(self.leaf(), &self.cert_chain[1..], bundle_source)
    }

    /// The leaf's SPIFFE ID.
    pub const fn spiffe_id(&self) -> &SpiffeId {
        &self.spiffe_id
    }

    /// Leaf first, then intermediates.
    pub fn cert_chain(&self) -> &[Certificate] {
        &self.cert_chain
    }

    /// The end-entity certificate.
    pub fn leaf(&self) -> &Certificate {
        // Construction guarantees a non-empty chain.
        &self.cert_chain[0]
    }

    /// The leaf's key.
    pub const fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Returns the Workload API hint, if any.
    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }
}
