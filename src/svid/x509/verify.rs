//! X.509-SVID chain verification against a trust bundle.
//!
//! The leaf is checked for SVID shape first (single SPIFFE URI SAN, no CA
//! flag, no signing key usages). The chain is then built with `rustls`'
//! WebPKI verifiers using only the bundle authorities of the leaf's trust
//! domain as anchors. Workload API bundles carry no revocation data, so no
//! CRL or OCSP checks are made.
//!
//! WebPKI always checks extended key usage when the extension is present.
//! A leaf is accepted if its chain builds for either server or client
//! authentication; an SVID is not tied to one side of a connection.

use std::sync::Arc;

use rustls::client::verify_server_cert_signed_by_trust_anchor;
use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::server::danger::ClientCertVerifier;
use rustls::server::{ParsedCertificate, WebPkiClientVerifier};
use rustls::RootCertStore;

use crate::bundle::x509::X509Bundle;
use crate::bundle::BundleSource;
use crate::cert::error::CertificateError;
use crate::cert::parsing::{
    extract_single_spiffe_id_from_uri_san, parse_der_encoded_bytes_as_x509_certificate,
    signing_flags,
};
use crate::cert::Certificate;
use crate::spiffe_id::TrustDomain;

/// Errors raised by [`verify`] before a chain is built.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum X509VerifyError {
    /// The leaf could not be parsed or has no single valid SPIFFE URI SAN.
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// The leaf is marked as a CA.
    #[error("leaf certificate is a CA")]
    LeafCertificateHasCaFlag,

    /// The leaf has the `keyCertSign` key usage.
    #[error("leaf certificate has the keyCertSign key usage")]
    LeafCertificateHasKeyCertSign,

    /// The leaf has the `cRLSign` key usage.
    #[error("leaf certificate has the cRLSign key usage")]
    LeafCertificateHasCrlSign,

    /// No X.509 bundle exists for the leaf's trust domain.
    #[error("no X.509 bundle found for trust domain: {0}")]
    BundleNotFound(TrustDomain),

    /// The bundle source failed.
    #[error("bundle source error")]
    BundleSource(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Verifies `leaf` and `intermediates` against the X.509 bundle of the leaf's trust domain.
///
/// Returns `Ok(true)` if a chain to one of the bundle authorities could be
/// built, `Ok(false)` otherwise. An empty bundle never verifies.
///
/// # Errors
///
/// Returns [`X509VerifyError`] if the leaf is not a valid X.509-SVID leaf, if
/// no bundle exists for its trust domain, or if the bundle source fails. These
/// checks all happen before chain building.
pub fn verify<B>(
    leaf: &Certificate,
    intermediates: &[Certificate],
    bundle_source: &B,
) -> Result<bool, X509VerifyError>
where
    B: BundleSource<Item = X509Bundle>,
{
    let x509 = parse_der_encoded_bytes_as_x509_certificate(leaf.as_bytes())?;
    let spiffe_id = extract_single_spiffe_id_from_uri_san(&x509)?;

    let flags = signing_flags(&x509)?;
    if flags.ca {
        return Err(X509VerifyError::LeafCertificateHasCaFlag);
    }
    if flags.key_cert_sign {
        return Err(X509VerifyError::LeafCertificateHasKeyCertSign);
    }
    if flags.crl_sign {
        return Err(X509VerifyError::LeafCertificateHasCrlSign);
    }

    let trust_domain = spiffe_id.trust_domain();
    let bundle = bundle_source
        .bundle_for_trust_domain(&trust_domain)
        .map_err(|e| X509VerifyError::BundleSource(Box::new(e)))?
        .ok_or(X509VerifyError::BundleNotFound(trust_domain))?;

    Ok(chain_verifies(&bundle, leaf, intermediates))
}

fn chain_verifies(bundle: &X509Bundle, leaf: &Certificate, intermediates: &[Certificate]) -> bool {
    let mut roots = RootCertStore::empty();
    roots.add_parsable_certificates(
        bundle
            .authorities()
            .iter()
            .map(|c| CertificateDer::from(c.as_bytes().to_vec())),
    );
    if roots.is_empty() {
        return false;
    }

    let leaf = CertificateDer::from(leaf.as_bytes());
    let intermediates: Vec<CertificateDer<'_>> = intermediates
        .iter()
        .map(|c| CertificateDer::from(c.as_bytes()))
        .collect();
    let now = UnixTime::now();
    let provider = rustls::crypto::ring::default_provider();

    let Ok(parsed) = ParsedCertificate::try_from(&leaf) else {
        return false;
    };
    let server_auth = verify_server_cert_signed_by_trust_anchor(
        &parsed,
        &roots,
        &intermediates,
        now,
        provider.signature_verification_algorithms.all,
    );
    if server_auth.is_ok() {
        return true;
    }

    let Ok(verifier) =
        WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::new(provider)).build()
    else {
        return false;
    };
    verifier.verify_client_cert(&leaf, &intermediates, now).is_ok()
}
