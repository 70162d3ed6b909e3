use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::{KeyUsage, ParsedExtension};
use x509_parser::oid_registry::{OID_X509_EXT_BASIC_CONSTRAINTS, OID_X509_EXT_KEY_USAGE};

use crate::cert::error::CertificateError;
use crate::cert::parsing::{
    extract_single_spiffe_id_from_uri_san, get_x509_extension,
    parse_der_encoded_bytes_as_x509_certificate,
};
use crate::cert::Certificate;
use crate::spiffe_id::SpiffeId;
use crate::svid::x509::X509SvidError;

/// Checks that `cert` can be an X.509-SVID leaf and returns its SPIFFE ID.
///
/// The leaf must sign (digitalSignature) and must not act as a CA.
pub(crate) fn validate_leaf_certificate(cert: &Certificate) -> Result<SpiffeId, X509SvidError> {
    let x509 = parse_der_encoded_bytes_as_x509_certificate(cert.as_bytes())?;

    let usage = key_usage(&x509)?;
    if !usage.digital_signature() {
        return Err(X509SvidError::LeafCertificateMissingDigitalSignature);
    }
    if usage.crl_sign() {
        return Err(X509SvidError::LeafCertificateHasCrlSign);
    }
    if usage.key_cert_sign() {
        return Err(X509SvidError::LeafCertificateHasKeyCertSign);
    }
    if is_ca(&x509)? {
        return Err(X509SvidError::LeafCertificateHasCaFlag);
    }

    Ok(extract_single_spiffe_id_from_uri_san(&x509)?)
}

/// Checks every certificate after the leaf: each must be a CA allowed to
/// sign certificates.
pub(crate) fn validate_signing_certificates(certs: &[Certificate]) -> Result<(), X509SvidError> {
    certs.iter().try_for_each(|cert| {
        let x509 = parse_der_encoded_bytes_as_x509_certificate(cert.as_bytes())?;
        if !is_ca(&x509)? {
            return Err(X509SvidError::SigningCertificateMissingCaFlag);
        }
        if !key_usage(&x509)?.key_cert_sign() {
            return Err(X509SvidError::SigningCertificateMissingKeyCertSign);
        }
        Ok(())
    })
}

// Both extensions are mandatory in an SVID chain. One that is present but
// unparseable fails the check instead of being skipped.

fn is_ca(cert: &X509Certificate<'_>) -> Result<bool, CertificateError> {
    match get_x509_extension(cert, &OID_X509_EXT_BASIC_CONSTRAINTS)? {
        ParsedExtension::BasicConstraints(constraints) => Ok(constraints.ca),
        _ => Err(CertificateError::UnparseableExtension("BasicConstraints")),
    }
}

fn key_usage<'a>(cert: &'a X509Certificate<'_>) -> Result<&'a KeyUsage, CertificateError> {
    match get_x509_extension(cert, &OID_X509_EXT_KEY_USAGE)? {
        ParsedExtension::KeyUsage(usage) => Ok(usage),
        _ => Err(CertificateError::UnparseableExtension("KeyUsage")),
    }
}
