//! Internal parsing and validation helpers.

use crate::cert::error::CertificateError;
use crate::cert::Certificate;
use crate::spiffe_id::SpiffeId;
use x509_parser::certificate::X509Certificate;
use x509_parser::der_parser::oid::Oid;
use x509_parser::error::X509Error;
use x509_parser::extensions::ParsedExtension;
use x509_parser::nom::Err;
use x509_parser::oid_registry;
use x509_parser::prelude::GeneralName;

/// Maximum number of certificates accepted in an SVID chain.
///
/// Bundles are parsed without this bound since they may legitimately carry
/// many authorities.
const MAX_CERT_CHAIN_LENGTH: usize = 16;

/// Parses a concatenated chain of DER-encoded certificates, leaf first.
pub(crate) fn to_certificate_vec(
    cert_chain_der: &[u8],
) -> Result<Vec<Certificate>, CertificateError> {
    split_der_certificates(cert_chain_der, Some(MAX_CERT_CHAIN_LENGTH))
}

/// Parses a concatenated list of DER-encoded authorities.
pub(crate) fn to_certificate_vec_unbounded(
    cert_list_der: &[u8],
) -> Result<Vec<Certificate>, CertificateError> {
    split_der_certificates(cert_list_der, None)
}

fn split_der_certificates(
    der: &[u8],
    max: Option<usize>,
) -> Result<Vec<Certificate>, CertificateError> {
    let mut rest = der;
    let mut certs = Vec::new();

    while !rest.is_empty() {
        if let Some(max) = max {
            if certs.len() >= max {
                return Err(CertificateError::TooManyCertificates { max });
            }
        }

        let (new_rest, _) = x509_parser::parse_x509_certificate(rest).map_err(nom_to_error)?;

        let cert_len = rest.len() - new_rest.len();
        certs.push(Certificate(rest[..cert_len].to_vec()));

        rest = new_rest;
    }

    Ok(certs)
}

/// Parses the given DER-encoded bytes as an X.509 certificate.
pub(crate) fn parse_der_encoded_bytes_as_x509_certificate(
    der_bytes: &[u8],
) -> Result<X509Certificate<'_>, CertificateError> {
    x509_parser::parse_x509_certificate(der_bytes)
        .map(|(_, cert)| cert)
        .map_err(nom_to_error)
}

fn nom_to_error(e: Err<X509Error>) -> CertificateError {
    match e {
        Err::Incomplete(_) => CertificateError::ParseX509Certificate(X509Error::InvalidCertificate),
        Err::Error(err) | Err::Failure(err) => CertificateError::ParseX509Certificate(err),
    }
}

/// Returns the parsed X.509 extension for the provided OID, if present.
pub(crate) fn find_x509_extension<'a>(
    cert: &'a X509Certificate<'_>,
    oid: &Oid<'static>,
) -> Result<Option<&'a ParsedExtension<'a>>, CertificateError> {
    Ok(cert
        .tbs_certificate
        .get_extension_unique(oid)?
        .map(|ext| ext.parsed_extension()))
}

/// Returns the parsed X.509 extension for the provided OID.
///
/// Fails with [`CertificateError::MissingX509Extension`] if it is absent.
pub(crate) fn get_x509_extension<'a>(
    cert: &'a X509Certificate<'_>,
    oid: &Oid<'static>,
) -> Result<&'a ParsedExtension<'a>, CertificateError> {
    find_x509_extension(cert, oid)?
        .ok_or_else(|| CertificateError::MissingX509Extension(oid.to_id_string()))
}

/// Extracts the SPIFFE ID from the certificate's only URI SAN.
pub(crate) fn extract_single_spiffe_id_from_uri_san(
    cert: &X509Certificate<'_>,
) -> Result<SpiffeId, CertificateError> {
    let san = match find_x509_extension(cert, &oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME)? {
        None => return Err(CertificateError::MissingUriSan),
        Some(ParsedExtension::SubjectAlternativeName(san)) => san,
        Some(_) => return Err(CertificateError::UnparseableExtension("SubjectAlternativeName")),
    };

    let mut uris = san.general_names.iter().filter_map(|name| match name {
        GeneralName::URI(uri) => Some(*uri),
        _ => None,
    });

    let uri = uris.next().ok_or(CertificateError::MissingUriSan)?;
    if uris.next().is_some() {
        return Err(CertificateError::MultipleUriSans);
    }

    Ok(SpiffeId::new(uri)?)
}

/// Signing capabilities a certificate advertises.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SigningFlags {
    pub(crate) ca: bool,
    pub(crate) key_cert_sign: bool,
    pub(crate) crl_sign: bool,
}

/// Reads the CA flag and the signing key usages, treating absent extensions as unset.
pub(crate) fn signing_flags(cert: &X509Certificate<'_>) -> Result<SigningFlags, CertificateError> {
    let mut flags = SigningFlags::default();

    match find_x509_extension(cert, &oid_registry::OID_X509_EXT_BASIC_CONSTRAINTS)? {
        None => {}
        Some(ParsedExtension::BasicConstraints(b)) => flags.ca = b.ca,
        Some(_) => return Err(CertificateError::UnparseableExtension("BasicConstraints")),
    }

    match find_x509_extension(cert, &oid_registry::OID_X509_EXT_KEY_USAGE)? {
        None => {}
        Some(ParsedExtension::KeyUsage(k)) => {
            flags.key_cert_sign = k.key_cert_sign();
            flags.crl_sign = k.crl_sign();
        }
        Some(_) => return Err(CertificateError::UnparseableExtension("KeyUsage")),
    }

    Ok(flags)
}
