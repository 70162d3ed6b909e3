//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use base64ct::{Base64UrlUnpadded, Encoding as _};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509};
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::pkcs8::EncodePrivateKey as _;
use p256::elliptic_curve::rand_core::OsRng;
use serde_json::json;

fn new_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn name(cn: &str) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    name.build()
}

fn builder(cn: &str, key: &PKey<Private>) -> X509Builder {

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&serial.to_asn1_integer().unwrap())
        .unwrap();
    builder.set_subject_name(&name(cn)).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(1).unwrap())
        .unwrap();
    builder
}

/// A self-signed root able to issue X.509-SVIDs.
pub struct Ca {
    pub cert: X509,
    key: PKey<Private>,
}

impl Ca {
    pub fn new(cn: &str) -> Self {
        let key = new_key();
        let mut builder = builder(cn, &key);
        builder.set_issuer_name(&name(cn)).unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();

        Self {
            cert: builder.build(),
            key,
        }
    }

    pub fn der(&self) -> Vec<u8> {
        self.cert.to_der().unwrap()
    }

    /// Returns `(leaf DER, PKCS#8 key DER)` for `spiffe_id`.
    pub fn issue(&self, spiffe_id: &str) -> (Vec<u8>, Vec<u8>) {
        let key = new_key();
        let mut builder = builder("workload", &key);
        builder.set_issuer_name(self.cert.subject_name()).unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().build().unwrap())
            .unwrap();
        builder
            .append_extension(KeyUsage::new().critical().digital_signature().build().unwrap())
            .unwrap();
        let san = SubjectAlternativeName::new()
            .uri(spiffe_id)
            .build(&builder.x509v3_context(Some(&self.cert), None))
            .unwrap();
        builder.append_extension(san).unwrap();
        builder.sign(&self.key, MessageDigest::sha256()).unwrap();

        (
            builder.build().to_der().unwrap(),
            key.private_key_to_pkcs8().unwrap(),
        )
    }
}

/// An ES256 JWT signing authority.
pub struct JwtSigner {
    pub kid: String,
    key: EncodingKey,
    jwks: Vec<u8>,
}

impl JwtSigner {
    pub fn new(kid: &str) -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let key = EncodingKey::from_ec_der(signing_key.to_pkcs8_der().unwrap().as_bytes());

        let point = signing_key.verifying_key().to_encoded_point(false);
        let jwks = serde_json::to_vec(&json!({
            "keys": [{
                "kty": "EC",
                "crv": "P-256",
                "x": Base64UrlUnpadded::encode_string(point.x().unwrap()),
                "y": Base64UrlUnpadded::encode_string(point.y().unwrap()),
                "kid": kid,
            }]
        }))
        .unwrap();

        Self {
            kid: kid.to_owned(),
            key,
            jwks,
        }
    }

    /// The JWKS document holding the public key.
    pub fn jwks(&self) -> &[u8] {
        &self.jwks
    }

    pub fn sign(&self, sub: &str, audience: &[&str]) -> String {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let mut header = Header::new(Algorithm::ES256);
        header.typ = Some("JWT".to_owned());
        header.kid = Some(self.kid.clone());

        encode(
            &header,
            &json!({ "sub": sub, "aud": audience, "exp": now + 300, "iat": now }),
            &self.key,
        )
        .unwrap()
    }
}
