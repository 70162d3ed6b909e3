//! Certificate fixtures generated at test time.

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509};

use crate::cert::Certificate;

const VALIDITY_SECS: i64 = 3600;

fn new_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn name(cn: &str) -> X509Name {
    let mut builder = X509NameBuilder::new().unwrap();
    builder.append_entry_by_text("CN", cn).unwrap();
    builder.build()
}

fn serial() -> Asn1Integer {
    let mut bn = BigNum::new().unwrap();
    bn.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    bn.to_asn1_integer().unwrap()
}

fn base_builder(subject: &X509Name, key: &PKey<Private>) -> X509Builder {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial()).unwrap();
    builder.set_subject_name(subject).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::from_unix(now - VALIDITY_SECS).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::from_unix(now + VALIDITY_SECS).unwrap())
        .unwrap();
    builder
}

/// A signing authority: a self-signed root or an intermediate.
pub(crate) struct TestCa {
    pub(crate) cert: X509,
    key: PKey<Private>,
}

/// Extensions of a generated leaf certificate.
pub(crate) struct LeafOptions<'a> {
    pub(crate) uris: Vec<&'a str>,
    pub(crate) ca: bool,
    pub(crate) key_cert_sign: bool,
    pub(crate) crl_sign: bool,
    pub(crate) client_auth: bool,
    pub(crate) server_auth: bool,
}

impl<'a> LeafOptions<'a> {
    pub(crate) fn spiffe(id: &'a str) -> Self {
        Self {
            uris: vec![id],
            ca: false,
            key_cert_sign: false,
            crl_sign: false,
            client_auth: true,
            server_auth: true,
        }
    }
}

/// A leaf certificate and its private key.
pub(crate) struct TestLeaf {
    pub(crate) cert: X509,
    pub(crate) key: PKey<Private>,
}

impl TestLeaf {
    pub(crate) fn certificate(&self) -> Certificate {
        Certificate::try_from(self.cert.to_der().unwrap()).unwrap()
    }

    pub(crate) fn key_der(&self) -> Vec<u8> {
        self.key.private_key_to_pkcs8().unwrap()
    }
}

impl TestCa {
    pub(crate) fn root(cn: &str) -> Self {
        let key = new_key();
        let subject = name(cn);

        let mut builder = base_builder(&subject, &key);
        builder.set_issuer_name(&subject).unwrap();
        Self::add_ca_extensions(&mut builder);
        builder.sign(&key, MessageDigest::sha256()).unwrap();

        Self {
            cert: builder.build(),
            key,
        }
    }

    pub(crate) fn intermediate(&self, cn: &str) -> Self {
        let key = new_key();

        let mut builder = base_builder(&name(cn), &key);
        builder.set_issuer_name(self.cert.subject_name()).unwrap();
        Self::add_ca_extensions(&mut builder);
        builder.sign(&self.key, MessageDigest::sha256()).unwrap();

        Self {
            cert: builder.build(),
            key,
        }
    }

    pub(crate) fn leaf(&self, spiffe_id: &str) -> TestLeaf {
        self.leaf_with(&LeafOptions::spiffe(spiffe_id))
    }

    pub(crate) fn leaf_with(&self, options: &LeafOptions<'_>) -> TestLeaf {
        let key = new_key();

        let mut builder = base_builder(&name("leaf"), &key);
        builder.set_issuer_name(self.cert.subject_name()).unwrap();

        let mut basic_constraints = BasicConstraints::new();
        basic_constraints.critical();
        if options.ca {
            basic_constraints.ca();
        }
        builder
            .append_extension(basic_constraints.build().unwrap())
            .unwrap();

        let mut key_usage = KeyUsage::new();
        key_usage.critical().digital_signature();
        if options.key_cert_sign {
            key_usage.key_cert_sign();
        }
        if options.crl_sign {
            key_usage.crl_sign();
        }
        builder.append_extension(key_usage.build().unwrap()).unwrap();

        if options.client_auth || options.server_auth {
            let mut eku = ExtendedKeyUsage::new();
            if options.client_auth {
                eku.client_auth();
            }
            if options.server_auth {
                eku.server_auth();
            }
            builder.append_extension(eku.build().unwrap()).unwrap();
        }

        let mut san = SubjectAlternativeName::new();
        if options.uris.is_empty() {
            san.dns("leaf.example.org");
        }
        for uri in &options.uris {
            san.uri(uri);
        }
        let san = san
            .build(&builder.x509v3_context(Some(&self.cert), None))
            .unwrap();
        builder.append_extension(san).unwrap();

        builder.sign(&self.key, MessageDigest::sha256()).unwrap();

        TestLeaf {
            cert: builder.build(),
            key,
        }
    }

    pub(crate) fn certificate(&self) -> Certificate {
        Certificate::try_from(self.cert.to_der().unwrap()).unwrap()
    }

    pub(crate) fn der(&self) -> Vec<u8> {
        self.cert.to_der().unwrap()
    }

    fn add_ca_extensions(builder: &mut X509Builder) {
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder
            .append_extension(
                KeyUsage::new()
                    .critical()
                    .key_cert_sign()
                    .crl_sign()
                    .digital_signature()
                    .build()
                    .unwrap(),
            )
            .unwrap();
    }
}

/// An unsigned compact JWT with `sub`, `aud` and a future `exp`.
pub(crate) fn unsigned_jwt(sub: &str, audience: &[&str]) -> String {
    use base64ct::{Base64UrlUnpadded, Encoding as _};

    let header = r#"{"alg":"ES256","typ":"JWT","kid":"k1"}"#;
    let claims = serde_json::json!({
        "sub": sub,
        "aud": audience,
        "exp": time::OffsetDateTime::now_utc().unix_timestamp() + 600,
    });

    format!(
        "{}.{}.sig",
        Base64UrlUnpadded::encode_string(header.as_bytes()),
        Base64UrlUnpadded::encode_string(claims.to_string().as_bytes()),
    )
}

/// A `FetchX509SVID` message with one SVID per ID, all issued by `ca`.
pub(crate) fn svid_response(
    ca: &TestCa,
    ids: &[&str],
) -> crate::workload_api::pb::X509svidResponse {
    use crate::workload_api::pb::{X509svid, X509svidResponse};
    use prost::bytes::Bytes;

    X509svidResponse {
        svids: ids
            .iter()
            .map(|id| {
                let leaf = ca.leaf(id);
                X509svid {
                    spiffe_id: (*id).to_owned(),
                    x509_svid: Bytes::from(leaf.cert.to_der().unwrap()),
                    x509_svid_key: Bytes::from(leaf.key_der()),
                    bundle: Bytes::from(ca.der()),
                    hint: String::new(),
                }
            })
            .collect(),
        ..Default::default()
    }
}

/// A `FetchJWTBundles` message with an empty JWKS per trust domain.
pub(crate) fn jwt_bundles_response(
    trust_domains: &[&str],
) -> crate::workload_api::pb::JwtBundlesResponse {
    crate::workload_api::pb::JwtBundlesResponse {
        bundles: trust_domains
            .iter()
            .map(|td| {
                (
                    (*td).to_owned(),
                    prost::bytes::Bytes::from_static(br#"{"keys":[]}"#),
                )
            })
            .collect(),
    }
}

/// A `FetchX509Bundles` message with a fresh root per trust domain.
pub(crate) fn x509_bundles_response(
    trust_domains: &[&str],
) -> crate::workload_api::pb::X509BundlesResponse {
    crate::workload_api::pb::X509BundlesResponse {
        crl: vec![],
        bundles: trust_domains
            .iter()
            .map(|td| {
                (
                    (*td).to_owned(),
                    prost::bytes::Bytes::from(TestCa::root(td).der()),
                )
            })
            .collect(),
    }
}

pub(crate) use fake::{FakeTransport, Recorded, RecordingWatcher, Script};

mod fake {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use tokio_stream::StreamExt as _;

    use crate::backoff::Backoff;
    use crate::workload_api::error::WorkloadApiError;
    use crate::workload_api::pb::{
        JwtBundlesResponse, JwtsvidRequest, JwtsvidResponse, ValidateJwtsvidRequest,
        ValidateJwtsvidResponse, X509BundlesResponse, X509svidResponse,
    };
    use crate::workload_api::transport::{RpcFuture, RpcStream, WorkloadApiTransport};
    use crate::workload_api::Watcher;

    /// What one opened stream does.
    pub(crate) enum Script<R> {
        /// Opening the stream fails.
        Reject(tonic::Status),
        /// The stream yields these items, then stays open.
        Send(Vec<Result<R, tonic::Status>>),
        /// The stream yields these items, then ends.
        SendAndClose(Vec<Result<R, tonic::Status>>),
    }

    type Queue<R> = Mutex<VecDeque<Script<R>>>;

    /// A transport replaying scripted streams. Once a queue is exhausted,
    /// further streams stay open without messages.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        x509_svid: Queue<X509svidResponse>,
        x509_bundles: Queue<X509BundlesResponse>,
        jwt_bundles: Queue<JwtBundlesResponse>,
        jwt_svid: Mutex<VecDeque<Result<JwtsvidResponse, tonic::Status>>>,
        validate: Mutex<VecDeque<Result<ValidateJwtsvidResponse, tonic::Status>>>,
        pub(crate) jwt_requests: Mutex<Vec<JwtsvidRequest>>,
        watched_backoff: Option<Arc<Backoff>>,
        pub(crate) attempts_at_open: Mutex<Vec<u32>>,
        opened: Mutex<Vec<&'static str>>,
    }

    impl FakeTransport {
        /// Records `backoff.attempt()` every time a stream is opened.
        pub(crate) fn watching_backoff(backoff: Arc<Backoff>) -> Self {
            Self {
                watched_backoff: Some(backoff),
                ..Self::default()
            }
        }

        pub(crate) fn push_x509_svid(&self, script: Script<X509svidResponse>) {
            self.x509_svid.lock().unwrap().push_back(script);
        }

        pub(crate) fn push_x509_bundles(&self, script: Script<X509BundlesResponse>) {
            self.x509_bundles.lock().unwrap().push_back(script);
        }

        pub(crate) fn push_jwt_bundles(&self, script: Script<JwtBundlesResponse>) {
            self.jwt_bundles.lock().unwrap().push_back(script);
        }

        pub(crate) fn push_jwt_svid(&self, response: Result<JwtsvidResponse, tonic::Status>) {
            self.jwt_svid.lock().unwrap().push_back(response);
        }

        pub(crate) fn push_validate(
            &self,
            response: Result<ValidateJwtsvidResponse, tonic::Status>,
        ) {
            self.validate.lock().unwrap().push_back(response);
        }

        /// How many streams of `rpc` have been opened.
        pub(crate) fn opens(&self, rpc: &str) -> usize {
            self.opened.lock().unwrap().iter().filter(|r| **r == rpc).count()
        }

        fn open<R: Send + 'static>(
            &self,
            rpc: &'static str,
            queue: &Queue<R>,
        ) -> RpcFuture<'_, RpcStream<R>> {
            self.opened.lock().unwrap().push(rpc);
            if let Some(backoff) = &self.watched_backoff {
                self.attempts_at_open.lock().unwrap().push(backoff.attempt());
            }

            let script = queue.lock().unwrap().pop_front();
            let result = match script {
                Some(Script::Reject(status)) => Err(status),
                Some(Script::Send(items)) => Ok(Box::pin(
                    tokio_stream::iter(items).chain(tokio_stream::pending()),
                ) as RpcStream<R>),
                Some(Script::SendAndClose(items)) => {
                    Ok(Box::pin(tokio_stream::iter(items)) as RpcStream<R>)
                }
                None => Ok(Box::pin(tokio_stream::pending()) as RpcStream<R>),
            };
            Box::pin(async move { result })
        }
    }

    impl WorkloadApiTransport for FakeTransport {
        fn fetch_x509_svid(&self) -> RpcFuture<'_, RpcStream<X509svidResponse>> {
            self.open("x509_svid", &self.x509_svid)
        }

        fn fetch_x509_bundles(&self) -> RpcFuture<'_, RpcStream<X509BundlesResponse>> {
            self.open("x509_bundles", &self.x509_bundles)
        }

        fn fetch_jwt_bundles(&self) -> RpcFuture<'_, RpcStream<JwtBundlesResponse>> {
            self.open("jwt_bundles", &self.jwt_bundles)
        }

        fn fetch_jwt_svid(&self, request: JwtsvidRequest) -> RpcFuture<'_, JwtsvidResponse> {
            self.jwt_requests.lock().unwrap().push(request);
            let response = self
                .jwt_svid
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(tonic::Status::unavailable("no scripted response")));
            Box::pin(async move { response })
        }

        fn validate_jwt_svid(
            &self,
            _request: ValidateJwtsvidRequest,
        ) -> RpcFuture<'_, ValidateJwtsvidResponse> {
            let response = self
                .validate
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(tonic::Status::unavailable("no scripted response")));
            Box::pin(async move { response })
        }
    }

    impl WorkloadApiTransport for Arc<FakeTransport> {
        fn fetch_x509_svid(&self) -> RpcFuture<'_, RpcStream<X509svidResponse>> {
            self.as_ref().fetch_x509_svid()
        }

        fn fetch_x509_bundles(&self) -> RpcFuture<'_, RpcStream<X509BundlesResponse>> {
            self.as_ref().fetch_x509_bundles()
        }

        fn fetch_jwt_bundles(&self) -> RpcFuture<'_, RpcStream<JwtBundlesResponse>> {
            self.as_ref().fetch_jwt_bundles()
        }

        fn fetch_jwt_svid(&self, request: JwtsvidRequest) -> RpcFuture<'_, JwtsvidResponse> {
            self.as_ref().fetch_jwt_svid(request)
        }

        fn validate_jwt_svid(
            &self,
            request: ValidateJwtsvidRequest,
        ) -> RpcFuture<'_, ValidateJwtsvidResponse> {
            self.as_ref().validate_jwt_svid(request)
        }
    }

    /// One watcher callback.
    #[derive(Debug)]
    pub(crate) enum Recorded<T> {
        Update(T),
        Error(String),
    }

    /// A watcher that records callbacks and wakes waiters on each one.
    pub(crate) struct RecordingWatcher<T> {
        events: Mutex<Vec<Recorded<T>>>,
        notify: tokio::sync::Notify,
    }

    impl<T> Default for RecordingWatcher<T> {
        fn default() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                notify: tokio::sync::Notify::new(),
            }
        }
    }

    impl<T: Clone> RecordingWatcher<T> {
        pub(crate) fn events(&self) -> Vec<Recorded<T>> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .map(|e| match e {
                    Recorded::Update(t) => Recorded::Update(t.clone()),
                    Recorded::Error(s) => Recorded::Error(s.clone()),
                })
                .collect()
        }

        /// Waits until at least `n` callbacks have been recorded.
        pub(crate) async fn wait_for(&self, n: usize) {
            loop {
                let notified = self.notify.notified();
                if self.events.lock().unwrap().len() >= n {
                    return;
                }
                notified.await;
            }
        }
    }

    impl<T: Send> Watcher<T> for RecordingWatcher<T> {
        fn on_update(&self, update: T) {
            self.events.lock().unwrap().push(Recorded::Update(update));
            self.notify.notify_waiters();
        }

        fn on_error(&self, error: &WorkloadApiError) {
            self.events
                .lock()
                .unwrap()
                .push(Recorded::Error(error.to_string()));
            self.notify.notify_waiters();
        }
    }
}
