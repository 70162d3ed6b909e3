//! SPIFFE ID and trust domain types with the strict SPIFFE grammar.
//!
//! Parsing never percent-decodes: a `%XX` sequence is rejected as an invalid
//! character, so two distinct strings never name the same identity.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

const SCHEME_PREFIX: &str = "spiffe://";

/// Characters accepted in a trust domain name.
pub const VALID_TRUST_DOMAIN_CHARS: &str = "abcdefghijklmnopqrstuvwxyz0123456789-._";

/// Characters accepted in a path segment.
pub const VALID_PATH_SEGMENT_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-._";

/// A trust domain name such as `acme.io`, without scheme or path.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TrustDomain {
    name: String,
}

/// A validated `spiffe://<trust-domain><path>` identity.
///
/// The offset where the path starts is kept next to the string, so the
/// accessors and the `append_*`/`replace_*` operations never parse twice.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SpiffeId {
    id: String,
    path_idx: usize,
}

/// Why a string is not a SPIFFE ID or trust domain.
///
/// The messages are stable and can be compared verbatim.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum SpiffeIdError {
    /// The input is the empty string.
    #[error("Cannot be empty")]
    Empty,

    /// Nothing between `spiffe://` and the path, or an empty trust domain name.
    #[error("Trust domain is missing")]
    MissingTrustDomain,

    /// The input does not start with `spiffe://`.
    #[error("Scheme is missing or invalid")]
    WrongScheme,

    /// A trust domain character outside [`VALID_TRUST_DOMAIN_CHARS`].
    #[error(
        "Trust domain characters are limited to lowercase letters, numbers, dots, dashes, and \
         underscores"
    )]
    BadTrustDomainChar,

    /// A path character outside [`VALID_PATH_SEGMENT_CHARS`].
    #[error(
        "Path segment characters are limited to letters, numbers, dots, dashes, and underscores"
    )]
    BadPathSegmentChar,

    /// `//` inside the path.
    #[error("Path cannot contain empty segments")]
    EmptySegment,

    /// A `.` or `..` segment.
    #[error("Path cannot contain dot segments")]
    DotSegment,

    /// The path ends with `/`.
    #[error("Path cannot have a trailing slash")]
    TrailingSlash,

    /// A non-empty path that does not start with `/`.
    #[error("Path must have a leading slash")]
    NoLeadingSlash,
}

impl TrustDomain {
    /// Parses a bare trust domain name, or takes the trust domain out of a
    /// SPIFFE ID when the input contains `:/`.
    ///
    /// Routing anything with `:/` through the SPIFFE ID parser means a typo
    /// such as `spiffe:/acme.io` reports a scheme error.
    ///
    /// # Errors
    ///
    /// [`SpiffeIdError::MissingTrustDomain`] for empty input, otherwise the
    /// first grammar violation.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiffe_workload::spiffe_id::TrustDomain;
    ///
    /// let bare = TrustDomain::new("acme.io").unwrap();
    /// let from_id = TrustDomain::new("spiffe://acme.io/billing").unwrap();
    ///
    /// assert_eq!(bare, from_id);
    /// assert_eq!(bare.id_string(), "spiffe://acme.io");
    /// ```
    pub fn new(id_or_name: &str) -> Result<Self, SpiffeIdError> {
        if id_or_name.contains(":/") {
            return SpiffeId::new(id_or_name).map(|id| id.trust_domain());
        }
        check_trust_domain_name(id_or_name)?;
        Ok(Self {
            name: id_or_name.to_owned(),
        })
    }

    /// The trust domain of a SPIFFE ID given as a URL.
    ///
    /// # Errors
    ///
    /// Same as [`SpiffeId::from_uri`].
    pub fn from_uri(uri: &Url) -> Result<Self, SpiffeIdError> {
        SpiffeId::from_uri(uri).map(|id| id.trust_domain())
    }

    /// `spiffe://` followed by the name.
    pub fn id_string(&self) -> String {
        [SCHEME_PREFIX, self.name.as_str()].concat()
    }

    /// The trust domain's own identity, with an empty path.
    pub fn spiffe_id(&self) -> SpiffeId {
        SpiffeId::join(&self.name, "")
    }
}

impl AsRef<str> for TrustDomain {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl SpiffeId {
    /// Parses `spiffe://<trust-domain><path>`.
    ///
    /// # Errors
    ///
    /// The first grammar violation, checked in order: emptiness, scheme,
    /// trust domain, then the path from left to right.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiffe_workload::spiffe_id::SpiffeId;
    ///
    /// let id = SpiffeId::new("spiffe://acme.io/billing/worker").unwrap();
    /// assert_eq!(id.trust_domain_name(), "acme.io");
    /// assert_eq!(id.path(), "/billing/worker");
    /// ```
    pub fn new(id: &str) -> Result<Self, SpiffeIdError> {
        if id.is_empty() {
            return Err(SpiffeIdError::Empty);
        }
        let rest = id
            .strip_prefix(SCHEME_PREFIX)
            .ok_or(SpiffeIdError::WrongScheme)?;
        let (trust_domain, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));

        check_trust_domain_name(trust_domain)?;
        validate_path(path)?;

        Ok(Self {
            id: id.to_owned(),
            path_idx: id.len() - path.len(),
        })
    }

    /// Parses the serialized URL with the same grammar as [`SpiffeId::new`].
    ///
    /// # Errors
    ///
    /// As for [`SpiffeId::new`].
    pub fn from_uri(uri: &Url) -> Result<Self, SpiffeIdError> {
        Self::new(uri.as_str())
    }

    /// The identity `path` names inside `trust_domain`. An empty path gives
    /// the trust domain's own identity.
    ///
    /// # Errors
    ///
    /// When `path` breaks the path grammar.
    ///
    /// # Examples
    ///
    /// ```
    /// use spiffe_workload::spiffe_id::{SpiffeId, TrustDomain};
    ///
    /// let acme = TrustDomain::new("acme.io").unwrap();
    /// let id = SpiffeId::from_path(&acme, "/billing/worker").unwrap();
    /// assert_eq!(id.as_str(), "spiffe://acme.io/billing/worker");
    /// ```
    pub fn from_path(trust_domain: &TrustDomain, path: &str) -> Result<Self, SpiffeIdError> {
        validate_path(path)?;
        Ok(Self::join(&trust_domain.name, path))
    }

    /// Like [`SpiffeId::from_path`], with the path given as segments that
    /// must not contain `/`.
    ///
    /// # Errors
    ///
    /// When a segment is empty, a dot segment, or has a character outside
    /// [`VALID_PATH_SEGMENT_CHARS`].
    ///
    /// # Examples
    ///
    /// ```
    /// use spiffe_workload::spiffe_id::{SpiffeId, TrustDomain};
    ///
    /// let acme = TrustDomain::new("acme.io").unwrap();
    /// let id = SpiffeId::from_segments(&acme, &["billing", "worker"]).unwrap();
    /// assert_eq!(id.path(), "/billing/worker");
    /// ```
    pub fn from_segments(
        trust_domain: &TrustDomain,
        segments: &[&str],
    ) -> Result<Self, SpiffeIdError> {
        Ok(Self::join(&trust_domain.name, &join_segments(segments)?))
    }

    /// This identity with `path` added after the current path.
    ///
    /// # Errors
    ///
    /// When `path` breaks the path grammar.
    pub fn append_path(&self, path: &str) -> Result<Self, SpiffeIdError> {
        validate_path(path)?;
        Ok(self.extended(path))
    }

    /// This identity with `segments` added after the current path.
    ///
    /// # Errors
    ///
    /// When a segment is not valid.
    pub fn append_segments(&self, segments: &[&str]) -> Result<Self, SpiffeIdError> {
        Ok(self.extended(&join_segments(segments)?))
    }

    /// Same trust domain, new path.
    ///
    /// # Errors
    ///
    /// When `path` breaks the path grammar.
    pub fn replace_path(&self, path: &str) -> Result<Self, SpiffeIdError> {
        validate_path(path)?;
        Ok(Self::join(self.trust_domain_name(), path))
    }

    /// Same trust domain, path rebuilt from `segments`.
    ///
    /// # Errors
    ///
    /// When a segment is not valid.
    pub fn replace_segments(&self, segments: &[&str]) -> Result<Self, SpiffeIdError> {
        Ok(Self::join(self.trust_domain_name(), &join_segments(segments)?))
    }

    /// An owned copy of the trust domain.
    pub fn trust_domain(&self) -> TrustDomain {
        TrustDomain {
            name: self.trust_domain_name().to_owned(),
        }
    }

    /// The trust domain name, borrowed from the ID.
    pub fn trust_domain_name(&self) -> &str {
        &self.id[SCHEME_PREFIX.len()..self.path_idx]
    }

    /// Everything after the trust domain; empty for a trust domain identity.
    pub fn path(&self) -> &str {
        &self.id[self.path_idx..]
    }

    /// The whole ID.
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Whether the trust domain names are equal. Prefixes do not count, so
    /// `spiffe://acme.io.evil/x` is not a member of `acme.io`.
    pub fn is_member_of(&self, trust_domain: &TrustDomain) -> bool {
        self.trust_domain_name() == trust_domain.name
    }

    // Callers validate both parts first.
    fn join(trust_domain: &str, path: &str) -> Self {
        let id = [SCHEME_PREFIX, trust_domain, path].concat();
        Self {
            path_idx: id.len() - path.len(),
            id,
        }
    }

    fn extended(&self, suffix: &str) -> Self {
        Self {
            id: [self.id.as_str(), suffix].concat(),
            path_idx: self.path_idx,
        }
    }
}

impl AsRef<str> for SpiffeId {
    fn as_ref(&self) -> &str {
        &self.id
    }
}

// Display and the string conversions are the same for both types.
macro_rules! string_conversions {
    ($($ty:ty),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(AsRef::<str>::as_ref(self))
            }
        }

        impl FromStr for $ty {
            type Err = SpiffeIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<&str> for $ty {
            type Error = SpiffeIdError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = SpiffeIdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(&s)
            }
        }
    )*};
}

string_conversions!(TrustDomain, SpiffeId);

/// Checks a SPIFFE ID path: empty, or `/`-prefixed segments that are
/// non-empty, not `.` or `..`, and drawn from [`VALID_PATH_SEGMENT_CHARS`],
/// with no trailing slash.
///
/// # Errors
///
/// The first violation from the left.
pub fn validate_path(path: &str) -> Result<(), SpiffeIdError> {
    if path.is_empty() {
        return Ok(());
    }
    let rest = path.strip_prefix('/').ok_or(SpiffeIdError::NoLeadingSlash)?;

    let mut segments = rest.split('/').peekable();
    while let Some(segment) = segments.next() {
        match validate_path_segment(segment) {
            Err(SpiffeIdError::EmptySegment) if segments.peek().is_none() => {
                return Err(SpiffeIdError::TrailingSlash)
            }
            result => result?,
        }
    }
    Ok(())
}

/// Checks one path segment, given without slashes.
///
/// # Errors
///
/// [`SpiffeIdError::EmptySegment`], [`SpiffeIdError::DotSegment`] or
/// [`SpiffeIdError::BadPathSegmentChar`].
pub fn validate_path_segment(segment: &str) -> Result<(), SpiffeIdError> {
    match segment {
        "" => Err(SpiffeIdError::EmptySegment),
        "." | ".." => Err(SpiffeIdError::DotSegment),
        s if s.bytes().all(is_path_byte) => Ok(()),
        _ => Err(SpiffeIdError::BadPathSegmentChar),
    }
}

fn join_segments(segments: &[&str]) -> Result<String, SpiffeIdError> {
    let mut path = String::new();
    for segment in segments {
        validate_path_segment(segment)?;
        path.push('/');
        path.push_str(segment);
    }
    Ok(path)
}

fn check_trust_domain_name(name: &str) -> Result<(), SpiffeIdError> {
    if name.is_empty() {
        Err(SpiffeIdError::MissingTrustDomain)
    } else if !name.bytes().all(is_trust_domain_byte) {
        Err(SpiffeIdError::BadTrustDomainChar)
    } else {
        Ok(())
    }
}

// Non-ASCII input fails both byte checks, since every UTF-8 byte of a
// multi-byte character is >= 0x80.

fn is_trust_domain_byte(b: u8) -> bool {
    matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_')
}

fn is_path_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_')
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::SpiffeIdError::*;
    use super::*;

    fn td(name: &str) -> TrustDomain {
        TrustDomain::new(name).unwrap()
    }

    macro_rules! parses {
        ($($name:ident: $input:expr => ($trust_domain:expr, $path:expr),)*) => {
        $(
            #[test]
            fn $name() {
                let id = SpiffeId::from_str($input).unwrap();
                assert_eq!(id.trust_domain_name(), $trust_domain);
                assert_eq!(id.path(), $path);
                assert_eq!(id.as_str(), $input);
            }
        )*
        }
    }

    parses! {
        parses_bare_trust_domain: "spiffe://prod.acme-corp" => ("prod.acme-corp", ""),
        parses_nested_path: "spiffe://acme.io/ns/pay/sa/api" => ("acme.io", "/ns/pay/sa/api"),
        mixed_case_path: "spiffe://acme.io/Billing/Worker_2" => ("acme.io", "/Billing/Worker_2"),
        dot_prefix_is_not_dot_segment: "spiffe://acme.io/.hidden" => ("acme.io", "/.hidden"),
        dot_dot_prefix_is_not_dot_segment: "spiffe://acme.io/..v2" => ("acme.io", "/..v2"),
        three_dots_are_not_a_dot_segment: "spiffe://acme.io/a/..." => ("acme.io", "/a/..."),
        underscore_trust_domain: "spiffe://staging_1.acme.io/job" => ("staging_1.acme.io", "/job"),
    }

    macro_rules! rejects {
        ($($name:ident: $input:expr => $error:expr,)*) => {
        $(
            #[test]
            fn $name() {
                assert_eq!(SpiffeId::from_str($input).unwrap_err(), $error);
            }
        )*
        }
    }

    rejects! {
        rejects_empty: "" => Empty,
        rejects_host_port: "10.0.0.7:8081" => WrongScheme,
        rejects_https: "https://acme.io/api" => WrongScheme,
        rejects_uppercase_scheme: "Spiffe://acme.io/api" => WrongScheme,
        rejects_single_slash_scheme: "spiffe:/acme.io/api" => WrongScheme,
        rejects_missing_authority: "spiffe:///api" => MissingTrustDomain,
        rejects_scheme_only: "spiffe://" => MissingTrustDomain,
        rejects_query: "spiffe://acme.io/api?v=1" => BadPathSegmentChar,
        rejects_fragment: "spiffe://acme.io/api#top" => BadPathSegmentChar,
        rejects_port: "spiffe://acme.io:443/api" => BadTrustDomainChar,
        rejects_userinfo: "spiffe://admin@acme.io/api" => BadTrustDomainChar,
        rejects_uppercase_trust_domain: "spiffe://ACME.io/api" => BadTrustDomainChar,
        root_with_slash_is_trailing_slash: "spiffe://acme.io/" => TrailingSlash,
        double_slash_is_empty_segment: "spiffe://acme.io//" => EmptySegment,
        leading_double_slash_is_empty_segment: "spiffe://acme.io//api" => EmptySegment,
        inner_double_slash_is_empty_segment: "spiffe://acme.io/a//b" => EmptySegment,
        path_with_trailing_slash: "spiffe://acme.io/api/v1/" => TrailingSlash,
        rejects_leading_dot_segment: "spiffe://acme.io/./api" => DotSegment,
        rejects_parent_segment: "spiffe://acme.io/api/../admin" => DotSegment,
        rejects_final_parent_segment: "spiffe://acme.io/api/.." => DotSegment,
        percent_is_not_decoded_in_path: "spiffe://acme.io/%61pi" => BadPathSegmentChar,
        percent_is_not_decoded_in_trust_domain: "spiffe://%61cme.io/api" => BadTrustDomainChar,
        rejects_non_ascii_path: "spiffe://acme.io/caf\u{e9}" => BadPathSegmentChar,
    }

    #[test]
    fn error_messages_are_stable() {
        let cases = [
            ("", "Cannot be empty"),
            ("ftp://acme.io", "Scheme is missing or invalid"),
            ("spiffe:///job", "Trust domain is missing"),
            (
                "spiffe://acme!io",
                concat!(
                    "Trust domain characters are limited to lowercase letters, numbers, ",
                    "dots, dashes, and underscores"
                ),
            ),
            (
                "spiffe://acme.io/job*",
                concat!(
                    "Path segment characters are limited to letters, numbers, ",
                    "dots, dashes, and underscores"
                ),
            ),
            ("spiffe://acme.io/a//b", "Path cannot contain empty segments"),
            ("spiffe://acme.io/..", "Path cannot contain dot segments"),
            ("spiffe://acme.io/job/", "Path cannot have a trailing slash"),
        ];
        for (input, message) in cases {
            assert_eq!(SpiffeId::new(input).unwrap_err().to_string(), message, "{input}");
        }

        let err = SpiffeId::from_path(&td("acme.io"), "job").unwrap_err();
        assert_eq!(err.to_string(), "Path must have a leading slash");
    }

    #[test]
    fn every_byte_is_classified_in_paths_and_trust_domains() {
        for c in (0..=255_u8).map(char::from).filter(|c| *c != '/') {
            let with_path = format!("spiffe://acme.io/job{c}");
            match SpiffeId::new(&with_path) {
                Ok(id) => {
                    assert!(VALID_PATH_SEGMENT_CHARS.contains(c), "{c:?} accepted");
                    assert_eq!(id.as_str(), with_path);
                }
                Err(e) => {
                    assert!(!VALID_PATH_SEGMENT_CHARS.contains(c), "{c:?} rejected");
                    assert_eq!(e, SpiffeIdError::BadPathSegmentChar);
                }
            }

            let name = format!("acme{c}io");
            match TrustDomain::new(&name) {
                Ok(trust_domain) => {
                    assert!(VALID_TRUST_DOMAIN_CHARS.contains(c), "{c:?} accepted");
                    assert_eq!(trust_domain.to_string(), name);
                    assert_eq!(
                        SpiffeId::new(&format!("spiffe://{name}")).unwrap().trust_domain(),
                        trust_domain
                    );
                }
                Err(e) => {
                    assert!(!VALID_TRUST_DOMAIN_CHARS.contains(c), "{c:?} rejected");
                    assert_eq!(e, SpiffeIdError::BadTrustDomainChar);
                }
            }

            let segment = format!("v{c}");
            let from_segments = SpiffeId::from_segments(&td("acme.io"), &[segment.as_str()]);
            assert_eq!(
                from_segments.is_ok(),
                VALID_PATH_SEGMENT_CHARS.contains(c),
                "segment {segment:?}"
            );
        }
    }

    #[test]
    fn membership_compares_whole_trust_domain() {
        let id = SpiffeId::new("spiffe://acme.io/api").unwrap();

        assert!(id.is_member_of(&td("acme.io")));
        assert!(!id.is_member_of(&td("acme.io.evil")));
        assert!(!id.is_member_of(&td("io")));
    }

    #[test]
    fn conversions_from_strings_and_urls() {
        let owned = SpiffeId::try_from(String::from("spiffe://acme.io/api")).unwrap();
        let borrowed = SpiffeId::try_from("spiffe://acme.io/api").unwrap();
        assert_eq!(owned, borrowed);
        assert_eq!(owned.trust_domain(), td("acme.io"));

        let url = Url::parse("spiffe://acme.io/api").unwrap();
        assert_eq!(SpiffeId::from_uri(&url).unwrap(), owned);
        assert_eq!(TrustDomain::from_uri(&url).unwrap(), td("acme.io"));

        let url = Url::parse("https://acme.io/api").unwrap();
        assert_eq!(SpiffeId::from_uri(&url).unwrap_err(), SpiffeIdError::WrongScheme);
    }

    #[test]
    fn from_path_uses_path_grammar() {
        let trust_domain = td("acme.io");

        assert_eq!(
            SpiffeId::from_path(&trust_domain, "/ns/web").unwrap().as_str(),
            "spiffe://acme.io/ns/web"
        );
        assert_eq!(SpiffeId::from_path(&trust_domain, "").unwrap(), trust_domain.spiffe_id());

        for (path, error) in [
            ("ns/web", SpiffeIdError::NoLeadingSlash),
            ("/ns/", SpiffeIdError::TrailingSlash),
            ("/ns//web", SpiffeIdError::EmptySegment),
            ("/ns/./web", SpiffeIdError::DotSegment),
            ("/ns/w eb", SpiffeIdError::BadPathSegmentChar),
        ] {
            assert_eq!(SpiffeId::from_path(&trust_domain, path).unwrap_err(), error, "{path}");
        }
    }

    #[test]
    fn from_segments_checks_each_segment() {
        let trust_domain = td("acme.io");

        let id = SpiffeId::from_segments(&trust_domain, &["ns", "web", "..."]).unwrap();
        assert_eq!(id.path(), "/ns/web/...");

        for (segments, error) in [
            (&["ns", ""][..], SpiffeIdError::EmptySegment),
            (&[".."][..], SpiffeIdError::DotSegment),
            (&["ns/web"][..], SpiffeIdError::BadPathSegmentChar),
        ] {
            assert_eq!(SpiffeId::from_segments(&trust_domain, segments).unwrap_err(), error);
        }
    }

    #[test]
    fn derived_ids_keep_trust_domain_boundary() {
        let base = SpiffeId::new("spiffe://acme.io/ns").unwrap();

        let appended = base.append_path("/web/v1").unwrap();
        assert_eq!(appended.as_str(), "spiffe://acme.io/ns/web/v1");
        assert_eq!(appended.trust_domain_name(), "acme.io");
        assert_eq!(appended.path(), "/ns/web/v1");
        assert_eq!(base.append_path("").unwrap(), base);
        assert_eq!(base.append_path("web").unwrap_err(), SpiffeIdError::NoLeadingSlash);

        let appended = base.append_segments(&["db", "primary"]).unwrap();
        assert_eq!(appended.path(), "/ns/db/primary");
        assert_eq!(base.append_segments(&["db", "."]).unwrap_err(), SpiffeIdError::DotSegment);

        let replaced = base.replace_path("/other").unwrap();
        assert_eq!(replaced.as_str(), "spiffe://acme.io/other");
        assert_eq!(base.replace_path("/x/").unwrap_err(), SpiffeIdError::TrailingSlash);

        let replaced = base.replace_segments(&["a", "b"]).unwrap();
        assert_eq!(replaced.path(), "/a/b");
        assert_eq!(base.replace_segments(&[]).unwrap().as_str(), "spiffe://acme.io");
    }

    macro_rules! trust_domain_cases {
        ($($name:ident: $input:expr => $expected:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let parsed = TrustDomain::new($input).map(|td| td.to_string());
                assert_eq!(parsed, $expected);
            }
        )*
        }
    }

    trust_domain_cases! {
        trust_domain_from_name: "acme.io" => Ok("acme.io".to_owned()),
        trust_domain_from_id: "spiffe://acme.io" => Ok("acme.io".to_owned()),
        trust_domain_from_id_with_path: "spiffe://acme.io/ns/web" => Ok("acme.io".to_owned()),
        trust_domain_empty: "" => Err(MissingTrustDomain),
        trust_domain_other_scheme: "https://acme.io" => Err(WrongScheme),
        trust_domain_single_slash_scheme: "spiffe:/acme.io" => Err(WrongScheme),
        trust_domain_empty_scheme: "://acme.io" => Err(WrongScheme),
        trust_domain_with_port: "spiffe://acme.io:8443" => Err(BadTrustDomainChar),
        trust_domain_with_userinfo: "spiffe://ops:pw@acme.io" => Err(BadTrustDomainChar),
        trust_domain_with_space: "spiffe:// acme.io" => Err(BadTrustDomainChar),
        trust_domain_id_without_name: "spiffe:///ns" => Err(MissingTrustDomain),
        trust_domain_name_with_path: "acme.io/ns" => Err(BadTrustDomainChar),
    }

    #[test]
    fn trust_domain_id_forms() {
        let trust_domain = TrustDomain::from_str("acme.io").unwrap();

        assert_eq!(trust_domain.id_string(), "spiffe://acme.io");
        let id = trust_domain.spiffe_id();
        assert_eq!(id.as_str(), "spiffe://acme.io");
        assert_eq!(id.path(), "");
        assert!(id.is_member_of(&trust_domain));
    }
}
