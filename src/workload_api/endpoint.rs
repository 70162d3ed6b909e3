//! Workload API endpoint addresses.
//!
//! The agent socket is named by a URI, usually taken from the
//! `SPIFFE_ENDPOINT_SOCKET` environment variable:
//!
//! - `unix:///path/to/socket` or `unix:/path/to/socket`
//! - `tcp://1.2.3.4:8081` (the host must be an IP address)
//! - `npipe:name` (Windows named pipe `\\.\pipe\name`)

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

/// Environment variable holding the Workload API endpoint.
pub const SPIFFE_ENDPOINT_SOCKET_ENV: &str = "SPIFFE_ENDPOINT_SOCKET";

/// Parsed Workload API endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// UNIX domain socket.
    Unix(PathBuf),

    /// TCP address.
    Tcp {
        /// IP address of the agent.
        host: IpAddr,
        /// TCP port of the agent.
        port: u16,
    },

    /// Windows named pipe, by name (without the `\\.\pipe\` prefix).
    NamedPipe(String),
}

/// Why an endpoint URI was refused.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EndpointError {
    /// `SPIFFE_ENDPOINT_SOCKET` is unset or empty.
    #[error("{SPIFFE_ENDPOINT_SOCKET_ENV} is not set")]
    NotConfigured,

    /// Not a URI at all.
    #[error("endpoint is not a URI: {0}")]
    Parse(#[from] url::ParseError),

    /// A scheme other than `unix`, `tcp` or `npipe`.
    #[error("endpoint scheme must be unix, tcp or npipe")]
    InvalidScheme,

    /// `user:pass@` before the host.
    #[error("endpoint URI carries user info")]
    HasUserInfo,

    /// A `?query` part.
    #[error("endpoint URI carries a query")]
    HasQuery,

    /// A `#fragment` part.
    #[error("endpoint URI carries a fragment")]
    HasFragment,

    /// `unix://host/...`: a socket path has no host.
    #[error("unix endpoint has an authority")]
    UnixAuthorityNotAllowed,

    /// No absolute socket path.
    #[error("unix endpoint has no absolute path")]
    UnixMissingPath,

    /// A host name instead of an IP address.
    #[error("tcp endpoint host is not an IP address")]
    TcpHostNotIp,

    /// No port after the address.
    #[error("tcp endpoint has no port")]
    TcpMissingPort,

    /// Anything after the port other than a lone `/`.
    #[error("tcp endpoint has a path")]
    TcpUnexpectedPath,

    /// `npipe://...` instead of `npipe:name`.
    #[error("npipe endpoint is not opaque")]
    NamedPipeNotOpaque,

    /// `npipe:` with nothing after it.
    #[error("npipe endpoint has no pipe name")]
    NamedPipeMissingName,
}

impl Endpoint {
    /// Parses and validates an endpoint URI.
    ///
    /// # Errors
    ///
    /// Returns an [`EndpointError`] if the input is not a URI, uses an
    /// unsupported scheme, carries user info, a query or a fragment, or breaks
    /// the rules of its scheme.
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(&normalize(input))?;

        if !url.username().is_empty() || url.password().is_some() {
            return Err(EndpointError::HasUserInfo);
        }
        if url.query().is_some() {
            return Err(EndpointError::HasQuery);
        }
        if url.fragment().is_some() {
            return Err(EndpointError::HasFragment);
        }

        match url.scheme() {
            "unix" => parse_unix(&url),
            "tcp" => parse_tcp(&url),
            "npipe" => parse_named_pipe(&url),
            _ => Err(EndpointError::InvalidScheme),
        }
    }

    /// Reads and parses `SPIFFE_ENDPOINT_SOCKET`.
    ///
    /// # Errors
    ///
    /// [`EndpointError::NotConfigured`] if the variable is unset or empty,
    /// otherwise any error of [`Endpoint::parse`].
    pub fn from_env() -> Result<Self, EndpointError> {
        match std::env::var(SPIFFE_ENDPOINT_SOCKET_ENV) {
            Ok(raw) if !raw.is_empty() => Self::parse(&raw),
            _ => Err(EndpointError::NotConfigured),
        }
    }
}

fn parse_unix(url: &Url) -> Result<Endpoint, EndpointError> {
    if url.host_str().is_some_and(|h| !h.is_empty()) {
        return Err(EndpointError::UnixAuthorityNotAllowed);
    }

    // `unix:tmp/sock` must fail: only absolute paths are accepted.
    let path = url.path();
    if path.is_empty() || path == "/" || !path.starts_with('/') {
        return Err(EndpointError::UnixMissingPath);
    }

    Ok(Endpoint::Unix(PathBuf::from(path)))
}

fn parse_tcp(url: &Url) -> Result<Endpoint, EndpointError> {
    let host = match url.host() {
        Some(url::Host::Ipv4(ip)) => IpAddr::V4(ip),
        Some(url::Host::Ipv6(ip)) => IpAddr::V6(ip),
        Some(url::Host::Domain(domain)) => {
            IpAddr::from_str(domain).map_err(|_| EndpointError::TcpHostNotIp)?
        }
        None => return Err(EndpointError::TcpHostNotIp),
    };
    let port = url.port().ok_or(EndpointError::TcpMissingPort)?;

    let path = url.path();
    if !path.is_empty() && path != "/" {
        return Err(EndpointError::TcpUnexpectedPath);
    }

    Ok(Endpoint::Tcp { host, port })
}

fn parse_named_pipe(url: &Url) -> Result<Endpoint, EndpointError> {
    if !url.cannot_be_a_base() {
        return Err(EndpointError::NamedPipeNotOpaque);
    }

    let name = url.path();
    if name.is_empty() {
        return Err(EndpointError::NamedPipeMissingName);
    }

    Ok(Endpoint::NamedPipe(name.to_owned()))
}

// `unix:/path` is not a valid hierarchical URL for the `url` crate, and
// `tcp:1.2.3.4:80` would parse as opaque.
fn normalize(input: &str) -> String {
    if let Some(rest) = input.strip_prefix("unix:/") {
        if !rest.starts_with('/') {
            return format!("unix:///{rest}");
        }
    }

    if let Some(rest) = input.strip_prefix("tcp:") {
        if !rest.starts_with("//") {
            return format!("tcp://{rest}");
        }
    }

    input.to_owned()
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp {
                host: IpAddr::V6(ip),
                port,
            } => write!(f, "tcp://[{ip}]:{port}"),
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::NamedPipe(name) => write!(f, "npipe:{name}"),
        }
    }
}
