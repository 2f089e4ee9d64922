//! Registry address parsing.
//!
//! Text form: `<scheme>://[user:pass@]host:port[?namespace=<name>]`.

use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;

use crate::errors::{InvokeError, RegistryBackend};

/// Kind of registry an address points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryScheme {
    /// Tree-structured coordination store (ZooKeeper).
    Hierarchical,
    /// HTTP registry partitioned into namespaces (Nacos).
    RestNamespace,
    /// The authority is the provider itself.
    Direct,
}

impl RegistryScheme {
    fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "zookeeper" => Some(Self::Hierarchical),
            "nacos" => Some(Self::RestNamespace),
            "direct" | "dubbo" => Some(Self::Direct),
            _ => None,
        }
    }

    /// Canonical scheme spelling used when rendering an address.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hierarchical => "zookeeper",
            Self::RestNamespace => "nacos",
            Self::Direct => "direct",
        }
    }

    pub fn backend(&self) -> RegistryBackend {
        match self {
            Self::Hierarchical => RegistryBackend::Hierarchical,
            Self::RestNamespace => RegistryBackend::RestNamespace,
            Self::Direct => RegistryBackend::Direct,
        }
    }
}

/// Username/password pair sent to registries that require authentication.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parsed registry location. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryAddress {
    scheme: RegistryScheme,
    host: String,
    port: u16,
    namespace: Option<String>,
    credentials: Option<Credentials>,
}

impl RegistryAddress {
    pub fn parse(input: &str) -> Result<Self, InvokeError> {
        let trimmed = input.trim();
        let (scheme_label, rest) = trimmed
            .split_once("://")
            .ok_or_else(|| InvokeError::invalid_address(input, "expected <scheme>://<host>:<port>"))?;
        let scheme = RegistryScheme::from_label(scheme_label)
            .ok_or_else(|| InvokeError::invalid_address(input, format!("unsupported registry scheme '{scheme_label}'")))?;

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };
        let location = location.trim_end_matches('/');

        let (credentials, authority) = match location.rsplit_once('@') {
            Some((user_info, authority)) => (Some(parse_credentials(input, user_info)?), authority),
            None => (None, location),
        };

        let (host, port_text) = authority
            .rsplit_once(':')
            .ok_or_else(|| InvokeError::invalid_address(input, "authority must be host:port"))?;
        if host.is_empty() {
            return Err(InvokeError::invalid_address(input, "missing host"));
        }
        let port = port_text
            .parse::<u16>()
            .map_err(|_| InvokeError::invalid_address(input, format!("invalid port '{port_text}'")))?;

        let namespace = query.and_then(namespace_from_query).filter(|value| !value.is_empty());

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            namespace,
            credentials,
        })
    }

    pub fn scheme(&self) -> RegistryScheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Namespace display name or id; only meaningful for the rest-namespace scheme.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Copy of this address with a namespace applied.
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: (!namespace.is_empty()).then_some(namespace),
            ..self.clone()
        }
    }
}

impl FromStr for RegistryAddress {
    type Err = InvokeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RegistryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme.label())?;
        if let Some(credentials) = &self.credentials {
            write!(f, "{}:<redacted>@", credentials.username)?;
        }
        write!(f, "{}", self.authority())?;
        if let Some(namespace) = &self.namespace {
            write!(f, "?namespace={namespace}")?;
        }
        Ok(())
    }
}

fn parse_credentials(input: &str, user_info: &str) -> Result<Credentials, InvokeError> {
    let (username, password) = user_info
        .split_once(':')
        .ok_or_else(|| InvokeError::invalid_address(input, "credentials must be user:password"))?;
    Ok(Credentials {
        username: percent_decode_str(username).decode_utf8_lossy().into_owned(),
        password: percent_decode_str(password).decode_utf8_lossy().into_owned(),
    })
}

fn namespace_from_query(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "namespace")
        .map(|(_, value)| percent_decode_str(value).decode_utf8_lossy().into_owned())
}
