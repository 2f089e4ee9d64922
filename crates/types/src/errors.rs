//! Error taxonomy for generic invocation.
//!
//! Every failure surfaced by the resolver, codec, session or extractor is one
//! variant of [`InvokeError`]. Callers render `success=false` with the error's
//! `Display` text; remote diagnostics are kept verbatim in
//! [`InvokeError::RemoteError`] so an operator can tell "provider said no"
//! apart from "engine gave up".

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Registry backend that produced a resolution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryBackend {
    Hierarchical,
    RestNamespace,
    Direct,
}

impl fmt::Display for RegistryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Hierarchical => "hierarchical",
            Self::RestNamespace => "rest-namespace",
            Self::Direct => "direct",
        };
        f.write_str(label)
    }
}

/// Sub-step of resolution that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionPhase {
    Connect,
    CatalogWalk,
    ProviderLookup,
    ProviderDecode,
    NamespaceListing,
    ServiceListing,
    ServiceDetail,
}

impl fmt::Display for ResolutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connect => "connect",
            Self::CatalogWalk => "catalog-walk",
            Self::ProviderLookup => "provider-lookup",
            Self::ProviderDecode => "provider-decode",
            Self::NamespaceListing => "namespace-listing",
            Self::ServiceListing => "service-listing",
            Self::ServiceDetail => "service-detail",
        };
        f.write_str(label)
    }
}

/// Failure of a single generic invocation or discovery call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvokeError {
    #[error("invalid registry address '{input}': {reason}")]
    InvalidRegistryAddress { input: String, reason: String },

    #[error("{backend} registry failed during {phase}: {message}")]
    ResolutionFailure {
        backend: RegistryBackend,
        phase: ResolutionPhase,
        message: String,
    },

    #[error("no provider available for service {service}")]
    NoProviderAvailable { service: String },

    #[error("connection to {endpoint} failed: {message}")]
    ConnectionFailure { endpoint: String, message: String },

    #[error("call timed out after {timeout_ms}ms without any response bytes")]
    CallTimeout { timeout_ms: u64 },

    #[error("text transcoding failed: {message}")]
    TranscodingFailure { message: String },

    #[error("expression syntax error at byte {offset}: {message}")]
    ExpressionSyntaxError { offset: usize, message: String },

    #[error("no valid payload found in response: {raw}")]
    NoValidPayload { raw: String },

    #[error("remote error: {message}")]
    RemoteError { message: String },
}

impl InvokeError {
    pub fn invalid_address(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRegistryAddress {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn resolution(backend: RegistryBackend, phase: ResolutionPhase, message: impl Into<String>) -> Self {
        Self::ResolutionFailure {
            backend,
            phase,
            message: message.into(),
        }
    }

    pub fn no_provider(service: impl Into<String>) -> Self {
        Self::NoProviderAvailable { service: service.into() }
    }

    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailure {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::CallTimeout { timeout_ms }
    }

    pub fn transcoding(message: impl Into<String>) -> Self {
        Self::TranscodingFailure { message: message.into() }
    }

    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::ExpressionSyntaxError {
            offset,
            message: message.into(),
        }
    }

    pub fn no_payload(raw: impl Into<String>) -> Self {
        Self::NoValidPayload { raw: raw.into() }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteError { message: message.into() }
    }

    /// Short machine-readable kind, used as the `error` field of wire results.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRegistryAddress { .. } => "InvalidRegistryAddress",
            Self::ResolutionFailure { .. } => "ResolutionFailure",
            Self::NoProviderAvailable { .. } => "NoProviderAvailable",
            Self::ConnectionFailure { .. } => "ConnectionFailure",
            Self::CallTimeout { .. } => "CallTimeout",
            Self::TranscodingFailure { .. } => "TranscodingFailure",
            Self::ExpressionSyntaxError { .. } => "ExpressionSyntaxError",
            Self::NoValidPayload { .. } => "NoValidPayload",
            Self::RemoteError { .. } => "RemoteError",
        }
    }
}
