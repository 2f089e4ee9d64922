use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Fully qualified service interface name. Equality is exact string match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceDescriptor(String);

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceDescriptor {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A live provider a session can connect to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEndpoint {
    pub host: String,
    pub port: u16,
    /// Scheme of the registration string, e.g. `dubbo`.
    pub protocol_tag: String,
}

impl ProviderEndpoint {
    pub fn new(host: impl Into<String>, port: u16, protocol_tag: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            protocol_tag: protocol_tag.into(),
        }
    }

    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ProviderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol_tag, self.host, self.port)
    }
}

/// One registered instance of a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    pub ip: String,
    pub port: u16,
    pub healthy: bool,
    pub enabled: bool,
    pub weight: f64,
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
}

/// Catalog entry enriched with instance health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetail {
    pub name: String,
    pub namespace: String,
    pub group: String,
    pub instances: Vec<InstanceInfo>,
    pub status: String,
}

impl ServiceDetail {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, group: impl Into<String>, instances: Vec<InstanceInfo>) -> Self {
        let status = instance_status(&instances);
        Self {
            name: name.into(),
            namespace: namespace.into(),
            group: group.into(),
            instances,
            status,
        }
    }

    /// Entry for a backend that only knows service names.
    pub fn bare(descriptor: &ServiceDescriptor) -> Self {
        Self::new(descriptor.name(), "", "", Vec::new())
    }
}

/// `"<healthy>/<total> healthy"`, or `"no instances"` when empty.
pub fn instance_status(instances: &[InstanceInfo]) -> String {
    if instances.is_empty() {
        return "no instances".to_string();
    }
    let healthy = instances.iter().filter(|instance| instance.healthy).count();
    format!("{healthy}/{} healthy", instances.len())
}
