//! Nacos-style REST registry.
//!
//! Both the namespace listing and the service listing changed shape across
//! server releases. Each is fetched by probing a fixed list of endpoint
//! variants in order; a variant that answers non-200 or with a body neither
//! envelope understands is skipped.

use async_trait::async_trait;
use dubbo_invoke_api::{ApiError, HttpReply, RegistryHttpClient};
use dubbo_invoke_types::{
    InstanceInfo, InvokeError, ProviderEndpoint, RegistryAddress, RegistryBackend, ResolutionPhase, ServiceDescriptor, ServiceDetail,
};
use dubbo_invoke_util::http::{parse_response_json_strict, status_error_message};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::namespace::{NamespaceEntry, NamespaceIndex, PUBLIC_NAMESPACE, is_literal_namespace, parse_namespace_list};
use crate::settings::RegistrySettings;
use crate::{CatalogResolver, ProviderResolver, RegistryResolver};

pub const NAMESPACE_LIST_PATHS: [&str; 4] = [
    "/v1/console/namespaces",
    "/nacos/v1/console/namespaces",
    "/v1/ns/namespace",
    "/nacos/v1/ns/namespace",
];

pub const SERVICE_LIST_PATHS: [&str; 2] = ["/nacos/v1/ns/service/list", "/nacos/v2/ns/service/list"];

pub const INSTANCE_LIST_PATH: &str = "/nacos/v1/ns/instance/list";

const BACKEND: RegistryBackend = RegistryBackend::RestNamespace;

pub struct NacosResolver {
    client: RegistryHttpClient,
    namespace: String,
    settings: RegistrySettings,
    index: NamespaceIndex,
}

impl NacosResolver {
    pub fn new(address: &RegistryAddress, settings: RegistrySettings) -> Result<Self, InvokeError> {
        let client = RegistryHttpClient::new(address, settings.http_timeout)
            .map_err(|error| InvokeError::resolution(BACKEND, ResolutionPhase::Connect, error.to_string()))?;
        Ok(Self {
            client,
            namespace: address.namespace().unwrap_or(PUBLIC_NAMESPACE).trim().to_string(),
            settings,
            index: NamespaceIndex::new(),
        })
    }

    /// Configured namespace as the operator wrote it.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Translates the configured namespace into the server's id. Never fails:
    /// an unknown name or an unreachable listing falls back to the name itself.
    pub async fn resolve_namespace_id(&self) -> String {
        let namespace = self.namespace.as_str();
        if namespace.is_empty() || namespace == PUBLIC_NAMESPACE {
            return PUBLIC_NAMESPACE.to_string();
        }
        if is_literal_namespace(namespace) {
            return namespace.to_string();
        }
        if let Some(id) = self.index.lookup(namespace).await {
            return id;
        }

        match self.fetch_namespaces().await {
            Ok(entries) => {
                self.index.replace(entries).await;
                if let Some(id) = self.index.lookup(namespace).await {
                    debug!(namespace, id = %id, "namespace resolved");
                    return id;
                }
                warn!(namespace, "namespace not found on server; using it as the id");
            }
            Err(error) => warn!(namespace, error = %error, "namespace listing failed; using the name as the id"),
        }
        namespace.to_string()
    }

    async fn fetch_namespaces(&self) -> Result<Vec<NamespaceEntry>, InvokeError> {
        self.probe(ResolutionPhase::NamespaceListing, &NAMESPACE_LIST_PATHS, &[], parse_namespace_list)
            .await
    }

    async fn fetch_service_names(&self, namespace_id: &str) -> Result<Vec<String>, InvokeError> {
        let mut query = vec![
            ("pageNo", "1".to_string()),
            ("pageSize", self.settings.page_size.to_string()),
        ];
        if namespace_id != PUBLIC_NAMESPACE {
            query.push(("namespaceId", namespace_id.to_string()));
        }
        if !self.settings.group.is_empty() {
            query.push(("groupName", self.settings.group.clone()));
        }
        self.probe(ResolutionPhase::ServiceListing, &SERVICE_LIST_PATHS, &query, parse_service_names)
            .await
    }

    /// Instances registered under `service_name`, healthy or not.
    pub async fn fetch_instances(&self, service_name: &str, namespace_id: &str) -> Result<Vec<InstanceInfo>, InvokeError> {
        let mut query = vec![("serviceName", service_name.to_string())];
        if namespace_id != PUBLIC_NAMESPACE {
            query.push(("namespaceId", namespace_id.to_string()));
        }
        if !self.settings.group.is_empty() {
            query.push(("groupName", self.settings.group.clone()));
        }
        let reply = self
            .client
            .get_text(INSTANCE_LIST_PATH, &query)
            .await
            .map_err(|error| transport_failure(ResolutionPhase::ServiceDetail, &error))?;
        if !reply.is_ok() {
            return Err(InvokeError::resolution(
                BACKEND,
                ResolutionPhase::ServiceDetail,
                describe_status(&reply, service_name),
            ));
        }
        let body = parse_response_json_strict(&reply.body, Some(reply.status))
            .map_err(|error| InvokeError::resolution(BACKEND, ResolutionPhase::ServiceDetail, error.to_string()))?;
        parse_instances(&body).ok_or_else(|| {
            InvokeError::resolution(BACKEND, ResolutionPhase::ServiceDetail, format!("instance list for {service_name} has no hosts array"))
        })
    }

    /// Tries each path in order and returns the first body `parse` accepts.
    async fn probe<T>(
        &self,
        phase: ResolutionPhase,
        paths: &[&str],
        query: &[(&str, String)],
        parse: fn(&Value) -> Option<T>,
    ) -> Result<T, InvokeError> {
        let mut attempts = Vec::with_capacity(paths.len());
        for path in paths {
            let reply = match self.client.get_text(path, query).await {
                Ok(reply) => reply,
                Err(error) => {
                    warn!(path, error = %error, "registry variant unreachable");
                    attempts.push(format!("{path}: {error}"));
                    continue;
                }
            };
            if !reply.is_ok() {
                warn!(path, status = reply.status.as_u16(), "registry variant rejected");
                attempts.push(format!("{path}: {}", describe_status(&reply, path)));
                continue;
            }
            let parsed = match parse_response_json_strict(&reply.body, Some(reply.status)) {
                Ok(body) => parse(&body),
                Err(error) => {
                    warn!(path, error = %error, "registry variant returned invalid json");
                    None
                }
            };
            match parsed {
                Some(value) => {
                    debug!(path, phase = %phase, "registry variant accepted");
                    return Ok(value);
                }
                None => {
                    warn!(path, "registry variant returned an unrecognized body");
                    attempts.push(format!("{path}: unrecognized response body"));
                }
            }
        }
        Err(InvokeError::resolution(
            BACKEND,
            phase,
            format!("all endpoint variants failed ({})", attempts.join("; ")),
        ))
    }
}

#[async_trait]
impl CatalogResolver for NacosResolver {
    async fn resolve_catalog(&self) -> Result<Vec<ServiceDescriptor>, InvokeError> {
        let namespace_id = self.resolve_namespace_id().await;
        let names = self.fetch_service_names(&namespace_id).await?;
        Ok(names.into_iter().map(ServiceDescriptor::new).collect())
    }

    /// One extra request per service; services whose detail cannot be
    /// fetched are logged and left out.
    async fn resolve_service_details(&self) -> Result<Vec<ServiceDetail>, InvokeError> {
        let namespace_id = self.resolve_namespace_id().await;
        let names = self.fetch_service_names(&namespace_id).await?;
        let display_namespace = if self.namespace.is_empty() { PUBLIC_NAMESPACE } else { self.namespace.as_str() };

        let mut details = Vec::with_capacity(names.len());
        for name in names {
            match self.fetch_instances(&name, &namespace_id).await {
                Ok(instances) => details.push(ServiceDetail::new(
                    name,
                    display_namespace,
                    self.settings.group.clone(),
                    instances,
                )),
                Err(error) => warn!(service = %name, error = %error, "omitting service without detail"),
            }
        }
        Ok(details)
    }
}

#[async_trait]
impl ProviderResolver for NacosResolver {
    /// First healthy and enabled instance. When the interface name has no
    /// instances, Dubbo's `providers:<interface>::` registration name is tried.
    async fn resolve_provider(&self, service: &ServiceDescriptor) -> Result<ProviderEndpoint, InvokeError> {
        let namespace_id = self.resolve_namespace_id().await;
        let direct = self.fetch_instances(service.name(), &namespace_id).await;
        let instances = match direct {
            Ok(instances) if !instances.is_empty() => instances,
            direct => {
                let registration_name = format!("providers:{}::", service.name());
                match self.fetch_instances(&registration_name, &namespace_id).await {
                    Ok(instances) => instances,
                    Err(probe_error) => match direct {
                        Ok(_) => {
                            debug!(service = %service, error = %probe_error, "registration-name probe failed");
                            Vec::new()
                        }
                        Err(error) => {
                            return Err(InvokeError::resolution(BACKEND, ResolutionPhase::ProviderLookup, error.to_string()));
                        }
                    },
                }
            }
        };

        instances
            .iter()
            .find(|instance| instance.healthy && instance.enabled)
            .map(|instance| ProviderEndpoint::new(instance.ip.clone(), instance.port, "dubbo"))
            .ok_or_else(|| InvokeError::no_provider(service.name()))
    }
}

impl RegistryResolver for NacosResolver {
    fn backend(&self) -> RegistryBackend {
        BACKEND
    }
}

fn transport_failure(phase: ResolutionPhase, error: &ApiError) -> InvokeError {
    InvokeError::resolution(BACKEND, phase, error.to_string())
}

fn describe_status(reply: &HttpReply, subject: &str) -> String {
    status_error_message(reply.status.as_u16()).unwrap_or_else(|| format!("HTTP {} for {subject}", reply.status.as_u16()))
}

/// Service names from the v1 `{count, doms}` or v2
/// `{code: 0, data: {count, services}}` envelope.
pub fn parse_service_names(body: &Value) -> Option<Vec<String>> {
    if let Some(doms) = body.get("doms").and_then(Value::as_array) {
        return Some(doms.iter().filter_map(Value::as_str).map(str::to_string).collect());
    }
    if body.get("code").and_then(Value::as_i64) == Some(0) {
        let services = body.get("data")?.get("services")?.as_array()?;
        return Some(
            services
                .iter()
                .filter_map(|service| match service {
                    Value::String(name) => Some(name.clone()),
                    Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect(),
        );
    }
    None
}

/// Instances from an instance-list body's `hosts` array.
pub fn parse_instances(body: &Value) -> Option<Vec<InstanceInfo>> {
    let hosts = body.get("hosts")?.as_array()?;
    Some(
        hosts
            .iter()
            .filter_map(|host| {
                let ip = host.get("ip")?.as_str()?.to_string();
                let port = u16::try_from(host.get("port")?.as_u64()?).ok()?;
                let metadata = host
                    .get("metadata")
                    .and_then(Value::as_object)
                    .map(|map| {
                        map.iter()
                            .map(|(key, value)| {
                                let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                                (key.clone(), text)
                            })
                            .collect::<IndexMap<_, _>>()
                    })
                    .unwrap_or_default();
                Some(InstanceInfo {
                    ip,
                    port,
                    healthy: host.get("healthy").and_then(Value::as_bool).unwrap_or(false),
                    enabled: host.get("enabled").and_then(Value::as_bool).unwrap_or(true),
                    weight: host.get("weight").and_then(Value::as_f64).unwrap_or(1.0),
                    metadata,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn service_names_from_either_envelope() {
        let v1 = json!({"count": 2, "doms": ["a.A", "b.B"]});
        assert_eq!(parse_service_names(&v1), Some(vec!["a.A".to_string(), "b.B".to_string()]));

        let v2 = json!({"code": 0, "message": "success", "data": {"count": 1, "services": ["c.C"]}});
        assert_eq!(parse_service_names(&v2), Some(vec!["c.C".to_string()]));

        let v2_error = json!({"code": 403, "message": "denied", "data": null});
        assert_eq!(parse_service_names(&v2_error), None);
    }

    #[test]
    fn instances_keep_health_weight_and_metadata() {
        let body = json!({"name": "a.A", "hosts": [
            {"ip": "10.0.0.1", "port": 20880, "healthy": true, "enabled": true, "weight": 1.5, "metadata": {"side": "provider", "timeout": 3000}},
            {"ip": "10.0.0.2", "port": 20880, "healthy": false, "weight": 1.0},
            {"ip": "broken"}
        ]});
        let instances = parse_instances(&body).expect("hosts array");
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].weight, 1.5);
        assert_eq!(instances[0].metadata["timeout"], "3000");
        assert!(!instances[1].healthy);
        assert!(instances[1].enabled);
    }
}
