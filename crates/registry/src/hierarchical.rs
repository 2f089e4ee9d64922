//! Catalog and provider resolution against a ZooKeeper-style tree.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dubbo_invoke_types::{InvokeError, ProviderEndpoint, RegistryBackend, ResolutionPhase, ServiceDescriptor};
use indexmap::IndexSet;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::registration::parse_registration;
use crate::store::{CoordinationStore, StoreError, join_path};
use crate::{CatalogResolver, ProviderResolver, RegistryResolver};

/// Child node that marks its parent as a service.
pub const PROVIDERS_NODE: &str = "providers";

pub struct HierarchicalResolver {
    store: Arc<dyn CoordinationStore>,
    base_path: String,
    /// Service name to its node, for services found below the first level.
    service_nodes: RwLock<HashMap<String, String>>,
}

impl HierarchicalResolver {
    pub fn new(store: Arc<dyn CoordinationStore>, base_path: impl Into<String>) -> Self {
        Self {
            store,
            base_path: base_path.into(),
            service_nodes: RwLock::new(HashMap::new()),
        }
    }

    fn failure(phase: ResolutionPhase, error: &StoreError) -> InvokeError {
        let phase = if error.is_connect() { ResolutionPhase::Connect } else { phase };
        InvokeError::resolution(RegistryBackend::Hierarchical, phase, error.to_string())
    }

    async fn provider_entries(&self, service_node: &str) -> Result<Option<Vec<String>>, InvokeError> {
        self.store
            .children(&join_path(service_node, PROVIDERS_NODE))
            .await
            .map_err(|error| Self::failure(ResolutionPhase::ProviderLookup, &error))
    }

    /// Node of `service`: where a walk found it, else directly under the base.
    async fn service_node(&self, service: &ServiceDescriptor) -> String {
        match self.service_nodes.read().await.get(service.name()) {
            Some(node) => node.clone(),
            None => join_path(&self.base_path, service.name()),
        }
    }
}

#[async_trait]
impl CatalogResolver for HierarchicalResolver {
    /// Depth-first walk below the base path. Nodes that cannot be read are
    /// logged and skipped.
    async fn resolve_catalog(&self) -> Result<Vec<ServiceDescriptor>, InvokeError> {
        let base_exists = self
            .store
            .exists(&self.base_path)
            .await
            .map_err(|error| Self::failure(ResolutionPhase::CatalogWalk, &error))?;
        if !base_exists {
            debug!(base_path = %self.base_path, "registry base path missing; catalog is empty");
            return Ok(Vec::new());
        }

        let mut services = IndexSet::new();
        let mut nodes = HashMap::new();
        let mut pending = vec![self.base_path.clone()];
        while let Some(path) = pending.pop() {
            let children = match self.store.children(&path).await {
                Ok(Some(children)) => children,
                Ok(None) => continue,
                Err(error) => {
                    warn!(path = %path, error = %error, "skipping unreadable registry node");
                    continue;
                }
            };
            if path != self.base_path && children.iter().any(|child| child == PROVIDERS_NODE) {
                if let Some(segment) = path.rsplit('/').next().filter(|segment| !segment.is_empty())
                    && services.insert(ServiceDescriptor::new(segment))
                {
                    nodes.insert(segment.to_string(), path.clone());
                }
                continue;
            }
            pending.extend(children.iter().rev().map(|child| join_path(&path, child)));
        }

        *self.service_nodes.write().await = nodes;
        debug!(base_path = %self.base_path, services = services.len(), "catalog walk finished");
        Ok(services.into_iter().collect())
    }
}

#[async_trait]
impl ProviderResolver for HierarchicalResolver {
    async fn resolve_provider(&self, service: &ServiceDescriptor) -> Result<ProviderEndpoint, InvokeError> {
        let node = self.service_node(service).await;
        let entries = match self.provider_entries(&node).await? {
            Some(entries) => entries,
            None => {
                // Not where expected: the service may sit deeper in the tree.
                self.resolve_catalog().await?;
                let found = self.service_node(service).await;
                if found == node {
                    Vec::new()
                } else {
                    self.provider_entries(&found).await?.unwrap_or_default()
                }
            }
        };
        if entries.is_empty() {
            return Err(InvokeError::no_provider(service.name()));
        }

        for entry in &entries {
            match parse_registration(entry) {
                Ok(endpoint) => {
                    debug!(service = %service, endpoint = %endpoint, "provider resolved");
                    return Ok(endpoint);
                }
                Err(reason) => warn!(service = %service, reason = %reason, "skipping undecodable provider entry"),
            }
        }
        Err(InvokeError::resolution(
            RegistryBackend::Hierarchical,
            ResolutionPhase::ProviderDecode,
            format!("none of {} provider entries for {service} could be decoded", entries.len()),
        ))
    }
}

impl RegistryResolver for HierarchicalResolver {
    fn backend(&self) -> RegistryBackend {
        RegistryBackend::Hierarchical
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const USER_PROVIDER: &str = "dubbo%3A%2F%2F10.0.0.7%3A20880%2Fcom.acme.UserService%3Fversion%3D1.0.0";

    fn sample_store() -> MemoryStore {
        MemoryStore::new()
            .with_node("/dubbo/com.acme.UserService/providers", &[USER_PROVIDER])
            .with_node("/dubbo/com.acme.UserService/consumers", &[])
            .with_node("/dubbo/com.acme.OrderService/providers", &[])
            .with_node("/dubbo/config", &[])
    }

    #[tokio::test]
    async fn catalog_lists_nodes_with_providers_child() {
        let resolver = HierarchicalResolver::new(Arc::new(sample_store()), "/dubbo");
        let catalog = resolver.resolve_catalog().await.expect("catalog");
        let names: Vec<_> = catalog.iter().map(ServiceDescriptor::name).collect();
        assert_eq!(names, vec!["com.acme.UserService", "com.acme.OrderService"]);
    }

    #[tokio::test]
    async fn missing_base_path_is_empty_catalog() {
        let resolver = HierarchicalResolver::new(Arc::new(MemoryStore::new()), "/dubbo");
        assert!(resolver.resolve_catalog().await.expect("catalog").is_empty());
    }

    #[tokio::test]
    async fn unreadable_node_is_skipped() {
        let store = sample_store().fail_on("/dubbo/com.acme.OrderService");
        let resolver = HierarchicalResolver::new(Arc::new(store), "/dubbo");
        let catalog = resolver.resolve_catalog().await.expect("catalog");
        assert_eq!(catalog, vec![ServiceDescriptor::new("com.acme.UserService")]);
    }

    #[tokio::test]
    async fn provider_resolves_first_decodable_entry() {
        let store = MemoryStore::new().with_node("/dubbo/com.acme.UserService/providers", &["garbage", USER_PROVIDER]);
        let resolver = HierarchicalResolver::new(Arc::new(store), "/dubbo");
        let endpoint = resolver
            .resolve_provider(&ServiceDescriptor::new("com.acme.UserService"))
            .await
            .expect("endpoint");
        assert_eq!(endpoint, ProviderEndpoint::new("10.0.0.7", 20880, "dubbo"));
    }

    #[tokio::test]
    async fn empty_or_missing_providers_is_no_provider() {
        let resolver = HierarchicalResolver::new(Arc::new(sample_store()), "/dubbo");
        let empty = resolver.resolve_provider(&ServiceDescriptor::new("com.acme.OrderService")).await;
        assert!(matches!(empty, Err(InvokeError::NoProviderAvailable { .. })));
        let missing = resolver.resolve_provider(&ServiceDescriptor::new("com.acme.Nope")).await;
        assert!(matches!(missing, Err(InvokeError::NoProviderAvailable { .. })));
    }

    #[tokio::test]
    async fn provider_read_failure_is_fatal() {
        let store = sample_store().fail_on("/dubbo/com.acme.UserService/providers");
        let resolver = HierarchicalResolver::new(Arc::new(store), "/dubbo");
        let error = resolver
            .resolve_provider(&ServiceDescriptor::new("com.acme.UserService"))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            InvokeError::ResolutionFailure {
                backend: RegistryBackend::Hierarchical,
                phase: ResolutionPhase::ProviderLookup,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn base_node_is_never_a_service() {
        let store = sample_store().with_node("/dubbo/providers", &[]);
        let resolver = HierarchicalResolver::new(Arc::new(store), "/dubbo");
        let names: Vec<_> = resolver
            .resolve_catalog()
            .await
            .expect("catalog")
            .iter()
            .map(|service| service.name().to_string())
            .collect();
        assert_eq!(names, vec!["com.acme.UserService", "com.acme.OrderService"]);
    }

    #[tokio::test]
    async fn nested_services_are_listed_and_resolvable() {
        let store = MemoryStore::new()
            .with_node("/dubbo/com.acme.UserService/providers", &[USER_PROVIDER])
            .with_node("/dubbo/billing/com.acme.InvoiceService/providers", &[USER_PROVIDER]);
        let resolver = HierarchicalResolver::new(Arc::new(store), "/dubbo");

        let catalog = resolver.resolve_catalog().await.expect("catalog");
        assert!(catalog.contains(&ServiceDescriptor::new("com.acme.InvoiceService")));

        let endpoint = resolver
            .resolve_provider(&ServiceDescriptor::new("com.acme.InvoiceService"))
            .await
            .expect("nested endpoint");
        assert_eq!(endpoint, ProviderEndpoint::new("10.0.0.7", 20880, "dubbo"));
    }

    #[tokio::test]
    async fn nested_service_resolves_without_a_prior_listing() {
        let store = MemoryStore::new().with_node("/dubbo/billing/com.acme.InvoiceService/providers", &[USER_PROVIDER]);
        let resolver = HierarchicalResolver::new(Arc::new(store), "/dubbo");
        let endpoint = resolver
            .resolve_provider(&ServiceDescriptor::new("com.acme.InvoiceService"))
            .await
            .expect("nested endpoint");
        assert_eq!(endpoint.authority(), "10.0.0.7:20880");
    }
}
