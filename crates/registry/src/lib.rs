//! Service discovery for generic invocation.
//!
//! A resolver is built for one [`RegistryAddress`] by [`resolver_for`] and
//! answers two questions: which services exist ([`CatalogResolver`]) and
//! where a given service can be called ([`ProviderResolver`]). Resolvers never
//! retry; failures name the backend and the step that failed.

use std::sync::Arc;

use async_trait::async_trait;
use dubbo_invoke_types::{
    InvokeError, ProviderEndpoint, RegistryAddress, RegistryBackend, RegistryScheme, ServiceDescriptor, ServiceDetail,
};

pub mod direct;
pub mod hierarchical;
pub mod nacos;
pub mod namespace;
pub mod registration;
pub mod settings;
pub mod store;
pub mod zookeeper;

pub use direct::DirectResolver;
pub use hierarchical::HierarchicalResolver;
pub use nacos::NacosResolver;
pub use namespace::NamespaceIndex;
pub use settings::RegistrySettings;
pub use store::{CoordinationStore, MemoryStore, StoreError};
pub use zookeeper::ZooKeeperStore;

#[async_trait]
pub trait CatalogResolver: Send + Sync {
    async fn resolve_catalog(&self) -> Result<Vec<ServiceDescriptor>, InvokeError>;

    /// Catalog enriched with instance health. Backends without instance
    /// data report each service with no instances.
    async fn resolve_service_details(&self) -> Result<Vec<ServiceDetail>, InvokeError> {
        let catalog = self.resolve_catalog().await?;
        Ok(catalog.iter().map(ServiceDetail::bare).collect())
    }
}

#[async_trait]
pub trait ProviderResolver: Send + Sync {
    async fn resolve_provider(&self, service: &ServiceDescriptor) -> Result<ProviderEndpoint, InvokeError>;
}

/// Both capabilities of one backend.
pub trait RegistryResolver: CatalogResolver + ProviderResolver {
    fn backend(&self) -> RegistryBackend;
}

/// Builds the resolver matching the address scheme.
pub fn resolver_for(address: &RegistryAddress, settings: &RegistrySettings) -> Result<Arc<dyn RegistryResolver>, InvokeError> {
    let resolver: Arc<dyn RegistryResolver> = match address.scheme() {
        RegistryScheme::Hierarchical => {
            let store = ZooKeeperStore::new(address.authority(), settings.connect_timeout);
            Arc::new(HierarchicalResolver::new(Arc::new(store), settings.base_path.clone()))
        }
        RegistryScheme::RestNamespace => Arc::new(NacosResolver::new(address, settings.clone())?),
        RegistryScheme::Direct => Arc::new(DirectResolver::new(address)),
    };
    tracing::debug!(registry = %address, backend = %resolver.backend(), "registry resolver ready");
    Ok(resolver)
}
