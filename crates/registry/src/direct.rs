use async_trait::async_trait;
use dubbo_invoke_types::{InvokeError, ProviderEndpoint, RegistryAddress, RegistryBackend, ServiceDescriptor};

use crate::{CatalogResolver, ProviderResolver, RegistryResolver};

/// Catalog entry reported for direct addresses, which have no discovery.
pub const DIRECT_PLACEHOLDER_SERVICE: &str = "com.example.DirectService";

/// The address authority is the provider itself.
pub struct DirectResolver {
    endpoint: ProviderEndpoint,
}

impl DirectResolver {
    pub fn new(address: &RegistryAddress) -> Self {
        Self {
            endpoint: ProviderEndpoint::new(address.host(), address.port(), "dubbo"),
        }
    }
}

#[async_trait]
impl CatalogResolver for DirectResolver {
    async fn resolve_catalog(&self) -> Result<Vec<ServiceDescriptor>, InvokeError> {
        Ok(vec![ServiceDescriptor::new(DIRECT_PLACEHOLDER_SERVICE)])
    }
}

#[async_trait]
impl ProviderResolver for DirectResolver {
    async fn resolve_provider(&self, _service: &ServiceDescriptor) -> Result<ProviderEndpoint, InvokeError> {
        Ok(self.endpoint.clone())
    }
}

impl RegistryResolver for DirectResolver {
    fn backend(&self) -> RegistryBackend {
        RegistryBackend::Direct
    }
}
