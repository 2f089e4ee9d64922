use std::sync::Arc;
use std::time::Instant;

use dubbo_invoke_registry::{RegistryResolver, resolver_for};
use dubbo_invoke_types::{
    CallArgument, InvocationResult, InvokeError, ProviderEndpoint, RegistryAddress, ServiceDescriptor, ServiceDetail,
    preserve_precision,
};
use dubbo_invoke_util::block_on_future;
use serde_json::Value;
use tracing::{debug, warn};

use crate::codec::CallExpression;
use crate::config::EngineConfig;
use crate::extractor::extract;
use crate::list_result::normalize_list_result;
use crate::session::ProviderSession;

/// One generic call: which service, which method, with what.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub service: ServiceDescriptor,
    pub method: String,
    pub arguments: Vec<CallArgument>,
}

impl InvocationRequest {
    pub fn new(service: impl Into<String>, method: impl Into<String>, arguments: Vec<CallArgument>) -> Self {
        Self {
            service: ServiceDescriptor::new(service),
            method: method.into(),
            arguments,
        }
    }

    /// Builds a request from `service.method(args)` text.
    pub fn parse(expression: &str) -> Result<Self, InvokeError> {
        let CallExpression {
            service,
            method,
            arguments,
        } = CallExpression::parse(expression)?;
        Ok(Self::new(service, method, arguments))
    }
}

/// Resolve, connect, send, assemble, extract. The resolver is fixed when the
/// engine is built; every call opens its own provider connection.
pub struct InvocationEngine {
    resolver: Arc<dyn RegistryResolver>,
    config: EngineConfig,
}

impl InvocationEngine {
    pub fn new(address: &RegistryAddress, config: EngineConfig) -> Result<Self, InvokeError> {
        let resolver = resolver_for(address, &config.registry)?;
        Ok(Self::with_resolver(resolver, config))
    }

    pub fn with_resolver(resolver: Arc<dyn RegistryResolver>, config: EngineConfig) -> Self {
        Self { resolver, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Never fails: every error is folded into an unsuccessful result.
    pub async fn invoke(&self, request: &InvocationRequest) -> InvocationResult {
        let started = Instant::now();
        let outcome = self.try_invoke(request).await;
        let elapsed_millis = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(payload) => InvocationResult::ok(payload, elapsed_millis),
            Err(error) => {
                warn!(
                    service = %request.service,
                    method = %request.method,
                    kind = error.kind(),
                    error = %error,
                    "invocation failed"
                );
                InvocationResult::failed(&error, elapsed_millis)
            }
        }
    }

    /// Payload of a successful call; `None` is a business null.
    pub async fn try_invoke(&self, request: &InvocationRequest) -> Result<Option<Value>, InvokeError> {
        let endpoint = self.resolver.resolve_provider(&request.service).await?;
        debug!(
            service = %request.service,
            method = %request.method,
            endpoint = %endpoint,
            arguments = request.arguments.len(),
            "invoking provider"
        );
        let mut session = ProviderSession::connect(&endpoint, &self.config).await?;
        let response = session
            .invoke(request.service.name(), &request.method, &request.arguments)
            .await;
        session.close().await;
        let response = response?;
        debug!(
            endpoint = %endpoint,
            bytes = response.bytes.len(),
            encoding = %response.encoding,
            completion = %response.completion,
            "response assembled"
        );

        let extraction = extract(&response.text)?;
        Ok(extraction
            .payload
            .map(|payload| normalize_list_result(&request.method, preserve_precision(payload))))
    }

    /// Runs [`InvocationEngine::invoke`] from synchronous code.
    pub fn invoke_blocking(&self, request: &InvocationRequest) -> InvocationResult {
        match block_on_future(self.invoke(request)) {
            Ok(result) => result,
            Err(error) => InvocationResult::failed(&InvokeError::connection("local runtime", error.to_string()), 0),
        }
    }

    pub async fn list_services(&self) -> Result<Vec<ServiceDescriptor>, InvokeError> {
        self.resolver.resolve_catalog().await
    }

    pub async fn list_service_details(&self) -> Result<Vec<ServiceDetail>, InvokeError> {
        self.resolver.resolve_service_details().await
    }

    /// Services a provider console reports through `ls`.
    pub async fn list_console_services(&self, endpoint: &ProviderEndpoint) -> Result<Vec<String>, InvokeError> {
        let mut session = ProviderSession::connect(endpoint, &self.config).await?;
        let listing = session.list_services().await;
        session.close().await;
        listing
    }
}
