//! Shared data model for Dubbo generic invocation: registry addresses, call
//! arguments, catalog entries, invocation results and the error taxonomy.

pub mod address;
pub mod argument;
pub mod catalog;
pub mod errors;
pub mod result;

pub use address::{Credentials, RegistryAddress, RegistryScheme};
pub use argument::{CallArgument, MAX_INTEGER_DIGITS, MAX_SAFE_INTEGER, Numeral, classify_numeral, is_safe_integer_text, preserve_precision};
pub use catalog::{InstanceInfo, ProviderEndpoint, ServiceDescriptor, ServiceDetail, instance_status};
pub use errors::{InvokeError, RegistryBackend, ResolutionPhase};
pub use result::{InvocationResult, WireResult};
