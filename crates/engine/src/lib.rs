//! # Dubbo Invoke Engine
//!
//! Generic invocation of Dubbo services through the provider's text console.
//! A call is resolved to a provider through the registry, written as an
//! `invoke` command and the console's unframed reply is assembled and mined
//! for its payload.
//!
//! ## Usage
//!
//! ```no_run
//! use dubbo_invoke_engine::{EngineConfig, InvocationEngine, InvocationRequest};
//! use dubbo_invoke_types::RegistryAddress;
//!
//! # async fn run() -> Result<(), dubbo_invoke_types::InvokeError> {
//! let address = RegistryAddress::parse("zookeeper://127.0.0.1:2181")?;
//! let engine = InvocationEngine::new(&address, EngineConfig::from_env())?;
//! let request = InvocationRequest::parse(r#"com.acme.UserService.getUser(42)"#)?;
//! let result = engine.invoke(&request).await;
//! println!("{}", serde_json::to_string(&result.to_wire()).unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`codec`**: argument literals in both directions and call expressions
//! - **`assembler`**: completion heuristics over accumulated console text
//! - **`session`**: one connection, one command, one assembled response
//! - **`extractor`**: payload recovery from noisy console text
//! - **`list_result`**: array shaping for collection-returning methods
//! - **`engine`**: resolve, connect, send, assemble and extract

pub mod assembler;
pub mod codec;
pub mod config;
pub mod engine;
pub mod extractor;
pub mod list_result;
pub mod session;

pub use assembler::{CompletionReason, RawResponse, ResponseAssembler};
pub use codec::CallExpression;
pub use config::EngineConfig;
pub use engine::{InvocationEngine, InvocationRequest};
pub use extractor::{Extraction, extract};
pub use list_result::normalize_list_result;
pub use session::{ProviderSession, ReadTimeouts, SessionState};
