use std::sync::{Arc, Mutex};
use std::time::Duration;

use dubbo_invoke_engine::{EngineConfig, InvocationEngine, InvocationRequest};
use dubbo_invoke_registry::{HierarchicalResolver, MemoryStore};
use dubbo_invoke_types::{CallArgument, InvokeError, ProviderEndpoint, RegistryAddress, ServiceDescriptor};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const PROMPT_TAIL: &[u8] = b"\r\nelapsed: 3 ms.\r\ndubbo>";

/// Stand-in provider console: records each command line and answers every
/// connection with the same chunks.
struct Console {
    port: u16,
    commands: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Console {
    async fn start(chunks: Vec<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&commands);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let chunks = chunks.clone();
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let mut command = Vec::new();
                    let mut buffer = [0u8; 1024];
                    while !command.contains(&b'\n') {
                        match socket.read(&mut buffer).await {
                            Ok(0) | Err(_) => return,
                            Ok(read) => command.extend_from_slice(&buffer[..read]),
                        }
                    }
                    recorded.lock().expect("commands").push(command);
                    for chunk in chunks {
                        if socket.write_all(&chunk).await.is_err() {
                            return;
                        }
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                    let mut rest = [0u8; 64];
                    let _ = socket.read(&mut rest).await;
                });
            }
        });
        Self { port, commands }
    }

    fn reply(payload: &[u8]) -> Vec<Vec<u8>> {
        vec![[payload, PROMPT_TAIL].concat()]
    }

    fn commands(&self) -> Vec<Vec<u8>> {
        self.commands.lock().expect("commands").clone()
    }

    fn direct_engine(&self) -> InvocationEngine {
        let address: RegistryAddress = format!("direct://127.0.0.1:{}", self.port).parse().expect("address");
        InvocationEngine::new(&address, test_config()).expect("engine")
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        call_timeout: Duration::from_secs(1),
        initial_read_timeout: Duration::from_secs(2),
        idle_read_timeout: Duration::from_millis(300),
        connect_timeout: Duration::from_secs(1),
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn oversized_integers_survive_both_directions() {
    let console = Console::start(Console::reply(br#"{"id":12345678901234567890,"score":7,"name":"Ann"}"#)).await;
    let engine = console.direct_engine();
    let request = InvocationRequest::parse(r#"com.acme.UserService.getUser(12345678901234567890, "Ann")"#).expect("request");

    let result = engine.invoke(&request).await;

    assert!(result.success, "{result:?}");
    assert_eq!(result.payload, Some(json!({"id": "12345678901234567890", "score": 7, "name": "Ann"})));
    assert_eq!(
        console.commands(),
        vec![b"invoke com.acme.UserService.getUser(12345678901234567890, \"Ann\")\n".to_vec()]
    );
    let wire = serde_json::to_value(result.to_wire()).expect("wire");
    assert_eq!(wire["data"]["id"], json!("12345678901234567890"));
    assert_eq!(wire["message"], json!("invocation succeeded"));
}

#[tokio::test]
async fn response_split_across_chunks_is_reassembled() {
    let console = Console::start(vec![
        br#"{"id":1,"items":["#.to_vec(),
        b"1,2,3]".to_vec(),
        [b"}".as_slice(), PROMPT_TAIL].concat(),
    ])
    .await;
    let result = console
        .direct_engine()
        .invoke(&InvocationRequest::new("com.acme.OrderService", "getOrder", vec![CallArgument::Int(1)]))
        .await;
    assert_eq!(result.payload, Some(json!({"id": 1, "items": [1, 2, 3]})));
}

#[tokio::test]
async fn business_null_is_a_success_without_payload() {
    let console = Console::start(Console::reply(b"null")).await;
    let result = console
        .direct_engine()
        .invoke(&InvocationRequest::new("com.acme.UserService", "getUser", vec![CallArgument::Int(404)]))
        .await;
    assert!(result.success);
    assert!(result.is_business_null());
    assert_eq!(result.to_wire().data, serde_json::Value::Null);
}

#[tokio::test]
async fn void_method_reply_is_a_success_without_payload() {
    let console = Console::start(vec![b"\r\ndubbo>".to_vec()]).await;
    let result = console
        .direct_engine()
        .invoke(&InvocationRequest::new("com.acme.AuditService", "record", vec![CallArgument::Str("login".into())]))
        .await;
    assert!(result.success, "{result:?}");
    assert!(result.is_business_null());
}

#[tokio::test]
async fn remote_diagnostics_become_failed_results() {
    let diagnostic = "Failed to invoke method getUser, cause: No such method getUser in service com.acme.UserService";
    let console = Console::start(vec![diagnostic.as_bytes().to_vec()]).await;
    let result = console
        .direct_engine()
        .invoke(&InvocationRequest::new("com.acme.UserService", "getUser", vec![]))
        .await;
    assert!(!result.success);
    assert_eq!(result.error_kind, Some("RemoteError"));
    assert!(result.error_message.as_deref().unwrap_or_default().contains(diagnostic));
}

#[tokio::test]
async fn list_methods_always_return_arrays() {
    let console = Console::start(Console::reply(br#""{\"id\":3}""#)).await;
    let result = console
        .direct_engine()
        .invoke(&InvocationRequest::new("com.acme.UserService", "findUsersByIds", vec![]))
        .await;
    assert_eq!(result.payload, Some(json!([{"id": 3}])));
}

#[tokio::test]
async fn gbk_text_is_transcoded_both_ways() {
    // "张三" in GBK.
    let gbk_name: &[u8] = &[0xD5, 0xC5, 0xC8, 0xFD];
    let console = Console::start(Console::reply(&[br#"{"name":""#.as_slice(), gbk_name, br#""}"#.as_slice()].concat())).await;
    let result = console
        .direct_engine()
        .invoke(&InvocationRequest::new("com.acme.UserService", "rename", vec![CallArgument::Str("张三".into())]))
        .await;
    assert_eq!(result.payload, Some(json!({"name": "张三"})));
    let command = console.commands().remove(0);
    assert!(command.windows(gbk_name.len()).any(|window| window == gbk_name));
}

#[tokio::test]
async fn registry_backed_invocation_and_catalog() {
    let console = Console::start(Console::reply(br#""pong""#)).await;
    let registration = format!(
        "dubbo%3A%2F%2F127.0.0.1%3A{}%2Fcom.acme.HealthService%3Fversion%3D1.0.0",
        console.port
    );
    let store = MemoryStore::new()
        .with_node("/dubbo/com.acme.HealthService/providers", &[registration.as_str()])
        .with_node("/dubbo/com.acme.IdleService/providers", &[]);
    let resolver = HierarchicalResolver::new(Arc::new(store), "/dubbo");
    let engine = InvocationEngine::with_resolver(Arc::new(resolver), test_config());

    let catalog = engine.list_services().await.expect("catalog");
    assert_eq!(
        catalog,
        vec![ServiceDescriptor::new("com.acme.HealthService"), ServiceDescriptor::new("com.acme.IdleService")]
    );

    let result = engine.invoke(&InvocationRequest::new("com.acme.HealthService", "ping", vec![])).await;
    assert_eq!(result.payload, Some(json!("pong")));

    let missing = engine.try_invoke(&InvocationRequest::new("com.acme.IdleService", "ping", vec![])).await;
    assert!(matches!(missing, Err(InvokeError::NoProviderAvailable { .. })));
}

#[tokio::test]
async fn console_listing_reports_exported_services() {
    let console = Console::start(vec![b"com.acme.UserService\r\ncom.acme.OrderService\r\ndubbo>".to_vec()]).await;
    let engine = console.direct_engine();
    let endpoint = ProviderEndpoint::new("127.0.0.1", console.port, "dubbo");
    let services = engine.list_console_services(&endpoint).await.expect("listing");
    assert_eq!(services, vec!["com.acme.UserService", "com.acme.OrderService"]);
    assert_eq!(console.commands(), vec![b"ls\n".to_vec()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_callers_get_the_same_result() {
    let console = Console::start(Console::reply(b"true")).await;
    let engine = console.direct_engine();
    let result = engine.invoke_blocking(&InvocationRequest::new("com.acme.FlagService", "enabled", vec![]));
    assert!(result.success);
    assert_eq!(result.payload, Some(json!(true)));
}
