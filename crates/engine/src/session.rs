//! One console connection to one provider, used for one exchange.

use std::fmt;
use std::time::Duration;

use dubbo_invoke_types::{CallArgument, InvokeError, ProviderEndpoint};
use dubbo_invoke_util::encode_for_provider;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use crate::assembler::{PROMPT_MARKER, READ_BUFFER_SIZE, RawResponse, ResponseAssembler};
use crate::codec::invoke_command;
use crate::config::EngineConfig;

/// Console command listing exported services.
pub const LIST_COMMAND: &str = "ls\n";

/// Lines of an `ls` listing that label sections rather than name services.
const LISTING_HEADINGS: [&str; 4] = ["PROVIDER", "CONSUMER", "Use", "help"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sent,
    Assembling,
    Complete,
    TimedOut,
    ConnectionError,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Sent => "sent",
            Self::Assembling => "assembling",
            Self::Complete => "complete",
            Self::TimedOut => "timed-out",
            Self::ConnectionError => "connection-error",
        })
    }
}

/// Deadlines that govern one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadTimeouts {
    pub call: Duration,
    pub initial: Duration,
    pub idle: Duration,
}

impl From<&EngineConfig> for ReadTimeouts {
    fn from(config: &EngineConfig) -> Self {
        Self {
            call: config.call_timeout,
            initial: config.initial_read_timeout,
            idle: config.idle_read_timeout,
        }
    }
}

pub struct ProviderSession<S> {
    stream: S,
    endpoint: String,
    timeouts: ReadTimeouts,
    state: SessionState,
}

impl ProviderSession<TcpStream> {
    pub async fn connect(endpoint: &ProviderEndpoint, config: &EngineConfig) -> Result<Self, InvokeError> {
        let authority = endpoint.authority();
        debug!(endpoint = %authority, "connecting to provider console");
        let stream = match timeout(config.connect_timeout, TcpStream::connect(&authority)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(error)) => return Err(InvokeError::connection(&authority, error.to_string())),
            Err(_) => {
                return Err(InvokeError::connection(
                    &authority,
                    format!("connect timed out after {} ms", config.connect_timeout.as_millis()),
                ));
            }
        };
        if let Err(error) = stream.set_nodelay(true) {
            debug!(endpoint = %authority, error = %error, "could not disable Nagle on provider socket");
        }
        Ok(Self::new(stream, authority, ReadTimeouts::from(config)))
    }
}

impl<S> ProviderSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, endpoint: impl Into<String>, timeouts: ReadTimeouts) -> Self {
        Self {
            stream,
            endpoint: endpoint.into(),
            timeouts,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub async fn invoke(&mut self, service: &str, method: &str, arguments: &[CallArgument]) -> Result<RawResponse, InvokeError> {
        self.exchange(&invoke_command(service, method, arguments)).await
    }

    /// Services the console reports through `ls`.
    pub async fn list_services(&mut self) -> Result<Vec<String>, InvokeError> {
        let response = self.exchange(LIST_COMMAND).await?;
        Ok(parse_service_listing(&response.text))
    }

    /// Writes one command and assembles its response.
    pub async fn exchange(&mut self, command: &str) -> Result<RawResponse, InvokeError> {
        let bytes = encode_for_provider(command);
        let write = async {
            self.stream.write_all(&bytes).await?;
            self.stream.flush().await
        };
        if let Err(error) = write.await {
            self.transition(SessionState::ConnectionError);
            return Err(InvokeError::connection(&self.endpoint, format!("write failed: {error}")));
        }
        self.transition(SessionState::Sent);

        let mut assembler = ResponseAssembler::new(self.timeouts.call);
        let mut chunk = [0u8; READ_BUFFER_SIZE];
        let mut first_byte_at: Option<Instant> = None;
        loop {
            let deadline = if assembler.is_empty() { self.timeouts.initial } else { self.timeouts.idle };
            match timeout(deadline, self.stream.read(&mut chunk)).await {
                Err(_) if assembler.is_empty() => {
                    self.transition(SessionState::TimedOut);
                    return Err(InvokeError::timeout(millis(self.timeouts.initial)));
                }
                Err(_) => {
                    debug!(endpoint = %self.endpoint, bytes = assembler.byte_len(), "idle deadline reached; data stopped");
                    break;
                }
                Ok(Ok(0)) if assembler.is_empty() => {
                    self.transition(SessionState::ConnectionError);
                    return Err(InvokeError::connection(&self.endpoint, "connection closed before any response"));
                }
                Ok(Ok(0)) => {
                    debug!(endpoint = %self.endpoint, bytes = assembler.byte_len(), "provider closed the connection");
                    break;
                }
                Ok(Ok(read)) => {
                    self.transition(SessionState::Assembling);
                    let started = *first_byte_at.get_or_insert_with(Instant::now);
                    if let Some(reason) = assembler.push_chunk(&chunk[..read], started.elapsed()) {
                        debug!(endpoint = %self.endpoint, reason = %reason, bytes = assembler.byte_len(), "response complete");
                        break;
                    }
                }
                // The loop stops at the first matched heuristic, so an error
                // here always arrives before the response looked complete.
                Ok(Err(error)) => {
                    self.transition(SessionState::ConnectionError);
                    warn!(endpoint = %self.endpoint, bytes = assembler.byte_len(), error = %error, "read failed mid-response");
                    return Err(InvokeError::connection(&self.endpoint, format!("read failed: {error}")));
                }
            }
        }
        self.transition(SessionState::Complete);
        Ok(assembler.finish())
    }

    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(endpoint = %self.endpoint, from = %self.state, to = %next, "session state");
            self.state = next;
        }
    }
}

/// Service names in an `ls` listing: dotted names without spaces, skipping
/// prompts and headings.
pub fn parse_service_listing(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && !line.starts_with(PROMPT_MARKER)
                && !LISTING_HEADINGS.iter().any(|heading| line.contains(heading))
                && line.contains('.')
                && !line.contains(' ')
        })
        .map(str::to_string)
        .collect()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::CompletionReason;
    use tokio::io::duplex;

    fn timeouts() -> ReadTimeouts {
        ReadTimeouts {
            call: Duration::from_millis(500),
            initial: Duration::from_millis(300),
            idle: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn sends_command_and_assembles_chunks() {
        let (client, mut provider) = duplex(64 * 1024);
        let mut session = ProviderSession::new(client, "test-provider", timeouts());
        let console = tokio::spawn(async move {
            let mut received = vec![0u8; 256];
            let read = provider.read(&mut received).await.expect("command");
            received.truncate(read);
            provider.write_all(br#"{"id":1,"items":["#).await.expect("chunk");
            tokio::time::sleep(Duration::from_millis(10)).await;
            provider.write_all(b"1,2,3]").await.expect("chunk");
            tokio::time::sleep(Duration::from_millis(10)).await;
            provider.write_all(b"}\r\nelapsed: 3 ms.\r\ndubbo>").await.expect("chunk");
            received
        });

        let response = session
            .invoke("com.acme.Orders", "find", &[CallArgument::Int(7)])
            .await
            .expect("response");
        assert_eq!(console.await.expect("console"), b"invoke com.acme.Orders.find(7)\n");
        assert_eq!(response.completion, CompletionReason::PromptAndTiming);
        assert!(response.text.starts_with(r#"{"id":1,"items":[1,2,3]}"#));
        assert_eq!(session.state(), SessionState::Complete);
    }

    #[tokio::test]
    async fn silence_is_a_call_timeout() {
        let (client, _provider) = duplex(1024);
        let mut session = ProviderSession::new(client, "test-provider", timeouts());
        let error = session.invoke("svc", "m", &[]).await.expect_err("timeout");
        assert!(matches!(error, InvokeError::CallTimeout { timeout_ms: 300 }));
        assert_eq!(session.state(), SessionState::TimedOut);
    }

    #[tokio::test]
    async fn idle_after_data_completes() {
        let (client, mut provider) = duplex(1024);
        let mut session = ProviderSession::new(client, "test-provider", timeouts());
        let console = tokio::spawn(async move {
            let mut command = [0u8; 64];
            let _ = provider.read(&mut command).await;
            provider.write_all(b"partial text").await.expect("chunk");
            tokio::time::sleep(Duration::from_millis(400)).await;
            provider
        });
        let response = session.invoke("svc", "m", &[]).await.expect("response");
        assert_eq!(response.text, "partial text");
        assert_eq!(response.completion, CompletionReason::DataStopped);
        drop(console.await);
    }

    #[tokio::test]
    async fn closed_before_reply_is_a_connection_failure() {
        let (client, provider) = duplex(1024);
        drop(provider);
        let mut session = ProviderSession::new(client, "test-provider", timeouts());
        let error = session.invoke("svc", "m", &[]).await.expect_err("closed");
        assert!(matches!(error, InvokeError::ConnectionFailure { .. }));
        assert_eq!(session.state(), SessionState::ConnectionError);
    }

    #[test]
    fn listing_keeps_service_names() {
        let text = "PROVIDER:\r\ncom.acme.UserService\r\ncom.acme.OrderService\r\nUse ls -l for details\r\nnot a service\r\ndubbo>";
        assert_eq!(parse_service_listing(text), vec!["com.acme.UserService", "com.acme.OrderService"]);
    }

    #[tokio::test]
    async fn connects_over_tcp_and_reports_refusals() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let accept = tokio::spawn(async move { listener.accept().await.map(|(socket, _)| socket) });

        let config = EngineConfig::default();
        let session = ProviderSession::connect(&ProviderEndpoint::new("127.0.0.1", port, "dubbo"), &config)
            .await
            .expect("session");
        assert_eq!(session.state(), SessionState::Idle);
        let _socket = accept.await.expect("accept task").expect("accepted");
        session.close().await;

        let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let closed_port = closed.local_addr().expect("addr").port();
        drop(closed);
        let refused = ProviderSession::connect(&ProviderEndpoint::new("127.0.0.1", closed_port, "dubbo"), &config).await;
        assert!(matches!(refused, Err(InvokeError::ConnectionFailure { .. })));
    }
}
