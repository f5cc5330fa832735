use super::config::ConnectionConfig;
use super::Transport;
use crate::error::TransportError;
use crate::resp::{self, Command, Value};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

const READ_CHUNK: usize = 16 * 1024;

/// A single TCP connection speaking RESP.
///
/// Requests are serialized through a mutex so that each reply is read by the
/// caller that sent the matching command; concurrent callers queue up. A request
/// whose future is dropped mid-flight leaves the connection closed, and later
/// calls fail with [`TransportError::Closed`].
pub struct TcpTransport {
    wire: Mutex<Option<Wire>>,
    response_timeout: Option<Duration>,
    endpoint: String,
}

struct Wire {
    stream: TcpStream,
    buf: Vec<u8>,
    /// Set from the first byte written until the reply is parsed. Still set on
    /// entry means an earlier call was cancelled mid-flight and its reply may be
    /// pending on the socket.
    in_flight: bool,
}

impl Wire {
    async fn round_trip(&mut self, command: &Command) -> Result<Value, TransportError> {
        self.in_flight = true;
        self.stream.write_all(&command.encode()).await?;
        let value = self.read_value().await?;
        self.in_flight = false;
        Ok(value)
    }

    async fn read_value(&mut self) -> Result<Value, TransportError> {
        loop {
            if let Some((value, used)) = resp::parse(&self.buf)? {
                self.buf.drain(..used);
                return Ok(value);
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

impl TcpTransport {
    /// Open the socket and run the handshake (`AUTH`, `SELECT`, `CLIENT SETNAME`)
    /// for whatever the config asks for.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, TransportError> {
        let endpoint = config.endpoint();
        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.connect_timeout))??;
        stream.set_nodelay(true)?;

        let transport = TcpTransport {
            wire: Mutex::new(Some(Wire {
                stream,
                buf: Vec::with_capacity(READ_CHUNK),
                in_flight: false,
            })),
            response_timeout: config.response_timeout,
            endpoint,
        };

        for command in handshake(config) {
            transport.execute(&command).await?.into_result()?;
        }

        log::debug!("Connected to {}", transport.endpoint);
        Ok(transport)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn handshake(config: &ConnectionConfig) -> Vec<Command> {
    let mut commands = Vec::new();
    if let Some(password) = &config.password {
        let mut auth = Command::new("AUTH");
        if let Some(user) = &config.user {
            auth = auth.arg(user);
        }
        commands.push(auth.arg(password));
    }
    if let Some(db) = config.database {
        commands.push(Command::new("SELECT").arg(db.to_string()));
    }
    if let Some(name) = &config.client_name {
        commands.push(Command::new("CLIENT").arg("SETNAME").arg(name));
    }
    commands
}

#[async_trait]
impl Transport for TcpTransport {
    async fn execute(&self, command: &Command) -> Result<Value, TransportError> {
        let mut guard = self.wire.lock().await;
        let wire = guard.as_mut().ok_or(TransportError::Closed)?;
        if wire.in_flight {
            log::warn!(
                "Dropping connection to {}: a cancelled request left its reply unread",
                self.endpoint
            );
            guard.take();
            return Err(TransportError::Closed);
        }

        let result = match self.response_timeout {
            Some(limit) => tokio::time::timeout(limit, wire.round_trip(command))
                .await
                .unwrap_or(Err(TransportError::Timeout(limit))),
            None => wire.round_trip(command).await,
        };

        // After an IO failure or timeout the stream position is unknown; drop it.
        if matches!(
            result,
            Err(TransportError::Io(_) | TransportError::Timeout(_) | TransportError::Protocol(_) | TransportError::Closed)
        ) {
            log::warn!("Dropping connection to {} after failed {}", self.endpoint, command.name());
            guard.take();
        }

        result
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(mut wire) = self.wire.lock().await.take() {
            wire.stream.shutdown().await?;
            log::debug!("Closed connection to {}", self.endpoint);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accepts one connection and answers each received command with the next
    /// scripted reply. Returns the commands it saw.
    async fn scripted_server(replies: Vec<Value>) -> (ConnectionConfig, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut seen = Vec::new();
            let mut buf = Vec::new();
            let mut replies = replies.into_iter();

            loop {
                while let Some((value, used)) = resp::parse(&buf).unwrap() {
                    buf.drain(..used);
                    let parts: Vec<String> = value
                        .into_array()
                        .unwrap()
                        .iter()
                        .map(|v| v.as_str().unwrap().to_string())
                        .collect();
                    seen.push(parts.join(" "));
                    match replies.next() {
                        Some(reply) => socket.write_all(&reply.encode()).await.unwrap(),
                        None => return seen,
                    }
                }
                let mut chunk = [0u8; 1024];
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    return seen;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        });

        (ConnectionConfig::new("127.0.0.1", port), handle)
    }

    #[tokio::test]
    async fn test_execute_round_trip() {
        let (config, server) = scripted_server(vec![Value::SimpleString("PONG".into())]).await;
        let transport = TcpTransport::connect(&config).await.unwrap();

        let reply = transport.execute(&Command::new("PING")).await.unwrap();
        assert_eq!(reply.as_str(), Some("PONG"));

        transport.close().await.unwrap();
        assert_eq!(server.await.unwrap(), vec!["PING".to_string()]);
    }

    #[tokio::test]
    async fn test_handshake_commands() {
        let (mut config, server) = scripted_server(vec![Value::ok(), Value::ok(), Value::ok()]).await;
        config.user = Some("app".into());
        config.password = Some("pw".into());
        config.database = Some(4);
        config.client_name = Some("loader".into());

        let transport = TcpTransport::connect(&config).await.unwrap();
        transport.close().await.unwrap();

        assert_eq!(
            server.await.unwrap(),
            vec!["AUTH app pw", "SELECT 4", "CLIENT SETNAME loader"]
        );
    }

    #[tokio::test]
    async fn test_rejected_auth_fails_connect() {
        let (mut config, _server) =
            scripted_server(vec![Value::Error("WRONGPASS invalid password".into())]).await;
        config.password = Some("nope".into());

        let result = TcpTransport::connect(&config).await;
        assert!(matches!(result, Err(TransportError::Server(msg)) if msg.starts_with("WRONGPASS")));
    }

    #[tokio::test]
    async fn test_error_reply_is_returned_as_value() {
        let (config, _server) = scripted_server(vec![Value::Error("ERR unknown command".into())]).await;
        let transport = TcpTransport::connect(&config).await.unwrap();

        let reply = transport.execute(&Command::new("NOPE")).await.unwrap();
        assert_eq!(reply, Value::Error("ERR unknown command".into()));
    }

    #[tokio::test]
    async fn test_execute_after_close() {
        let (config, _server) = scripted_server(vec![]).await;
        let transport = TcpTransport::connect(&config).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let result = transport.execute(&Command::new("PING")).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_server_hangup_is_closed() {
        // The script has no replies, so the server returns on the first command.
        let (config, _server) = scripted_server(vec![]).await;
        let transport = TcpTransport::connect(&config).await.unwrap();

        let result = transport.execute(&Command::new("PING")).await;
        assert!(matches!(result, Err(TransportError::Closed) | Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_cancelled_request_poisons_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Answers every command with `reply-<n>`, holding back the first reply.
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut answered = 0;
            loop {
                while let Some((_, used)) = resp::parse(&buf).unwrap() {
                    buf.drain(..used);
                    answered += 1;
                    if answered == 1 {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    let reply = Value::bulk(format!("reply-{answered}"));
                    if socket.write_all(&reply.encode()).await.is_err() {
                        return;
                    }
                }
                let mut chunk = [0u8; 1024];
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
        });

        let transport = TcpTransport::connect(&ConnectionConfig::new("127.0.0.1", port))
            .await
            .unwrap();

        let first = tokio::time::timeout(
            Duration::from_millis(50),
            transport.execute(&Command::new("GET").arg("a")),
        )
        .await;
        assert!(first.is_err());

        // The pending `reply-1` must never be handed to a later command.
        let second = transport.execute(&Command::new("GET").arg("b")).await;
        assert!(matches!(second, Err(TransportError::Closed)));
        let third = transport.execute(&Command::new("GET").arg("c")).await;
        assert!(matches!(third, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = TcpTransport::connect(&ConnectionConfig::new("127.0.0.1", port)).await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
