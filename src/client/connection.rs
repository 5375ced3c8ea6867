//! Node Connection Module
//!
//! One TCP connection from the client to a cache node.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::protocol::ROLE_CLIENT;

// == Node Connection ==
/// A connection record: the node address and, while active, its socket.
///
/// The mutex is held across a command's write and read so concurrent
/// callers never interleave bytes on the socket. An I/O failure drops the
/// socket and leaves the record inactive until the next `establish`.
#[derive(Debug)]
pub struct NodeConnection {
    addr: String,
    stream: Mutex<Option<TcpStream>>,
}

impl NodeConnection {
    /// Creates an inactive record for `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn is_active(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    // == Establish ==
    /// Dials the node and sends the client handshake byte.
    ///
    /// A failed attempt is retried up to `retries` more times, sleeping
    /// `retry_interval` in between.
    pub async fn establish(&self, retries: u32, retry_interval: Duration) -> Result<(), ClientError> {
        let mut guard = self.stream.lock().await;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match dial(&self.addr).await {
                Ok(stream) => {
                    info!(node = %self.addr, attempt, "Connection established");
                    *guard = Some(stream);
                    return Ok(());
                }
                Err(err) if attempt <= retries => {
                    debug!(node = %self.addr, attempt, error = %err, "Connect failed, retrying");
                    tokio::time::sleep(retry_interval).await;
                }
                Err(err) => {
                    return Err(ClientError::ConnectFailed {
                        addr: self.addr.clone(),
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    // == Execute ==
    /// Writes one encoded command and reads one response.
    ///
    /// `read_buffer_size` caps the response; replies are not framed, so the
    /// caller sizes it for the largest expected payload.
    pub async fn exec(&self, cmd: &[u8], read_buffer_size: usize) -> Result<Vec<u8>, ClientError> {
        let mut guard = self.stream.lock().await;
        let Some(stream) = guard.as_mut() else {
            return Err(ClientError::ConnectionInactive(self.addr.clone()));
        };

        match round_trip(stream, cmd, read_buffer_size).await {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!(node = %self.addr, error = %err, "Connection lost, marking inactive");
                *guard = None;
                Err(ClientError::Connection {
                    addr: self.addr.clone(),
                    source: err,
                })
            }
        }
    }

    // == Close ==
    /// Shuts the socket down if there is one. The record becomes inactive.
    pub async fn close(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
            debug!(node = %self.addr, "Connection closed");
        }
    }
}

async fn dial(addr: &str) -> io::Result<TcpStream> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    stream.write_all(&[ROLE_CLIENT]).await?;
    Ok(stream)
}

async fn round_trip<S>(stream: &mut S, cmd: &[u8], read_buffer_size: usize) -> io::Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(cmd).await?;

    let mut buf = vec![0u8; read_buffer_size];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by node",
        ));
    }
    buf.truncate(n);
    Ok(buf)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_round_trip_reads_one_response() {
        let mut mock = Builder::new()
            .write(&[1, 3, b'f', b'o', b'o'])
            .read(b"bar")
            .build();

        let response = round_trip(&mut mock, &[1, 3, b'f', b'o', b'o'], 2048)
            .await
            .unwrap();
        assert_eq!(response, b"bar");
    }

    #[tokio::test]
    async fn test_round_trip_eof_is_error() {
        let mut mock = Builder::new().write(&[4]).build();

        let err = round_trip(&mut mock, &[4], 2048).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_exec_inactive() {
        let conn = NodeConnection::new("127.0.0.1:1");
        let err = conn.exec(&[4], 2048).await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionInactive(addr) if addr == "127.0.0.1:1"));
    }

    #[tokio::test]
    async fn test_establish_sends_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let conn = NodeConnection::new(addr);
        conn.establish(0, Duration::ZERO).await.unwrap();
        assert!(conn.is_active().await);

        let (mut peer, _) = listener.accept().await.unwrap();
        let mut role = [0u8; 1];
        peer.read_exact(&mut role).await.unwrap();
        assert_eq!(role[0], ROLE_CLIENT);
    }

    #[tokio::test]
    async fn test_establish_exhausts_retries() {
        // Bind then drop to get a port nothing listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let conn = NodeConnection::new(addr.clone());
        let err = conn
            .establish(2, Duration::from_millis(5))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::ConnectFailed { attempts: 3, addr: ref a, .. } if *a == addr
        ));
        assert!(!conn.is_active().await);
    }

    #[tokio::test]
    async fn test_exec_marks_inactive_on_peer_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let conn = NodeConnection::new(addr);
        conn.establish(0, Duration::ZERO).await.unwrap();
        let (peer, _) = listener.accept().await.unwrap();
        drop(peer);

        let err = conn.exec(&[4], 2048).await.unwrap_err();
        assert!(matches!(err, ClientError::Connection { .. }));
        assert!(!conn.is_active().await);
    }
}
