//! TCP management transport.
//!
//! A request is two consecutive 0x50 frames: the destination
//! configuration (empty for the device) and the JSON command. Each
//! request gets exactly one framed response. Requests on one connection
//! are handled in order.

use bytes::Bytes;
use fbrun_manager::{CommandIntent, FrameCodec, FrameError, Manager};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Transport error
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// The command body could not be decoded
    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    /// Peer closed the connection between the two frames of a request
    #[error("Connection closed after the destination frame")]
    Truncated,
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::ProtocolDecode(err.to_string())
    }
}

/// Management server
pub struct Server {
    manager: Arc<Manager>,
}

impl Server {
    /// Create a server dispatching to `manager`
    #[must_use]
    pub fn new(manager: Arc<Manager>) -> Self {
        Self { manager }
    }

    /// Bind `addr` and serve until `shutdown` is cancelled
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    pub async fn run(&self, addr: &str, shutdown: CancellationToken) -> Result<(), TransportError> {
        let listener = TcpListener::bind(addr).await?;
        info!(bind = %listener.local_addr()?, "management transport listening");
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Accept connections on `listener` until `shutdown` is cancelled
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let manager = Arc::clone(&self.manager);
                        let shutdown = shutdown.child_token();
                        tokio::spawn(async move {
                            match handle_connection(stream, peer, &manager, shutdown).await {
                                Ok(()) => debug!(%peer, "connection closed"),
                                Err(err) => {
                                    warn!(%peer, error = %err, "connection closed with error")
                                }
                            }
                        });
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                },
            }
        }
        info!("management transport stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    manager: &Manager,
    shutdown: CancellationToken,
) -> Result<(), TransportError> {
    debug!(%peer, "connection opened");
    let (reader, mut writer) = stream.into_split();
    let mut frames = FramedRead::new(reader, FrameCodec::new());

    loop {
        let destination = tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            frame = frames.next() => match frame {
                Some(frame) => frame?,
                None => return Ok(()),
            },
        };
        let body = frames.next().await.ok_or(TransportError::Truncated)??;

        let intent = decode_request(&destination, &body)?;
        debug!(%peer, request = %intent.id, action = %intent.action, "request received");

        let response = manager.dispatch_framed(&intent).await;
        writer.write_all(&response).await?;
    }
}

/// Build the command intent of one request; a non-empty destination
/// frame names the target configuration
fn decode_request(destination: &Bytes, body: &Bytes) -> Result<CommandIntent, TransportError> {
    let destination = std::str::from_utf8(destination)
        .map_err(|err| {
            TransportError::ProtocolDecode(format!("destination is not UTF-8: {}", err))
        })?
        .trim();

    let mut intent = CommandIntent::from_json(body)?;
    if !destination.is_empty() {
        intent.target = Some(destination.to_string());
    }
    Ok(intent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbrun_manager::{Response, ResponseBody};
    use fbrun_runtime::BlockRegistry;
    use futures::SinkExt;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio_util::codec::FramedWrite;

    struct Client {
        reader: FramedRead<OwnedReadHalf, FrameCodec>,
        writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
    }

    impl Client {
        async fn connect(addr: SocketAddr) -> Self {
            let (reader, writer) = TcpStream::connect(addr).await.unwrap().into_split();
            Self {
                reader: FramedRead::new(reader, FrameCodec::new()),
                writer: FramedWrite::new(writer, FrameCodec::new()),
            }
        }

        async fn send(&mut self, destination: &str, body: &str) {
            self.writer.send(Bytes::copy_from_slice(destination.as_bytes())).await.unwrap();
            self.writer.send(Bytes::copy_from_slice(body.as_bytes())).await.unwrap();
        }

        async fn request(&mut self, destination: &str, body: &str) -> Response {
            self.send(destination, body).await;
            let frame = self.reader.next().await.unwrap().unwrap();
            serde_json::from_slice(&frame).unwrap()
        }
    }

    async fn start() -> (SocketAddr, CancellationToken, Arc<Manager>) {
        let manager = Arc::new(Manager::new(Arc::new(BlockRegistry::with_builtins())));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();

        let server = Server::new(Arc::clone(&manager));
        let token = shutdown.clone();
        tokio::spawn(async move { server.serve(listener, token).await });
        (addr, shutdown, manager)
    }

    #[test]
    fn test_decode_request_uses_destination() {
        let intent = decode_request(
            &Bytes::from_static(b"RES0"),
            &Bytes::from_static(br#"{"id":"1","action":"START"}"#),
        )
        .unwrap();
        assert_eq!(intent.scope(), Some("RES0"));

        let body = Bytes::from_static(br#"{"id":"2","action":"QUERY"}"#);
        let intent = decode_request(&Bytes::new(), &body).unwrap();
        assert_eq!(intent.scope(), None);
    }

    #[test]
    fn test_decode_request_rejects_bad_json() {
        let result = decode_request(&Bytes::new(), &Bytes::from_static(b"<Request/>"));
        assert!(matches!(result, Err(TransportError::ProtocolDecode(_))));
    }

    #[tokio::test]
    async fn test_request_response_over_tcp() {
        let (addr, shutdown, manager) = start().await;
        let mut client = Client::connect(addr).await;

        let body = concat!(
            r#"{"id":"1","action":"CREATE","#,
            r#""operations":[{"FB":{"name":"RES0","type":"EMB_RES"}}]}"#
        );
        let response = client.request("", body).await;
        assert_eq!(response, Response::empty("1"));

        let body = concat!(
            r#"{"id":"2","action":"CREATE","#,
            r#""operations":[{"FB":{"name":"A","type":"MOVE"}}]}"#
        );
        let response = client.request("RES0", body).await;
        assert_eq!(response.id, "2");
        assert_eq!(manager.configuration("RES0").unwrap().block_count(), 1);

        let response = client.request("", r#"{"id":"3","action":"QUERY"}"#).await;
        let Some(ResponseBody::Resources(resources)) = response.result else {
            panic!("expected resources");
        };
        assert_eq!(resources[0].blocks, 1);

        shutdown.cancel();
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_target_over_tcp() {
        let (addr, shutdown, _manager) = start().await;
        let mut client = Client::connect(addr).await;

        let response = client.request("NOPE", r#"{"id":"9","action":"START"}"#).await;
        assert_eq!(response, Response::empty("9"));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_bad_body_closes_connection() {
        let (addr, shutdown, _manager) = start().await;
        let mut client = Client::connect(addr).await;

        client.send("", "not json").await;
        assert!(client.reader.next().await.is_none());
        shutdown.cancel();
    }
}
