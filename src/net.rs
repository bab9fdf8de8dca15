use crate::error::{Result, RingError};
use crate::handlers::handle_request;
use crate::messages::{Request, Response};
use crate::Node;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{io, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, error, warn};

const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

/// One-shot request/response calls to other nodes.
#[async_trait]
pub trait RingClient: Send + Sync + 'static {
    /// Send `request` to `to` and wait for its single response.
    async fn call(&self, to: SocketAddr, request: Request) -> Result<Response>;

    /// Send `request` to `to` without waiting for an answer.
    async fn send(&self, to: SocketAddr, request: Request) -> Result<()>;
}

/// Opens a fresh connection per call; every call is bounded by `timeout`.
#[derive(Clone, Debug)]
pub struct TcpClient {
    timeout: Duration,
}

impl TcpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn with_timeout<T>(
        &self,
        to: SocketAddr,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| RingError::Timeout {
                addr: to,
                timeout: self.timeout,
            })?
    }
}

#[async_trait]
impl RingClient for TcpClient {
    async fn call(&self, to: SocketAddr, request: Request) -> Result<Response> {
        self.with_timeout(to, async {
            let mut stream = connect(to).await?;
            send_msg(&mut stream, &request)
                .await
                .map_err(|e| into_ring_error(to, e))?;
            recv_msg(&mut stream)
                .await
                .map_err(|e| into_ring_error(to, e))
        })
        .await
    }

    async fn send(&self, to: SocketAddr, request: Request) -> Result<()> {
        self.with_timeout(to, async {
            let mut stream = connect(to).await?;
            send_msg(&mut stream, &request)
                .await
                .map_err(|e| into_ring_error(to, e))?;
            let _ = stream.shutdown().await;
            Ok(())
        })
        .await
    }
}

async fn connect(to: SocketAddr) -> Result<TcpStream> {
    let stream = TcpStream::connect(to)
        .await
        .map_err(|source| RingError::Connection { addr: to, source })?;
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

/// Framing failures: transport trouble or a payload that does not decode.
#[derive(Debug)]
pub(crate) enum FrameError {
    Io(io::Error),
    Decode(String),
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        FrameError::Io(e)
    }
}

fn into_ring_error(addr: SocketAddr, e: FrameError) -> RingError {
    match e {
        FrameError::Io(source) => RingError::Connection { addr, source },
        FrameError::Decode(reason) => RingError::Protocol { addr, reason },
    }
}

// Handles serialization of the raw message
pub(crate) async fn send_msg<M, W>(stream: &mut W, msg: &M) -> std::result::Result<(), FrameError>
where
    M: Serialize,
    W: AsyncWriteExt + Unpin,
{
    let encoded = bincode::serialize(msg).map_err(|e| FrameError::Decode(e.to_string()))?;
    let len = encoded.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&encoded).await?;
    stream.flush().await?;
    Ok(())
}

// handles deserialization of the raw message
pub(crate) async fn recv_msg<M, R>(stream: &mut R) -> std::result::Result<M, FrameError>
where
    M: for<'de> Deserialize<'de>,
    R: AsyncReadExt + Unpin,
{
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::Decode(format!("frame of {len} bytes is too large")));
    }
    let mut buffer = vec![0u8; len];
    stream.read_exact(&mut buffer).await?;
    bincode::deserialize(&buffer).map_err(|e| FrameError::Decode(e.to_string()))
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RingError::Bind { addr, source })
}

/// Accept loop: one task per inbound connection, each serving one request.
pub async fn serve<C: RingClient>(listener: TcpListener, node: Arc<Node<C>>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let node = node.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(&node, stream, addr).await {
                        warn!("[{}] request from {} failed: {}", node.me(), addr, e);
                    }
                });
            }
            Err(e) => error!("Accept failed: {}", e),
        }
    }
}

async fn handle_connection<C: RingClient>(
    node: &Node<C>,
    mut stream: TcpStream,
    from: SocketAddr,
) -> Result<()> {
    let _ = stream.set_nodelay(true);
    let request: Request = match recv_msg(&mut stream).await {
        Ok(request) => request,
        Err(FrameError::Decode(reason)) => {
            // no response: the caller will see the connection close
            warn!("[{}] unsupported request from {}: {}", node.me(), from, reason);
            return Ok(());
        }
        Err(e) => return Err(into_ring_error(from, e)),
    };

    debug!("[{}] {} from {}", node.me(), request.action(), from);
    if let Some(response) = handle_request(node, request).await? {
        send_msg(&mut stream, &response)
            .await
            .map_err(|e| into_ring_error(from, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::Membership;
    use crate::{NodeId, Settings};

    fn settings() -> Settings {
        Settings {
            stabilize_interval: Duration::from_millis(50),
            rpc_timeout: Duration::from_millis(500),
            ..Settings::default()
        }
    }

    async fn spawn_node() -> Arc<Node<TcpClient>> {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let settings = settings();
        let me = NodeId::from_addr(&settings.space, addr);
        let node = Arc::new(Node::new(me, TcpClient::new(settings.rpc_timeout), settings));
        tokio::spawn(serve(listener, node.clone()));
        node
    }

    #[tokio::test]
    async fn frames_round_trip_over_a_socket() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        send_msg(&mut a, &Request::Cpf { id: 99 }).await.unwrap();
        let got: Request = recv_msg(&mut b).await.unwrap();
        assert_eq!(got, Request::Cpf { id: 99 });
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&(u32::MAX).to_be_bytes()).await.unwrap();
        match recv_msg::<Request, _>(&mut b).await {
            Err(FrameError::Decode(_)) => {}
            other => panic!("expected a decode error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn succ_and_pred_over_tcp() {
        let node = spawn_node().await;
        let client = TcpClient::new(Duration::from_millis(500));

        let succ = client.call(node.me().addr, Request::Succ).await.unwrap();
        assert_eq!(succ, Response::Successor(node.me().clone()));

        let pred = client.call(node.me().addr, Request::Pred).await.unwrap();
        assert_eq!(pred, Response::Predecessor(Some(node.me().clone())));
    }

    #[tokio::test]
    async fn malformed_request_gets_no_response() {
        let node = spawn_node().await;
        let mut stream = TcpStream::connect(node.me().addr).await.unwrap();

        // a well-formed frame carrying an action that does not exist
        let payload = 42u32.to_le_bytes();
        stream.write_all(&(payload.len() as u32).to_be_bytes()).await.unwrap();
        stream.write_all(&payload).await.unwrap();

        let mut buf = Vec::new();
        let read = stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(read, 0, "node must close without answering");

        // the node keeps serving afterwards
        let client = TcpClient::new(Duration::from_millis(500));
        assert!(client.call(node.me().addr, Request::Succ).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_peer_is_a_connection_error() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = TcpClient::new(Duration::from_millis(500));
        let err = client.call(addr, Request::Succ).await.unwrap_err();
        assert!(err.is_peer_failure(), "{err}");
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        // accepts but never answers
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = TcpClient::new(Duration::from_millis(100));
        match client.call(addr, Request::Succ).await {
            Err(RingError::Timeout { addr: a, .. }) => assert_eq!(a, addr),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn binding_a_used_port_fails() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        match bind(addr).await {
            Err(RingError::Bind { addr: a, .. }) => assert_eq!(a, addr),
            other => panic!("expected bind error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn two_nodes_join_over_tcp() {
        let a = spawn_node().await;
        let b = spawn_node().await;

        let succ = b.join(a.me().addr).await.unwrap();
        assert_eq!(&succ, a.me());

        let a_snap = a.snapshot().await.unwrap();
        assert_eq!(&a_snap.successor, b.me());
        assert_eq!(a_snap.predecessor.as_ref(), Some(b.me()));

        let b_snap = b.snapshot().await.unwrap();
        assert_eq!(&b_snap.successor, a.me());
        assert_eq!(b_snap.predecessor, None);
        assert_eq!(b_snap.membership, Membership::Joined);

        // one stabilize from a hands b its predecessor
        a.stabilize().await.unwrap();
        // notify is fire-and-forget; give b's handler a moment
        for _ in 0..50 {
            if b.snapshot().await.unwrap().predecessor.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(b.snapshot().await.unwrap().predecessor.as_ref(), Some(a.me()));
    }
}
