use super::Transport;
use crate::config::NodeConfig;
use crate::core::{JoinError, NodeId, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::task::JoinHandle;

/// Largest accepted frame payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Writes one length-prefixed frame (u32 big-endian length, then payload).
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(JoinError::Transport(format!(
            "frame of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    Ok(())
}

/// Reads one frame. `None` means the peer closed the stream between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(JoinError::Transport(format!(
            "incoming frame of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_LEN
        )));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// TCP endpoint of one node.
///
/// Binding starts a background accept loop; every accepted connection gets a
/// reader task that pushes decoded frames into the node's inbound queue.
/// Outbound connections are opened on first use and kept per peer.
pub struct TcpTransport {
    node_id: NodeId,
    nodes: NodeConfig,
    local_addr: SocketAddr,
    inbound: std::sync::Mutex<UnboundedReceiver<Vec<u8>>>,
    outbound: Mutex<HashMap<NodeId, TcpStream>>,
    accept_task: Option<JoinHandle<()>>,
}

impl TcpTransport {
    pub async fn bind(node_id: NodeId, nodes: NodeConfig) -> Result<Self> {
        let addr = nodes.address(node_id)?;
        let listener = TcpListener::bind(addr).await.map_err(|err| {
            JoinError::Transport(format!("node {} cannot bind {}: {}", node_id, addr, err))
        })?;
        Self::from_listener(node_id, listener, nodes)
    }

    /// Wraps an already bound listener. Lets callers bind every node on port 0
    /// first and build the [`NodeConfig`] from the resulting addresses.
    pub fn from_listener(node_id: NodeId, listener: TcpListener, nodes: NodeConfig) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        info!("node {} listening on {}", node_id, local_addr);

        let (tx, rx) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(accept_loop(node_id, listener, tx));

        Ok(Self {
            node_id,
            nodes,
            local_addr,
            inbound: std::sync::Mutex::new(rx),
            outbound: Mutex::new(HashMap::new()),
            accept_task: Some(accept_task),
        })
    }

    /// Binds `node_count` nodes on ephemeral localhost ports.
    pub async fn bind_local_cluster(node_count: usize) -> Result<Vec<Self>> {
        let mut listeners = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            listeners.push(TcpListener::bind(("127.0.0.1", 0)).await?);
        }
        let addresses = listeners
            .iter()
            .map(|listener| listener.local_addr())
            .collect::<std::io::Result<Vec<_>>>()?;
        let nodes = NodeConfig::new(addresses)?;
        listeners
            .into_iter()
            .enumerate()
            .map(|(node_id, listener)| Self::from_listener(node_id, listener, nodes.clone()))
            .collect()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

async fn accept_loop(node_id: NodeId, listener: TcpListener, tx: UnboundedSender<Vec<u8>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("node {} accepted connection from {}", node_id, peer);
                tokio::spawn(read_connection(node_id, peer, stream, tx.clone()));
            }
            Err(err) => {
                warn!("node {} accept failed: {}", node_id, err);
                break;
            }
        }
    }
}

async fn read_connection(
    node_id: NodeId,
    peer: SocketAddr,
    mut stream: TcpStream,
    tx: UnboundedSender<Vec<u8>>,
) {
    loop {
        match read_frame(&mut stream).await {
            Ok(Some(frame)) => {
                if tx.send(frame).is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("node {}: connection from {} closed", node_id, peer);
                break;
            }
            Err(err) => {
                warn!("node {}: reading from {} failed: {}", node_id, peer, err);
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    async fn send(&self, target: NodeId, message: Vec<u8>) -> Result<()> {
        let mut outbound = self.outbound.lock().await;
        if !outbound.contains_key(&target) {
            let addr = self.nodes.address(target)?;
            let stream = TcpStream::connect(addr).await.map_err(|err| {
                JoinError::Transport(format!(
                    "node {} cannot connect to node {} at {}: {}",
                    self.node_id, target, addr, err
                ))
            })?;
            stream.set_nodelay(true)?;
            outbound.insert(target, stream);
        }
        let stream = outbound.get_mut(&target).ok_or_else(|| {
            JoinError::Transport(format!("no connection to node {}", target))
        })?;
        write_frame(stream, &message).await?;
        stream.flush().await?;
        Ok(())
    }

    fn try_receive(&self) -> Result<Option<Vec<u8>>> {
        let mut inbound = self.inbound.lock()?;
        match inbound.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(JoinError::Transport(format!(
                "node {} listener stopped",
                self.node_id
            ))),
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(accept_task) = self.accept_task.take() {
            accept_task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_round_trip_over_a_duplex_pipe() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, b"abc").await.unwrap();
        write_frame(&mut client, b"").await.unwrap();
        drop(client);

        assert_eq!(read_frame(&mut server).await.unwrap(), Some(b"abc".to_vec()));
        assert_eq!(read_frame(&mut server).await.unwrap(), Some(Vec::new()));
        assert_eq!(read_frame(&mut server).await.unwrap(), None);
    }

    #[tokio::test]
    async fn local_cluster_delivers_in_send_order() {
        let nodes = TcpTransport::bind_local_cluster(2).await.unwrap();
        assert_ne!(nodes[0].local_addr(), nodes[1].local_addr());

        nodes[0].send(1, b"first".to_vec()).await.unwrap();
        nodes[0].send(1, b"second".to_vec()).await.unwrap();

        let mut received = Vec::new();
        for _ in 0..500 {
            if let Some(message) = nodes[1].try_receive().unwrap() {
                received.push(message);
                if received.len() == 2 {
                    break;
                }
            } else {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        }
        assert_eq!(received, vec![b"first".to_vec(), b"second".to_vec()]);
        assert!(nodes[1].send(5, Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn oversized_frame_header_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32(u32::MAX).await.unwrap();
        assert!(matches!(
            read_frame(&mut server).await,
            Err(JoinError::Transport(_))
        ));
    }
}
