use super::Transport;
use crate::core::{JoinError, NodeId, Result};
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};

/// Registry of bound in-memory endpoints.
///
/// Simulates the network inside one process: each bound node owns an
/// unbounded channel and peers push encoded messages into it.
#[derive(Clone, Default)]
pub struct InMemoryTransportHub {
    peers: Arc<Mutex<HashMap<NodeId, UnboundedSender<Vec<u8>>>>>,
}

impl InMemoryTransportHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the inbound channel of `node_id`. Each node binds exactly once.
    pub async fn bind(&self, node_id: NodeId) -> Result<InMemoryTransport> {
        let mut peers = self.peers.lock().await;
        if peers.contains_key(&node_id) {
            return Err(JoinError::Transport(format!(
                "node {} is already bound",
                node_id
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        peers.insert(node_id, tx);
        debug!("in-memory transport bound node {}", node_id);
        Ok(InMemoryTransport {
            node_id,
            hub: self.clone(),
            inbound: std::sync::Mutex::new(rx),
        })
    }

    pub async fn bound_nodes(&self) -> usize {
        self.peers.lock().await.len()
    }

    async fn peer(&self, node_id: NodeId) -> Result<UnboundedSender<Vec<u8>>> {
        let peers = self.peers.lock().await;
        peers.get(&node_id).cloned().ok_or_else(|| {
            JoinError::Transport(format!("target node {} is not bound", node_id))
        })
    }
}

/// One node's endpoint on an [`InMemoryTransportHub`].
pub struct InMemoryTransport {
    node_id: NodeId,
    hub: InMemoryTransportHub,
    inbound: std::sync::Mutex<UnboundedReceiver<Vec<u8>>>,
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    async fn send(&self, target: NodeId, message: Vec<u8>) -> Result<()> {
        let peer = self.hub.peer(target).await?;
        peer.send(message).map_err(|_| {
            JoinError::Transport(format!(
                "node {} inbound channel closed (sender {})",
                target, self.node_id
            ))
        })
    }

    fn try_receive(&self) -> Result<Option<Vec<u8>>> {
        let mut inbound = self.inbound.lock()?;
        match inbound.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(JoinError::Transport(format!(
                "node {} inbound channel disconnected",
                self.node_id
            ))),
        }
    }
}
