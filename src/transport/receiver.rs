use super::Transport;
use super::wire::{self, Message};
use crate::core::{JoinError, NodeId, Relation, Result};
use crate::storage::SharedTupleStore;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// The receive stores of one node, one per relation.
#[derive(Debug, Clone)]
pub struct ReceiveStores {
    pub r: SharedTupleStore,
    pub s: SharedTupleStore,
}

impl ReceiveStores {
    pub fn with_capacity(r_capacity: usize, s_capacity: usize) -> Self {
        Self {
            r: SharedTupleStore::with_capacity(r_capacity),
            s: SharedTupleStore::with_capacity(s_capacity),
        }
    }

    pub fn for_relation(&self, relation: Relation) -> &SharedTupleStore {
        match relation {
            Relation::R => &self.r,
            Relation::S => &self.s,
        }
    }
}

/// What a receiver drained before it finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiveStats {
    pub messages: usize,
    pub r_rows: usize,
    pub s_rows: usize,
    /// Messages with an unknown tag or a broken body; skipped
    pub malformed: usize,
    /// Failed polls of the transport; retried
    pub transport_errors: usize,
    /// Peers that signalled end-of-stream
    pub finished_peers: usize,
}

/// Background task draining a node's inbound messages into its receive stores.
pub struct ReceiverWorker {
    node_id: NodeId,
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<Result<ReceiveStats>>>,
}

impl ReceiverWorker {
    /// Waits until every expected peer has finished sending, at most `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<ReceiveStats> {
        let Some(mut join_handle) = self.join_handle.take() else {
            return Err(JoinError::Execution(format!(
                "receiver of node {} already collected",
                self.node_id
            )));
        };
        match tokio::time::timeout(timeout, &mut join_handle).await {
            Ok(joined) => joined?,
            Err(_) => {
                join_handle.abort();
                Err(JoinError::Timeout(format!(
                    "node {} still waiting for peers after {:?}",
                    self.node_id, timeout
                )))
            }
        }
    }

    /// Signals the worker to stop and returns what it drained so far.
    pub async fn stop(mut self) -> Result<ReceiveStats> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        match self.join_handle.take() {
            Some(join_handle) => join_handle.await?,
            None => Ok(ReceiveStats::default()),
        }
    }
}

impl Drop for ReceiverWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns the receiver of one node.
///
/// The worker finishes once `expected_peers` distinct peers have sent their
/// end-of-stream marker. Rows from one peer always precede its marker, so at
/// that point every row addressed to this node is in `stores`. Malformed
/// messages are logged and skipped; overflowing a receive store ends the
/// worker with [`JoinError::CapacityExceeded`].
pub fn spawn_receiver(
    transport: Arc<dyn Transport>,
    stores: ReceiveStores,
    expected_peers: usize,
    poll_interval: Duration,
) -> ReceiverWorker {
    let node_id = transport.node_id();
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        let mut stats = ReceiveStats::default();
        let mut finished: HashSet<NodeId> = HashSet::new();

        while finished.len() < expected_peers {
            match transport.try_receive() {
                Ok(Some(bytes)) => {
                    stats.messages += 1;
                    match wire::decode(&bytes) {
                        Ok(Message::Rows { relation, rows }) => {
                            stores.for_relation(relation).extend_from_slice(&rows)?;
                            match relation {
                                Relation::R => stats.r_rows += rows.len(),
                                Relation::S => stats.s_rows += rows.len(),
                            }
                        }
                        Ok(Message::EndOfStream { sender }) => {
                            debug!("node {} got end-of-stream from node {}", node_id, sender);
                            finished.insert(sender);
                        }
                        Err(err) => {
                            stats.malformed += 1;
                            warn!("node {} dropped a malformed message: {}", node_id, err);
                        }
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = &mut stop_rx => break,
                        _ = sleep(poll_interval) => {}
                    }
                }
                Err(err) => {
                    stats.transport_errors += 1;
                    warn!("node {} receive failed: {}", node_id, err);
                    tokio::select! {
                        _ = &mut stop_rx => break,
                        _ = sleep(poll_interval) => {}
                    }
                }
            }
        }

        stats.finished_peers = finished.len();
        Ok(stats)
    });

    ReceiverWorker {
        node_id,
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Row;
    use crate::transport::{InMemoryTransportHub, send_end_of_stream, send_rows};

    #[tokio::test]
    async fn drains_until_every_peer_finished() {
        let hub = InMemoryTransportHub::new();
        let receiver_side: Arc<dyn Transport> = Arc::new(hub.bind(0).await.unwrap());
        let peer = hub.bind(1).await.unwrap();

        let stores = ReceiveStores::with_capacity(10, 10);
        let worker = spawn_receiver(receiver_side, stores.clone(), 1, Duration::from_millis(1));

        send_rows(&peer, 0, Relation::R, &[Row::new(1, 1, 0), Row::new(2, 2, 0)], 1)
            .await
            .unwrap();
        send_rows(&peer, 0, Relation::S, &[Row::new(1, 0, 9)], 8)
            .await
            .unwrap();
        peer.send(0, vec![b'Q', 1, 2, 3]).await.unwrap();
        send_end_of_stream(&peer, 0).await.unwrap();

        let stats = worker.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(stats.r_rows, 2);
        assert_eq!(stats.s_rows, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.finished_peers, 1);
        assert_eq!(stores.r.len().unwrap(), 2);
        assert_eq!(stores.s.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn overflow_is_fatal() {
        let hub = InMemoryTransportHub::new();
        let receiver_side: Arc<dyn Transport> = Arc::new(hub.bind(0).await.unwrap());
        let peer = hub.bind(1).await.unwrap();

        let worker = spawn_receiver(
            receiver_side,
            ReceiveStores::with_capacity(1, 1),
            1,
            Duration::from_millis(1),
        );
        send_rows(&peer, 0, Relation::R, &[Row::new(1, 1, 0), Row::new(2, 2, 0)], 2)
            .await
            .unwrap();

        let result = worker.wait(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(JoinError::CapacityExceeded { capacity: 1 })));
    }

    #[tokio::test]
    async fn stop_and_timeout() {
        let hub = InMemoryTransportHub::new();
        let receiver_side: Arc<dyn Transport> = Arc::new(hub.bind(0).await.unwrap());
        let worker = spawn_receiver(
            receiver_side.clone(),
            ReceiveStores::with_capacity(1, 1),
            1,
            Duration::from_millis(1),
        );
        let stats = worker.stop().await.unwrap();
        assert_eq!(stats.finished_peers, 0);

        let worker = spawn_receiver(
            receiver_side,
            ReceiveStores::with_capacity(1, 1),
            1,
            Duration::from_millis(1),
        );
        assert!(matches!(
            worker.wait(Duration::from_millis(20)).await,
            Err(JoinError::Timeout(_))
        ));
    }
}
