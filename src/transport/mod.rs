//! Message channels between nodes and the coordination built on them.

pub mod barrier;
pub mod memory;
pub mod receiver;
pub mod tcp;
pub mod wire;

pub use barrier::Rendezvous;
pub use memory::{InMemoryTransport, InMemoryTransportHub};
pub use receiver::{ReceiveStats, ReceiveStores, ReceiverWorker, spawn_receiver};
pub use tcp::TcpTransport;
pub use wire::Message;

use crate::core::{NodeId, Relation, Result, Row};
use async_trait::async_trait;

/// A node's endpoint for exchanging encoded messages with its peers.
///
/// Delivery preserves the bytes of one message. Messages from one sender to one
/// target arrive in send order; nothing is guaranteed across senders.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The node this endpoint belongs to.
    fn node_id(&self) -> NodeId;

    /// Delivers one message to `target`'s inbound channel.
    async fn send(&self, target: NodeId, message: Vec<u8>) -> Result<()>;

    /// Next inbound message, or `None` if nothing is waiting. Never blocks.
    fn try_receive(&self) -> Result<Option<Vec<u8>>>;
}

/// Sends `rows` to `target` in messages of at most `batch_size` rows.
/// Returns the number of messages sent.
pub async fn send_rows(
    transport: &dyn Transport,
    target: NodeId,
    relation: Relation,
    rows: &[Row],
    batch_size: usize,
) -> Result<usize> {
    let mut messages = 0;
    for chunk in rows.chunks(batch_size.max(1)) {
        transport
            .send(target, wire::encode_rows(relation, chunk)?)
            .await?;
        messages += 1;
    }
    Ok(messages)
}

/// Tells `target` that this node is done sending.
pub async fn send_end_of_stream(transport: &dyn Transport, target: NodeId) -> Result<()> {
    transport
        .send(target, wire::encode_end_of_stream(transport.node_id())?)
        .await
}
