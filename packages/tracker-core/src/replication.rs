//! Replication fan-out to sibling trackers.
//!
//! After a local mutating command succeeds, its envelope is pushed to every
//! configured sibling over a short-lived connection:
//!
//! ```text
//! SYNC_SIZE <n>\n  →  ACK\n  →  n raw bytes of "SYNC <ip> <port> <cmd> ..."
//! ```
//!
//! Delivery is fire-and-forget with a 5 second deadline per sibling. A
//! sibling that is down simply misses the update; there is no retry queue
//! and no ordering guarantee. Convergence relies on the envelopes being
//! idempotent when re-applied through the shared command handlers.
use std::time::Duration;

use peergrid_primitives::PeerAddress;
use peergrid_wire_protocol::framing::write_line;
use peergrid_wire_protocol::sync::SyncEnvelope;
use peergrid_wire_protocol::ProtocolError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Deadline for one complete envelope delivery (connect, handshake, body).
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// Pushes replication envelopes to a fixed set of sibling trackers.
#[derive(Debug, Clone)]
pub struct Replicator {
    siblings: Vec<PeerAddress>,
}

impl Replicator {
    #[must_use]
    pub fn new(siblings: Vec<PeerAddress>) -> Self {
        Self { siblings }
    }

    /// A replicator with no siblings; every fan-out is a no-op.
    #[must_use]
    pub fn standalone() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub fn siblings(&self) -> &[PeerAddress] {
        &self.siblings
    }

    /// Sends the envelope to every sibling, each in its own detached task.
    ///
    /// Returns immediately; per-sibling failures are logged with the `SYNC`
    /// tag and dropped.
    pub fn fan_out(&self, envelope: &SyncEnvelope) {
        let payload = envelope.encode();

        for sibling in self.siblings.iter().copied() {
            let payload = payload.clone();

            tokio::spawn(async move {
                match tokio::time::timeout(SYNC_TIMEOUT, push_envelope(sibling, &payload)).await {
                    Ok(Ok(())) => {
                        tracing::debug!(%sibling, tag = "SYNC", "envelope delivered");
                    }
                    Ok(Err(err)) => {
                        tracing::error!(%sibling, tag = "SYNC", %err, "envelope delivery failed");
                    }
                    Err(_elapsed) => {
                        tracing::error!(%sibling, tag = "SYNC", "envelope delivery timed out");
                    }
                }
            });
        }
    }
}

async fn push_envelope(sibling: PeerAddress, payload: &str) -> Result<(), ProtocolError> {
    let stream = TcpStream::connect(sibling.socket_addr()).await?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_line(&mut writer, &format!("SYNC_SIZE {}", payload.len())).await?;

    let mut ack = String::new();
    if reader.read_line(&mut ack).await? == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    if ack.trim() != "ACK" {
        return Err(ProtocolError::MalformedEnvelope {
            reason: format!("expected ACK, got: {}", ack.trim()),
        });
    }

    writer.write_all(payload.as_bytes()).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {

    mod the_replication_fan_out {
        use std::net::{IpAddr, Ipv4Addr};

        use peergrid_primitives::PeerAddress;
        use peergrid_wire_protocol::sync::{SyncCommand, SyncEnvelope};
        use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
        use tokio::net::TcpListener;

        use crate::replication::Replicator;

        fn envelope() -> SyncEnvelope {
            SyncEnvelope::new(
                PeerAddress::new(IpAddr::V4(Ipv4Addr::new(126, 0, 0, 1)), 6881),
                SyncCommand::CreateGroup {
                    group: "g1".to_string(),
                    user: "alice".to_string(),
                },
            )
        }

        #[tokio::test]
        async fn it_should_deliver_the_sized_and_acked_envelope() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let sibling = PeerAddress::from(listener.local_addr().unwrap());

            let accept = tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                let (read_half, mut writer) = stream.into_split();
                let mut reader = BufReader::new(read_half);

                let mut size_line = String::new();
                reader.read_line(&mut size_line).await.unwrap();
                let announced: usize = size_line.trim().strip_prefix("SYNC_SIZE ").unwrap().parse().unwrap();

                writer.write_all(b"ACK\n").await.unwrap();

                let mut body = vec![0u8; announced];
                reader.read_exact(&mut body).await.unwrap();
                String::from_utf8(body).unwrap()
            });

            Replicator::new(vec![sibling]).fan_out(&envelope());

            let received = accept.await.unwrap();
            assert_eq!(received, envelope().encode());
        }

        #[tokio::test]
        async fn an_unreachable_sibling_should_not_block_the_caller() {
            // Nothing listens here; fan_out must still return immediately.
            let sibling = PeerAddress::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 1);

            Replicator::new(vec![sibling]).fan_out(&envelope());
        }

        #[tokio::test]
        async fn a_standalone_replicator_should_be_a_no_op() {
            Replicator::standalone().fan_out(&envelope());
        }
    }
}
