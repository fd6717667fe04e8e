//! Targeted send and best-effort broadcast over a [`ConnectionPool`].

use easyws_core::{ClientId, Message};
use metrics::counter;
use tracing::{debug, error, warn};

use crate::error::{NetError, Result};
use crate::event_bridge::EventSink;
use crate::metrics::WS_BROADCAST_FAILURES_TOTAL;
use crate::pool::ConnectionPool;

/// Outcome of one broadcast call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Identities in the snapshot.
    pub attempted: usize,
    /// Writes that succeeded.
    pub delivered: usize,
    /// Writes that failed. Each was reported to the event sink.
    pub failed: usize,
    /// Identities that had vanished between snapshot and lookup.
    pub evicted: usize,
}

/// Write `message` to one client. Write errors propagate to the caller.
pub async fn send(pool: &ConnectionPool, id: ClientId, message: Message) -> Result<()> {
    let conn = pool.get(id).ok_or(NetError::NoSuchClient(id))?;
    conn.write(message.with_client(id)).await
}

/// Write `message` to every registered client.
///
/// A failed write is reported as `on_failure(false, ..)` and the broadcast
/// continues; the failing entry stays in the pool. An identity whose lookup
/// comes back empty is deleted.
pub async fn broadcast(
    pool: &ConnectionPool,
    events: &dyn EventSink,
    message: &Message,
) -> BroadcastReport {
    let ids = pool.ids();
    let mut report = BroadcastReport {
        attempted: ids.len(),
        ..BroadcastReport::default()
    };

    for id in ids {
        let Some(conn) = pool.get(id) else {
            warn!(client_id = %id, "connection vanished during broadcast, removing");
            let _ = pool.delete(id);
            report.evicted += 1;
            continue;
        };
        match conn.write(message.clone().with_client(id)).await {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                error!(client_id = %id, error = %e, "broadcast write failed");
                counter!(WS_BROADCAST_FAILURES_TOTAL).increment(1);
                report.failed += 1;
                events.on_failure(
                    false,
                    NetError::SendFailed {
                        client_id: id,
                        source: Box::new(e),
                    },
                );
            }
        }
    }

    debug!(
        attempted = report.attempted,
        delivered = report.delivered,
        failed = report.failed,
        "broadcast complete"
    );
    report
}
