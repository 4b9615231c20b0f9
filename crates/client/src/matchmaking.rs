use tokio::sync::oneshot;
use tracing::info;

use crate::error::ClientError;
use crate::mux::WsMux;
use crate::protocol::{JoinQueueData, MatchFoundData, MuxMessage, JOIN_QUEUE, LEAVE_QUEUE, MATCH_FOUND};

/// Queue membership on the shared API socket.
#[derive(Clone)]
pub struct Matchmaker {
    mux: WsMux,
}

/// Pending queue entry. Resolves once the server pairs us with an opponent.
pub struct QueueTicket {
    rx: oneshot::Receiver<MuxMessage>,
}

impl QueueTicket {
    /// Room id of the found match. Fails with [`ClientError::Closed`] when
    /// the queue was left or the socket went away first.
    pub async fn match_found(self) -> Result<String, ClientError> {
        let message = self.rx.await.map_err(|_| ClientError::Closed)?;
        let data: MatchFoundData = message.payload()?;
        info!(room_id = %data.room_id, "Match found");
        Ok(data.room_id)
    }
}

impl Matchmaker {
    pub fn new(mux: WsMux) -> Self {
        Self { mux }
    }

    pub fn join_queue(&self, client_id: &str) -> Result<QueueTicket, ClientError> {
        // subscribe before sending so a fast reply is not missed
        let rx = self.mux.subscribe_once(MATCH_FOUND);
        let sent = self.mux.send(
            JOIN_QUEUE,
            &JoinQueueData {
                id: client_id.to_string(),
            },
        );
        if !sent {
            self.mux.unsubscribe(MATCH_FOUND);
            return Err(ClientError::Closed);
        }
        info!(client_id, "Joined matchmaking queue");
        Ok(QueueTicket { rx })
    }

    pub fn leave_queue(&self) -> bool {
        self.mux.unsubscribe(MATCH_FOUND);
        let sent = self.mux.send(LEAVE_QUEUE, &serde_json::json!({}));
        info!(sent, "Left matchmaking queue");
        sent
    }
}
