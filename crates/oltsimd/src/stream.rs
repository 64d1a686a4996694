//! Outbound indication stream of a controller session.

use oltsim_types::Indication;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tracing::{debug, warn};
use uuid::Uuid;

/// Receiving side handed to the RPC transport.
pub type IndicationReceiver = ReceiverStream<Result<Indication, Status>>;

/// Sending side of one controller session.
///
/// Cloned into every dispatch loop and UNI of the session. A send on a
/// stream whose controller went away is logged and dropped; the loops keep
/// running until their session is cancelled.
#[derive(Debug, Clone)]
pub struct IndicationStream {
    tx: mpsc::Sender<Result<Indication, Status>>,
    session_id: Uuid,
}

impl IndicationStream {
    /// Creates a stream with room for `buffer` undelivered indications.
    pub fn channel(buffer: usize) -> (Self, IndicationReceiver) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let stream = Self {
            tx,
            session_id: Uuid::new_v4(),
        };
        (stream, ReceiverStream::new(rx))
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Returns true once the controller dropped its end.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Sends an indication, returning false if the controller is gone.
    pub async fn send(&self, indication: Indication) -> bool {
        let kind = indication.kind();
        match self.tx.send(Ok(indication)).await {
            Ok(()) => {
                debug!(session = %self.session_id, kind, "indication sent");
                true
            }
            Err(_) => {
                warn!(session = %self.session_id, kind, "failed to send indication, stream closed");
                false
            }
        }
    }
}
