//! Reader task for the engine's streamed `/events` response.

use bytes::Buf;
use hyper::body::HttpBody;
use imgsweep_events::{EventError, LineDecoder, RuntimeEvent};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::runtime::{EventSender, RuntimeError};

/// Spawn a task that decodes `body` into creation events on `tx`.
///
/// A body error is forwarded as a single `Err` item; end of body drops the
/// sender, which the consumer sees as a clean close.
pub fn spawn_reader<B>(body: B, tx: EventSender) -> JoinHandle<()>
where
    B: HttpBody + Unpin + Send + 'static,
    B::Data: Send,
    B::Error: std::fmt::Display + Send,
{
    tokio::spawn(read_events(body, tx))
}

async fn read_events<B>(mut body: B, tx: EventSender)
where
    B: HttpBody + Unpin,
    B::Error: std::fmt::Display,
{
    let mut decoder = LineDecoder::new();

    while let Some(chunk) = body.data().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(RuntimeError::Stream(e.to_string()))).await;
                return;
            }
        };

        let mut bytes = Vec::with_capacity(chunk.remaining());
        bytes.extend_from_slice(chunk.chunk());
        for item in decoder.decode(&bytes) {
            if !forward(&tx, item).await {
                debug!("Event consumer gone, stopping reader");
                return;
            }
        }
    }

    if let Some(rest) = decoder.finish() {
        forward(&tx, RuntimeEvent::from_json(&rest)).await;
    }

    debug!("Event stream ended");
}

/// Send a decoded creation event; returns false once the consumer is gone.
///
/// Records that fail to decode are skipped.
async fn forward(tx: &EventSender, item: Result<RuntimeEvent, EventError>) -> bool {
    match item.and_then(|event| event.creation()) {
        Ok(Some(event)) => tx.send(Ok(event)).await.is_ok(),
        Ok(None) => true,
        Err(e) => {
            warn!(error = %e, "Skipping undecodable event record");
            true
        }
    }
}
