// WebSocket edge: accepts client connections and feeds their frames to the
// application loop.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::Stream;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

/// Events emitted by the WebSocket edge to the application layer.
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    /// A client completed the handshake and was assigned a connection handle.
    Connected {
        connection_id: String,
        addr: String,
    },
    /// A text frame arrived from the client (raw JSON string).
    Message {
        connection_id: String,
        text: String,
    },
    /// The client's socket closed (cleanly or not).
    Disconnected { connection_id: String },
}

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(0);

/// Mint a fresh connection handle: UTC-timestamp prefix plus a process-local
/// counter so same-instant accepts never collide.
pub fn generate_connection_id() -> String {
    let seq = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
    format!(
        "conn_{}_{seq}",
        chrono::Utc::now().format("%Y%m%d%H%M%S%3f")
    )
}

/// Run the WebSocket edge on `bind:port`, forwarding events through `tx`.
///
/// Each accepted socket gets its own connection handle and reader task, so
/// any number of clients can be connected and submitting concurrently. The
/// listener runs until the task is cancelled or the event channel closes.
pub async fn run(bind: &str, port: u16, tx: mpsc::Sender<WsEvent>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("{bind}:{port}")).await?;
    let local_addr = listener.local_addr()?;
    info!("WebSocket edge listening on {local_addr}");

    loop {
        let (stream, addr) = listener.accept().await?;
        let tx = tx.clone();

        tokio::spawn(async move {
            let addr_str = addr.to_string();

            let ws_stream = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake failed for {addr_str}: {e}");
                    return;
                }
            };

            let connection_id = generate_connection_id();
            info!("Accepted connection {connection_id} from {addr_str}");

            if tx
                .send(WsEvent::Connected {
                    connection_id: connection_id.clone(),
                    addr: addr_str,
                })
                .await
                .is_err()
            {
                return;
            }

            let (_write, read) = ws_stream.split();
            let _ = process_message_stream(read, &tx, &connection_id).await;

            let _ = tx.send(WsEvent::Disconnected { connection_id }).await;
        });
    }
}

/// Process raw WebSocket [`Message`] items from any [`Stream`], forwarding
/// text payloads through `tx` tagged with the connection handle. Returns
/// `Err(())` if the channel is closed (receiver dropped), signalling the
/// caller to stop.
///
/// Generic over the stream type so it can be tested with in-memory streams
/// without opening TCP ports.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<WsEvent>,
    connection_id: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let event = WsEvent::Message {
                    connection_id: connection_id.to_string(),
                    text: text.to_string(),
                };
                if tx.send(event).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Connection {connection_id} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error on {connection_id}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(())
}
