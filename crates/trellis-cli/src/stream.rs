//! Websocket transport for the garden event stream.

use std::future::Future;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use trellis_core::events::{EventError, EventTransport, TransportStream, redact_url};

const CHANNEL_CAPACITY: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens `ws://` / `wss://` event streams. Text frames are forwarded as
/// messages; the stream ends on a close frame or socket error.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebsocketTransport;

impl EventTransport for WebsocketTransport {
    fn open(&self, url: &str) -> impl Future<Output = Result<TransportStream, EventError>> + Send {
        let url = url.to_string();
        async move {
            // wss needs a crypto provider; Err means already installed.
            let _ = rustls::crypto::ring::default_provider().install_default();

            let (socket, _response) =
                connect_async(url.as_str())
                    .await
                    .map_err(|e| EventError::Connect {
                        url: redact_url(&url).to_string(),
                        reason: e.to_string(),
                    })?;
            debug!(url = %redact_url(&url), "Websocket connected");

            let (tx, stream) = TransportStream::channel(CHANNEL_CAPACITY);
            tokio::spawn(forward_frames(socket, tx));
            Ok(stream)
        }
    }
}

/// Pump text frames into `tx` until the socket ends or the reader drops its
/// receiver; in the latter case the socket is closed from this side.
async fn forward_frames(mut socket: Socket, tx: mpsc::Sender<String>) {
    loop {
        let frame = tokio::select! {
            () = tx.closed() => {
                debug!("Event reader gone, closing websocket");
                if let Err(e) = socket.close(None).await {
                    debug!(error = %e, "Websocket close failed");
                }
                return;
            }
            frame = socket.next() => frame,
        };

        match frame {
            None | Some(Ok(Message::Close(_))) => break,
            Some(Ok(Message::Text(text))) => {
                if tx.send(text.as_str().to_owned()).await.is_err() {
                    debug!("Event reader gone, closing websocket");
                    let _ = socket.close(None).await;
                    break;
                }
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "Websocket read failed");
                break;
            }
        }
    }
}
