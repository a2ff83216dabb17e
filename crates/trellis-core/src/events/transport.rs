//! The seam between the registry and the real-time connection.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};

use super::types::EventError;

const CHANNEL_CAPACITY: usize = 64;

/// An open upstream link: raw text messages until the sender side ends.
#[derive(Debug)]
pub struct TransportStream {
    pub messages: mpsc::Receiver<String>,
}

impl TransportStream {
    /// A stream fed by the returned sender.
    pub fn channel(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { messages: rx })
    }
}

/// Opens upstream links for an [`EventRegistry`](super::EventRegistry).
pub trait EventTransport: Send + Sync + 'static {
    fn open(&self, url: &str) -> impl Future<Output = Result<TransportStream, EventError>> + Send;
}

/// In-memory transport. Each `open` replaces the previous link; messages
/// pushed go to the latest one.
#[derive(Debug, Clone, Default)]
pub struct ChannelTransport {
    inner: Arc<ChannelInner>,
}

#[derive(Debug, Default)]
struct ChannelInner {
    sender: Mutex<Option<mpsc::Sender<String>>>,
    opens: AtomicUsize,
    refusing: AtomicBool,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message on the current link. Returns `false` when no link
    /// is open or its reader has gone away.
    pub async fn push(&self, message: impl Into<String>) -> bool {
        let sender = self.inner.sender.lock().await.clone();
        match sender {
            Some(sender) => sender.send(message.into()).await.is_ok(),
            None => false,
        }
    }

    /// End the current link as if the server went away.
    pub async fn disconnect(&self) {
        self.inner.sender.lock().await.take();
    }

    /// Make subsequent opens fail.
    pub fn set_refusing(&self, refusing: bool) {
        self.inner.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }
}

impl EventTransport for ChannelTransport {
    fn open(&self, url: &str) -> impl Future<Output = Result<TransportStream, EventError>> + Send {
        let inner = Arc::clone(&self.inner);
        let url = url.to_string();
        async move {
            if inner.refusing.load(Ordering::SeqCst) {
                return Err(EventError::Connect {
                    url,
                    reason: "connection refused".into(),
                });
            }
            let (tx, stream) = TransportStream::channel(CHANNEL_CAPACITY);
            *inner.sender.lock().await = Some(tx);
            inner.opens.fetch_add(1, Ordering::SeqCst);
            Ok(stream)
        }
    }
}
