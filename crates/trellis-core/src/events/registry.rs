//! Named-callback registry over a single upstream event link.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::transport::{EventTransport, TransportStream};
use super::types::{Event, EventError, StreamState, Subscription};

/// A registered event handler.
pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

struct Registered {
    generation: u64,
    callback: Callback,
}

type CallbackMap = Arc<RwLock<BTreeMap<String, Registered>>>;

/// Fans events from one upstream link out to named callbacks.
///
/// Callbacks run one after another, in name order, on the reader task.
pub struct EventRegistry<T> {
    transport: T,
    url: String,
    callbacks: CallbackMap,
    link: Mutex<Option<JoinHandle<()>>>,
    state: Arc<RwLock<StreamState>>,
    next_generation: AtomicU64,
}

impl<T: EventTransport> EventRegistry<T> {
    pub fn new(transport: T, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            callbacks: Arc::new(RwLock::new(BTreeMap::new())),
            link: Mutex::new(None),
            state: Arc::new(RwLock::new(StreamState::NoConnection)),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn state(&self) -> StreamState {
        *self.state.read().await
    }

    /// Open the upstream link unless one is already running.
    pub async fn connect(&self) -> Result<(), EventError> {
        let mut link = self.link.lock().await;
        if link.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!(url = %redact_url(&self.url), "Event stream already open");
            return Ok(());
        }

        *self.state.write().await = StreamState::Connecting;
        info!(url = %redact_url(&self.url), "Opening event stream");

        let stream = match self.transport.open(&self.url).await {
            Ok(stream) => stream,
            Err(e) => {
                *self.state.write().await = StreamState::Closed;
                warn!(url = %redact_url(&self.url), error = %e, "Failed to open event stream");
                return Err(e);
            }
        };

        *self.state.write().await = StreamState::Open;
        *link = Some(tokio::spawn(read_events(
            stream,
            Arc::clone(&self.callbacks),
            Arc::clone(&self.state),
        )));
        drop(link);
        Ok(())
    }

    /// Stop the upstream link, if any.
    pub async fn close(&self) {
        let task = self.link.lock().await.take();
        if let Some(task) = task {
            task.abort();
            // Wait for the reader to be dropped so the transport sees it go.
            let _ = task.await;
            *self.state.write().await = StreamState::Closed;
            info!(url = %redact_url(&self.url), "Event stream closed");
        }
    }

    /// Register `callback` under `name`, replacing any previous one.
    pub async fn add_callback<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.insert(name.into(), Arc::new(callback)).await;
    }

    /// Remove the callback registered under `name`. Returns whether one was.
    pub async fn remove_callback(&self, name: &str) -> bool {
        let removed = self.callbacks.write().await.remove(name).is_some();
        if removed {
            debug!(callback = name, "Removed event callback");
        }
        removed
    }

    /// Like [`add_callback`](Self::add_callback), returning a handle that
    /// only removes this particular registration.
    pub async fn subscribe<F>(&self, name: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.insert(name.into(), Arc::new(callback)).await
    }

    /// Remove the registration behind `subscription`. A handle whose name
    /// has since been re-registered leaves the newer callback in place.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut callbacks = self.callbacks.write().await;
        let current = callbacks
            .get(&subscription.name)
            .is_some_and(|r| r.generation == subscription.generation);
        if current {
            callbacks.remove(&subscription.name);
        }
        drop(callbacks);

        if current {
            debug!(callback = %subscription.name, "Unsubscribed event callback");
        } else {
            trace!(callback = %subscription.name, "Stale subscription ignored");
        }
        current
    }

    pub async fn callback_count(&self) -> usize {
        self.callbacks.read().await.len()
    }

    async fn insert(&self, name: String, callback: Callback) -> Subscription {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .callbacks
            .write()
            .await
            .insert(
                name.clone(),
                Registered {
                    generation,
                    callback,
                },
            )
            .is_some();
        debug!(callback = %name, replaced, "Registered event callback");
        Subscription { name, generation }
    }
}

impl<T> Drop for EventRegistry<T> {
    fn drop(&mut self) {
        if let Some(task) = self.link.get_mut().take() {
            task.abort();
        }
    }
}

async fn read_events(
    mut stream: TransportStream,
    callbacks: CallbackMap,
    state: Arc<RwLock<StreamState>>,
) {
    while let Some(message) = stream.messages.recv().await {
        match Event::decode(&message) {
            Ok(event) => dispatch(&callbacks, &event).await,
            Err(e) => warn!(error = %e, "Dropping undecodable event message"),
        }
    }
    *state.write().await = StreamState::Closed;
    info!("Event stream ended");
}

async fn dispatch(callbacks: &CallbackMap, event: &Event) {
    let snapshot: Vec<(String, Callback)> = callbacks
        .read()
        .await
        .iter()
        .map(|(name, registered)| (name.clone(), Arc::clone(&registered.callback)))
        .collect();

    for (name, callback) in snapshot {
        trace!(callback = %name, event = %event.name, "Dispatching event");
        // A panicking callback must not take the link down with it.
        if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            warn!(callback = %name, event = %event.name, "Event callback panicked");
        }
    }
}

/// `url` without its query string, which may carry the access token.
pub fn redact_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::events::ChannelTransport;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const URL: &str = "ws://localhost:2337/api/v1/socket/events/";

    fn registry() -> EventRegistry<ChannelTransport> {
        EventRegistry::new(ChannelTransport::new(), URL)
    }

    fn recorder(tag: &'static str, tx: &mpsc::UnboundedSender<String>) -> impl Fn(&Event) + use<> {
        let tx = tx.clone();
        move |event: &Event| {
            let _ = tx.send(format!("{tag}:{}", event.name));
        }
    }

    fn event(name: &str) -> String {
        format!(r#"{{"name": "{name}", "payload": {{}}}}"#)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for dispatch")
            .expect("channel closed")
    }

    async fn wait_for_state(registry: &EventRegistry<ChannelTransport>, want: StreamState) {
        for _ in 0..200 {
            if registry.state().await == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("registry never reached {want}");
    }

    #[test]
    fn redact_url_drops_query() {
        assert_eq!(redact_url("ws://h/events/?token=secret"), "ws://h/events/");
        assert_eq!(redact_url(URL), URL);
    }

    #[tokio::test]
    async fn state_before_connect_is_no_connection() {
        let registry = registry();
        assert_eq!(registry.state().await, StreamState::NoConnection);
        registry.close().await;
        assert_eq!(registry.state().await, StreamState::NoConnection);
    }

    #[tokio::test]
    async fn connect_opens_once() {
        let registry = registry();
        let (a, b) = tokio::join!(registry.connect(), registry.connect());
        a.unwrap();
        b.unwrap();
        registry.connect().await.unwrap();

        assert_eq!(registry.transport().open_count(), 1);
        assert_eq!(registry.state().await, StreamState::Open);
    }

    #[tokio::test]
    async fn events_reach_every_callback() {
        let registry = registry();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.add_callback("alpha", recorder("alpha", &tx)).await;
        registry.add_callback("beta", recorder("beta", &tx)).await;
        registry.connect().await.unwrap();

        assert!(registry.transport().push(event("GARDEN_SYNC")).await);
        assert_eq!(next(&mut rx).await, "alpha:GARDEN_SYNC");
        assert_eq!(next(&mut rx).await, "beta:GARDEN_SYNC");
    }

    #[tokio::test]
    async fn last_registration_under_a_name_wins() {
        let registry = registry();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.add_callback("a", recorder("f", &tx)).await;
        registry.add_callback("a", recorder("g", &tx)).await;
        assert_eq!(registry.callback_count().await, 1);
        registry.connect().await.unwrap();

        registry.transport().push(event("GARDEN_UPDATED")).await;
        assert_eq!(next(&mut rx).await, "g:GARDEN_UPDATED");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn removed_callback_no_longer_fires() {
        let registry = registry();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.add_callback("a", recorder("a", &tx)).await;
        assert!(registry.remove_callback("a").await);
        assert!(!registry.remove_callback("a").await);
        registry.add_callback("probe", recorder("probe", &tx)).await;
        registry.connect().await.unwrap();

        registry.transport().push(event("GARDEN_CREATED")).await;
        assert_eq!(next(&mut rx).await, "probe:GARDEN_CREATED");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_subscription_leaves_newer_callback() {
        let registry = registry();
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = registry.subscribe("a", recorder("f", &tx)).await;
        let second = registry.subscribe("a", recorder("g", &tx)).await;

        assert!(!registry.unsubscribe(&first).await);
        assert_eq!(registry.callback_count().await, 1);
        assert!(registry.unsubscribe(&second).await);
        assert_eq!(registry.callback_count().await, 0);
        assert_eq!(second.name(), "a");
    }

    #[tokio::test]
    async fn undecodable_messages_are_dropped() {
        let registry = registry();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.add_callback("a", recorder("a", &tx)).await;
        registry.connect().await.unwrap();

        registry.transport().push("not json").await;
        registry.transport().push(r#"{"payload": {}}"#).await;
        registry.transport().push(event("GARDEN_STARTED")).await;

        assert_eq!(next(&mut rx).await, "a:GARDEN_STARTED");
        assert_eq!(registry.state().await, StreamState::Open);
    }

    #[tokio::test]
    async fn upstream_end_allows_reconnect() {
        let registry = registry();
        registry.connect().await.unwrap();

        registry.transport().disconnect().await;
        wait_for_state(&registry, StreamState::Closed).await;

        registry.connect().await.unwrap();
        assert_eq!(registry.transport().open_count(), 2);
        assert_eq!(registry.state().await, StreamState::Open);
    }

    #[tokio::test]
    async fn close_stops_the_link() {
        let registry = registry();
        registry.connect().await.unwrap();
        registry.close().await;

        assert_eq!(registry.state().await, StreamState::Closed);
        registry.close().await;
        assert_eq!(registry.state().await, StreamState::Closed);
        assert!(!registry.transport().push(event("GARDEN_SYNC")).await);
    }

    #[tokio::test]
    async fn failed_open_reports_error_and_closed_state() {
        let registry = registry();
        registry.transport().set_refusing(true);

        let err = registry.connect().await.unwrap_err();
        assert!(matches!(err, EventError::Connect { .. }));
        assert_eq!(registry.state().await, StreamState::Closed);

        registry.transport().set_refusing(false);
        registry.connect().await.unwrap();
        assert_eq!(registry.state().await, StreamState::Open);
    }

    #[tokio::test]
    async fn panicking_callback_does_not_stop_delivery() {
        let registry = registry();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry
            .add_callback("a-failing", |_event: &Event| panic!("callback failed"))
            .await;
        registry.add_callback("b", recorder("b", &tx)).await;
        registry.connect().await.unwrap();

        assert!(registry.transport().push(event("GARDEN_SYNC")).await);
        assert!(registry.transport().push(event("GARDEN_UPDATED")).await);

        assert_eq!(next(&mut rx).await, "b:GARDEN_SYNC");
        assert_eq!(next(&mut rx).await, "b:GARDEN_UPDATED");
        assert_eq!(registry.state().await, StreamState::Open);
    }

    #[tokio::test]
    async fn registering_from_a_callback_does_not_deadlock() {
        let registry = Arc::new(registry());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let weak = Arc::downgrade(&registry);
        let late = recorder("late", &tx);
        let late = Arc::new(late);
        registry
            .add_callback("adder", move |_event: &Event| {
                let Some(registry) = weak.upgrade() else {
                    return;
                };
                let late = Arc::clone(&late);
                tokio::spawn(async move {
                    registry.add_callback("late", move |e: &Event| late(e)).await;
                });
            })
            .await;
        registry.connect().await.unwrap();

        registry.transport().push(event("GARDEN_SYNC")).await;
        for _ in 0..200 {
            if registry.callback_count().await == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(registry.callback_count().await, 2);

        registry.transport().push(event("GARDEN_STOPPED")).await;
        assert_eq!(next(&mut rx).await, "late:GARDEN_STOPPED");
    }
}
