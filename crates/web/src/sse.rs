//! Server-sent events broadcasting.
//!
//! A [`SseBroker`] is registered as a handler. Every request reaching it becomes a
//! subscriber whose response is a `text/event-stream` kept open; [`SseBroker::send`] fans an
//! [`Event`] out to every connected subscriber.

use crate::body::ResponseBody;
use crate::handler::{BoxError, Handler, HandlerResult};
use crate::RequestContext;
use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc::{Receiver, Sender, channel};
use futures::{SinkExt, Stream, StreamExt};
use http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONNECTION, CONTENT_TYPE, EXPIRES};
use http::HeaderValue;
use http_body::Frame;
use http_body_util::StreamBody;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::fmt::Write;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BUFFER: usize = 16;

type OnConnect = Box<dyn Fn() -> Result<Event, BoxError> + Send + Sync>;

/// One server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    // https://html.spec.whatwg.org/multipage/server-sent-events.html#concept-event-stream-last-event-id
    pub id: Option<String>,
    pub retry: Option<Duration>,
    pub name: Option<String>,
    pub data: Vec<String>,
}

impl Event {
    pub fn data(data: impl Into<String>) -> Self {
        Self { data: vec![data.into()], ..Self::default() }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data.push(data.into());
        self
    }

    /// The wire form of the event, terminated by the blank line.
    pub fn encode(&self) -> Bytes {
        let mut string = String::new();

        if let Some(id) = &self.id {
            let _ = writeln!(string, "id: {id}");
        }

        if let Some(retry) = self.retry.filter(|retry| !retry.is_zero()) {
            let _ = writeln!(string, "retry: {}", retry.as_millis());
        }

        if let Some(name) = &self.name {
            let _ = writeln!(string, "event: {name}");
        }

        for line in self.data.iter().flat_map(|data| data.lines()) {
            let _ = writeln!(string, "data: {line}");
        }

        string.push('\n');
        Bytes::from(string)
    }
}

/// Registry of connected event stream subscribers.
///
/// Cloning gives another handle to the same subscribers.
#[derive(Clone)]
pub struct SseBroker {
    inner: Arc<Inner>,
}

struct Inner {
    subscribers: Mutex<HashMap<u64, Sender<Bytes>>>,
    next_id: AtomicU64,
    buffer: usize,
    on_connect: Option<OnConnect>,
}

impl Inner {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, Sender<Bytes>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The receiving end of one subscriber, deregistered from the broker when dropped.
struct Subscription {
    id: u64,
    broker: Weak<Inner>,
    receiver: Receiver<Bytes>,
}

impl Stream for Subscription {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.receiver.poll_next_unpin(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.broker.upgrade() {
            if inner.subscribers().remove(&self.id).is_some() {
                debug!(subscriber = self.id, "subscriber went away");
            }
        }
    }
}

impl Default for SseBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl SseBroker {
    pub fn new() -> Self {
        let inner = Inner {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            buffer: DEFAULT_BUFFER,
            on_connect: None,
        };
        Self { inner: Arc::new(inner) }
    }

    /// Sets how many events may queue per subscriber before [`SseBroker::send`] waits.
    ///
    /// Only effective before the broker is cloned.
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.buffer = buffer.max(1),
            None => warn!("broker already shared, buffer size unchanged"),
        }
        self
    }

    /// Sets the event each new subscriber receives first. A failing callback sends nothing.
    ///
    /// Only effective before the broker is cloned.
    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<Event, BoxError> + Send + Sync + 'static,
    {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.on_connect = Some(Box::new(f)),
            None => warn!("broker already shared, connect event ignored"),
        }
        self
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, Sender<Bytes>>> {
        self.inner.subscribers()
    }

    /// Returns true if at least one subscriber is still connected.
    pub fn has_subscribers(&self) -> bool {
        let mut subscribers = self.subscribers();
        subscribers.retain(|_, sender| !sender.is_closed());
        !subscribers.is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|_, sender| !sender.is_closed());
        subscribers.len()
    }

    /// Sends `event` to every subscriber, dropping the ones that went away.
    pub async fn send(&self, event: Event) {
        let bytes = event.encode();
        let senders = self.subscribers().iter().map(|(id, sender)| (*id, sender.clone())).collect::<Vec<_>>();

        for (id, mut sender) in senders {
            if sender.send(bytes.clone()).await.is_err() {
                debug!(subscriber = id, "subscriber disconnected");
                self.unsubscribe(id);
            }
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers().remove(&id);
    }

    fn subscribe(&self) -> ResponseBody {
        let (mut sender, receiver) = channel::<Bytes>(self.inner.buffer);

        if let Some(on_connect) = &self.inner.on_connect {
            match on_connect() {
                Ok(event) => {
                    if let Err(e) = sender.try_send(event.encode()) {
                        warn!(cause = %e, "can't queue the connect event");
                    }
                }
                Err(e) => debug!(cause = %e, "connect event skipped"),
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers().insert(id, sender);
        debug!(subscriber = id, "subscriber connected");

        let subscription = Subscription { id, broker: Arc::downgrade(&self.inner), receiver };
        let frames = subscription.map(|bytes| Ok::<_, Infallible>(Frame::data(bytes)));
        ResponseBody::stream(StreamBody::new(frames))
    }
}

#[async_trait]
impl<X: Send + 'static> Handler<X> for SseBroker {
    async fn handle(&self, ctx: &mut RequestContext<X>) -> HandlerResult {
        let response = ctx.response_mut();
        response.insert_header(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        response.insert_header(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        response.insert_header(CONNECTION, HeaderValue::from_static("keep-alive"));
        response.insert_header(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        response.insert_header(EXPIRES, HeaderValue::from_static("-1"));

        let body = self.subscribe();
        ctx.response_mut().stream(body);
        Ok(())
    }
}

impl fmt::Debug for SseBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseBroker")
            .field("subscribers", &self.subscribers().len())
            .field("buffer", &self.inner.buffer)
            .field("on_connect", &self.inner.on_connect.is_some())
            .finish()
    }
}
