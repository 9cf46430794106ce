//! Live event feed.
//!
//! The runtime publishes [`Event`]s; observers call [`EventFeed::subscribe`]
//! with a [`SubscriptionFilter`] and pull from the returned [`Subscription`].
//! A subscription ends only when it is dropped or when the feed severs it.
//!
//! [`EventBus`] is the in-process implementation backed by a
//! `tokio::sync::broadcast` channel.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use futures_util::stream::{BoxStream, Stream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

use crate::filter::SubscriptionFilter;
use crate::types::Event;

/// Default broadcast capacity.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Item yielded by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    /// An event that passed the subscription filter
    Event(Event),
    /// The subscriber fell behind and this many events were skipped
    Lagged(u64),
}

/// Source of live events.
pub trait EventFeed: Send + Sync + 'static {
    /// Open a new subscription restricted by `filter`.
    fn subscribe(&self, filter: SubscriptionFilter) -> Subscription;
}

/// A live, filtered event stream.
pub struct Subscription {
    inner: BoxStream<'static, FeedItem>,
}

impl Subscription {
    /// Wrap an arbitrary stream of feed items, applying `filter` to events.
    pub fn filtered<S>(stream: S, filter: SubscriptionFilter) -> Self
    where
        S: Stream<Item = FeedItem> + Send + 'static,
    {
        let inner = stream.filter(move |item| {
            let keep = match item {
                FeedItem::Event(event) => filter.matches(event),
                FeedItem::Lagged(_) => true,
            };
            std::future::ready(keep)
        });
        Self {
            inner: Box::pin(inner),
        }
    }

    /// Build a subscription over a broadcast receiver.
    pub fn from_broadcast(rx: broadcast::Receiver<Event>, filter: SubscriptionFilter) -> Self {
        let stream = async_stream::stream! {
            let mut rx = rx;
            loop {
                match rx.recv().await {
                    Ok(event) => yield FeedItem::Event(event),
                    Err(RecvError::Lagged(skipped)) => yield FeedItem::Lagged(skipped),
                    Err(RecvError::Closed) => break,
                }
            }
        };
        Self::filtered(stream, filter)
    }

    /// Next item; `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<FeedItem> {
        self.inner.next().await
    }

    /// Next event, skipping lag notifications.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            match self.next().await? {
                FeedItem::Event(event) => return Some(event),
                FeedItem::Lagged(skipped) => debug!(skipped, "subscription lagged"),
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// In-process broadcast event bus.
#[derive(Debug)]
pub struct EventBus {
    sender: RwLock<broadcast::Sender<Event>>,
    capacity: usize,
    published: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl EventBus {
    /// Create a bus holding up to `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _receiver) = broadcast::channel(capacity);
        Self {
            sender: RwLock::new(sender),
            capacity,
            published: AtomicU64::new(0),
        }
    }

    /// Publish an event to every current subscriber. Returns the receiver count.
    pub fn publish(&self, event: Event) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let sender = self.sender.read().unwrap_or_else(|e| e.into_inner());
        // No receivers is not an error: nobody is watching yet.
        sender.send(event).unwrap_or(0)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .receiver_count()
    }

    /// Total events published since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// End every open subscription. New subscriptions work normally.
    pub fn sever(&self) {
        let (sender, _receiver) = broadcast::channel(self.capacity);
        let mut guard = self.sender.write().unwrap_or_else(|e| e.into_inner());
        let severed = guard.receiver_count();
        *guard = sender;
        info!(severed, "event bus severed all subscriptions");
    }
}

impl EventFeed for EventBus {
    fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let rx = self
            .sender
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .subscribe();
        debug!(match_all = filter.is_match_all(), "new event subscription");
        Subscription::from_broadcast(rx, filter)
    }
}
