//! Local event surface.
//!
//! Each named event is an explicit, ordered list of subscriber callbacks.
//! Emission walks a snapshot of the list, so callbacks may subscribe or
//! unsubscribe while an event is being delivered. A panicking subscriber
//! is logged and skipped; the others still receive the event.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{trace, warn};

/// Payload of the login and logout events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStateChange {
    pub connection_id: String,
    pub user_name: String,
}

/// Payload of the message-received event.
///
/// Private messages arrive with a recipient, which is not kept here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReceived {
    pub sender_id: String,
    pub message: String,
}

/// Handle returned by [`Subscribers::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered multicast list for one event.
pub struct Subscribers<T> {
    name: &'static str,
    next_id: AtomicU64,
    handlers: RwLock<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T> Subscribers<T> {
    /// Creates an empty list; `name` only appears in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Appends a subscriber. It runs after every subscriber added before it.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    /// Removes a subscriber. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(sid, _)| *sid != id);
        handlers.len() != before
    }

    /// Number of current subscribers.
    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `payload` to every subscriber in subscription order.
    ///
    /// Returns how many subscribers completed without panicking.
    pub fn emit(&self, payload: &T) -> usize {
        let snapshot: Vec<Handler<T>> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| h.clone())
            .collect();

        let mut delivered = 0;
        for handler in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(event = self.name, "subscriber panicked, continuing delivery"),
            }
        }
        trace!(event = self.name, delivered, total = snapshot.len(), "event emitted");
        delivered
    }
}

impl<T> fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}

/// The six events a [`RealtimeClient`](crate::RealtimeClient) re-emits.
#[derive(Debug)]
pub struct HubEvents {
    /// A user connected (`Connect`).
    pub login: Subscribers<UserStateChange>,
    /// A user disconnected (`Disconnect`).
    pub logout: Subscribers<UserStateChange>,
    /// A background job started (`Start`).
    pub job_started: Subscribers<String>,
    /// A background job completed (`Completed`).
    pub job_completed: Subscribers<String>,
    /// A notification was broadcast (`SendNotification`).
    pub notification_received: Subscribers<String>,
    /// A chat message arrived (`SendMessage` and `SendPrivateMessage`).
    pub message_received: Subscribers<MessageReceived>,
}

impl Default for HubEvents {
    fn default() -> Self {
        Self {
            login: Subscribers::new("login"),
            logout: Subscribers::new("logout"),
            job_started: Subscribers::new("job_started"),
            job_completed: Subscribers::new("job_completed"),
            notification_received: Subscribers::new("notification_received"),
            message_received: Subscribers::new("message_received"),
        }
    }
}
