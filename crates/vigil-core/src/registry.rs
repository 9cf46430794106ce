//! Escalation request/response correlation.
//!
//! The runtime registers a question with [`RequestResponseRegistry::register`],
//! announces it, then parks the asking task on [`PendingResponse::wait`]; the
//! operator answers through [`RequestResponseRegistry::provide_response`]. Each pending id owns
//! a single-use `oneshot` rendezvous, so the shared map lock is only held to
//! insert or remove an entry and never while a waiter is suspended.
//!
//! ## Delivery semantics
//!
//! | Situation | Result |
//! |-----------|--------|
//! | answer arrives before timeout | waiter gets `Some(answer)` |
//! | timeout elapses first | waiter gets `None`, later answers are no-ops |
//! | answer claimed as the timeout fires | waiter gets `Some(answer)` |
//! | second answer for the same id | no-op |
//! | answer for an unknown id | no-op |

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::types::{PendingEscalation, RequestId};

struct Waiter {
    escalation: PendingEscalation,
    responder: oneshot::Sender<String>,
}

#[derive(Default)]
struct Inner {
    waiters: Mutex<HashMap<RequestId, Waiter>>,
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RequestId, Waiter>> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Correlates escalation request ids with operator answers.
///
/// Cheap to clone; clones share the same pending set.
#[derive(Clone, Default)]
pub struct RequestResponseRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RequestResponseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestResponseRegistry")
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// A registered escalation, waiting to be answered.
///
/// Returned by [`RequestResponseRegistry::register`]. The request is visible
/// to [`RequestResponseRegistry::pending`] from registration until it is
/// answered, times out or this handle is dropped.
pub struct PendingResponse {
    inner: Arc<Inner>,
    request_id: RequestId,
    rx: oneshot::Receiver<String>,
    armed: bool,
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("request_id", &self.request_id)
            .finish()
    }
}

impl PendingResponse {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Suspend until the request is answered or `timeout` elapses.
    ///
    /// Returns `None` on timeout.
    pub async fn wait(mut self, timeout: Duration) -> Option<String> {
        debug!(request_id = %self.request_id, timeout_ms = timeout.as_millis() as u64, "waiting for response");
        tokio::select! {
            answer = &mut self.rx => {
                self.armed = false;
                answer.ok()
            }
            _ = tokio::time::sleep(timeout) => {
                if self.disarm() {
                    info!(request_id = %self.request_id, "escalation timed out");
                    None
                } else {
                    // A responder claimed the entry at the deadline and holds the sender.
                    (&mut self.rx).await.ok()
                }
            }
        }
    }

    /// Remove the entry now. Returns true if it was still registered.
    fn disarm(&mut self) -> bool {
        self.armed = false;
        self.inner.lock().remove(&self.request_id).is_some()
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock().remove(&self.request_id);
        }
    }
}

impl RequestResponseRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for an answer to `request_id` without registering question details.
    pub async fn wait_for_response(&self, request_id: &str, timeout: Duration) -> Option<String> {
        self.wait_for_escalation(PendingEscalation::new(request_id, ""), timeout)
            .await
    }

    /// Register `escalation` and suspend until it is answered or `timeout` elapses.
    ///
    /// Returns `None` on timeout; the caller applies its own default. A second
    /// wait on an id that is already pending returns `None` immediately and
    /// leaves the first waiter untouched.
    pub async fn wait_for_escalation(
        &self,
        escalation: PendingEscalation,
        timeout: Duration,
    ) -> Option<String> {
        self.register(escalation)?.wait(timeout).await
    }

    /// Make `escalation` pending without waiting yet.
    ///
    /// Lets a caller announce the question only once it is answerable.
    /// Returns `None` if the id is already pending.
    pub fn register(&self, escalation: PendingEscalation) -> Option<PendingResponse> {
        let request_id = escalation.request_id.clone();
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.inner.lock();
        if waiters.contains_key(&request_id) {
            warn!(request_id = %request_id, "escalation already pending, ignoring duplicate wait");
            return None;
        }
        waiters.insert(
            request_id.clone(),
            Waiter {
                escalation,
                responder: tx,
            },
        );
        drop(waiters);
        Some(PendingResponse {
            inner: Arc::clone(&self.inner),
            request_id,
            rx,
            armed: true,
        })
    }

    /// Deliver `response` to the waiter for `request_id`.
    ///
    /// Returns true if a waiter received it. Unknown or already-resolved ids
    /// are a no-op.
    pub fn provide_response(&self, request_id: &str, response: impl Into<String>) -> bool {
        let Some(waiter) = self.inner.lock().remove(request_id) else {
            debug!(request_id, "no pending waiter for response");
            return false;
        };
        let delivered = waiter.responder.send(response.into()).is_ok();
        info!(request_id, delivered, "escalation answered");
        delivered
    }

    /// Snapshot of pending request ids.
    pub fn get_pending_request_ids(&self) -> std::collections::HashSet<RequestId> {
        self.inner.lock().keys().cloned().collect()
    }

    /// Snapshot of pending escalations, oldest first.
    pub fn pending(&self) -> Vec<PendingEscalation> {
        let mut pending: Vec<PendingEscalation> = self
            .inner
            .lock()
            .values()
            .map(|waiter| waiter.escalation.clone())
            .collect();
        pending.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        pending
    }

    /// Number of pending escalations.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if `request_id` is waiting for an answer.
    pub fn is_pending(&self, request_id: &str) -> bool {
        self.inner.lock().contains_key(request_id)
    }
}
