//! # vigil-core
//!
//! Runtime-facing types and collaborators for the VIGIL dashboard.
//!
//! This crate provides:
//! - [`VigilError`] - Error type shared by every VIGIL crate
//! - [`logging`] - Tracing setup and log directory helpers
//! - [`types`] - Events, sources, urgency and escalations
//! - [`feed`] - Live event subscriptions and the in-process [`EventBus`]
//! - [`registry`] - Escalation request/response correlation
//! - [`services`] - Action services (tickets, threads, goals)
//! - [`simulator`] - Demo multi-agent runtime
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vigil_core::{Event, EventBus, EventFeed, EventKind, Source, SubscriptionFilter};
//!
//! # async fn demo() {
//! let bus = Arc::new(EventBus::default());
//! let mut sub = bus.subscribe(SubscriptionFilter::kinds([EventKind::TaskCreated]));
//! bus.publish(Event::new(EventKind::TaskCreated, Source::agent("planner"), "T-1 created"));
//! let event = sub.next_event().await;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod filter;
pub mod logging;
pub mod registry;
pub mod services;
pub mod simulator;
pub mod types;

// Re-export main types for convenience
pub use config::{DemoConfig, VigilConfig};
pub use error::{Result, VigilError};
pub use feed::{EventBus, EventFeed, FeedItem, Subscription};
pub use filter::{FilterPreset, SubscriptionFilter};
pub use logging::{LogGuard, init_logging};
pub use registry::{PendingResponse, RequestResponseRegistry};
pub use services::{ActionService, InMemoryActionService, Ticket, TicketStatus};
pub use simulator::{DemoPhase, DemoRuntime, ListenerId};
pub use types::{
    AgentId, AgentStatus, Event, EventKind, PendingEscalation, RequestId, Significance, Source,
    Timestamp, Urgency,
};
