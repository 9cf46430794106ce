//! Live aggregation of the event feed into a [`ViewState`].
//!
//! [`ViewStatePresenter`] owns a background task that reads the full event
//! feed and folds every event into a bounded summary. After each event the
//! task publishes a fresh immutable snapshot, so readers on other tasks only
//! ever see fully applied state.
//!
//! ## Failure handling
//!
//! - Malformed events are logged, counted in [`Vitals::dropped_events`] and skipped.
//! - A lagging subscription counts the skipped events as dropped.
//! - If the feed ends while the presenter is running it resubscribes after a
//!   jittered backoff and counts the attempt in [`Vitals::resubscribes`].
//!
//! Escalations can resolve without any event following them, so with a
//! registry attached the task also samples the pending count on a timer and
//! republishes when it changes. Offline agents are forgotten, oldest first,
//! once more than `agent_capacity` agents are known.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_core::{
    AgentId, AgentStatus, Event, EventFeed, EventKind, FeedItem, RequestResponseRegistry,
    Significance, Subscription, SubscriptionFilter, Timestamp, VigilConfig,
};

/// Derived per-agent state.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    pub agent_id: AgentId,
    pub display_name: String,
    pub status: AgentStatus,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
    pub last_summary: String,
    pub events: u64,
}

impl AgentState {
    fn new(agent_id: &str, at: Timestamp) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            display_name: display_name(agent_id),
            status: AgentStatus::Idle,
            first_seen: at,
            last_seen: at,
            last_summary: String::new(),
            events: 0,
        }
    }
}

/// One point on an agent's activity strip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparkSample {
    pub at: Timestamp,
    pub status: AgentStatus,
}

/// Headline counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vitals {
    pub events_seen: u64,
    pub significant_events: u64,
    pub dropped_events: u64,
    pub resubscribes: u64,
    pub active_agents: usize,
    pub tickets_open: u64,
    pub tickets_done: u64,
    pub pending_escalations: usize,
    pub last_event_at: Option<Timestamp>,
}

/// Point-in-time summary of the runtime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub vitals: Vitals,
    pub agent_states: BTreeMap<AgentId, AgentState>,
    /// Oldest first, bounded, arrival order
    pub recent_significant_events: VecDeque<Event>,
    /// Memory stores and recalls, oldest first, bounded
    pub recent_memory_ops: VecDeque<Event>,
    /// Per-agent status samples, oldest first, bounded
    pub spark: BTreeMap<AgentId, VecDeque<SparkSample>>,
}

impl ViewState {
    /// Spark samples for `agent_id`, most recent first, at most `limit`.
    pub fn spark_history(&self, agent_id: &str, limit: usize) -> Vec<SparkSample> {
        self.spark
            .get(agent_id)
            .map(|samples| samples.iter().rev().take(limit).copied().collect())
            .unwrap_or_default()
    }

    /// Agents that are not offline.
    pub fn active_agents(&self) -> impl Iterator<Item = &AgentState> {
        self.agent_states.values().filter(|s| s.status.is_active())
    }
}

/// Presenter tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenterConfig {
    pub recent_capacity: usize,
    pub memory_capacity: usize,
    pub spark_capacity: usize,
    pub agent_capacity: usize,
    pub resubscribe_backoff: Duration,
    /// How often the registry's pending count is sampled
    pub registry_poll: Duration,
    pub verbose: bool,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self::from(&VigilConfig::default())
    }
}

impl From<&VigilConfig> for PresenterConfig {
    fn from(config: &VigilConfig) -> Self {
        Self {
            recent_capacity: config.recent_events_capacity,
            memory_capacity: config.memory_ops_capacity,
            spark_capacity: config.spark_capacity,
            agent_capacity: config.agent_capacity,
            resubscribe_backoff: config.resubscribe_backoff(),
            registry_poll: config.render_interval(),
            verbose: config.verbose,
        }
    }
}

/// Folds events into a [`ViewState`]. Single-threaded; the presenter task
/// owns one and publishes clones of its state.
#[derive(Debug, Clone)]
pub struct ViewStateAggregator {
    config: PresenterConfig,
    state: ViewState,
}

impl ViewStateAggregator {
    pub fn new(config: PresenterConfig) -> Self {
        Self::resume(config, ViewState::default())
    }

    /// Continue aggregating on top of an existing state.
    pub fn resume(config: PresenterConfig, state: ViewState) -> Self {
        Self { config, state }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Apply one event. Invalid events are rejected and counted as dropped.
    pub fn apply(&mut self, event: Event, verbose: bool) -> vigil_core::Result<()> {
        if let Err(e) = event.validate() {
            self.state.vitals.dropped_events += 1;
            return Err(e);
        }

        let vitals = &mut self.state.vitals;
        vitals.events_seen += 1;
        vitals.last_event_at = Some(
            vitals
                .last_event_at
                .map_or(event.timestamp, |last| last.max(event.timestamp)),
        );
        match event.kind {
            EventKind::TaskCreated => vitals.tickets_open += 1,
            EventKind::TaskCompleted => {
                vitals.tickets_open = vitals.tickets_open.saturating_sub(1);
                vitals.tickets_done += 1;
            }
            _ => {}
        }

        if let Some(agent_id) = event.source.agent_id() {
            self.apply_to_agent(agent_id, &event);
            self.forget_offline_agents();
        }
        self.state.vitals.active_agents = self.state.active_agents().count();

        if event.kind.is_memory_op() {
            push_bounded(
                &mut self.state.recent_memory_ops,
                event.clone(),
                self.config.memory_capacity,
            );
        }

        let significant = event.significance() == Significance::Significant;
        if significant {
            self.state.vitals.significant_events += 1;
        }
        if significant || verbose {
            push_bounded(
                &mut self.state.recent_significant_events,
                event,
                self.config.recent_capacity,
            );
        }
        Ok(())
    }

    fn apply_to_agent(&mut self, agent_id: &str, event: &Event) {
        let agent = self
            .state
            .agent_states
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentState::new(agent_id, event.timestamp));
        agent.last_seen = agent.last_seen.max(event.timestamp);
        agent.last_summary = event.summary.clone();
        agent.events += 1;

        let Some(status) = event.kind.implied_status() else {
            return;
        };
        agent.status = status;
        let samples = self.state.spark.entry(agent_id.to_string()).or_default();
        push_bounded(
            samples,
            SparkSample {
                at: event.timestamp,
                status,
            },
            self.config.spark_capacity,
        );
    }

    fn forget_offline_agents(&mut self) {
        while self.state.agent_states.len() > self.config.agent_capacity {
            let oldest = self
                .state
                .agent_states
                .values()
                .filter(|agent| !agent.status.is_active())
                .min_by_key(|agent| agent.last_seen)
                .map(|agent| agent.agent_id.clone());
            let Some(agent_id) = oldest else {
                break;
            };
            self.state.agent_states.remove(&agent_id);
            self.state.spark.remove(&agent_id);
            debug!(agent_id = %agent_id, "forgetting offline agent");
        }
    }

    /// Count events the subscription skipped.
    pub fn record_dropped(&mut self, count: u64) {
        self.state.vitals.dropped_events += count;
    }

    pub fn record_resubscribe(&mut self) {
        self.state.vitals.resubscribes += 1;
    }

    /// Returns true if the count changed.
    pub fn set_pending_escalations(&mut self, pending: usize) -> bool {
        let changed = self.state.vitals.pending_escalations != pending;
        self.state.vitals.pending_escalations = pending;
        changed
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T, capacity: usize) {
    queue.push_back(item);
    while queue.len() > capacity {
        queue.pop_front();
    }
}

/// Title-case an agent id for display (`code-reviewer` -> `Code Reviewer`).
fn display_name(agent_id: &str) -> String {
    agent_id
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Base delay with +/-25% jitter.
fn jittered(base: Duration) -> Duration {
    let base = base.as_secs_f64();
    let range = base * 0.25;
    if range <= 0.0 {
        return Duration::from_secs_f64(base);
    }
    let jitter = rand::rng().random_range(-range..range);
    Duration::from_secs_f64((base + jitter).max(0.0))
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Background consumer of the event feed.
pub struct ViewStatePresenter {
    feed: Arc<dyn EventFeed>,
    registry: Option<RequestResponseRegistry>,
    config: PresenterConfig,
    verbose: Arc<AtomicBool>,
    state_tx: Arc<watch::Sender<Arc<ViewState>>>,
    running: Mutex<Option<Running>>,
}

impl ViewStatePresenter {
    pub fn new(feed: Arc<dyn EventFeed>, config: PresenterConfig) -> Self {
        let (state_tx, _rx) = watch::channel(Arc::new(ViewState::default()));
        Self {
            feed,
            registry: None,
            verbose: Arc::new(AtomicBool::new(config.verbose)),
            config,
            state_tx: Arc::new(state_tx),
            running: Mutex::new(None),
        }
    }

    /// Report pending escalations from `registry` in the vitals.
    pub fn with_registry(mut self, registry: RequestResponseRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Begin consuming the feed. Returns false if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let mut running = self.lock_running();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!("presenter already running");
            return false;
        }

        let cancel = CancellationToken::new();
        // Subscribe before returning so nothing published after start() is missed.
        let subscription = self.feed.subscribe(SubscriptionFilter::all());
        let consumer = Consumer {
            feed: Arc::clone(&self.feed),
            registry: self.registry.clone(),
            verbose: Arc::clone(&self.verbose),
            state_tx: Arc::clone(&self.state_tx),
            aggregator: ViewStateAggregator::resume(
                self.config.clone(),
                ViewState::clone(&self.state_tx.borrow()),
            ),
            backoff: self.config.resubscribe_backoff,
            registry_poll: self.config.registry_poll,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(consumer.run(subscription));
        *running = Some(Running { cancel, handle });
        info!("presenter started");
        true
    }

    /// Stop consuming and wait for the consumer task to exit.
    ///
    /// The last published snapshot stays readable.
    pub async fn stop(&self) {
        let running = self.lock_running().take();
        let Some(Running { cancel, handle }) = running else {
            return;
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "presenter task ended abnormally");
        }
        info!("presenter stopped");
    }

    pub fn is_running(&self) -> bool {
        self.lock_running()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Latest fully applied snapshot. Never blocks on the writer.
    pub fn get_view_state(&self) -> Arc<ViewState> {
        Arc::clone(&self.state_tx.borrow())
    }

    /// Status samples for `agent_id`, most recent first, at most `limit`.
    pub fn get_spark_history(&self, agent_id: &str, limit: usize) -> Vec<SparkSample> {
        self.get_view_state().spark_history(agent_id, limit)
    }

    /// Include routine events in the recent events sequence from now on.
    pub fn set_verbose(&self, verbose: bool) {
        if self.verbose.swap(verbose, Ordering::AcqRel) != verbose {
            debug!(verbose, "presenter verbosity changed");
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Acquire)
    }

    /// Receiver notified after every published snapshot.
    pub fn watch_state(&self) -> watch::Receiver<Arc<ViewState>> {
        self.state_tx.subscribe()
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ViewStatePresenter {
    fn drop(&mut self) {
        if let Some(running) = self.lock_running().take() {
            running.cancel.cancel();
        }
    }
}

struct Consumer {
    feed: Arc<dyn EventFeed>,
    registry: Option<RequestResponseRegistry>,
    verbose: Arc<AtomicBool>,
    state_tx: Arc<watch::Sender<Arc<ViewState>>>,
    aggregator: ViewStateAggregator,
    backoff: Duration,
    registry_poll: Duration,
    cancel: CancellationToken,
}

impl Consumer {
    async fn run(mut self, first: Subscription) {
        let mut subscription = first;
        let mut poll = tokio::time::interval(self.registry_poll.max(Duration::from_millis(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return,
                    item = subscription.next() => item,
                    _ = poll.tick(), if self.registry.is_some() => {
                        self.refresh_pending();
                        continue;
                    }
                };
                match item {
                    Some(FeedItem::Event(event)) => {
                        let kind = event.kind;
                        if let Err(e) = self
                            .aggregator
                            .apply(event, self.verbose.load(Ordering::Acquire))
                        {
                            warn!(kind = %kind, error = %e, "dropping malformed event");
                        }
                    }
                    Some(FeedItem::Lagged(skipped)) => {
                        warn!(skipped, "presenter fell behind the event feed");
                        self.aggregator.record_dropped(skipped);
                    }
                    None => break,
                }
                self.publish();
            }

            self.aggregator.record_resubscribe();
            self.publish();
            let delay = jittered(self.backoff);
            warn!(delay_ms = delay.as_millis() as u64, "event subscription ended, resubscribing");
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            subscription = self.feed.subscribe(SubscriptionFilter::all());
        }
    }

    fn refresh_pending(&mut self) {
        let Some(registry) = &self.registry else {
            return;
        };
        if self.aggregator.set_pending_escalations(registry.pending_count()) {
            self.publish();
        }
    }

    fn publish(&mut self) {
        if let Some(registry) = &self.registry {
            self.aggregator
                .set_pending_escalations(registry.pending_count());
        }
        let snapshot = Arc::new(self.aggregator.state().clone());
        self.state_tx.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use vigil_core::{EventBus, Source, Urgency};

    use super::*;

    fn at(secs: i64) -> Timestamp {
        chrono::Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn event(kind: EventKind, agent: &str, secs: i64) -> Event {
        Event::new(kind, Source::agent(agent), format!("{kind} from {agent}")).with_timestamp(at(secs))
    }

    fn small_config() -> PresenterConfig {
        PresenterConfig {
            recent_capacity: 3,
            memory_capacity: 2,
            spark_capacity: 4,
            agent_capacity: 3,
            resubscribe_backoff: Duration::from_millis(10),
            registry_poll: Duration::from_millis(20),
            verbose: false,
        }
    }

    #[test]
    fn test_bounded_history_keeps_most_recent_in_order() {
        let mut agg = ViewStateAggregator::new(small_config());
        for i in 0..7 {
            agg.apply(
                Event::new(EventKind::TaskCreated, Source::Human, format!("task {i}")),
                false,
            )
            .unwrap();
        }
        let summaries: Vec<&str> = agg
            .state()
            .recent_significant_events
            .iter()
            .map(|e| e.summary.as_str())
            .collect();
        assert_eq!(summaries, vec!["task 4", "task 5", "task 6"]);
    }

    #[test]
    fn test_routine_events_need_verbose() {
        let mut agg = ViewStateAggregator::new(small_config());
        agg.apply(event(EventKind::Heartbeat, "a", 0), false).unwrap();
        assert!(agg.state().recent_significant_events.is_empty());
        assert_eq!(agg.state().vitals.events_seen, 1);

        agg.apply(event(EventKind::Heartbeat, "a", 1), true).unwrap();
        assert_eq!(agg.state().recent_significant_events.len(), 1);

        let urgent = event(EventKind::Heartbeat, "a", 2).with_urgency(Urgency::High);
        agg.apply(urgent, false).unwrap();
        assert_eq!(agg.state().recent_significant_events.len(), 2);
    }

    #[test]
    fn test_agent_state_and_spark() {
        let mut agg = ViewStateAggregator::new(small_config());
        agg.apply(event(EventKind::AgentStarted, "code-reviewer", 0), false).unwrap();
        agg.apply(event(EventKind::AgentThinking, "code-reviewer", 1), false).unwrap();
        agg.apply(event(EventKind::MessagePosted, "code-reviewer", 2), false).unwrap();
        agg.apply(event(EventKind::AgentWorking, "code-reviewer", 3), false).unwrap();

        let state = agg.state();
        let agent = &state.agent_states["code-reviewer"];
        assert_eq!(agent.display_name, "Code Reviewer");
        assert_eq!(agent.status, AgentStatus::Working);
        assert_eq!(agent.events, 4);
        assert_eq!(agent.last_seen, at(3));

        let history = state.spark_history("code-reviewer", 2);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, AgentStatus::Working);
        assert_eq!(history[1].status, AgentStatus::Thinking);
        assert!(state.spark_history("nobody", 5).is_empty());
    }

    #[test]
    fn test_spark_is_bounded() {
        let mut agg = ViewStateAggregator::new(small_config());
        for i in 0..10 {
            agg.apply(event(EventKind::AgentWorking, "a", i), false).unwrap();
        }
        assert_eq!(agg.state().spark["a"].len(), 4);
        assert_eq!(agg.state().spark_history("a", 100)[0].at, at(9));
    }

    #[test]
    fn test_malformed_event_is_counted_and_skipped() {
        let mut agg = ViewStateAggregator::new(small_config());
        let bad = Event::new(EventKind::TaskCreated, Source::agent(""), "orphan");
        assert!(agg.apply(bad, false).is_err());
        assert_eq!(agg.state().vitals.dropped_events, 1);
        assert_eq!(agg.state().vitals.events_seen, 0);
        assert!(agg.state().agent_states.is_empty());
    }

    #[test]
    fn test_ticket_and_agent_vitals() {
        let mut agg = ViewStateAggregator::new(small_config());
        agg.apply(event(EventKind::AgentStarted, "a", 0), false).unwrap();
        agg.apply(event(EventKind::AgentStarted, "b", 0), false).unwrap();
        agg.apply(event(EventKind::TaskCreated, "a", 1), false).unwrap();
        agg.apply(event(EventKind::TaskCreated, "a", 2), false).unwrap();
        agg.apply(event(EventKind::TaskCompleted, "b", 3), false).unwrap();
        agg.apply(event(EventKind::AgentStopped, "b", 4), false).unwrap();

        let vitals = &agg.state().vitals;
        assert_eq!(vitals.tickets_open, 1);
        assert_eq!(vitals.tickets_done, 1);
        assert_eq!(vitals.active_agents, 1);
        assert_eq!(vitals.last_event_at, Some(at(4)));
    }

    #[test]
    fn test_memory_ops_are_kept_separately() {
        let mut agg = ViewStateAggregator::new(small_config());
        agg.apply(event(EventKind::MemoryRecalled, "a", 0), false).unwrap();
        agg.apply(event(EventKind::MemoryStored, "a", 1), false).unwrap();
        agg.apply(event(EventKind::MemoryStored, "a", 2), false).unwrap();
        let ops = &agg.state().recent_memory_ops;
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].timestamp, at(1));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("planner"), "Planner");
        assert_eq!(display_name("agent_7"), "Agent 7");
    }

    async fn wait_for<F>(presenter: &ViewStatePresenter, mut pred: F) -> Arc<ViewState>
    where
        F: FnMut(&ViewState) -> bool,
    {
        let mut rx = presenter.watch_state();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let state = presenter.get_view_state();
                if pred(&*state) {
                    return state;
                }
                let _ = rx.changed().await;
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_keeps_snapshot() {
        let bus = Arc::new(EventBus::default());
        let presenter = ViewStatePresenter::new(bus.clone(), small_config());
        assert!(presenter.start());
        assert!(!presenter.start());
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(Event::new(EventKind::TaskCreated, Source::Human, "T-1 created"));
        let state = wait_for(&presenter, |s| s.vitals.events_seen == 1).await;

        presenter.stop().await;
        assert!(!presenter.is_running());
        bus.publish(Event::new(EventKind::TaskCreated, Source::Human, "T-2 created"));
        assert_eq!(presenter.get_view_state(), state);
    }

    #[tokio::test]
    async fn test_resubscribes_after_feed_drop() {
        let bus = Arc::new(EventBus::default());
        let presenter = ViewStatePresenter::new(bus.clone(), small_config());
        presenter.start();
        tokio::task::yield_now().await;

        bus.sever();
        wait_for(&presenter, |s| s.vitals.resubscribes == 1).await;

        // The new subscription is live once the backoff elapses.
        tokio::time::timeout(Duration::from_secs(5), async {
            while bus.subscriber_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        bus.publish(Event::new(EventKind::AgentStarted, Source::agent("a"), "a online"));
        let state = wait_for(&presenter, |s| s.agent_states.contains_key("a")).await;
        assert!(presenter.is_running());
        assert_eq!(state.vitals.resubscribes, 1);
        presenter.stop().await;
    }

    #[tokio::test]
    async fn test_pending_escalations_reported() {
        let bus = Arc::new(EventBus::default());
        let registry = RequestResponseRegistry::new();
        let presenter =
            ViewStatePresenter::new(bus.clone(), small_config()).with_registry(registry.clone());
        presenter.start();
        tokio::task::yield_now().await;

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .wait_for_response("esc-1", Duration::from_secs(30))
                    .await
            })
        };
        while !registry.is_pending("esc-1") {
            tokio::task::yield_now().await;
        }
        bus.publish(Event::new(EventKind::QuestionRaised, Source::agent("a"), "esc-1: ok?"));
        wait_for(&presenter, |s| s.vitals.pending_escalations == 1).await;

        registry.provide_response("esc-1", "yes");
        waiter.await.unwrap();
        presenter.stop().await;
    }

    #[tokio::test]
    async fn test_pending_count_clears_after_timeout_without_events() {
        let bus = Arc::new(EventBus::default());
        let registry = RequestResponseRegistry::new();
        let presenter =
            ViewStatePresenter::new(bus.clone(), small_config()).with_registry(registry.clone());
        presenter.start();

        let pending = registry
            .register(vigil_core::PendingEscalation::new("esc-1", "ok?"))
            .unwrap();
        bus.publish(Event::new(EventKind::QuestionRaised, Source::agent("a"), "esc-1: ok?"));
        wait_for(&presenter, |s| s.vitals.pending_escalations == 1).await;

        assert_eq!(pending.wait(Duration::from_millis(50)).await, None);
        let state = wait_for(&presenter, |s| s.vitals.pending_escalations == 0).await;
        assert_eq!(state.vitals.events_seen, 1);
        presenter.stop().await;
    }

    #[tokio::test]
    async fn test_pending_count_seen_without_announcement() {
        let bus = Arc::new(EventBus::default());
        let registry = RequestResponseRegistry::new();
        let presenter =
            ViewStatePresenter::new(bus.clone(), small_config()).with_registry(registry.clone());
        presenter.start();

        let _pending = registry
            .register(vigil_core::PendingEscalation::new("esc-2", "ok?"))
            .unwrap();
        let state = wait_for(&presenter, |s| s.vitals.pending_escalations == 1).await;
        assert_eq!(state.vitals.events_seen, 0);
        presenter.stop().await;
    }

    #[test]
    fn test_offline_agents_forgotten_beyond_capacity() {
        let mut agg = ViewStateAggregator::new(small_config());
        agg.apply(event(EventKind::AgentStarted, "a", 0), false).unwrap();
        agg.apply(event(EventKind::AgentStarted, "b", 1), false).unwrap();
        agg.apply(event(EventKind::AgentStopped, "a", 2), false).unwrap();
        agg.apply(event(EventKind::AgentStopped, "b", 3), false).unwrap();
        agg.apply(event(EventKind::AgentStarted, "c", 4), false).unwrap();
        assert_eq!(agg.state().agent_states.len(), 3);

        agg.apply(event(EventKind::AgentStarted, "d", 5), false).unwrap();
        let state = agg.state();
        let known: Vec<&str> = state.agent_states.keys().map(String::as_str).collect();
        assert_eq!(known, vec!["b", "c", "d"]);
        assert!(!state.spark.contains_key("a"));
        assert_eq!(state.vitals.active_agents, 2);
    }

    #[test]
    fn test_active_agents_are_never_forgotten() {
        let mut agg = ViewStateAggregator::new(small_config());
        for (i, agent) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            agg.apply(event(EventKind::AgentWorking, agent, i as i64), false).unwrap();
        }
        assert_eq!(agg.state().agent_states.len(), 5);
        assert_eq!(agg.state().vitals.active_agents, 5);
    }
}
