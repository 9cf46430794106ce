//! Demo agent runtime.
//!
//! Drives a handful of simulated agents through a repeating
//! `Planning -> Working -> Reviewing` timeline so the dashboard and shell have
//! something live to observe without a real runtime attached. Each cycle may
//! raise an escalation that waits on the [`RequestResponseRegistry`] and falls
//! back to the first option when nobody answers in time.
//!
//! Phase listeners are registered explicitly with [`DemoRuntime::on_phase`]
//! and removed with [`DemoRuntime::remove_listener`]. [`DemoRuntime::reset`]
//! rewinds the timeline but leaves registrations alone.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::seq::IndexedRandom;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DemoConfig;
use crate::error::Result;
use crate::feed::EventBus;
use crate::registry::RequestResponseRegistry;
use crate::services::{ActionService, InMemoryActionService, TicketStatus};
use crate::types::{AgentId, Event, EventKind, PendingEscalation, Source, Urgency};

const AGENT_NAMES: [&str; 9] = [
    "planner",
    "coder",
    "reviewer",
    "tester",
    "scribe",
    "scout",
    "critic",
    "builder",
    "librarian",
];

const TASKS: [&str; 6] = [
    "Add retry to the fetch client",
    "Document the config loader",
    "Fix flaky login test",
    "Split the render module",
    "Profile the startup path",
    "Tighten input validation",
];

const TOOLS: [&str; 5] = ["read_file", "grep", "run_tests", "edit_file", "git_diff"];

const QUESTIONS: [(&str, &[&str]); 3] = [
    ("Merge the reviewed branch?", &["no", "yes"]),
    ("Which database should the cache use?", &["sqlite", "postgres"]),
    ("Retry the failing deploy?", &["wait", "retry", "abort"]),
];

/// Timeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemoPhase {
    Planning,
    Working,
    Reviewing,
}

impl DemoPhase {
    /// Phase that follows this one. `Reviewing` wraps to `Planning`.
    pub fn next(&self) -> DemoPhase {
        match self {
            Self::Planning => Self::Working,
            Self::Working => Self::Reviewing,
            Self::Reviewing => Self::Planning,
        }
    }
}

impl fmt::Display for DemoPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::Working => write!(f, "working"),
            Self::Reviewing => write!(f, "reviewing"),
        }
    }
}

/// Handle returned by [`DemoRuntime::on_phase`].
pub type ListenerId = u64;

type PhaseListener = Arc<dyn Fn(DemoPhase, u64) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct Timeline {
    phase: DemoPhase,
    cycle: u64,
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            phase: DemoPhase::Planning,
            cycle: 0,
        }
    }
}

/// Simulated multi-agent runtime.
pub struct DemoRuntime {
    bus: Arc<EventBus>,
    registry: RequestResponseRegistry,
    actions: Arc<InMemoryActionService>,
    agents: Vec<AgentId>,
    tick: Duration,
    escalation_timeout: Duration,
    timeline: Mutex<Timeline>,
    listeners: Mutex<BTreeMap<ListenerId, PhaseListener>>,
    next_listener: AtomicU64,
}

impl DemoRuntime {
    pub fn new(
        bus: Arc<EventBus>,
        registry: RequestResponseRegistry,
        actions: Arc<InMemoryActionService>,
        config: &DemoConfig,
        escalation_timeout: Duration,
    ) -> Self {
        Self {
            bus,
            registry,
            actions,
            agents: agent_names(config.agents.max(1)),
            tick: Duration::from_millis(config.tick_ms),
            escalation_timeout,
            timeline: Mutex::new(Timeline::default()),
            listeners: Mutex::new(BTreeMap::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Simulated agent ids.
    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    /// Register a phase listener, called with the phase and cycle number
    /// every time the timeline enters a phase.
    pub fn on_phase<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(DemoPhase, u64) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.lock_listeners().insert(id, Arc::new(listener));
        debug!(listener_id = id, "phase listener registered");
        id
    }

    /// Unregister a phase listener. Returns false if `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.lock_listeners().remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    /// Rewind the timeline to the first phase of cycle zero.
    pub fn reset(&self) {
        *self.lock_timeline() = Timeline::default();
        info!("demo timeline reset");
    }

    pub fn phase(&self) -> DemoPhase {
        self.lock_timeline().phase
    }

    pub fn cycle(&self) -> u64 {
        self.lock_timeline().cycle
    }

    /// Announce every agent and register it with the action service.
    pub async fn start_agents(&self) {
        for agent in &self.agents {
            self.actions.register_agent(agent.clone()).await;
            self.emit(EventKind::AgentStarted, agent, format!("{agent} online"));
        }
    }

    /// Run the current phase, then advance the timeline.
    pub async fn step(&self) -> Result<DemoPhase> {
        let Timeline { phase, cycle } = *self.lock_timeline();
        self.notify(phase, cycle);

        match phase {
            DemoPhase::Planning => self.plan(cycle).await?,
            DemoPhase::Working => self.work().await?,
            DemoPhase::Reviewing => self.review(cycle).await?,
        }

        let mut timeline = self.lock_timeline();
        // A reset during the phase wins over advancing.
        if timeline.phase == phase && timeline.cycle == cycle {
            timeline.phase = phase.next();
            if phase == DemoPhase::Reviewing {
                timeline.cycle += 1;
            }
        }
        Ok(phase)
    }

    /// Drive the timeline until `cancel` fires, then stop every agent.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.start_agents().await;
        info!(agents = self.agents.len(), "demo runtime started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.tick) => {}
            }
            let cycle = self.cycle();
            match self.step().await {
                Ok(DemoPhase::Reviewing) if cycle % 2 == 0 => {
                    let runtime = Arc::clone(&self);
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = runtime.raise_escalation(cycle) => {}
                        }
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "demo step failed"),
            }
        }

        for agent in &self.agents {
            self.emit(EventKind::AgentStopped, agent, format!("{agent} offline"));
        }
        info!("demo runtime stopped");
    }

    /// Ask the operator a question and wait for the answer.
    ///
    /// Returns the operator's answer, or the escalation's default choice when
    /// the wait times out.
    pub async fn raise_escalation(&self, cycle: u64) -> String {
        let (question, options) = QUESTIONS[(cycle as usize) % QUESTIONS.len()];
        let request_id = format!("esc-{cycle}");
        let asker = self.agent(2);
        let escalation =
            PendingEscalation::new(&request_id, question).with_options(options.iter().copied());
        let default = escalation.default_choice();
        let pending = self.registry.register(escalation);

        self.bus.publish(
            Event::new(
                EventKind::QuestionRaised,
                Source::agent(asker),
                format!("{request_id}: {question} [{}]", options.join("/")),
            )
            .with_urgency(Urgency::High),
        );

        let answer = match pending {
            Some(pending) => pending.wait(self.escalation_timeout).await,
            None => None,
        };
        let (answer, how) = match answer {
            Some(answer) => (answer, "answered"),
            None => (default, "defaulted"),
        };
        info!(request_id = %request_id, answer = %answer, how, "escalation resolved");

        self.bus.publish(
            Event::new(
                EventKind::QuestionAnswered,
                Source::agent(asker),
                format!("{request_id} {how}: {answer}"),
            )
            .with_urgency(Urgency::Medium),
        );
        answer
    }

    async fn plan(&self, cycle: u64) -> Result<()> {
        let planner = self.agent(0);
        self.emit(EventKind::AgentThinking, planner, "breaking down the goal");
        self.emit(EventKind::MemoryRecalled, planner, "recalled project conventions");

        let title = TASKS[(cycle as usize) % TASKS.len()];
        let ticket = self.actions.create_ticket_as(Source::agent(planner), title).await?;
        let coder = self.agent(1);
        self.actions.assign_ticket(&ticket.id, coder).await?;
        self.actions
            .post_as(Source::agent(planner), "general", &format!("{} is up next", ticket.id))
            .await?;
        self.emit(EventKind::AgentIdle, planner, "plan published");
        Ok(())
    }

    async fn work(&self) -> Result<()> {
        let workers: Vec<&AgentId> = self.agents.iter().skip(1).collect();
        let workers = if workers.is_empty() {
            vec![self.agent(0)]
        } else {
            workers
        };
        for agent in workers {
            self.emit(EventKind::AgentWorking, agent, "working on assigned ticket");
            let tool = pick(&TOOLS);
            self.emit(EventKind::ToolInvoked, agent, tool);
            self.emit(EventKind::Heartbeat, agent, "alive");
        }
        Ok(())
    }

    async fn review(&self, cycle: u64) -> Result<()> {
        let coder = self.agent(1);
        let reviewer = self.agent(2);
        self.emit(EventKind::CodeSubmitted, coder, format!("patch for cycle {cycle}"));
        self.emit(EventKind::AgentThinking, reviewer, "reviewing patch");

        let open: Vec<String> = self
            .actions
            .tickets()
            .await?
            .into_iter()
            .filter(|t| t.assignee.as_deref() == Some(coder.as_str()))
            .filter(|t| t.status != TicketStatus::Done)
            .map(|t| t.id)
            .collect();
        for ticket_id in open {
            self.actions.complete_ticket(&ticket_id).await?;
        }

        self.emit(EventKind::MemoryStored, reviewer, "stored review notes");
        for agent in &self.agents {
            self.emit(EventKind::AgentIdle, agent, "waiting for next cycle");
        }
        Ok(())
    }

    fn agent(&self, role: usize) -> &AgentId {
        &self.agents[role % self.agents.len()]
    }

    fn emit(&self, kind: EventKind, agent: &str, summary: impl Into<String>) {
        self.bus.publish(Event::new(kind, Source::agent(agent), summary));
    }

    fn notify(&self, phase: DemoPhase, cycle: u64) {
        // Call outside the lock so listeners may register or remove others.
        let listeners: Vec<PhaseListener> = self.lock_listeners().values().cloned().collect();
        for listener in listeners {
            listener(phase, cycle);
        }
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, BTreeMap<ListenerId, PhaseListener>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_timeline(&self) -> std::sync::MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn agent_names(count: usize) -> Vec<AgentId> {
    (0..count)
        .map(|i| match AGENT_NAMES.get(i) {
            Some(name) => (*name).to_string(),
            None => format!("agent-{}", i + 1),
        })
        .collect()
}

fn pick(choices: &[&'static str]) -> &'static str {
    choices.choose(&mut rand::rng()).copied().unwrap_or("noop")
}
