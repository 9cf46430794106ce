//! End-to-end tests across the presenter, scheduler, shell and runtime.
//!
//! Events flow from an in-process bus through the presenter into frames
//! written to a recording screen, the same path the binary uses with a real
//! terminal.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use tokio_util::sync::CancellationToken;
    use vigil_core::{
        DemoConfig, DemoRuntime, Event, EventBus, EventFeed, EventKind, FeedItem,
        InMemoryActionService, RequestResponseRegistry, Source, SubscriptionFilter,
    };

    use crate::commands::CommandDispatcher;
    use crate::executor::CommandResult;
    use crate::presenter::{PresenterConfig, ViewState, ViewStatePresenter};
    use crate::repl::{ModalCommandInterpreter, ReplAction, ReplMode};
    use crate::scheduler::{DashboardScheduler, RenderCache, SchedulerConfig};
    use crate::terminal::testing::RecordingScreen;
    use crate::view::ViewMode;

    // ============================================================
    // Test Helpers
    // ============================================================

    struct Stack {
        bus: Arc<EventBus>,
        registry: RequestResponseRegistry,
        actions: Arc<InMemoryActionService>,
        presenter: Arc<ViewStatePresenter>,
        scheduler: DashboardScheduler,
    }

    fn stack(config: PresenterConfig) -> Stack {
        let bus = Arc::new(EventBus::default());
        let registry = RequestResponseRegistry::new();
        let presenter = Arc::new(
            ViewStatePresenter::new(bus.clone(), config).with_registry(registry.clone()),
        );
        let actions = Arc::new(InMemoryActionService::new(bus.clone()));
        let dispatcher = CommandDispatcher::new(actions.clone(), registry.clone(), presenter.clone());
        let scheduler = DashboardScheduler::new(
            presenter.clone(),
            dispatcher,
            SchedulerConfig::default(),
            CancellationToken::new(),
        );
        presenter.start();
        Stack {
            bus,
            registry,
            actions,
            presenter,
            scheduler,
        }
    }

    async fn wait_for_state<F>(presenter: &ViewStatePresenter, mut pred: F) -> Arc<ViewState>
    where
        F: FnMut(&ViewState) -> bool,
    {
        let mut rx = presenter.watch_state();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let state = presenter.get_view_state();
                if pred(&state) {
                    return state;
                }
                let _ = rx.changed().await;
            }
        })
        .await
        .expect("presenter never reached the expected state")
    }

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn esc() -> KeyEvent {
        KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)
    }

    fn agent_event(kind: EventKind, agent: &str) -> Event {
        Event::new(kind, Source::agent(agent), format!("{agent} {kind}"))
    }

    // ============================================================
    // Rendering
    // ============================================================

    #[tokio::test]
    async fn test_e2e_render_is_idempotent_and_change_detected() {
        let s = stack(PresenterConfig::default());
        s.bus.publish(agent_event(EventKind::AgentStarted, "planner"));
        s.bus.publish(Event::new(EventKind::TaskCreated, Source::Human, "T-1 created"));
        wait_for_state(&s.presenter, |st| st.vitals.events_seen == 2).await;

        let mut screen = RecordingScreen::new(100, 30);
        let mut cache = RenderCache::default();
        assert!(s.scheduler.render_tick(&mut screen, &mut cache).unwrap());
        assert!(!s.scheduler.render_tick(&mut screen, &mut cache).unwrap());
        assert_eq!(screen.frame_count(), 1);

        let frame = screen.last_frame().unwrap();
        assert!(frame.contains("Planner"));
        assert!(frame.contains("T-1 created"));

        // A new event changes the frame.
        s.bus.publish(agent_event(EventKind::AgentWorking, "planner"));
        wait_for_state(&s.presenter, |st| st.vitals.events_seen == 3).await;
        assert!(s.scheduler.render_tick(&mut screen, &mut cache).unwrap());
        assert_eq!(screen.frame_count(), 2);
        s.presenter.stop().await;
    }

    // ============================================================
    // Event stream and presenter
    // ============================================================

    #[tokio::test]
    async fn test_e2e_significant_events_keep_arrival_order() {
        let s = stack(PresenterConfig::default());
        for kind in [EventKind::TaskCreated, EventKind::QuestionRaised, EventKind::CodeSubmitted] {
            s.bus.publish(agent_event(kind, "coder"));
        }
        let state = wait_for_state(&s.presenter, |st| st.recent_significant_events.len() == 3).await;
        let kinds: Vec<EventKind> = state.recent_significant_events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::TaskCreated, EventKind::QuestionRaised, EventKind::CodeSubmitted]
        );
        s.presenter.stop().await;
    }

    #[tokio::test]
    async fn test_e2e_filter_passes_only_matching_kinds() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe(SubscriptionFilter::kinds([EventKind::TaskCreated]));
        bus.publish(Event::new(EventKind::TaskCreated, Source::Human, "T-1 created"));
        bus.publish(agent_event(EventKind::MessagePosted, "coder"));
        bus.sever();

        let mut received = Vec::new();
        while let Some(item) = sub.next().await {
            if let FeedItem::Event(event) = item {
                received.push(event.kind);
            }
        }
        assert_eq!(received, vec![EventKind::TaskCreated]);
    }

    #[tokio::test]
    async fn test_e2e_bounded_history_evicts_oldest() {
        let s = stack(PresenterConfig {
            recent_capacity: 5,
            ..PresenterConfig::default()
        });
        for i in 0..12 {
            s.bus
                .publish(Event::new(EventKind::TaskCreated, Source::Human, format!("task {i}")));
        }
        let state = wait_for_state(&s.presenter, |st| st.vitals.events_seen == 12).await;
        let summaries: Vec<&str> = state
            .recent_significant_events
            .iter()
            .map(|e| e.summary.as_str())
            .collect();
        assert_eq!(summaries, vec!["task 7", "task 8", "task 9", "task 10", "task 11"]);
        s.presenter.stop().await;
    }

    // ============================================================
    // Agent slots and focus
    // ============================================================

    #[tokio::test]
    async fn test_e2e_agent_slots_are_stable_and_reused() {
        let s = stack(PresenterConfig::default());
        let mut screen = RecordingScreen::new(100, 30);
        let mut cache = RenderCache::default();

        for agent in ["alpha", "beta", "gamma"] {
            s.bus.publish(agent_event(EventKind::AgentStarted, agent));
            wait_for_state(&s.presenter, |st| st.agent_states.contains_key(agent)).await;
        }

        s.scheduler.handle_key(key('2'));
        assert_eq!(
            s.scheduler.view().snapshot().focused_agent_id.as_deref(),
            Some("beta")
        );
        s.scheduler.handle_key(esc());

        // beta leaves; alpha and gamma keep their numbers.
        s.bus.publish(agent_event(EventKind::AgentStopped, "beta"));
        wait_for_state(&s.presenter, |st| st.vitals.active_agents == 2).await;
        s.scheduler.render_tick(&mut screen, &mut cache).unwrap();
        s.scheduler.handle_key(key('3'));
        assert_eq!(
            s.scheduler.view().snapshot().focused_agent_id.as_deref(),
            Some("gamma")
        );
        s.scheduler.handle_key(esc());

        // The next new agent takes the lowest free slot.
        s.bus.publish(agent_event(EventKind::AgentStarted, "delta"));
        wait_for_state(&s.presenter, |st| st.agent_states.contains_key("delta")).await;
        s.scheduler.handle_key(key('2'));
        assert_eq!(
            s.scheduler.view().snapshot().focused_agent_id.as_deref(),
            Some("delta")
        );
        s.scheduler.handle_key(key('1'));
        assert_eq!(
            s.scheduler.view().snapshot().focused_agent_id.as_deref(),
            Some("alpha")
        );
        s.presenter.stop().await;
    }

    #[tokio::test]
    async fn test_e2e_focus_missing_index_falls_back_to_dashboard() {
        let s = stack(PresenterConfig::default());
        for agent in ["alpha", "beta"] {
            s.bus.publish(agent_event(EventKind::AgentStarted, agent));
        }
        wait_for_state(&s.presenter, |st| st.vitals.active_agents == 2).await;

        s.scheduler.handle_key(key('3'));
        let config = s.scheduler.view().snapshot();
        assert_eq!(config.mode, ViewMode::Dashboard);
        assert_eq!(config.focused_agent_id, None);

        let mut screen = RecordingScreen::new(100, 30);
        assert!(
            s.scheduler
                .render_tick(&mut screen, &mut RenderCache::default())
                .unwrap()
        );
        s.presenter.stop().await;
    }

    // ============================================================
    // Modal interpreter timing
    // ============================================================

    #[test]
    fn test_e2e_double_escape_threshold() {
        let threshold = Duration::from_millis(300);
        let start = Instant::now();

        let mut fast = ModalCommandInterpreter::new(threshold);
        assert_eq!(fast.handle_key(esc(), start), ReplAction::None);
        assert_eq!(
            fast.handle_key(esc(), start + Duration::from_millis(120)),
            ReplAction::EmergencyExit
        );

        let mut slow = ModalCommandInterpreter::new(threshold);
        assert_eq!(slow.handle_key(esc(), start), ReplAction::None);
        assert_eq!(slow.mode(), ReplMode::Normal);
        assert_eq!(
            slow.handle_key(esc(), start + Duration::from_millis(450)),
            ReplAction::None
        );
        assert_eq!(slow.mode(), ReplMode::Normal);
    }

    // ============================================================
    // Escalations
    // ============================================================

    #[tokio::test]
    async fn test_e2e_escalation_answered_from_command_line() {
        let s = stack(PresenterConfig::default());
        let runtime = Arc::new(DemoRuntime::new(
            s.bus.clone(),
            s.registry.clone(),
            s.actions.clone(),
            &DemoConfig::default(),
            Duration::from_secs(30),
        ));
        runtime.start_agents().await;

        let asking = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.raise_escalation(0).await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while !s.registry.is_pending("esc-0") {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let options = s.registry.pending()[0].options.clone();
        let choice = options.last().cloned().unwrap_or_else(|| "yes".to_string());

        for c in format!(":answer esc-0 {choice}").chars() {
            s.scheduler.handle_key(key(c));
        }
        s.scheduler
            .handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));

        assert_eq!(asking.await.unwrap(), choice);
        let view = s.scheduler.view().clone();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !view.snapshot().has_overlay() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(
            view.snapshot().last_result,
            Some(CommandResult::Success(format!("Answered esc-0: {choice}")))
        );

        // A second answer finds nothing pending.
        assert!(!s.registry.provide_response("esc-0", "again"));
        wait_for_state(&s.presenter, |st| {
            st.recent_significant_events
                .iter()
                .any(|e| e.kind == EventKind::QuestionAnswered)
        })
        .await;
        s.presenter.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_e2e_escalation_times_out_to_default() {
        let bus = Arc::new(EventBus::default());
        let registry = RequestResponseRegistry::new();
        let actions = Arc::new(InMemoryActionService::new(bus.clone()));
        let runtime = DemoRuntime::new(
            bus.clone(),
            registry.clone(),
            actions,
            &DemoConfig::default(),
            Duration::from_secs(2),
        );
        let answer = runtime.raise_escalation(0).await;
        assert!(!answer.is_empty());
        assert_eq!(registry.pending_count(), 0);
        assert!(!registry.provide_response("esc-0", "late"));
    }

    // ============================================================
    // Full run
    // ============================================================

    #[tokio::test]
    async fn test_e2e_dashboard_run_with_demo_runtime() {
        let s = stack(PresenterConfig::default());
        let cancel = CancellationToken::new();
        let runtime = Arc::new(DemoRuntime::new(
            s.bus.clone(),
            s.registry.clone(),
            s.actions.clone(),
            &DemoConfig { agents: 3, tick_ms: 5 },
            Duration::from_secs(30),
        ));
        let demo = tokio::spawn(runtime.clone().run(cancel.clone()));

        let screen = RecordingScreen::new(100, 30);
        let (keys, rx) = tokio::sync::mpsc::channel(8);
        let scheduler = Arc::new(s.scheduler);
        let running = {
            let scheduler = scheduler.clone();
            let mut screen = screen.clone();
            tokio::spawn(async move { scheduler.run(&mut screen, rx).await })
        };

        wait_for_state(&s.presenter, |st| st.vitals.tickets_open + st.vitals.tickets_done > 0).await;
        let probe = screen.clone();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !probe.last_frame().is_some_and(|f| f.contains("Planner")) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        keys.send(key('e')).await.unwrap();
        keys.send(key('q')).await.unwrap();
        running.await.unwrap().unwrap();
        cancel.cancel();
        demo.await.unwrap();

        assert!(scheduler.is_shutdown());
        screen.with(|r| {
            assert_eq!(r.restored, 1);
            assert!(r.text.starts_with("vigil: "));
        });
    }
}
