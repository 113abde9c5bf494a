//! Orchestrator - scan sessions, stage timers and the live event bus
//!
//! A [`ScanOrchestrator`] runs at most one session per target. Each session
//! replays a [`PipelineDefinition`](redops_pipeline::PipelineDefinition)
//! against its target, publishing one [`LogEvent`](redops_common::LogEvent)
//! per stage on the [`LogEventBus`] and keeping a replayable copy in the
//! [`SessionRegistry`].

mod bus;
mod config;
mod orchestrator;
mod progress;
mod registry;
mod scheduler;

pub use bus::{BusMessage, LogEventBus, Subscription};
pub use config::OrchestratorConfig;
pub use orchestrator::{OrchestratorBuilder, ScanOrchestrator, SYSTEM_TOOL};
pub use progress::ProgressTracker;
pub use registry::SessionRegistry;
pub use scheduler::{StageHandle, StageScheduler, StageTask, TokioScheduler};

#[cfg(test)]
mod tests {
    use super::*;
    use redops_catalog::TargetCatalog;
    use redops_common::{
        LogEvent, PipelineStage, RedopsError, RedopsResult, SessionState, Severity,
        TargetStatus, TargetStore,
    };
    use redops_pipeline::PipelineDefinition;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn short_pipeline() -> PipelineDefinition {
        PipelineDefinition::new(vec![
            PipelineStage::new("dnsx", "Resolving {target}", ms(100)),
            PipelineStage::new("httpx", "Probing {target}", ms(200))
                .with_severity(Severity::Warning),
            PipelineStage::new("system", "Pipeline completed successfully.", ms(300))
                .with_severity(Severity::Success)
                .terminal(),
        ])
        .unwrap()
    }

    fn setup(
        pipeline: PipelineDefinition,
        config: OrchestratorConfig,
    ) -> (ScanOrchestrator, Arc<TargetCatalog>) {
        let catalog = Arc::new(TargetCatalog::demo());
        let store: Arc<dyn TargetStore> = catalog.clone();
        let orch = ScanOrchestrator::builder(pipeline, store)
            .config(config)
            .build();
        (orch, catalog)
    }

    async fn drain(sub: &mut Subscription) -> Vec<LogEvent> {
        let mut events = Vec::new();
        while let Some(event) = sub.next().await {
            events.push(event.unwrap());
        }
        events
    }

    struct RefusingScheduler;

    impl StageScheduler for RefusingScheduler {
        fn schedule(&self, _fire_at: Instant, _task: StageTask) -> RedopsResult<StageHandle> {
            Err(RedopsError::Scheduling("timer facility offline".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_and_publishes_in_order() {
        let (orch, catalog) = setup(short_pipeline(), OrchestratorConfig::default());
        let origin = Instant::now();
        let (id, mut sub) = orch.start_watched("1").unwrap();
        assert!(orch.registry().active("1").is_some());
        assert_eq!(catalog.get("1").unwrap().status, TargetStatus::Scanning);

        let events = drain(&mut sub).await;
        assert_eq!(sub.outcome(), Some(SessionState::Completed));
        assert_eq!(origin.elapsed(), ms(300));

        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(events[0].tool, "dnsx");
        assert_eq!(events[0].message, "Resolving corp-internal.demo.com");
        assert_eq!(events[0].severity, Severity::Info);
        assert_eq!(events[1].severity, Severity::Warning);
        assert_eq!(events[2].severity, Severity::Success);

        let session = orch.session(id).unwrap();
        assert_eq!(session.state, SessionState::Completed);
        assert!(session.finished_at.is_some());
        assert!(orch.registry().active("1").is_none());
        assert_eq!(orch.registry().replay(id).unwrap(), events);
        assert_eq!(catalog.get("1").unwrap().status, TargetStatus::Completed);
        assert_eq!(orch.running_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn jittered_sessions_keep_declaration_order() {
        let config = OrchestratorConfig {
            stage_jitter_ms: 2_000,
            ..Default::default()
        };
        let (orch, _) = setup(PipelineDefinition::recon_default(), config);
        let expected: Vec<String> = orch
            .pipeline()
            .stages()
            .iter()
            .map(|s| s.tool.clone())
            .collect();

        let (_, mut a) = orch.start_watched("1").unwrap();
        let (_, mut b) = orch.start_watched("2").unwrap();
        let (_, mut c) = orch.start_watched("3").unwrap();
        let (a, b, c) = tokio::join!(drain(&mut a), drain(&mut b), drain(&mut c));

        for events in [a, b, c] {
            let tools: Vec<String> = events.iter().map(|e| e.tool.clone()).collect();
            assert_eq!(tools, expected);
            assert!(events.iter().zip(1..).all(|(e, seq)| e.sequence == seq));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_on_busy_target_conflicts() {
        let (orch, _) = setup(short_pipeline(), OrchestratorConfig::default());
        let mut watcher = orch.subscribe(None);
        let first = orch.start("1").unwrap();

        match orch.start("1") {
            Err(RedopsError::Conflict(target)) => assert_eq!(target, "1"),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(orch.registry().active("1").unwrap().id, first);

        let mut seen = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(1), watcher.next()).await
        {
            seen.push(event.unwrap());
        }
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|e| e.session_id == first));

        // other targets are unaffected
        assert!(orch.start("2").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribing_to_a_finished_session_ends_at_once() {
        let (orch, _) = setup(
            PipelineDefinition::recon_default(),
            OrchestratorConfig::default(),
        );
        let (id, mut sub) = orch.start_watched("1").unwrap();
        drain(&mut sub).await;

        let mut late = orch.subscribe(Some(id));
        let next = tokio::time::timeout(Duration::from_secs(3600), late.next()).await;
        assert!(matches!(next, Ok(None)));
        assert_eq!(late.outcome(), Some(SessionState::Completed));

        let mut unknown = orch.subscribe(Some(uuid::Uuid::new_v4()));
        let next = tokio::time::timeout(Duration::from_secs(3600), unknown.next()).await;
        assert!(matches!(next, Ok(None)));
        assert_eq!(unknown.outcome(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_after_plain_start_sees_the_close() {
        let instant = PipelineDefinition::new(vec![
            PipelineStage::new("system", "done", Duration::ZERO).terminal(),
        ])
        .unwrap();
        let (orch, _) = setup(instant, OrchestratorConfig::default());
        let id = orch.start("1").unwrap();
        tokio::time::sleep(ms(10)).await;
        assert_eq!(orch.session(id).unwrap().state, SessionState::Completed);

        let mut sub = orch.subscribe(Some(id));
        assert!(sub.next().await.is_none());
        assert_eq!(sub.outcome(), Some(SessionState::Completed));

        // a session still running is followed to its end
        let (orch, _) = setup(short_pipeline(), OrchestratorConfig::default());
        let id = orch.start("2").unwrap();
        let mut sub = orch.subscribe(Some(id));
        assert_eq!(drain(&mut sub).await.len(), 3);
        assert_eq!(sub.outcome(), Some(SessionState::Completed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_have_one_winner() {
        let (orch, _) = setup(
            PipelineDefinition::recon_default(),
            OrchestratorConfig::default(),
        );
        let orch = Arc::new(orch);

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let orch = orch.clone();
                tokio::spawn(async move { orch.start("3") })
            })
            .collect();

        let mut winners = Vec::new();
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(id) => winners.push(id),
                Err(RedopsError::Conflict(_)) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(orch.registry().active("3").unwrap().id, winners[0]);
        assert_eq!(orch.cancel(winners[0]).unwrap(), SessionState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_further_events() {
        let (orch, catalog) = setup(short_pipeline(), OrchestratorConfig::default());
        let (id, mut sub) = orch.start_watched("2").unwrap();

        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.sequence, 1);
        let mut watcher = orch.subscribe(None);

        assert_eq!(orch.cancel(id).unwrap(), SessionState::Cancelled);
        assert_eq!(orch.cancel(id).unwrap(), SessionState::Cancelled);
        assert!(sub.next().await.is_none());
        assert_eq!(sub.outcome(), Some(SessionState::Cancelled));

        let late = tokio::time::timeout(Duration::from_secs(5), watcher.next()).await;
        assert!(late.is_err(), "no event may follow a cancel");

        let session = orch.session(id).unwrap();
        assert!(session.cancel_requested);
        assert_eq!(orch.registry().replay(id).unwrap(), vec![first]);
        assert!(orch.registry().active("2").is_none());
        assert_eq!(catalog.get("2").unwrap().status, TargetStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_completion_is_a_no_op() {
        let (orch, _) = setup(short_pipeline(), OrchestratorConfig::default());
        let (id, mut sub) = orch.start_watched("1").unwrap();
        drain(&mut sub).await;

        assert_eq!(orch.cancel(id).unwrap(), SessionState::Completed);
        assert!(!orch.session(id).unwrap().cancel_requested);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_subscriber_overflows_without_stalling_the_session() {
        let pipeline = PipelineDefinition::new(vec![
            PipelineStage::new("dnsx", "a", ms(100)),
            PipelineStage::new("subfinder", "b", ms(200)),
            PipelineStage::new("httpx", "c", ms(300)),
            PipelineStage::new("nmap", "d", ms(400)),
            PipelineStage::new("system", "e", ms(500)).terminal(),
        ])
        .unwrap();
        let config = OrchestratorConfig {
            bus_capacity: 2,
            ..Default::default()
        };
        let (orch, _) = setup(pipeline, config);
        let mut slow = orch.subscribe(None);

        let (id, mut fast) = orch.start_watched("1").unwrap();
        let fast_events = drain(&mut fast).await;
        assert_eq!(fast_events.len(), 5);
        assert_eq!(fast.outcome(), Some(SessionState::Completed));

        assert!(matches!(
            slow.next().await,
            Some(Err(RedopsError::SubscriberOverflow { .. }))
        ));
        assert!(slow.next().await.is_none());
        assert_eq!(orch.session(id).unwrap().state, SessionState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn unarmed_session_fails_with_one_error_event() {
        let catalog = Arc::new(TargetCatalog::demo());
        let store: Arc<dyn TargetStore> = catalog.clone();
        let orch = ScanOrchestrator::builder(short_pipeline(), store)
            .scheduler(Arc::new(RefusingScheduler))
            .build();
        let mut watcher = orch.subscribe(None);

        assert!(matches!(orch.start("1"), Err(RedopsError::Scheduling(_))));
        assert!(orch.registry().active("1").is_none());

        let event = watcher.next().await.unwrap().unwrap();
        assert_eq!(event.sequence, 1);
        assert_eq!(event.tool, SYSTEM_TOOL);
        assert_eq!(event.severity, Severity::Error);

        let history = orch.registry().history("1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, SessionState::Failed);
        assert_eq!(history[0].id, event.session_id);
        assert_eq!(orch.registry().replay(event.session_id).unwrap(), vec![event]);
        assert_eq!(catalog.get("1").unwrap().status, TargetStatus::Error);

        // the slot is free again
        assert!(matches!(orch.start("1"), Err(RedopsError::Scheduling(_))));
        assert_eq!(orch.registry().history("1").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn partially_armed_session_publishes_no_stage() {
        let config = OrchestratorConfig {
            max_armed_timers: Some(3),
            ..Default::default()
        };
        let (orch, _) = setup(PipelineDefinition::recon_default(), config);
        let mut watcher = orch.subscribe(None);

        assert!(matches!(orch.start("3"), Err(RedopsError::Scheduling(_))));
        let event = watcher.next().await.unwrap().unwrap();
        assert_eq!(event.severity, Severity::Error);

        let later = tokio::time::timeout(Duration::from_secs(20), watcher.next()).await;
        assert!(later.is_err());
        assert_eq!(orch.running_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_ids_are_not_found() {
        let (orch, _) = setup(short_pipeline(), OrchestratorConfig::default());
        assert!(matches!(orch.start("99"), Err(RedopsError::NotFound(_))));
        assert!(matches!(
            orch.cancel(uuid::Uuid::new_v4()),
            Err(RedopsError::NotFound(_))
        ));
        assert!(orch.registry().history("99").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn target_can_be_rescanned_after_completion() {
        let (orch, _) = setup(short_pipeline(), OrchestratorConfig::default());
        let (first, mut sub) = orch.start_watched("1").unwrap();
        drain(&mut sub).await;

        let (second, mut sub) = orch.start_watched("1").unwrap();
        assert_ne!(first, second);
        let events = drain(&mut sub).await;
        assert_eq!(events.first().map(|e| e.sequence), Some(1));

        let history = orch.registry().history("1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first);
        assert_eq!(history[1].id, second);
    }

    #[tokio::test(start_paused = true)]
    async fn stages_after_terminal_never_fire() {
        let pipeline = PipelineDefinition::new(vec![
            PipelineStage::new("dnsx", "resolve", ms(100)),
            PipelineStage::new("system", "done", ms(200)).terminal(),
            PipelineStage::new("nuclei", "too late", ms(300)),
        ])
        .unwrap();
        let (orch, _) = setup(pipeline, OrchestratorConfig::default());
        let (id, mut sub) = orch.start_watched("1").unwrap();

        let events = drain(&mut sub).await;
        assert_eq!(events.len(), 2);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(orch.registry().replay(id).unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_offset_stages_are_seen_by_watchers() {
        let pipeline = PipelineDefinition::new(vec![
            PipelineStage::new("dnsx", "immediate", Duration::ZERO),
            PipelineStage::new("system", "done", Duration::ZERO).terminal(),
        ])
        .unwrap();
        let (orch, _) = setup(pipeline, OrchestratorConfig::default());
        let (_, mut sub) = orch.start_watched("1").unwrap();

        let events = drain(&mut sub).await;
        let tools: Vec<&str> = events.iter().map(|e| e.tool.as_str()).collect();
        assert_eq!(tools, vec!["dnsx", "system"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_running_sessions() {
        let (orch, _) = setup(short_pipeline(), OrchestratorConfig::default());
        let a = orch.start("1").unwrap();
        let b = orch.start("2").unwrap();
        assert_eq!(orch.running_sessions(), 2);

        orch.shutdown();
        assert_eq!(orch.running_sessions(), 0);
        assert_eq!(orch.session(a).unwrap().state, SessionState::Cancelled);
        assert_eq!(orch.session(b).unwrap().state, SessionState::Cancelled);
    }
}
