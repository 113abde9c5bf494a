// crates/orchestrator/src/orchestrator.rs
//! Scan orchestrator - session lifecycle, stage timers and ordered dispatch
//!
//! Every stage of a session gets its own timer, but timers never publish.
//! They report "stage i is due" to the session's single dispatcher, which
//! publishes strictly in declaration order. Publishing, completion and
//! cancellation all happen under the session's lock, so a cancel either
//! lands before a publish or waits for it to finish.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use redops_common::{
    LogEvent, RedopsError, RedopsResult, ScanSession, SessionId, SessionState, Severity,
    TargetStatus, TargetStore,
};
use redops_pipeline::{PipelineDefinition, SeverityClassifier};

use crate::bus::{LogEventBus, Subscription};
use crate::config::OrchestratorConfig;
use crate::registry::SessionRegistry;
use crate::scheduler::{StageHandle, StageScheduler, StageTask, TokioScheduler};

/// Tool name used for events the orchestrator emits itself.
pub const SYSTEM_TOOL: &str = "system";

/// Mutable per-session state. Never shared across sessions.
struct SessionCore {
    session: ScanSession,
    domain: String,
    /// Dispatcher first, then one handle per armed stage.
    handles: Vec<StageHandle>,
}

struct LiveSession {
    core: Mutex<SessionCore>,
}

/// State shared by the orchestrator and the dispatchers it spawns.
struct Shared {
    pipeline: PipelineDefinition,
    classifier: SeverityClassifier,
    registry: SessionRegistry,
    bus: LogEventBus,
    targets: Arc<dyn TargetStore>,
    live: Mutex<HashMap<SessionId, Arc<LiveSession>>>,
}

/// Orchestrator drives simulated recon pipelines and streams their progress.
pub struct ScanOrchestrator {
    shared: Arc<Shared>,
    scheduler: Arc<dyn StageScheduler>,
}

/// Builder for [`ScanOrchestrator`].
pub struct OrchestratorBuilder {
    pipeline: PipelineDefinition,
    targets: Arc<dyn TargetStore>,
    config: OrchestratorConfig,
    classifier: SeverityClassifier,
    scheduler: Option<Arc<dyn StageScheduler>>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn classifier(mut self, classifier: SeverityClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the timer facility derived from the config.
    pub fn scheduler(mut self, scheduler: Arc<dyn StageScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> ScanOrchestrator {
        let config = self.config;
        let scheduler = self.scheduler.unwrap_or_else(|| {
            let mut scheduler = TokioScheduler::new().with_jitter(config.stage_jitter());
            if let Some(capacity) = config.max_armed_timers {
                scheduler = scheduler.with_capacity(capacity);
            }
            Arc::new(scheduler)
        });

        ScanOrchestrator {
            shared: Arc::new(Shared {
                pipeline: self.pipeline,
                classifier: self.classifier,
                registry: SessionRegistry::new(config.history_limit),
                bus: LogEventBus::new(config.bus_capacity),
                targets: self.targets,
                live: Mutex::new(HashMap::new()),
            }),
            scheduler,
        }
    }
}

impl ScanOrchestrator {
    pub fn builder(
        pipeline: PipelineDefinition,
        targets: Arc<dyn TargetStore>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder {
            pipeline,
            targets,
            config: OrchestratorConfig::default(),
            classifier: SeverityClassifier::default(),
            scheduler: None,
        }
    }

    /// Orchestrator with default config and a tokio-backed scheduler.
    pub fn new(pipeline: PipelineDefinition, targets: Arc<dyn TargetStore>) -> Self {
        Self::builder(pipeline, targets).build()
    }

    /// Start a session for `target_id` and return without waiting for it.
    ///
    /// Fails with `NotFound` for unknown targets, `Conflict` when the target
    /// already has a session, and `Scheduling` when the timers cannot be
    /// armed (in which case no session ever becomes active).
    #[instrument(skip(self))]
    pub fn start(&self, target_id: &str) -> RedopsResult<SessionId> {
        let shared = &self.shared;
        let target = shared
            .targets
            .get(target_id)
            .ok_or_else(|| RedopsError::NotFound(format!("target '{}'", target_id)))?;
        let session_id = shared.registry.claim(&target.id)?;

        let live = Arc::new(LiveSession {
            core: Mutex::new(SessionCore {
                session: ScanSession::new(session_id, target.id.clone()),
                domain: target.domain.clone(),
                handles: Vec::new(),
            }),
        });

        // Dispatchers block on this lock, so nothing publishes before activation.
        let mut core = live.core.lock();
        let handles = match self.arm(&live, Instant::now()) {
            Ok(handles) => handles,
            Err(err) => return Err(shared.fail_unarmed(&mut core, err)),
        };
        core.handles = handles;
        if let Err(err) = core.session.transition(SessionState::Running) {
            return Err(shared.fail_unarmed(&mut core, err));
        }
        if let Err(err) = shared.registry.activate(&core.session) {
            return Err(shared.fail_unarmed(&mut core, err));
        }
        shared.live.lock().insert(session_id, live.clone());
        shared.targets.set_status(
            &target.id,
            TargetStatus::Scanning,
            Some(core.session.started_at),
        );

        info!(
            session = %session_id,
            target = %target.domain,
            stages = shared.pipeline.reachable_stages().len(),
            "Session started"
        );
        Ok(session_id)
    }

    /// Like [`start`](Self::start), but also returns a subscription scoped to
    /// the new session that is attached before any timer is armed.
    pub fn start_watched(&self, target_id: &str) -> RedopsResult<(SessionId, Subscription)> {
        let mut subscription = self.shared.bus.subscribe(None);
        let session_id = self.start(target_id)?;
        subscription.bind(session_id);
        Ok((session_id, subscription))
    }

    /// Request cancellation and return the session's resulting state.
    ///
    /// Running sessions become Cancelled; an in-flight publish completes
    /// first. Calling this on a finished session changes nothing.
    #[instrument(skip(self))]
    pub fn cancel(&self, session_id: SessionId) -> RedopsResult<SessionState> {
        let live = self.shared.live.lock().get(&session_id).cloned();
        if let Some(live) = live {
            let mut core = live.core.lock();
            if core.session.is_running() {
                self.shared.retire(&mut core, SessionState::Cancelled);
            }
            return Ok(core.session.state);
        }

        self.shared
            .registry
            .find(session_id)
            .map(|session| session.state)
            .ok_or_else(|| RedopsError::NotFound(format!("session {}", session_id)))
    }

    /// Cancel every running session.
    pub fn shutdown(&self) {
        let live: Vec<SessionId> = self.shared.live.lock().keys().copied().collect();
        for session_id in live {
            if let Err(err) = self.cancel(session_id) {
                debug!(session = %session_id, "Skipping shutdown cancel: {}", err);
            }
        }
    }

    /// Subscribe to the live event stream, optionally for one session.
    ///
    /// A subscription to a session that already finished, or that was never
    /// started, comes back closed; its `outcome` is the terminal state if known.
    pub fn subscribe(&self, session: Option<SessionId>) -> Subscription {
        // attach before looking, so a close marker sent in between is not lost
        let mut subscription = self.shared.bus.subscribe(session);
        if let Some(session_id) = session {
            match self.shared.registry.find(session_id) {
                Some(found) if found.state.is_terminal() => {
                    subscription.finish(Some(found.state))
                }
                Some(_) => {}
                None => subscription.finish(None),
            }
        }
        subscription
    }

    /// Latest snapshot of a live or retired session.
    pub fn session(&self, session_id: SessionId) -> Option<ScanSession> {
        self.shared.registry.find(session_id)
    }

    pub fn running_sessions(&self) -> usize {
        self.shared.live.lock().len()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.shared.registry
    }

    pub fn bus(&self) -> &LogEventBus {
        &self.shared.bus
    }

    pub fn pipeline(&self) -> &PipelineDefinition {
        &self.shared.pipeline
    }

    /// Arm the dispatcher and one timer per reachable stage. All or nothing.
    fn arm(&self, live: &Arc<LiveSession>, origin: Instant) -> RedopsResult<Vec<StageHandle>> {
        let stages = self.shared.pipeline.reachable_stages();
        let (fired_tx, fired_rx) = mpsc::unbounded_channel::<usize>();
        let mut handles = Vec::with_capacity(stages.len() + 1);

        let dispatcher: StageTask = Box::pin(dispatch(self.shared.clone(), live.clone(), fired_rx));
        handles.push(self.scheduler.schedule(origin, dispatcher)?);

        for (index, stage) in stages.iter().enumerate() {
            let fired = fired_tx.clone();
            let task: StageTask = Box::pin(async move {
                let _ = fired.send(index);
            });
            match self.scheduler.schedule(origin + stage.offset, task) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    for handle in &handles {
                        handle.revoke();
                    }
                    return Err(err);
                }
            }
        }
        Ok(handles)
    }
}

impl Drop for ScanOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    /// Publish stage `index` if the session still runs. Returns whether
    /// dispatch should continue.
    fn fire(&self, live: &LiveSession, index: usize) -> bool {
        let mut core = live.core.lock();
        if !core.session.is_running() {
            debug!(session = %core.session.id, index, "Dropping stage for finished session");
            return false;
        }
        if !self.registry.owns(&core.session) {
            warn!(session = %core.session.id, "Session lost its slot, stopping dispatch");
            return false;
        }

        let stage = &self.pipeline.reachable_stages()[index];
        let severity = self.classifier.classify(stage);
        let sequence = core.session.take_sequence();
        let event = LogEvent::new(
            core.session.id,
            sequence,
            stage.tool.clone(),
            stage.render(&core.domain),
            severity,
        );
        if let Err(err) = self.registry.record(&core.session, &event) {
            warn!(session = %core.session.id, "Could not record event: {}", err);
            return false;
        }
        debug!(session = %core.session.id, sequence, tool = %stage.tool, %severity, "Stage fired");
        self.bus.publish(event);

        if stage.terminal {
            self.retire(&mut core, SessionState::Completed);
            return false;
        }
        true
    }

    /// Move a running session into a terminal state and release its slot.
    fn retire(&self, core: &mut SessionCore, state: SessionState) {
        if let Err(err) = core.session.transition(state) {
            warn!("{}", err);
            return;
        }
        for handle in core.handles.drain(..) {
            handle.revoke();
        }

        let session_id = core.session.id;
        if let Err(err) = self.registry.update(&core.session) {
            warn!(session = %session_id, "Could not update session: {}", err);
        }
        if let Err(err) = self.registry.release(session_id) {
            warn!(session = %session_id, "Could not release slot: {}", err);
        }
        self.targets.set_status(
            &core.session.target_id,
            TargetStatus::for_session(state),
            None,
        );
        self.live.lock().remove(&session_id);
        self.bus.close_session(session_id, state);

        info!(
            session = %session_id,
            %state,
            events = core.session.events_published(),
            "Session finished"
        );
    }

    /// Record a start that never became active: one ERROR event, Failed
    /// history entry, claim dropped.
    fn fail_unarmed(&self, core: &mut SessionCore, err: RedopsError) -> RedopsError {
        for handle in core.handles.drain(..) {
            handle.revoke();
        }
        if let Err(transition) = core.session.transition(SessionState::Failed) {
            warn!("{}", transition);
        }

        let session_id = core.session.id;
        let sequence = core.session.take_sequence();
        let event = LogEvent::new(
            session_id,
            sequence,
            SYSTEM_TOOL,
            format!("Pipeline could not be started: {}", err),
            Severity::Error,
        );
        self.registry
            .abandon(core.session.clone(), vec![event.clone()]);
        self.targets
            .set_status(&core.session.target_id, TargetStatus::Error, None);
        self.bus.publish(event);
        self.bus.close_session(session_id, SessionState::Failed);

        warn!(session = %session_id, target = %core.session.target_id, "Session failed to start: {}", err);
        err
    }
}

/// Single writer for one session: buffers fired stages and publishes them in
/// declaration order.
async fn dispatch(
    shared: Arc<Shared>,
    live: Arc<LiveSession>,
    mut fired: mpsc::UnboundedReceiver<usize>,
) {
    let total = shared.pipeline.reachable_stages().len();
    let mut ready = vec![false; total];
    let mut next = 0;

    while let Some(index) = fired.recv().await {
        ready[index] = true;
        while next < total && ready[next] {
            if !shared.fire(&live, next) {
                return;
            }
            next += 1;
        }
    }
}
