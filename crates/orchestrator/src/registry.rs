//! Session registry - per-target ownership slots and session history
//!
//! The registry is the only place that decides whether a target may start a
//! new session. Every slot lives behind one mutex, so two concurrent claims
//! for the same target resolve deterministically: one wins, the other gets
//! `Conflict`.
//!
//! A slot goes through `claim` (reserved, invisible to `active`), `activate`
//! (running), and `release` (moved to history). A start that fails to arm its
//! timers calls `abandon` instead of `activate`.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::debug;
use uuid::Uuid;

use redops_common::{LogEvent, RedopsError, RedopsResult, ScanSession, SessionId};

/// A session together with every event it published.
#[derive(Debug, Clone)]
struct SessionRecord {
    session: ScanSession,
    events: Vec<LogEvent>,
}

#[derive(Debug)]
enum ActiveSlot {
    Claimed(SessionId),
    Live(SessionRecord),
}

#[derive(Debug, Default)]
struct TargetSlot {
    active: Option<ActiveSlot>,
    history: VecDeque<SessionRecord>,
}

impl TargetSlot {
    fn live_mut(&mut self, session_id: SessionId) -> Option<&mut SessionRecord> {
        match self.active.as_mut() {
            Some(ActiveSlot::Live(record)) if record.session.id == session_id => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    slots: HashMap<String, TargetSlot>,
    /// Which target every known session belongs to.
    owners: HashMap<SessionId, String>,
}

impl RegistryState {
    fn slot_of(&mut self, session_id: SessionId) -> Option<&mut TargetSlot> {
        let target = self.owners.get(&session_id)?;
        self.slots.get_mut(target)
    }

    fn retire(&mut self, target_id: &str, record: SessionRecord, limit: usize) {
        let RegistryState { slots, owners } = self;
        let slot = slots.entry(target_id.to_string()).or_default();
        slot.history.push_back(record);
        while slot.history.len() > limit {
            if let Some(evicted) = slot.history.pop_front() {
                owners.remove(&evicted.session.id);
            }
        }
    }
}

#[derive(Debug)]
pub struct SessionRegistry {
    state: Mutex<RegistryState>,
    history_limit: usize,
}

impl SessionRegistry {
    pub fn new(history_limit: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            history_limit: history_limit.max(1),
        }
    }

    /// Atomically reserve the target's slot for a new session.
    pub fn claim(&self, target_id: &str) -> RedopsResult<SessionId> {
        let mut guard = self.state.lock();
        let RegistryState { slots, owners } = &mut *guard;
        let slot = slots.entry(target_id.to_string()).or_default();
        if slot.active.is_some() {
            return Err(RedopsError::Conflict(target_id.to_string()));
        }

        let session_id = Uuid::new_v4();
        slot.active = Some(ActiveSlot::Claimed(session_id));
        owners.insert(session_id, target_id.to_string());
        debug!(target = target_id, session = %session_id, "Slot claimed");
        Ok(session_id)
    }

    /// Turn a claim into a running session.
    pub fn activate(&self, session: &ScanSession) -> RedopsResult<()> {
        let mut guard = self.state.lock();
        let slot = guard
            .slots
            .get_mut(&session.target_id)
            .ok_or_else(|| not_claimed(session.id))?;
        if !matches!(slot.active, Some(ActiveSlot::Claimed(id)) if id == session.id) {
            return Err(not_claimed(session.id));
        }
        slot.active = Some(ActiveSlot::Live(SessionRecord {
            session: session.clone(),
            events: Vec::new(),
        }));
        Ok(())
    }

    /// Drop a claim whose session never became active, keeping it in history.
    pub fn abandon(&self, session: ScanSession, events: Vec<LogEvent>) {
        let mut guard = self.state.lock();
        if let Some(slot) = guard.slots.get_mut(&session.target_id) {
            if matches!(slot.active, Some(ActiveSlot::Claimed(id)) if id == session.id) {
                slot.active = None;
            }
        }
        let target_id = session.target_id.clone();
        guard.retire(&target_id, SessionRecord { session, events }, self.history_limit);
    }

    /// Whether `session` currently holds its target's slot.
    pub fn owns(&self, session: &ScanSession) -> bool {
        let mut guard = self.state.lock();
        guard
            .slots
            .get_mut(&session.target_id)
            .and_then(|slot| slot.live_mut(session.id))
            .is_some()
    }

    /// Store a published event and the session snapshot that produced it.
    pub fn record(&self, session: &ScanSession, event: &LogEvent) -> RedopsResult<()> {
        let mut guard = self.state.lock();
        let record = guard
            .slots
            .get_mut(&session.target_id)
            .and_then(|slot| slot.live_mut(session.id))
            .ok_or_else(|| not_active(session.id))?;
        record.session = session.clone();
        record.events.push(event.clone());
        Ok(())
    }

    /// Refresh the snapshot of a live session.
    pub fn update(&self, session: &ScanSession) -> RedopsResult<()> {
        let mut guard = self.state.lock();
        let record = guard
            .slots
            .get_mut(&session.target_id)
            .and_then(|slot| slot.live_mut(session.id))
            .ok_or_else(|| not_active(session.id))?;
        record.session = session.clone();
        Ok(())
    }

    /// Free the target's slot and move the session into history.
    pub fn release(&self, session_id: SessionId) -> RedopsResult<ScanSession> {
        let mut guard = self.state.lock();
        let slot = guard
            .slot_of(session_id)
            .ok_or_else(|| not_active(session_id))?;
        let record = match slot.active.take() {
            Some(ActiveSlot::Live(record)) if record.session.id == session_id => record,
            other => {
                slot.active = other;
                return Err(not_active(session_id));
            }
        };
        let session = record.session.clone();
        guard.retire(&session.target_id, record, self.history_limit);
        debug!(target = %session.target_id, session = %session_id, state = %session.state, "Slot released");
        Ok(session)
    }

    /// The running session of a target, if any.
    pub fn active(&self, target_id: &str) -> Option<ScanSession> {
        let guard = self.state.lock();
        match guard.slots.get(target_id)?.active.as_ref()? {
            ActiveSlot::Live(record) => Some(record.session.clone()),
            ActiveSlot::Claimed(_) => None,
        }
    }

    /// Retired sessions of a target, oldest first.
    pub fn history(&self, target_id: &str) -> Vec<ScanSession> {
        let guard = self.state.lock();
        guard
            .slots
            .get(target_id)
            .map(|slot| slot.history.iter().map(|r| r.session.clone()).collect())
            .unwrap_or_default()
    }

    /// Events a live or retired session published so far, in order.
    pub fn replay(&self, session_id: SessionId) -> RedopsResult<Vec<LogEvent>> {
        self.with_record(session_id, |record| record.events.clone())
            .ok_or_else(|| RedopsError::NotFound(format!("session {}", session_id)))
    }

    /// Latest snapshot of any live or retired session.
    pub fn find(&self, session_id: SessionId) -> Option<ScanSession> {
        self.with_record(session_id, |record| record.session.clone())
    }

    fn with_record<T>(
        &self,
        session_id: SessionId,
        f: impl FnOnce(&SessionRecord) -> T,
    ) -> Option<T> {
        let mut guard = self.state.lock();
        let slot = guard.slot_of(session_id)?;
        if let Some(ActiveSlot::Live(record)) = slot.active.as_ref() {
            if record.session.id == session_id {
                return Some(f(record));
            }
        }
        slot.history
            .iter()
            .find(|r| r.session.id == session_id)
            .map(f)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(20)
    }
}

fn not_claimed(session_id: SessionId) -> RedopsError {
    RedopsError::NotFound(format!("no claim held by session {}", session_id))
}

fn not_active(session_id: SessionId) -> RedopsError {
    RedopsError::NotFound(format!("session {} is not active", session_id))
}
