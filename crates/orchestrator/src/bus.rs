//! Live log event bus
//!
//! Fan-out of published [`LogEvent`]s to every current subscriber, in publish
//! order. Publishing never waits on a subscriber: each one may fall at most
//! `capacity` messages behind, after which it receives a single
//! `SubscriberOverflow` error and is disconnected. The broadcast buffer may be
//! larger than `capacity` (tokio rounds it up), so the bound is enforced on
//! the receiving side.

use std::fmt;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use redops_common::{LogEvent, RedopsError, RedopsResult, SessionId, SessionState};

/// What travels on the bus.
#[derive(Debug, Clone)]
pub enum BusMessage {
    Event(LogEvent),
    /// The session reached a terminal state; no events for it follow.
    SessionClosed {
        session_id: SessionId,
        state: SessionState,
    },
}

#[derive(Clone)]
pub struct LogEventBus {
    sender: broadcast::Sender<BusMessage>,
    capacity: usize,
}

impl fmt::Debug for LogEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl LogEventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Deliver an event to all current subscribers. Returns how many there were.
    pub fn publish(&self, event: LogEvent) -> usize {
        self.sender.send(BusMessage::Event(event)).unwrap_or(0)
    }

    pub(crate) fn close_session(&self, session_id: SessionId, state: SessionState) {
        let _ = self
            .sender
            .send(BusMessage::SessionClosed { session_id, state });
    }

    /// Subscribe to everything, or to one session when `session` is set.
    ///
    /// Only messages published after this call are seen, so a session that
    /// closed earlier never ends this stream. `ScanOrchestrator::subscribe`
    /// checks for that case.
    pub fn subscribe(&self, session: Option<SessionId>) -> Subscription {
        Subscription {
            rx: Some(self.sender.subscribe()),
            filter: session,
            outcome: None,
            capacity: self.capacity,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Live, non-restartable sequence of log events.
///
/// A session-scoped subscription ends (`None`) once its session closes;
/// an unscoped one ends only when the bus goes away. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: Option<broadcast::Receiver<BusMessage>>,
    filter: Option<SessionId>,
    outcome: Option<SessionState>,
    capacity: usize,
}

impl Subscription {
    /// Next event, `Some(Err(SubscriberOverflow))` once if this subscriber fell
    /// too far behind, `None` when the stream is over.
    pub async fn next(&mut self) -> Option<RedopsResult<LogEvent>> {
        loop {
            let rx = self.rx.as_mut()?;
            let backlog = rx.len();
            if backlog > self.capacity {
                let skipped = (backlog - self.capacity) as u64;
                warn!(backlog, capacity = self.capacity, "Subscriber fell behind, disconnecting");
                self.rx = None;
                return Some(Err(RedopsError::SubscriberOverflow { skipped }));
            }
            match rx.recv().await {
                Ok(BusMessage::Event(event)) => {
                    if self.filter.map_or(true, |id| id == event.session_id) {
                        return Some(Ok(event));
                    }
                }
                Ok(BusMessage::SessionClosed { session_id, state }) => {
                    if self.filter == Some(session_id) {
                        debug!(session = %session_id, %state, "Subscription finished");
                        self.outcome = Some(state);
                        self.rx = None;
                        return None;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber fell behind, disconnecting");
                    self.rx = None;
                    return Some(Err(RedopsError::SubscriberOverflow { skipped }));
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Terminal state of the watched session, once the stream has ended.
    pub fn outcome(&self) -> Option<SessionState> {
        self.outcome
    }

    pub fn session(&self) -> Option<SessionId> {
        self.filter
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_none()
    }

    /// Scope this subscription to one session. Buffered messages are filtered too.
    pub(crate) fn bind(&mut self, session_id: SessionId) {
        self.filter = Some(session_id);
    }

    /// End the stream now, for a session whose close marker was missed.
    pub(crate) fn finish(&mut self, outcome: Option<SessionState>) {
        self.rx = None;
        self.outcome = outcome;
    }
}
