//! Structural and conversational events dispatched to external observers.

use crate::types::{AgentId, Message, RunState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One structural or conversational event in the delegation tree.
#[derive(Clone, Debug)]
pub enum Event {
    AgentCreated {
        seq: u64,
        agent_id: AgentId,
        parent_id: Option<AgentId>,
        name: String,
        depth: usize,
    },
    AgentDelegated {
        seq: u64,
        parent_id: AgentId,
        child_id: AgentId,
        parent_message_idx: usize,
        child_message_idx: usize,
        instructions: String,
    },
    AgentMessage {
        seq: u64,
        agent_id: AgentId,
        message: Message,
    },
    AgentStateChange {
        seq: u64,
        agent_id: AgentId,
        old: RunState,
        new: RunState,
    },
    ToolCall {
        seq: u64,
        agent_id: AgentId,
        name: String,
        is_error: bool,
    },
}

impl Event {
    pub fn seq(&self) -> u64 {
        match self {
            Event::AgentCreated { seq, .. }
            | Event::AgentDelegated { seq, .. }
            | Event::AgentMessage { seq, .. }
            | Event::AgentStateChange { seq, .. }
            | Event::ToolCall { seq, .. } => *seq,
        }
    }
}

/// A listener callback. Implementors that need to `.await` should do their
/// own work internally and return promptly; the bus fans each listener's
/// delivery out independently so a slow listener cannot stall the others.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: Event);
}

impl<F> EventListener for F
where
    F: Fn(Event) + Send + Sync,
{
    fn on_event(&self, event: Event) {
        (self)(event)
    }
}

/// Delivers events to every registered listener, each on its own ordered
/// queue: dispatch never blocks on a listener's own processing, a
/// panicking/failing listener never prevents delivery to the others, and —
/// unlike a spawn-per-event design — a given listener always observes events
/// in the order they were dispatched, since each listener drains a single
/// FIFO channel fed in dispatch order rather than racing independent tasks.
#[derive(Default)]
pub struct EventBus {
    senders: dashmap::DashMap<u64, tokio::sync::mpsc::UnboundedSender<Event>>,
    next_listener_id: AtomicU64,
    next_seq: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            senders: dashmap::DashMap::new(),
            next_listener_id: AtomicU64::new(0),
            next_seq: AtomicU64::new(0),
        }
    }

    /// The next sequence number to stamp onto an event before dispatch.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a listener, spawning the task that drains its events in
    /// order, and returns a handle that can later be used to remove it.
    pub fn add_listener(&self, listener: Arc<dyn EventListener>) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Event>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                listener.on_event(event);
            }
        });
        self.senders.insert(id, tx);
        id
    }

    pub fn remove_listener(&self, id: u64) {
        self.senders.remove(&id);
    }

    /// Dispatches `event` to every registered listener's queue. The sends
    /// themselves happen in dispatch order, so each listener's drain task
    /// sees events in the order this method was called.
    pub fn dispatch(&self, event: Event) {
        for entry in self.senders.iter() {
            let _ = entry.value().send(event.clone());
        }
    }
}
