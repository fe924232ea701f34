//! Document state flags and their change channel
//!
//! The state is a small set of independently settable flags. The empty set
//! is the normal state of an open, editable document.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DocumentState(u8);

impl DocumentState {
    pub const NORMAL: DocumentState = DocumentState(0);
    pub const CLOSED: DocumentState = DocumentState(1 << 0);
    pub const IN_CONFLICT: DocumentState = DocumentState(1 << 1);
    pub const SAVING_ERROR: DocumentState = DocumentState(1 << 2);
    pub const EDITING_DISABLED: DocumentState = DocumentState(1 << 3);
    pub const PROGRESS_AVAILABLE: DocumentState = DocumentState(1 << 4);

    const NAMED: [(DocumentState, &'static str); 5] = [
        (Self::CLOSED, "closed"),
        (Self::IN_CONFLICT, "inConflict"),
        (Self::SAVING_ERROR, "savingError"),
        (Self::EDITING_DISABLED, "editingDisabled"),
        (Self::PROGRESS_AVAILABLE, "progressAvailable"),
    ];

    pub fn is_normal(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: DocumentState) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: DocumentState) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: DocumentState) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: DocumentState, enabled: bool) {
        if enabled {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for DocumentState {
    type Output = DocumentState;

    fn bitor(self, rhs: Self) -> Self::Output {
        DocumentState(self.0 | rhs.0)
    }
}

impl BitOrAssign for DocumentState {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_normal() {
            return write!(f, "[normal]");
        }
        let names: Vec<&str> = Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Publishes every state transition to subscribed receivers.
///
/// Dropping a receiver unsubscribes it.
#[derive(Debug)]
pub struct StatePublisher {
    sender: watch::Sender<DocumentState>,
}

impl StatePublisher {
    pub fn new(initial: DocumentState) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub fn current(&self) -> DocumentState {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DocumentState> {
        self.sender.subscribe()
    }

    /// Apply `change` and notify subscribers. Returns the new state.
    pub fn update(&self, change: impl FnOnce(&mut DocumentState)) -> DocumentState {
        self.sender.send_modify(|state| {
            let before = *state;
            change(state);
            let after = *state;
            if after != before {
                tracing::info!(from = %before, to = %after, "document state changed");
            }
        });
        self.current()
    }
}
