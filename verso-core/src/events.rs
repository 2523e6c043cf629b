//! Repository lifecycle notifications
//!
//! Observers subscribe to a specific [`EventKind`] with a callback or a
//! channel. Every successful mutating operation on the repository dispatches
//! a [`RepositoryEvent`] to the subscribers of its kind, in subscription
//! order.
//!
//! # Example
//!
//! ```rust,ignore
//! use verso_core::events::{EventKind, RepositoryEvent};
//!
//! let handle = repo.subscribe(EventKind::CommitCreated, |event| {
//!     if let RepositoryEvent::CommitCreated { commit } = event {
//!         println!("new commit {}", commit.id);
//!     }
//! });
//!
//! repo.unsubscribe(&handle);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::versioning::{Branch, Commit, MergeRequest};

/// Names of the notifications the repository emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    RepositoryInitialized,
    FilesStaged,
    FilesUnstaged,
    CommitCreated,
    BranchCreated,
    BranchSwitched,
    BranchesMerged,
    MergeRequestCreated,
    MergeRequestUpdated,
}

impl EventKind {
    /// Every event kind, in emission-pipeline order
    pub const ALL: [EventKind; 9] = [
        EventKind::RepositoryInitialized,
        EventKind::FilesStaged,
        EventKind::FilesUnstaged,
        EventKind::CommitCreated,
        EventKind::BranchCreated,
        EventKind::BranchSwitched,
        EventKind::BranchesMerged,
        EventKind::MergeRequestCreated,
        EventKind::MergeRequestUpdated,
    ];

    /// Wire name of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RepositoryInitialized => "repository-initialized",
            EventKind::FilesStaged => "files-staged",
            EventKind::FilesUnstaged => "files-unstaged",
            EventKind::CommitCreated => "commit-created",
            EventKind::BranchCreated => "branch-created",
            EventKind::BranchSwitched => "branch-switched",
            EventKind::BranchesMerged => "branches-merged",
            EventKind::MergeRequestCreated => "merge-request-created",
            EventKind::MergeRequestUpdated => "merge-request-updated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification emitted after a repository operation succeeds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RepositoryEvent {
    /// Root commit created by `initialize`
    RepositoryInitialized {
        repository_id: String,
        commit_id: String,
    },

    /// Paths copied into (or staged for deletion in) the staging area
    FilesStaged { paths: Vec<String> },

    /// Paths removed from the staging area
    FilesUnstaged { paths: Vec<String> },

    /// A commit was appended to the current branch
    CommitCreated { commit: Commit },

    /// A branch was created
    BranchCreated { branch: Branch },

    /// The current branch changed
    BranchSwitched {
        branch_name: String,
        commit_id: Option<String>,
    },

    /// A merge commit advanced the target branch
    BranchesMerged {
        source_branch: String,
        target_branch: String,
        merge_commit_id: String,
    },

    /// A merge request was recorded
    MergeRequestCreated { merge_request: MergeRequest },

    /// A merge request changed status
    MergeRequestUpdated { merge_request: MergeRequest },
}

impl RepositoryEvent {
    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            RepositoryEvent::RepositoryInitialized { .. } => EventKind::RepositoryInitialized,
            RepositoryEvent::FilesStaged { .. } => EventKind::FilesStaged,
            RepositoryEvent::FilesUnstaged { .. } => EventKind::FilesUnstaged,
            RepositoryEvent::CommitCreated { .. } => EventKind::CommitCreated,
            RepositoryEvent::BranchCreated { .. } => EventKind::BranchCreated,
            RepositoryEvent::BranchSwitched { .. } => EventKind::BranchSwitched,
            RepositoryEvent::BranchesMerged { .. } => EventKind::BranchesMerged,
            RepositoryEvent::MergeRequestCreated { .. } => EventKind::MergeRequestCreated,
            RepositoryEvent::MergeRequestUpdated { .. } => EventKind::MergeRequestUpdated,
        }
    }
}

/// Callback invoked for each dispatched event
pub type EventHandler = Arc<dyn Fn(&RepositoryEvent) + Send + Sync>;

/// Handle to a subscription (used to unsubscribe)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: Uuid,
    kind: EventKind,
}

impl SubscriptionHandle {
    /// Get the subscription ID
    pub fn id(&self) -> &Uuid {
        &self.id
    }

    /// Get the subscribed event kind
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

enum Subscriber {
    Callback(EventHandler),
    Channel(mpsc::Sender<RepositoryEvent>),
}

/// Registry of event subscribers keyed by event kind
pub struct EventBus {
    subscribers: HashMap<EventKind, Vec<(Uuid, Subscriber)>>,
    channel_buffer: usize,
}

impl EventBus {
    /// Create an empty bus; channel subscriptions get `channel_buffer` capacity
    pub fn new(channel_buffer: usize) -> Self {
        Self {
            subscribers: HashMap::new(),
            channel_buffer: channel_buffer.max(1),
        }
    }

    /// Register a callback for one event kind
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionHandle
    where
        F: Fn(&RepositoryEvent) + Send + Sync + 'static,
    {
        self.insert(kind, Subscriber::Callback(Arc::new(handler)))
    }

    /// Register a bounded channel for one event kind
    ///
    /// Events that do not fit in the buffer are dropped with a warning; the
    /// subscription is removed once the receiver is dropped.
    pub fn subscribe_channel(
        &mut self,
        kind: EventKind,
    ) -> (SubscriptionHandle, mpsc::Receiver<RepositoryEvent>) {
        let (tx, rx) = mpsc::channel(self.channel_buffer);
        (self.insert(kind, Subscriber::Channel(tx)), rx)
    }

    fn insert(&mut self, kind: EventKind, subscriber: Subscriber) -> SubscriptionHandle {
        let id = Uuid::new_v4();
        self.subscribers
            .entry(kind)
            .or_default()
            .push((id, subscriber));
        tracing::debug!(event = %kind, subscription = %id, "Subscriber registered");
        SubscriptionHandle { id, kind }
    }

    /// Remove a subscription, returns true if it existed
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> bool {
        let Some(list) = self.subscribers.get_mut(&handle.kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != handle.id);
        before != list.len()
    }

    /// Remove every subscription
    pub fn unsubscribe_all(&mut self) {
        self.subscribers.clear();
    }

    /// Number of live subscriptions for a kind
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map_or(0, Vec::len)
    }

    /// Dispatch an event to the subscribers of its kind
    pub fn emit(&mut self, event: RepositoryEvent) {
        let kind = event.kind();
        tracing::debug!(event = %kind, "Dispatching repository event");

        let Some(list) = self.subscribers.get_mut(&kind) else {
            return;
        };

        list.retain(|(id, subscriber)| match subscriber {
            Subscriber::Callback(handler) => {
                handler(&event);
                true
            }
            Subscriber::Channel(tx) => match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(event = %kind, subscription = %id, "Event channel full, dropping event");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn staged(paths: &[&str]) -> RepositoryEvent {
        RepositoryEvent::FilesStaged {
            paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_callback_receives_matching_kind_only() {
        let mut bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        bus.subscribe(EventKind::FilesStaged, move |event| {
            seen_clone.lock().unwrap().push(event.kind());
        });

        bus.emit(staged(&["a.sol"]));
        bus.emit(RepositoryEvent::FilesUnstaged { paths: vec![] });

        assert_eq!(*seen.lock().unwrap(), vec![EventKind::FilesStaged]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::default();
        let handle = bus.subscribe(EventKind::FilesStaged, |_| {});
        assert_eq!(bus.subscriber_count(EventKind::FilesStaged), 1);

        assert!(bus.unsubscribe(&handle));
        assert!(!bus.unsubscribe(&handle));
        assert_eq!(bus.subscriber_count(EventKind::FilesStaged), 0);
    }

    #[test]
    fn test_unsubscribe_all() {
        let mut bus = EventBus::default();
        bus.subscribe(EventKind::FilesStaged, |_| {});
        bus.subscribe(EventKind::CommitCreated, |_| {});
        bus.unsubscribe_all();

        for kind in EventKind::ALL {
            assert_eq!(bus.subscriber_count(kind), 0);
        }
    }

    #[test]
    fn test_channel_subscription() {
        let mut bus = EventBus::new(1);
        let (_handle, mut rx) = bus.subscribe_channel(EventKind::FilesStaged);

        bus.emit(staged(&["a.sol"]));
        // Buffer of one: the second event is dropped, not blocking
        bus.emit(staged(&["b.sol"]));

        match rx.try_recv().expect("event delivered") {
            RepositoryEvent::FilesStaged { paths } => assert_eq!(paths, vec!["a.sol"]),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_pruned() {
        let mut bus = EventBus::default();
        let (_handle, rx) = bus.subscribe_channel(EventKind::FilesStaged);
        drop(rx);

        bus.emit(staged(&["a.sol"]));
        assert_eq!(bus.subscriber_count(EventKind::FilesStaged), 0);
    }

    #[test]
    fn test_event_serialization_uses_wire_names() {
        let event = RepositoryEvent::BranchesMerged {
            source_branch: "feature/x".to_string(),
            target_branch: "main".to_string(),
            merge_commit_id: "commit_1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "branches-merged");
        assert_eq!(json["sourceBranch"], "feature/x");
        assert_eq!(event.kind().as_str(), "branches-merged");
    }
}
