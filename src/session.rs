use std::sync::Arc;

use dashmap::DashMap;
use teloxide::types::UserId;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::quiz::{builder::BuilderSession, runner::RunSession, Quiz};

/// The one thing a user can be doing at a time.
#[derive(Debug, Clone)]
pub enum Session {
    Builder(BuilderSession),
    Run(RunSession),
}

type Slot = Arc<Mutex<Option<Session>>>;
type Slots = Arc<DashMap<UserId, Slot>>;

/// Sessions keyed by user. Every user has their own lock, so events of one
/// user are handled one after another while different users never wait on
/// each other.
#[derive(Debug, Default)]
pub struct SessionStore {
    slots: Slots,
    /// The last quiz each author finalized, waiting to be run.
    shelf: DashMap<UserId, Arc<Quiz>>,
}

/// Exclusive access to a user's session until dropped.
pub struct SessionGuard {
    user: UserId,
    slots: Slots,
    handle: Slot,
    slot: OwnedMutexGuard<Option<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user: UserId) -> SessionGuard {
        // Clone the slot out so the map shard is not held while waiting.
        let handle = Arc::clone(self.slots.entry(user).or_default().value());
        SessionGuard {
            user,
            slots: Arc::clone(&self.slots),
            slot: Arc::clone(&handle).lock_owned().await,
            handle,
        }
    }

    /// Snapshot of a user's session.
    pub async fn get(&self, user: UserId) -> Option<Session> {
        self.lock(user).await.get().cloned()
    }

    pub fn shelve(&self, author: UserId, quiz: Arc<Quiz>) {
        self.shelf.insert(author, quiz);
    }

    pub fn shelved(&self, author: UserId) -> Option<Arc<Quiz>> {
        self.shelf.get(&author).map(|quiz| Arc::clone(quiz.value()))
    }
}

impl SessionGuard {
    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn get(&self) -> Option<&Session> {
        self.slot.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut Session> {
        self.slot.as_mut()
    }

    /// Replaces whatever session the user had.
    pub fn put(&mut self, session: Session) {
        *self.slot = Some(session);
    }

    pub fn take(&mut self) -> Option<Session> {
        self.slot.take()
    }

    pub fn remove(&mut self) {
        *self.slot = None;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.slot.is_some() {
            return;
        }
        // The map, `handle` and the locked guard account for three references.
        // Anyone else holding the slot is waiting on it, so it has to stay.
        // Cloning a slot out of the map takes the shard lock `remove_if` holds.
        self.slots.remove_if(&self.user, |_, slot| {
            Arc::ptr_eq(slot, &self.handle) && Arc::strong_count(slot) == 3
        });
    }
}
