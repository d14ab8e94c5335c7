use std::sync::Arc;

use anyhow::Context;
use shared::domain::{ChoiceLevel, EventId, SubjectCode, TutorialEventData};
use storage::{KeyValueStore, MemoryStore};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

pub mod cart;
pub mod choice_store;
pub mod error;
pub mod selection_dialog;
pub mod summary_bar;

pub use cart::{CartCollaborator, HttpCartClient, MissingCartCollaborator};
pub use choice_store::{ChoiceCommand, ChoiceStore, STORAGE_KEY};
pub use error::ChoiceError;
pub use selection_dialog::{DialogRow, SelectionDialog};
pub use summary_bar::{SummaryAction, SummaryBarController, SummaryBarState, SummaryBarView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

/// Transient, dismissable user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceEvent {
    ChoicesChanged { subject: SubjectCode },
    Notification(Notification),
}

/// Owns the tutorial choice store and funnels every mutation through
/// [`ChoiceStoreHandle::dispatch`], which persists the full container under
/// [`STORAGE_KEY`] after each command.
pub struct ChoiceStoreHandle {
    store: Mutex<ChoiceStore>,
    kv: Arc<dyn KeyValueStore>,
    events: broadcast::Sender<ChoiceEvent>,
}

impl ChoiceStoreHandle {
    /// Reads persisted choices once. Unreadable JSON starts an empty store;
    /// a failing storage backend is an error.
    pub async fn load(kv: Arc<dyn KeyValueStore>) -> anyhow::Result<Arc<Self>> {
        let raw = kv
            .load(STORAGE_KEY)
            .await
            .context("failed to read persisted tutorial choices")?;
        let store = ChoiceStore::from_persisted(raw.as_deref());
        debug!(
            subjects = store.subjects().count(),
            "choices: loaded tutorial choices"
        );
        Ok(Self::with_store(store, kv))
    }

    pub fn in_memory() -> Arc<Self> {
        Self::with_store(ChoiceStore::new(), Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: ChoiceStore, kv: Arc<dyn KeyValueStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            store: Mutex::new(store),
            kv,
            events,
        })
    }

    /// Applies `command` and writes the whole container back to storage.
    ///
    /// The lock is held across the write so persisted snapshots land in
    /// dispatch order. If the write fails the in-memory mutation stays applied
    /// and the error is returned.
    pub async fn dispatch(&self, command: ChoiceCommand) -> Result<(), ChoiceError> {
        let subject = command.subject().clone();
        let command_name = command.name();

        let persisted = {
            let mut store = self.store.lock().await;
            store.apply(command);
            match store.to_json() {
                Ok(serialized) => self.kv.save(STORAGE_KEY, &serialized).await,
                Err(err) => Err(anyhow::Error::new(err)),
            }
        };

        let _ = self.events.send(ChoiceEvent::ChoicesChanged {
            subject: subject.clone(),
        });

        match persisted {
            Ok(()) => {
                debug!(subject = %subject, command = command_name, "choices: applied command");
                Ok(())
            }
            Err(source) => {
                warn!(
                    subject = %subject,
                    command = command_name,
                    error = %source,
                    "choices: failed to persist tutorial choices"
                );
                Err(ChoiceError::Persistence { source })
            }
        }
    }

    pub async fn add_or_update(
        &self,
        subject: &SubjectCode,
        level: ChoiceLevel,
        event: TutorialEventData,
    ) -> Result<(), ChoiceError> {
        self.dispatch(ChoiceCommand::AddOrUpdate {
            subject: subject.clone(),
            level,
            event,
        })
        .await
    }

    pub async fn remove_tutorial_choice(
        &self,
        subject: &SubjectCode,
        level: ChoiceLevel,
    ) -> Result<(), ChoiceError> {
        self.dispatch(ChoiceCommand::Remove {
            subject: subject.clone(),
            level,
        })
        .await
    }

    pub async fn remove_subject_choices(&self, subject: &SubjectCode) -> Result<(), ChoiceError> {
        self.dispatch(ChoiceCommand::RemoveSubject {
            subject: subject.clone(),
        })
        .await
    }

    pub async fn mark_as_added(&self, subject: &SubjectCode) -> Result<(), ChoiceError> {
        self.dispatch(ChoiceCommand::MarkAsAdded {
            subject: subject.clone(),
        })
        .await
    }

    pub async fn confirm_carted(
        &self,
        subject: &SubjectCode,
        sent: Vec<(ChoiceLevel, EventId)>,
    ) -> Result<(), ChoiceError> {
        self.dispatch(ChoiceCommand::ConfirmCarted {
            subject: subject.clone(),
            sent,
        })
        .await
    }

    pub async fn restore_to_draft(&self, subject: &SubjectCode) -> Result<(), ChoiceError> {
        self.dispatch(ChoiceCommand::RestoreToDraft {
            subject: subject.clone(),
        })
        .await
    }

    pub async fn snapshot(&self) -> ChoiceStore {
        self.store.lock().await.clone()
    }

    pub async fn read<R>(&self, f: impl FnOnce(&ChoiceStore) -> R) -> R {
        let store = self.store.lock().await;
        f(&store)
    }

    pub fn notify(&self, notification: Notification) {
        let _ = self.events.send(ChoiceEvent::Notification(notification));
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChoiceEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/fixtures.rs"]
pub(crate) mod fixtures;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
