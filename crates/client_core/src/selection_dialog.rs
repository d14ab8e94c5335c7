use shared::domain::{ChoiceLevel, EventId, SubjectCode, TutorialEventData};

use crate::{choice_store::ChoiceStore, error::ChoiceError, ChoiceStoreHandle};

/// Selectable tutorial events for one subject, optionally narrowed to a
/// location. Selections are written straight into the choice store; closing
/// the dialog commits nothing.
#[derive(Debug, Clone)]
pub struct SelectionDialog {
    subject_code: SubjectCode,
    subject_name: String,
    location: Option<String>,
    events: Vec<TutorialEventData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogRow<'a> {
    pub event: &'a TutorialEventData,
    pub assigned_level: Option<ChoiceLevel>,
    pub is_draft: Option<bool>,
}

impl SelectionDialog {
    pub fn new(
        subject_code: SubjectCode,
        subject_name: impl Into<String>,
        events: Vec<TutorialEventData>,
    ) -> Self {
        Self {
            subject_code,
            subject_name: subject_name.into(),
            location: None,
            events,
        }
    }

    pub fn for_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn subject_code(&self) -> &SubjectCode {
        &self.subject_code
    }

    pub fn visible_events(&self) -> impl Iterator<Item = &TutorialEventData> {
        self.events.iter().filter(|event| {
            self.location
                .as_deref()
                .map_or(true, |location| event.location.eq_ignore_ascii_case(location))
        })
    }

    pub fn rows(&self, store: &ChoiceStore) -> Vec<DialogRow<'_>> {
        self.visible_events()
            .map(|event| {
                let assigned_level = store.level_for_event(&self.subject_code, event.event_id);
                let is_draft = assigned_level
                    .and_then(|level| store.choice(&self.subject_code, level))
                    .map(|choice| choice.is_draft);
                DialogRow {
                    event,
                    assigned_level,
                    is_draft,
                }
            })
            .collect()
    }

    pub fn available_levels(&self, store: &ChoiceStore) -> Vec<ChoiceLevel> {
        ChoiceLevel::ALL
            .into_iter()
            .filter(|level| store.choice(&self.subject_code, *level).is_none())
            .collect()
    }

    fn event(&self, event_id: EventId) -> Result<&TutorialEventData, ChoiceError> {
        self.events
            .iter()
            .find(|event| event.event_id == event_id)
            .ok_or_else(|| ChoiceError::UnknownEvent {
                subject: self.subject_code.clone(),
                event_id,
            })
    }

    pub async fn select(
        &self,
        choices: &ChoiceStoreHandle,
        event_id: EventId,
        level: ChoiceLevel,
    ) -> Result<(), ChoiceError> {
        let mut event = self.event(event_id)?.clone();
        event.subject_code = self.subject_code.clone();
        event.subject_name = self.subject_name.clone();
        choices.add_or_update(&self.subject_code, level, event).await
    }

    /// Same as [`SelectionDialog::select`] for a level given as text.
    pub async fn select_str(
        &self,
        choices: &ChoiceStoreHandle,
        event_id: EventId,
        level: &str,
    ) -> Result<(), ChoiceError> {
        let level: ChoiceLevel = level.parse()?;
        self.select(choices, event_id, level).await
    }

    /// Clears whichever level `event_id` occupies. Returns false when the
    /// event was not selected.
    pub async fn deselect(
        &self,
        choices: &ChoiceStoreHandle,
        event_id: EventId,
    ) -> Result<bool, ChoiceError> {
        let level = choices
            .read(|store| store.level_for_event(&self.subject_code, event_id))
            .await;
        match level {
            Some(level) => {
                choices
                    .remove_tutorial_choice(&self.subject_code, level)
                    .await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
#[path = "tests/selection_dialog_tests.rs"]
mod tests;
