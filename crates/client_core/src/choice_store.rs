//! In-memory tutorial choice container, keyed by subject then choice level.
//!
//! All mutation goes through [`ChoiceStore::apply`] (or the `*_at` methods it
//! forwards to); the store itself never performs I/O. Persistence lives in
//! [`crate::ChoiceStoreHandle`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::domain::{ChoiceLevel, EventId, SubjectCode, TutorialChoice, TutorialEventData};
use tracing::warn;

/// Durable storage key holding the serialized container.
pub const STORAGE_KEY: &str = "tutorialChoices";

pub type SubjectChoices = BTreeMap<ChoiceLevel, TutorialChoice>;

#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceCommand {
    AddOrUpdate {
        subject: SubjectCode,
        level: ChoiceLevel,
        event: TutorialEventData,
    },
    Remove {
        subject: SubjectCode,
        level: ChoiceLevel,
    },
    RemoveSubject {
        subject: SubjectCode,
    },
    MarkAsAdded {
        subject: SubjectCode,
    },
    /// Marks carted only the entries whose level and event match `sent`.
    ConfirmCarted {
        subject: SubjectCode,
        sent: Vec<(ChoiceLevel, EventId)>,
    },
    RestoreToDraft {
        subject: SubjectCode,
    },
}

impl ChoiceCommand {
    pub fn subject(&self) -> &SubjectCode {
        match self {
            ChoiceCommand::AddOrUpdate { subject, .. }
            | ChoiceCommand::Remove { subject, .. }
            | ChoiceCommand::RemoveSubject { subject }
            | ChoiceCommand::MarkAsAdded { subject }
            | ChoiceCommand::ConfirmCarted { subject, .. }
            | ChoiceCommand::RestoreToDraft { subject } => subject,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChoiceCommand::AddOrUpdate { .. } => "add_or_update",
            ChoiceCommand::Remove { .. } => "remove",
            ChoiceCommand::RemoveSubject { .. } => "remove_subject",
            ChoiceCommand::MarkAsAdded { .. } => "mark_as_added",
            ChoiceCommand::ConfirmCarted { .. } => "confirm_carted",
            ChoiceCommand::RestoreToDraft { .. } => "restore_to_draft",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChoiceStore {
    subjects: BTreeMap<SubjectCode, SubjectChoices>,
}

impl ChoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from its persisted JSON. Missing or corrupt data
    /// yields an empty store.
    pub fn from_persisted(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };
        match serde_json::from_str::<ChoiceStore>(raw) {
            Ok(mut store) => {
                store.normalize();
                store
            }
            Err(err) => {
                warn!(error = %err, "choices: discarding corrupt persisted tutorial choices");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn apply(&mut self, command: ChoiceCommand) {
        self.apply_at(command, Utc::now());
    }

    pub fn apply_at(&mut self, command: ChoiceCommand, now: DateTime<Utc>) {
        match command {
            ChoiceCommand::AddOrUpdate {
                subject,
                level,
                event,
            } => self.add_or_update_at(&subject, level, event, now),
            ChoiceCommand::Remove { subject, level } => self.remove_choice(&subject, level),
            ChoiceCommand::RemoveSubject { subject } => self.remove_subject(&subject),
            ChoiceCommand::MarkAsAdded { subject } => self.set_draft_at(&subject, false, now),
            ChoiceCommand::ConfirmCarted { subject, sent } => {
                self.confirm_carted_at(&subject, &sent, now)
            }
            ChoiceCommand::RestoreToDraft { subject } => self.set_draft_at(&subject, true, now),
        }
    }

    /// Writes `event` at `level` as a draft. An event already held at another
    /// level of the same subject is moved, never duplicated.
    pub fn add_or_update_at(
        &mut self,
        subject: &SubjectCode,
        level: ChoiceLevel,
        mut event: TutorialEventData,
        now: DateTime<Utc>,
    ) {
        event.subject_code = subject.clone();
        let choices = self.subjects.entry(subject.clone()).or_default();

        let prior_level = choices
            .iter()
            .find(|(existing, choice)| **existing != level && choice.event_id() == event.event_id)
            .map(|(existing, _)| *existing);
        if let Some(prior_level) = prior_level {
            choices.remove(&prior_level);
        }

        choices.insert(
            level,
            TutorialChoice {
                event,
                choice_level: level,
                is_draft: true,
                timestamp: now,
            },
        );
    }

    pub fn remove_choice(&mut self, subject: &SubjectCode, level: ChoiceLevel) {
        let Some(choices) = self.subjects.get_mut(subject) else {
            return;
        };
        choices.remove(&level);
        if choices.is_empty() {
            self.subjects.remove(subject);
        }
    }

    pub fn remove_subject(&mut self, subject: &SubjectCode) {
        self.subjects.remove(subject);
    }

    fn set_draft_at(&mut self, subject: &SubjectCode, is_draft: bool, now: DateTime<Utc>) {
        if let Some(choices) = self.subjects.get_mut(subject) {
            for choice in choices.values_mut() {
                choice.is_draft = is_draft;
                choice.timestamp = now;
            }
        }
    }

    /// Entries replaced or added after `sent` was captured stay draft.
    pub fn confirm_carted_at(
        &mut self,
        subject: &SubjectCode,
        sent: &[(ChoiceLevel, EventId)],
        now: DateTime<Utc>,
    ) {
        let Some(choices) = self.subjects.get_mut(subject) else {
            return;
        };
        for (level, choice) in choices.iter_mut() {
            if sent.contains(&(*level, choice.event_id())) {
                choice.is_draft = false;
                choice.timestamp = now;
            }
        }
    }

    pub fn subjects(&self) -> impl Iterator<Item = &SubjectCode> {
        self.subjects.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn subject_choices(&self, subject: &SubjectCode) -> Option<&SubjectChoices> {
        self.subjects.get(subject)
    }

    pub fn choice(&self, subject: &SubjectCode, level: ChoiceLevel) -> Option<&TutorialChoice> {
        self.subjects.get(subject)?.get(&level)
    }

    /// All choices for `subject`, ordered 1st, 2nd, 3rd.
    pub fn choices(&self, subject: &SubjectCode) -> Vec<&TutorialChoice> {
        self.subjects
            .get(subject)
            .map(|choices| choices.values().collect())
            .unwrap_or_default()
    }

    pub fn draft_choices(&self, subject: &SubjectCode) -> Vec<&TutorialChoice> {
        self.choices(subject)
            .into_iter()
            .filter(|choice| choice.is_draft)
            .collect()
    }

    pub fn carted_choices(&self, subject: &SubjectCode) -> Vec<&TutorialChoice> {
        self.choices(subject)
            .into_iter()
            .filter(|choice| !choice.is_draft)
            .collect()
    }

    pub fn has_draft_choices(&self, subject: &SubjectCode) -> bool {
        self.choices(subject).iter().any(|choice| choice.is_draft)
    }

    pub fn has_carted_choices(&self, subject: &SubjectCode) -> bool {
        self.choices(subject).iter().any(|choice| !choice.is_draft)
    }

    pub fn level_for_event(&self, subject: &SubjectCode, event_id: EventId) -> Option<ChoiceLevel> {
        self.subjects
            .get(subject)?
            .iter()
            .find(|(_, choice)| choice.event_id() == event_id)
            .map(|(level, _)| *level)
    }

    pub fn is_event_selected(&self, subject: &SubjectCode, event_id: EventId) -> bool {
        self.level_for_event(subject, event_id).is_some()
    }

    pub fn next_available_level(&self, subject: &SubjectCode) -> Option<ChoiceLevel> {
        let taken = self.subjects.get(subject);
        ChoiceLevel::ALL
            .into_iter()
            .find(|level| taken.map_or(true, |choices| !choices.contains_key(level)))
    }

    /// Chargeable price for a subject: the 1st choice's standard price.
    pub fn subject_price(&self, subject: &SubjectCode) -> Option<f64> {
        self.choice(subject, ChoiceLevel::First)?
            .event
            .variation
            .standard_price()
    }

    pub fn total_price(&self) -> f64 {
        self.subjects
            .keys()
            .filter_map(|subject| self.subject_price(subject))
            .sum()
    }

    fn normalize(&mut self) {
        self.subjects.retain(|subject, choices| {
            for (level, choice) in choices.iter_mut() {
                choice.choice_level = *level;
                choice.event.subject_code = subject.clone();
            }
            !choices.is_empty()
        });
    }
}

#[cfg(test)]
#[path = "tests/choice_store_tests.rs"]
mod tests;
