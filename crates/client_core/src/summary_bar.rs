//! Per-subject summary of tutorial choices and the cart actions it offers.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use shared::{
    domain::{format_price, CartItemId, ChoiceLevel, EventId, PriceType, SubjectCode},
    protocol::{
        CartItem, ChoiceMetadata, PriceData, ProductData, ProductType, TutorialCartMetadata,
    },
};
use tracing::{info, warn};

use crate::{
    cart::CartCollaborator, choice_store::ChoiceStore, error::ChoiceError, ChoiceStoreHandle,
    Notification,
};

pub const ADD_FAILED_MESSAGE: &str = "Failed to add tutorial selections to cart. Please try again.";
pub const REMOVE_FAILED_MESSAGE: &str = "Failed to remove tutorial selections. Please try again.";

#[derive(Debug, Clone, PartialEq)]
pub struct DraftLine {
    pub level: ChoiceLevel,
    pub event_id: EventId,
    pub event_title: String,
    pub location: String,
    pub venue: String,
    pub start_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryBarState {
    Hidden,
    Collapsed,
    /// Draft lines are ordered 1st, 2nd, 3rd.
    Expanded { draft_lines: Vec<DraftLine> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryAction {
    Edit,
    AddToCart,
    Remove,
}

impl SummaryBarState {
    pub fn is_visible(&self) -> bool {
        !matches!(self, SummaryBarState::Hidden)
    }

    pub fn actions(&self) -> Vec<SummaryAction> {
        match self {
            SummaryBarState::Hidden => Vec::new(),
            SummaryBarState::Collapsed => vec![SummaryAction::Edit],
            SummaryBarState::Expanded { .. } => vec![
                SummaryAction::Edit,
                SummaryAction::AddToCart,
                SummaryAction::Remove,
            ],
        }
    }
}

pub fn classify(store: &ChoiceStore, subject: &SubjectCode) -> SummaryBarState {
    let choices = store.choices(subject);
    if choices.is_empty() {
        return SummaryBarState::Hidden;
    }

    let draft_lines: Vec<DraftLine> = choices
        .into_iter()
        .filter(|choice| choice.is_draft)
        .map(|choice| DraftLine {
            level: choice.choice_level,
            event_id: choice.event_id(),
            event_title: choice.event.event_title.clone(),
            location: choice.event.location.clone(),
            venue: choice.event.venue.clone(),
            start_date: choice.event.start_date,
        })
        .collect();

    if draft_lines.is_empty() {
        SummaryBarState::Collapsed
    } else {
        SummaryBarState::Expanded { draft_lines }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryBarView {
    pub subject_code: SubjectCode,
    pub subject_name: String,
    pub state: SummaryBarState,
    pub actions: Vec<SummaryAction>,
    pub price: Option<String>,
}

/// One view per subject holding any choice; hidden subjects are omitted.
pub fn render_summaries(store: &ChoiceStore) -> Vec<SummaryBarView> {
    store
        .subjects()
        .filter_map(|subject| {
            let state = classify(store, subject);
            if !state.is_visible() {
                return None;
            }
            let subject_name = store
                .choices(subject)
                .first()
                .map(|choice| choice.event.subject_name.clone())
                .unwrap_or_default();
            Some(SummaryBarView {
                subject_code: subject.clone(),
                subject_name,
                actions: state.actions(),
                state,
                price: store.subject_price(subject).map(format_price),
            })
        })
        .collect()
}

/// Cart payload covering every choice of `subject`, draft and carted alike.
/// Returns `None` when the subject has no choices.
pub fn build_tutorial_cart_payload(
    store: &ChoiceStore,
    subject: &SubjectCode,
) -> Option<(ProductData, PriceData)> {
    let choices = store.choices(subject);
    let first = *choices.first()?;
    let amount = store.subject_price(subject).unwrap_or(0.0);
    let price_label = format_price(amount);

    let choice_metadata: Vec<ChoiceMetadata> = choices
        .iter()
        .map(|choice| ChoiceMetadata {
            choice: choice.choice_level,
            event_id: choice.event_id(),
            event_code: choice.event.event_code.clone(),
            event_title: choice.event.event_title.clone(),
            location: choice.event.location.clone(),
            venue: choice.event.venue.clone(),
            start_date: choice.event.start_date,
            end_date: choice.event.end_date,
            variation_id: choice.event.variation.variation_id,
            variation_name: choice.event.variation.variation_name.clone(),
            price: price_label.clone(),
        })
        .collect();

    let variation_id = store
        .choice(subject, ChoiceLevel::First)
        .unwrap_or(first)
        .event
        .variation
        .variation_id;

    let product = ProductData {
        subject_code: subject.clone(),
        subject_name: first.event.subject_name.clone(),
        product_type: ProductType::Tutorial,
        variation_id: Some(variation_id),
        quantity: 1,
        metadata: TutorialCartMetadata {
            kind: ProductType::Tutorial,
            subject_code: subject.clone(),
            subject_name: first.event.subject_name.clone(),
            total_choice_count: choice_metadata.len(),
            choices: choice_metadata,
        },
    };
    let price = PriceData {
        price_type: PriceType::Standard,
        actual_price: amount,
    };
    Some((product, price))
}

/// Drives add-to-cart and remove for summary bars.
///
/// Local choices are only mutated after the cart call they depend on
/// succeeds. At most one cart operation per subject runs at a time.
pub struct SummaryBarController {
    choices: Arc<ChoiceStoreHandle>,
    cart: Arc<dyn CartCollaborator>,
    in_flight: Mutex<HashSet<SubjectCode>>,
}

struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<SubjectCode>>,
    subject: SubjectCode,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.subject);
    }
}

impl SummaryBarController {
    pub fn new(choices: Arc<ChoiceStoreHandle>, cart: Arc<dyn CartCollaborator>) -> Self {
        Self {
            choices,
            cart,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn choices(&self) -> &Arc<ChoiceStoreHandle> {
        &self.choices
    }

    pub fn is_in_flight(&self, subject: &SubjectCode) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(subject)
    }

    fn begin(&self, subject: &SubjectCode) -> Result<InFlightGuard<'_>, ChoiceError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(subject.clone()) {
            return Err(ChoiceError::OperationInFlight {
                subject: subject.clone(),
            });
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            subject: subject.clone(),
        })
    }

    pub async fn views(&self) -> Vec<SummaryBarView> {
        self.choices.read(render_summaries).await
    }

    /// Creates or updates the subject's tutorial cart line, then marks the
    /// choices that were sent as carted. Choices made while the call was
    /// pending stay draft.
    pub async fn add_to_cart(&self, subject: &SubjectCode) -> Result<(), ChoiceError> {
        let _guard = self.begin(subject)?;

        let payload = self
            .choices
            .read(|store| build_tutorial_cart_payload(store, subject))
            .await;
        let Some((product, price)) = payload else {
            return Err(ChoiceError::NoChoices {
                subject: subject.clone(),
            });
        };

        let result = async {
            let items = self.cart.cart_items().await?;
            match find_tutorial_line(&items, subject) {
                Some(line_id) => {
                    self.cart
                        .update_cart_item(line_id, &product, &price)
                        .await
                }
                None => self.cart.add_to_cart(&product, &price).await,
            }
        }
        .await;

        if let Err(source) = result {
            warn!(subject = %subject, error = %source, "summary: add to cart failed");
            self.choices.notify(Notification::error(ADD_FAILED_MESSAGE));
            return Err(ChoiceError::Cart {
                subject: subject.clone(),
                source,
            });
        }

        let sent = product
            .metadata
            .choices
            .iter()
            .map(|choice| (choice.choice, choice.event_id))
            .collect();
        self.choices.confirm_carted(subject, sent).await?;
        info!(
            subject = %subject,
            choices = product.metadata.total_choice_count,
            "summary: tutorial choices added to cart"
        );
        Ok(())
    }

    /// Deletes the subject's cart line (when one exists) and only then clears
    /// the local choices. On failure nothing local changes.
    pub async fn remove(&self, subject: &SubjectCode) -> Result<(), ChoiceError> {
        let _guard = self.begin(subject)?;

        let result = async {
            let items = self.cart.cart_items().await?;
            if let Some(line_id) = find_tutorial_line(&items, subject) {
                self.cart.remove_from_cart(line_id).await?;
            }
            anyhow::Ok(())
        }
        .await;

        if let Err(source) = result {
            warn!(subject = %subject, error = %source, "summary: remove failed");
            self.choices
                .notify(Notification::error(REMOVE_FAILED_MESSAGE));
            return Err(ChoiceError::Cart {
                subject: subject.clone(),
                source,
            });
        }

        self.choices.remove_subject_choices(subject).await?;
        info!(subject = %subject, "summary: tutorial choices removed");
        Ok(())
    }

    /// Returns carted subjects whose tutorial line is gone from `items` to
    /// draft. Yields the subjects that were restored.
    pub async fn reconcile_with_cart(
        &self,
        items: &[CartItem],
    ) -> Result<Vec<SubjectCode>, ChoiceError> {
        let orphaned: Vec<SubjectCode> = self
            .choices
            .read(|store| {
                store
                    .subjects()
                    .filter(|subject| store.has_carted_choices(subject))
                    .filter(|subject| find_tutorial_line(items, subject).is_none())
                    .cloned()
                    .collect()
            })
            .await;

        let mut restored = Vec::with_capacity(orphaned.len());
        for subject in orphaned {
            // An in-flight add may be about to create the missing line.
            if self.is_in_flight(&subject) {
                continue;
            }
            info!(subject = %subject, "summary: cart line gone, restoring choices to draft");
            self.choices.restore_to_draft(&subject).await?;
            restored.push(subject);
        }
        Ok(restored)
    }

    pub async fn refresh_from_cart(&self) -> Result<Vec<SubjectCode>, ChoiceError> {
        let items = self
            .cart
            .cart_items()
            .await
            .map_err(|source| ChoiceError::CartUnavailable { source })?;
        self.reconcile_with_cart(&items).await
    }
}

fn find_tutorial_line(items: &[CartItem], subject: &SubjectCode) -> Option<CartItemId> {
    items
        .iter()
        .find(|item| item.is_tutorial_for(subject))
        .map(|item| item.id)
}

#[cfg(test)]
#[path = "tests/summary_bar_tests.rs"]
mod tests;
