use super::*;
use crate::{
    fixtures::{cm2, event},
    ChoiceEvent, NotificationLevel,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::VariationId,
    protocol::{CartItemMetadata, CartSnapshot},
};
use tokio::sync::{Mutex as AsyncMutex, Notify};

#[derive(Debug, Clone)]
enum CartCall {
    Items,
    Add(ProductData),
    Update(CartItemId, ProductData),
    Remove(CartItemId),
}

#[derive(Default)]
struct FakeCart {
    items: AsyncMutex<Vec<CartItem>>,
    calls: AsyncMutex<Vec<CartCall>>,
    fail_add: bool,
    fail_remove: bool,
    add_gate: Option<Arc<Notify>>,
    observed: Option<Arc<ChoiceStoreHandle>>,
    store_at_remove: AsyncMutex<Option<ChoiceStore>>,
}

impl FakeCart {
    fn tutorial_line(id: i64, subject: &SubjectCode) -> CartItem {
        CartItem {
            id: CartItemId(id),
            subject_code: Some(subject.clone()),
            product_type: Some(ProductType::Tutorial),
            metadata: CartItemMetadata::default(),
        }
    }

    async fn with_line(self, id: i64, subject: &SubjectCode) -> Self {
        self.items
            .lock()
            .await
            .push(Self::tutorial_line(id, subject));
        self
    }

    async fn calls(&self) -> Vec<CartCall> {
        self.calls.lock().await.clone()
    }

    async fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            id: Some(1),
            items: self.items.lock().await.clone(),
        }
    }
}

#[async_trait]
impl CartCollaborator for FakeCart {
    async fn cart_items(&self) -> Result<Vec<CartItem>> {
        self.calls.lock().await.push(CartCall::Items);
        Ok(self.items.lock().await.clone())
    }

    async fn add_to_cart(&self, product: &ProductData, _price: &PriceData) -> Result<CartSnapshot> {
        self.calls.lock().await.push(CartCall::Add(product.clone()));
        if let Some(gate) = &self.add_gate {
            gate.notified().await;
        }
        if self.fail_add {
            return Err(anyhow!("cart service returned 500"));
        }
        self.items
            .lock()
            .await
            .push(Self::tutorial_line(500, &product.subject_code));
        Ok(self.snapshot().await)
    }

    async fn update_cart_item(
        &self,
        line_id: CartItemId,
        product: &ProductData,
        _price: &PriceData,
    ) -> Result<CartSnapshot> {
        self.calls
            .lock()
            .await
            .push(CartCall::Update(line_id, product.clone()));
        Ok(self.snapshot().await)
    }

    async fn remove_from_cart(&self, line_id: CartItemId) -> Result<CartSnapshot> {
        self.calls.lock().await.push(CartCall::Remove(line_id));
        if let Some(handle) = &self.observed {
            *self.store_at_remove.lock().await = Some(handle.snapshot().await);
        }
        if self.fail_remove {
            return Err(anyhow!("cart service returned 503"));
        }
        self.items.lock().await.retain(|item| item.id != line_id);
        Ok(self.snapshot().await)
    }
}

async fn london_and_new_york() -> Arc<ChoiceStoreHandle> {
    let handle = ChoiceStoreHandle::in_memory();
    handle
        .add_or_update(&cm2(), ChoiceLevel::First, event(1, "London", 450.0))
        .await
        .expect("1st");
    handle
        .add_or_update(&cm2(), ChoiceLevel::Second, event(2, "New York", 500.0))
        .await
        .expect("2nd");
    handle
}

fn controller(handle: &Arc<ChoiceStoreHandle>, cart: &Arc<FakeCart>) -> SummaryBarController {
    SummaryBarController::new(handle.clone(), cart.clone())
}

#[tokio::test]
async fn drafts_expand_then_collapse_after_add_to_cart() {
    let handle = london_and_new_york().await;
    let cart = Arc::new(FakeCart::default());
    let controller = controller(&handle, &cart);

    let views = controller.views().await;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].price.as_deref(), Some("£450.00"));
    match &views[0].state {
        SummaryBarState::Expanded { draft_lines } => {
            let levels: Vec<ChoiceLevel> = draft_lines.iter().map(|line| line.level).collect();
            assert_eq!(levels, vec![ChoiceLevel::First, ChoiceLevel::Second]);
            assert_eq!(draft_lines[0].location, "London");
            assert_eq!(draft_lines[1].location, "New York");
        }
        other => panic!("expected expanded bar, got {other:?}"),
    }
    assert_eq!(
        views[0].actions,
        vec![
            SummaryAction::Edit,
            SummaryAction::AddToCart,
            SummaryAction::Remove
        ]
    );

    controller.add_to_cart(&cm2()).await.expect("add");

    let adds: Vec<ProductData> = cart
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            CartCall::Add(product) => Some(product),
            CartCall::Update(..) => panic!("no line existed to update"),
            _ => None,
        })
        .collect();
    assert_eq!(adds.len(), 1);
    assert_eq!(adds[0].metadata.total_choice_count, 2);
    assert_eq!(adds[0].metadata.choices[0].choice, ChoiceLevel::First);
    assert_eq!(adds[0].metadata.choices[1].choice, ChoiceLevel::Second);

    let store = handle.snapshot().await;
    assert!(store.choices(&cm2()).iter().all(|choice| !choice.is_draft));
    assert_eq!(classify(&store, &cm2()), SummaryBarState::Collapsed);
    assert_eq!(
        SummaryBarState::Collapsed.actions(),
        vec![SummaryAction::Edit]
    );
}

#[tokio::test]
async fn existing_line_is_updated_with_every_choice() {
    let handle = london_and_new_york().await;
    let cart = Arc::new(FakeCart::default().with_line(77, &cm2()).await);
    let controller = controller(&handle, &cart);

    handle.mark_as_added(&cm2()).await.expect("mark");
    handle
        .add_or_update(&cm2(), ChoiceLevel::Third, event(4, "Edinburgh", 420.0))
        .await
        .expect("3rd");

    controller.add_to_cart(&cm2()).await.expect("update");

    let calls = cart.calls().await;
    assert!(!calls.iter().any(|call| matches!(call, CartCall::Add(_))));
    let (line_id, product) = calls
        .iter()
        .find_map(|call| match call {
            CartCall::Update(line_id, product) => Some((*line_id, product.clone())),
            _ => None,
        })
        .expect("update call");
    assert_eq!(line_id, CartItemId(77));
    assert_eq!(product.metadata.total_choice_count, 3);
    assert!(!handle.snapshot().await.has_draft_choices(&cm2()));
}

#[tokio::test]
async fn rejected_remove_leaves_choices_untouched() {
    let handle = london_and_new_york().await;
    handle.mark_as_added(&cm2()).await.expect("mark");
    let cart = Arc::new(
        FakeCart {
            fail_remove: true,
            ..FakeCart::default()
        }
        .with_line(77, &cm2())
        .await,
    );
    let controller = controller(&handle, &cart);
    let before = handle.snapshot().await;
    let mut events = handle.subscribe_events();

    let err = controller.remove(&cm2()).await.expect_err("remove fails");
    assert!(matches!(err, ChoiceError::Cart { .. }));

    assert_eq!(handle.snapshot().await, before);
    match events.recv().await.expect("event") {
        ChoiceEvent::Notification(notification) => {
            assert_eq!(notification.level, NotificationLevel::Error);
            assert_eq!(notification.message, REMOVE_FAILED_MESSAGE);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(!controller.is_in_flight(&cm2()));
}

#[tokio::test]
async fn remove_deletes_cart_line_before_clearing_choices() {
    let handle = london_and_new_york().await;
    let cart = Arc::new(FakeCart::default().with_line(77, &cm2()).await);
    let controller = controller(&handle, &cart);

    controller.remove(&cm2()).await.expect("remove");

    assert!(cart
        .calls()
        .await
        .iter()
        .any(|call| matches!(call, CartCall::Remove(CartItemId(77)))));
    assert!(cart.items.lock().await.is_empty());
    let store = handle.snapshot().await;
    assert_eq!(classify(&store, &cm2()), SummaryBarState::Hidden);
    assert!(render_summaries(&store).is_empty());
}

#[tokio::test]
async fn remove_without_cart_line_only_clears_locally() {
    let handle = london_and_new_york().await;
    let cart = Arc::new(FakeCart::default());
    let controller = controller(&handle, &cart);

    controller.remove(&cm2()).await.expect("remove");

    assert!(!cart
        .calls()
        .await
        .iter()
        .any(|call| matches!(call, CartCall::Remove(_))));
    assert!(handle.snapshot().await.choices(&cm2()).is_empty());
}

#[tokio::test]
async fn failed_add_keeps_drafts_and_notifies() {
    let handle = london_and_new_york().await;
    let cart = Arc::new(FakeCart {
        fail_add: true,
        ..FakeCart::default()
    });
    let controller = controller(&handle, &cart);
    let mut events = handle.subscribe_events();

    let err = controller.add_to_cart(&cm2()).await.expect_err("add fails");
    assert!(matches!(err, ChoiceError::Cart { .. }));

    assert!(handle
        .snapshot()
        .await
        .choices(&cm2())
        .iter()
        .all(|choice| choice.is_draft));
    match events.recv().await.expect("event") {
        ChoiceEvent::Notification(notification) => {
            assert_eq!(notification.message, ADD_FAILED_MESSAGE);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn add_without_choices_is_rejected() {
    let handle = ChoiceStoreHandle::in_memory();
    let cart = Arc::new(FakeCart::default());
    let controller = controller(&handle, &cart);

    let err = controller.add_to_cart(&cm2()).await.expect_err("empty");
    assert!(matches!(err, ChoiceError::NoChoices { .. }));
    assert!(cart.calls().await.is_empty());
    assert_eq!(
        classify(&handle.snapshot().await, &cm2()),
        SummaryBarState::Hidden
    );
}

#[tokio::test]
async fn second_operation_for_same_subject_is_rejected_while_in_flight() {
    let handle = london_and_new_york().await;
    let gate = Arc::new(Notify::new());
    let cart = Arc::new(FakeCart {
        add_gate: Some(gate.clone()),
        ..FakeCart::default()
    });
    let controller = controller(&handle, &cart);
    let subject = cm2();

    let (first, second) = tokio::join!(controller.add_to_cart(&subject), async {
        let result = controller.remove(&subject).await;
        gate.notify_one();
        result
    });

    first.expect("first add completes");
    assert!(matches!(
        second,
        Err(ChoiceError::OperationInFlight { .. })
    ));
    assert!(!controller.is_in_flight(&cm2()));
    assert!(handle.snapshot().await.has_carted_choices(&cm2()));
}

#[tokio::test]
async fn reconcile_restores_subjects_whose_line_vanished() {
    let handle = london_and_new_york().await;
    handle.mark_as_added(&cm2()).await.expect("mark");
    let cart = Arc::new(FakeCart::default().with_line(77, &cm2()).await);
    let controller = controller(&handle, &cart);

    assert!(controller
        .refresh_from_cart()
        .await
        .expect("refresh")
        .is_empty());
    assert!(!handle.snapshot().await.has_draft_choices(&cm2()));

    cart.items.lock().await.clear();
    let restored = controller.refresh_from_cart().await.expect("refresh");
    assert_eq!(restored, vec![cm2()]);

    let store = handle.snapshot().await;
    assert!(matches!(
        classify(&store, &cm2()),
        SummaryBarState::Expanded { .. }
    ));
}

#[tokio::test]
async fn refresh_reports_unavailable_cart() {
    let handle = london_and_new_york().await;
    let controller =
        SummaryBarController::new(handle, Arc::new(crate::cart::MissingCartCollaborator));
    let err = controller.refresh_from_cart().await.expect_err("no cart");
    assert!(matches!(err, ChoiceError::CartUnavailable { .. }));
}

#[test]
fn payload_without_first_choice_is_priced_at_zero() {
    let mut store = ChoiceStore::new();
    store.apply(crate::ChoiceCommand::AddOrUpdate {
        subject: cm2(),
        level: ChoiceLevel::Second,
        event: event(2, "New York", 500.0),
    });

    let (product, price) = build_tutorial_cart_payload(&store, &cm2()).expect("payload");
    assert_eq!(price.actual_price, 0.0);
    assert_eq!(product.metadata.choices[0].price, "£0.00");
    assert_eq!(product.variation_id, Some(VariationId(20)));
    assert!(build_tutorial_cart_payload(&store, &SubjectCode::from("SP9")).is_none());
}

#[test]
fn payload_repeats_subject_price_on_each_choice() {
    let mut store = ChoiceStore::new();
    for (level, id, location, amount) in [
        (ChoiceLevel::First, 1, "London", 450.0),
        (ChoiceLevel::Second, 2, "New York", 500.0),
    ] {
        store.apply(crate::ChoiceCommand::AddOrUpdate {
            subject: cm2(),
            level,
            event: event(id, location, amount),
        });
    }

    let (product, price) = build_tutorial_cart_payload(&store, &cm2()).expect("payload");
    assert_eq!(price.actual_price, 450.0);
    assert!(product
        .metadata
        .choices
        .iter()
        .all(|choice| choice.price == "£450.00"));
    assert_eq!(product.product_type, ProductType::Tutorial);
    assert_eq!(product.variation_id, Some(VariationId(10)));
}

#[tokio::test]
async fn choice_made_while_add_is_pending_stays_draft() {
    let handle = london_and_new_york().await;
    let gate = Arc::new(Notify::new());
    let cart = Arc::new(FakeCart {
        add_gate: Some(gate.clone()),
        ..FakeCart::default()
    });
    let controller = controller(&handle, &cart);
    let subject = cm2();

    let (added, selected) = tokio::join!(controller.add_to_cart(&subject), async {
        let result = handle
            .add_or_update(&subject, ChoiceLevel::Third, event(4, "Edinburgh", 420.0))
            .await;
        gate.notify_one();
        result
    });
    added.expect("add");
    selected.expect("select 3rd");

    let sent_counts: Vec<usize> = cart
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            CartCall::Add(product) => Some(product.metadata.total_choice_count),
            _ => None,
        })
        .collect();
    assert_eq!(sent_counts, vec![2]);

    let store = handle.snapshot().await;
    let third = store.choice(&subject, ChoiceLevel::Third).expect("3rd");
    assert!(third.is_draft);
    assert_eq!(store.carted_choices(&subject).len(), 2);
    match classify(&store, &subject) {
        SummaryBarState::Expanded { draft_lines } => {
            assert_eq!(draft_lines.len(), 1);
            assert_eq!(draft_lines[0].level, ChoiceLevel::Third);
        }
        other => panic!("expected expanded bar, got {other:?}"),
    }
}

#[tokio::test]
async fn remove_mixed_subject_deletes_line_before_clearing() {
    let handle = ChoiceStoreHandle::in_memory();
    handle
        .add_or_update(&cm2(), ChoiceLevel::First, event(1, "London", 450.0))
        .await
        .expect("1st");
    handle.mark_as_added(&cm2()).await.expect("mark");
    handle
        .add_or_update(&cm2(), ChoiceLevel::Second, event(2, "New York", 500.0))
        .await
        .expect("2nd");
    let cart = Arc::new(
        FakeCart {
            observed: Some(handle.clone()),
            ..FakeCart::default()
        }
        .with_line(77, &cm2())
        .await,
    );
    let controller = controller(&handle, &cart);

    controller.remove(&cm2()).await.expect("remove");

    let at_remove = cart
        .store_at_remove
        .lock()
        .await
        .clone()
        .expect("delete-line call made");
    assert_eq!(at_remove.carted_choices(&cm2()).len(), 1);
    assert_eq!(at_remove.draft_choices(&cm2()).len(), 1);
    assert!(cart
        .calls()
        .await
        .iter()
        .any(|call| matches!(call, CartCall::Remove(CartItemId(77)))));
    assert!(cart.items.lock().await.is_empty());
    assert!(handle.snapshot().await.choices(&cm2()).is_empty());
}
