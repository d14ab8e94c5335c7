use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CartItemId, ChoiceLevel, EventId, PriceType, SubjectCode, VariationId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Tutorial,
    Material,
    Marking,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartItemMetadata {
    #[serde(
        rename = "subjectCode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub subject_code: Option<SubjectCode>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One line of the server-side cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_code: Option<SubjectCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<ProductType>,
    #[serde(default)]
    pub metadata: CartItemMetadata,
}

impl CartItem {
    /// Subject code of the line, falling back to the metadata copy.
    pub fn subject(&self) -> Option<&SubjectCode> {
        self.subject_code
            .as_ref()
            .or(self.metadata.subject_code.as_ref())
    }

    pub fn is_tutorial_for(&self, subject: &SubjectCode) -> bool {
        self.product_type == Some(ProductType::Tutorial) && self.subject() == Some(subject)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub items: Vec<CartItem>,
}

impl CartSnapshot {
    pub fn tutorial_line_for(&self, subject: &SubjectCode) -> Option<&CartItem> {
        self.items.iter().find(|item| item.is_tutorial_for(subject))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceMetadata {
    pub choice: ChoiceLevel,
    pub event_id: EventId,
    pub event_code: String,
    pub event_title: String,
    pub location: String,
    pub venue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub variation_id: VariationId,
    pub variation_name: String,
    pub price: String,
}

/// Metadata attached to a tutorial cart line; choices are ordered 1st, 2nd, 3rd.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorialCartMetadata {
    #[serde(rename = "type")]
    pub kind: ProductType,
    pub subject_code: SubjectCode,
    pub subject_name: String,
    pub total_choice_count: usize,
    pub choices: Vec<ChoiceMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductData {
    pub subject_code: SubjectCode,
    pub subject_name: String,
    pub product_type: ProductType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_id: Option<VariationId>,
    pub quantity: u32,
    pub metadata: TutorialCartMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceData {
    pub price_type: PriceType,
    pub actual_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddToCartRequest {
    pub product: ProductData,
    pub price: PriceData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCartItemRequest {
    pub product: ProductData,
    pub price: PriceData,
}
