use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(EventId);
id_newtype!(VariationId);
id_newtype!(CartItemId);

/// Course code grouping related tutorial offerings, e.g. `CM2`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectCode(pub String);

impl SubjectCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectCode {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SubjectCode {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Ordered preference rank of a tutorial event within one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChoiceLevel {
    #[serde(rename = "1st")]
    First,
    #[serde(rename = "2nd")]
    Second,
    #[serde(rename = "3rd")]
    Third,
}

impl ChoiceLevel {
    pub const ALL: [ChoiceLevel; 3] = [ChoiceLevel::First, ChoiceLevel::Second, ChoiceLevel::Third];

    pub fn as_str(self) -> &'static str {
        match self {
            ChoiceLevel::First => "1st",
            ChoiceLevel::Second => "2nd",
            ChoiceLevel::Third => "3rd",
        }
    }
}

impl fmt::Display for ChoiceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChoiceLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1st" => Ok(ChoiceLevel::First),
            "2nd" => Ok(ChoiceLevel::Second),
            "3rd" => Ok(ChoiceLevel::Third),
            other => Err(DomainError::InvalidChoiceLevel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    Standard,
    Retaker,
    Reduced,
    Additional,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub price_type: PriceType,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    pub variation_id: VariationId,
    pub variation_name: String,
    #[serde(default)]
    pub prices: Vec<Price>,
}

impl Variation {
    pub fn standard_price(&self) -> Option<f64> {
        self.prices
            .iter()
            .find(|price| price.price_type == PriceType::Standard)
            .map(|price| price.amount)
    }
}

/// Catalog snapshot of one tutorial event occurrence, copied at selection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorialEventData {
    pub event_id: EventId,
    pub event_code: String,
    pub event_title: String,
    pub location: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub variation: Variation,
    pub subject_code: SubjectCode,
    pub subject_name: String,
}

/// A selection record: one per subject and choice level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorialChoice {
    #[serde(flatten)]
    pub event: TutorialEventData,
    pub choice_level: ChoiceLevel,
    pub is_draft: bool,
    pub timestamp: DateTime<Utc>,
}

impl TutorialChoice {
    pub fn event_id(&self) -> EventId {
        self.event.event_id
    }
}

pub fn format_price(amount: f64) -> String {
    format!("£{amount:.2}")
}
