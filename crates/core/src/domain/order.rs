use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::customer::CustomerId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Placed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Placed => "PLACED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PLACED" => Some(Self::Placed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityUpdate {
    pub sku: String,
    pub quantity: i64,
}

/// Structured change set applied to an order's items in a single call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderDelta {
    pub add_items: Vec<LineItem>,
    pub remove_items: Vec<String>,
    pub update_quantities: Vec<QuantityUpdate>,
}

/// SKU to quantity map. Every stored quantity is positive.
///
/// On the wire this is a list of `{sku, quantity}` entries ordered by SKU.
/// Documents that store items as a `{sku: quantity}` object are accepted too.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredItems", into = "Vec<LineItem>")]
pub struct ItemMap(BTreeMap<String, u32>);

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredItems {
    Lines(Vec<LineItem>),
    Keyed(BTreeMap<String, i64>),
}

impl From<StoredItems> for ItemMap {
    fn from(stored: StoredItems) -> Self {
        match stored {
            StoredItems::Lines(lines) => Self::from(lines),
            StoredItems::Keyed(quantities) => Self(
                quantities
                    .into_iter()
                    .filter_map(|(sku, quantity)| {
                        u32::try_from(quantity).ok().filter(|quantity| *quantity > 0).map(|q| (sku, q))
                    })
                    .collect(),
            ),
        }
    }
}

impl ItemMap {
    /// Builds the item map for a new order. Duplicate SKUs are summed.
    pub fn from_requested(items: &[LineItem]) -> Result<Self, DomainError> {
        if items.is_empty() {
            return Err(DomainError::Validation("items cannot be empty".to_string()));
        }

        let mut quantities = BTreeMap::new();
        for item in items {
            let sku = item.sku.trim();
            if sku.is_empty() {
                return Err(DomainError::Validation("item sku cannot be empty".to_string()));
            }
            if item.quantity == 0 {
                return Err(DomainError::Validation(format!(
                    "quantity for sku `{sku}` must be at least 1"
                )));
            }
            let entry: &mut u32 = quantities.entry(sku.to_string()).or_default();
            *entry = entry.saturating_add(item.quantity);
        }

        Ok(Self(quantities))
    }

    pub fn get(&self, sku: &str) -> Option<u32> {
        self.0.get(sku).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_line_items(&self) -> Vec<LineItem> {
        self.0
            .iter()
            .map(|(sku, quantity)| LineItem { sku: sku.clone(), quantity: *quantity })
            .collect()
    }

    /// Merges a delta into this map and returns the result.
    ///
    /// Precedence is fixed: adds increment first, removals then delete the
    /// SKU outright, and quantity updates are applied last so they win over
    /// both. Any SKU that ends at zero or below is dropped. SKUs are trimmed
    /// the same way as at creation; blank ones are ignored.
    pub fn apply_delta(&self, delta: &OrderDelta) -> Self {
        let mut working: BTreeMap<String, i64> =
            self.0.iter().map(|(sku, quantity)| (sku.clone(), i64::from(*quantity))).collect();

        for item in &delta.add_items {
            let Some(sku) = normalized_sku(&item.sku) else { continue };
            let entry = working.entry(sku.to_string()).or_insert(0);
            *entry = entry.saturating_add(i64::from(item.quantity));
        }

        let removals: BTreeSet<&str> =
            delta.remove_items.iter().filter_map(|sku| normalized_sku(sku)).collect();
        for sku in removals {
            working.remove(sku);
        }

        for update in &delta.update_quantities {
            let Some(sku) = normalized_sku(&update.sku) else { continue };
            if update.quantity <= 0 {
                working.remove(sku);
            } else {
                working.insert(sku.to_string(), update.quantity);
            }
        }

        Self(
            working
                .into_iter()
                .filter(|(_, quantity)| *quantity > 0)
                .map(|(sku, quantity)| (sku, u32::try_from(quantity).unwrap_or(u32::MAX)))
                .collect(),
        )
    }
}

fn normalized_sku(sku: &str) -> Option<&str> {
    Some(sku.trim()).filter(|sku| !sku.is_empty())
}

impl From<Vec<LineItem>> for ItemMap {
    fn from(items: Vec<LineItem>) -> Self {
        let mut quantities = BTreeMap::new();
        for item in items.into_iter().filter(|item| item.quantity > 0) {
            let entry: &mut u32 = quantities.entry(item.sku).or_default();
            *entry = entry.saturating_add(item.quantity);
        }
        Self(quantities)
    }
}

impl From<ItemMap> for Vec<LineItem> {
    fn from(items: ItemMap) -> Self {
        items
            .0
            .into_iter()
            .map(|(sku, quantity)| LineItem { sku, quantity })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    #[serde(default)]
    pub items: ItemMap,
    #[serde(default)]
    pub shipping_address: String,
    #[serde(deserialize_with = "deserialize_created_at")]
    pub created_at: DateTime<Utc>,
}

/// Accepts RFC 3339 timestamps and naive ISO-8601 ones, which are read as UTC.
fn deserialize_created_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

impl Order {
    pub fn place(customer_id: CustomerId, items: ItemMap, shipping_address: String) -> Self {
        Self {
            id: OrderId::generate(),
            customer_id,
            status: OrderStatus::Placed,
            items,
            shipping_address,
            created_at: Utc::now(),
        }
    }
}
