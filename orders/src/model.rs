use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Done,
    Rescheduled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Done => "done",
            OrderStatus::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Some(OrderStatus::Pending),
            "done" => Some(OrderStatus::Done),
            "rescheduled" => Some(OrderStatus::Rescheduled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderKind {
    Repair,
    Job,
}

static ORDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Identifiers sort by creation: unix millis plus a per-process sequence.
pub fn next_order_id(prefix: &str) -> String {
    let seq = ORDER_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{seq}", Utc::now().timestamp_millis())
}

/// One order variant as held by the store. The store owns `id` and
/// `created_at`; everything else arrives through `Fields` at creation and
/// mutates through field-merge of a `Patch`.
pub trait OrderRecord:
    Clone + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Fields: DeserializeOwned + Send + 'static;
    type Patch: DeserializeOwned + Send + 'static;

    const COLLECTION: &'static str;
    const ID_PREFIX: &'static str;

    fn build(id: String, created_at: DateTime<Utc>, fields: Self::Fields) -> Self;
    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    fn apply(&mut self, patch: Self::Patch);
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOrder {
    pub id: String,
    pub customer_name: String,
    pub phone_number: String,
    pub damage: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub deadline: NaiveDate,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairFields {
    pub customer_name: String,
    pub phone_number: String,
    pub damage: String,
    pub price: f64,
    #[serde(default)]
    pub picture: Option<String>,
    pub deadline: NaiveDate,
    #[serde(default)]
    pub status: OrderStatus,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairPatch {
    pub customer_name: Option<String>,
    pub phone_number: Option<String>,
    pub damage: Option<String>,
    pub price: Option<f64>,
    pub picture: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub status: Option<OrderStatus>,
}

impl OrderRecord for RepairOrder {
    type Fields = RepairFields;
    type Patch = RepairPatch;

    const COLLECTION: &'static str = "repair-orders";
    const ID_PREFIX: &'static str = "repair";

    fn build(id: String, created_at: DateTime<Utc>, fields: RepairFields) -> Self {
        Self {
            id,
            customer_name: fields.customer_name,
            phone_number: fields.phone_number,
            damage: fields.damage,
            price: fields.price,
            picture: fields.picture,
            deadline: fields.deadline,
            status: fields.status,
            created_at,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply(&mut self, patch: RepairPatch) {
        if let Some(customer_name) = patch.customer_name {
            self.customer_name = customer_name;
        }
        if let Some(phone_number) = patch.phone_number {
            self.phone_number = phone_number;
        }
        if let Some(damage) = patch.damage {
            self.damage = damage;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(picture) = patch.picture {
            self.picture = Some(picture);
        }
        if let Some(deadline) = patch.deadline {
            self.deadline = deadline;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOrder {
    pub id: String,
    pub customer_name: String,
    pub phone_number: String,
    pub description: String,
    pub quantity: u32,
    pub price: f64,
    pub deadline: NaiveDate,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFields {
    pub customer_name: String,
    pub phone_number: String,
    pub description: String,
    pub quantity: u32,
    pub price: f64,
    pub deadline: NaiveDate,
    #[serde(default)]
    pub status: OrderStatus,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPatch {
    pub customer_name: Option<String>,
    pub phone_number: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<u32>,
    pub price: Option<f64>,
    pub deadline: Option<NaiveDate>,
    pub status: Option<OrderStatus>,
}

impl OrderRecord for JobOrder {
    type Fields = JobFields;
    type Patch = JobPatch;

    const COLLECTION: &'static str = "job-orders";
    const ID_PREFIX: &'static str = "job";

    fn build(id: String, created_at: DateTime<Utc>, fields: JobFields) -> Self {
        Self {
            id,
            customer_name: fields.customer_name,
            phone_number: fields.phone_number,
            description: fields.description,
            quantity: fields.quantity,
            price: fields.price,
            deadline: fields.deadline,
            status: fields.status,
            created_at,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply(&mut self, patch: JobPatch) {
        if let Some(customer_name) = patch.customer_name {
            self.customer_name = customer_name;
        }
        if let Some(phone_number) = patch.phone_number {
            self.phone_number = phone_number;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(quantity) = patch.quantity {
            self.quantity = quantity;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(deadline) = patch.deadline {
            self.deadline = deadline;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{JobOrder, OrderRecord, OrderStatus, RepairOrder, RepairPatch, next_order_id};

    fn repair() -> RepairOrder {
        RepairOrder {
            id: "repair-1-0".to_string(),
            customer_name: "Jane Doe".to_string(),
            phone_number: "555-1111".to_string(),
            damage: "torn strap".to_string(),
            price: 25.0,
            picture: None,
            deadline: "2024-06-01".parse().unwrap(),
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn patch_merges_only_given_fields() {
        let mut order = repair();
        let before = order.clone();

        order.apply(RepairPatch {
            status: Some(OrderStatus::Done),
            ..RepairPatch::default()
        });

        assert_eq!(order.status, OrderStatus::Done);
        assert_eq!(order.customer_name, before.customer_name);
        assert_eq!(order.price, before.price);
        assert_eq!(order.deadline, before.deadline);
        assert_eq!(order.created_at, before.created_at);
        assert_eq!(order.id, before.id);
    }

    #[test]
    fn status_round_trips_as_lowercase() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Rescheduled).unwrap(),
            "\"rescheduled\""
        );
        assert_eq!(OrderStatus::parse(" Done "), Some(OrderStatus::Done));
        assert_eq!(OrderStatus::parse("unknown"), None);
    }

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = next_order_id(RepairOrder::ID_PREFIX);
        let b = next_order_id(RepairOrder::ID_PREFIX);

        assert_ne!(a, b);
        assert!(a.starts_with("repair-"));
        assert!(next_order_id(JobOrder::ID_PREFIX).starts_with("job-"));
    }

    #[test]
    fn wire_names_are_camel_case() {
        let json = serde_json::to_value(repair()).unwrap();

        assert!(json.get("customerName").is_some());
        assert!(json.get("createdAt").is_some());
        assert!(json.get("customer_name").is_none());
        // absent picture is omitted entirely
        assert!(json.get("picture").is_none());
    }
}
