//! Upstream entities and their lifted projections

use paypipe_common::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Entity {
    PaymentIntents,
    Charges,
    Invoices,
    Customers,
}

impl Entity {
    /// Extraction order used by `run-all`.
    pub const ALL: [Entity; 4] = [
        Entity::PaymentIntents,
        Entity::Charges,
        Entity::Invoices,
        Entity::Customers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::PaymentIntents => "payment_intents",
            Entity::Charges => "charges",
            Entity::Invoices => "invoices",
            Entity::Customers => "customers",
        }
    }

    fn lifted_fields(&self) -> &'static [&'static str] {
        match self {
            Entity::PaymentIntents => &[
                "id",
                "created",
                "amount",
                "currency",
                "status",
                "customer",
                "latest_charge",
                "invoice",
            ],
            Entity::Charges => &[
                "id",
                "created",
                "amount",
                "currency",
                "status",
                "payment_intent",
                "invoice",
                "customer",
            ],
            Entity::Invoices => &[
                "id",
                "created",
                "due_date",
                "status",
                "customer",
                "total",
                "amount_due",
                "period_start",
                "period_end",
            ],
            Entity::Customers => &["id", "created", "email", "name"],
        }
    }

    /// Entity-specific normalized projection of a raw record.
    /// Absent fields project to `null`.
    pub fn lift(&self, record: &Value) -> Value {
        let lifted: Map<String, Value> = self
            .lifted_fields()
            .iter()
            .map(|field| {
                let value = record.get(*field).cloned().unwrap_or(Value::Null);
                (field.to_string(), value)
            })
            .collect();
        Value::Object(lifted)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Entity {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Entity::ALL
            .into_iter()
            .find(|e| e.as_str() == s.trim())
            .ok_or_else(|| PipelineError::config(format!("unknown entity '{s}'")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_and_display() {
        for entity in Entity::ALL {
            assert_eq!(entity.as_str().parse::<Entity>().unwrap(), entity);
        }
        assert!("refunds".parse::<Entity>().is_err());
        assert_eq!(serde_json::to_value(Entity::PaymentIntents).unwrap(), json!("payment_intents"));
    }

    #[test]
    fn test_lift_fills_missing_with_null() {
        let record = json!({"id": "cus_1", "created": 10, "email": "a@example.com", "extra": true});
        assert_eq!(
            Entity::Customers.lift(&record),
            json!({"id": "cus_1", "created": 10, "email": "a@example.com", "name": null})
        );
    }

    #[test]
    fn test_lift_charge() {
        let record = json!({
            "id": "ch_1",
            "created": 5,
            "amount": 1200,
            "currency": "usd",
            "status": "succeeded",
            "payment_intent": "pi_1",
            "customer": "cus_9"
        });
        let lifted = Entity::Charges.lift(&record);
        assert_eq!(lifted["payment_intent"], "pi_1");
        assert_eq!(lifted["invoice"], Value::Null);
        assert_eq!(lifted.as_object().unwrap().len(), 8);
    }
}
