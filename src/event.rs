//! The `OrderCreatedEvent` contract exchanged between the API and the processor.

use crate::error::WorkerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

const FIELD_NAMES: [&str; 4] = ["orderId", "customerEmail", "totalAmount", "createdAtUtc"];

/// Emitted once per order by the API and consumed by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub customer_email: String,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub total_amount: Decimal,
    pub created_at_utc: DateTime<Utc>,
}

impl OrderCreatedEvent {
    /// Creates an event for a new order, stamped with a fresh id and the current time.
    pub fn new(customer_email: impl Into<String>, total_amount: Decimal) -> Self {
        Self {
            order_id: Uuid::new_v4(),
            customer_email: customer_email.into(),
            total_amount,
            created_at_utc: Utc::now(),
        }
    }

    /// The event synthesized by `POST /orders`.
    pub fn demo() -> Self {
        Self::new("customer@example.com", Decimal::new(4999, 2))
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, WorkerError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a wire payload, matching field names without regard to case.
    ///
    /// Publishers may send `OrderId`, `orderId` or `orderid`; all map onto the
    /// same field. Unknown fields are ignored. If two keys fold onto the same
    /// field, the one appearing later in the document wins.
    pub fn from_json_slice(body: &[u8]) -> Result<Self, WorkerError> {
        let raw: Map<String, Value> = serde_json::from_slice(body)?;
        let mut normalized = Map::with_capacity(FIELD_NAMES.len());
        for (key, value) in raw {
            if let Some(canonical) = FIELD_NAMES.iter().find(|name| name.eq_ignore_ascii_case(&key)) {
                normalized.insert((*canonical).to_string(), value);
            }
        }
        Ok(serde_json::from_value(Value::Object(normalized))?)
    }

    /// Rejects events carrying default values, which usually means the payload
    /// did not match the schema.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.order_id.is_nil() {
            return Err(WorkerError::Validation("order id is empty".into()));
        }
        if self.total_amount <= Decimal::ZERO {
            return Err(WorkerError::Validation(format!(
                "total amount must be positive, got {}",
                self.total_amount
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> OrderCreatedEvent {
        OrderCreatedEvent {
            order_id: Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap(),
            customer_email: "a@b.com".into(),
            total_amount: Decimal::new(4999, 2),
            created_at_utc: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn serializes_camel_case_with_numeric_amount() {
        let value: Value = serde_json::from_slice(&sample().to_json_bytes().unwrap()).unwrap();
        assert_eq!(value["orderId"], "11111111-1111-1111-1111-111111111111");
        assert_eq!(value["customerEmail"], "a@b.com");
        assert!(value["totalAmount"].is_number());
        assert_eq!(value["totalAmount"].as_f64(), Some(49.99));
        assert_eq!(value["createdAtUtc"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn round_trips_through_wire_form() {
        let event = sample();
        let decoded = OrderCreatedEvent::from_json_slice(&event.to_json_bytes().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn keeps_every_digit_of_large_amounts() {
        let mut event = sample();
        event.total_amount = Decimal::new(1234567890123456789, 2);

        let bytes = event.to_json_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains(r#""totalAmount":12345678901234567.89"#), "{}", text);

        let decoded = OrderCreatedEvent::from_json_slice(&bytes).unwrap();
        assert_eq!(decoded.total_amount, Decimal::new(1234567890123456789, 2));
        assert_eq!(decoded, event);
    }

    #[test]
    fn accepts_pascal_and_mixed_case_fields() {
        let pascal = br#"{
            "OrderId": "11111111-1111-1111-1111-111111111111",
            "CustomerEmail": "a@b.com",
            "TotalAmount": 49.99,
            "CreatedAtUtc": "2024-01-01T00:00:00Z"
        }"#;
        let mixed = br#"{
            "ORDERID": "11111111-1111-1111-1111-111111111111",
            "customeremail": "a@b.com",
            "totalAMOUNT": 49.99,
            "createdatutc": "2024-01-01T00:00:00Z",
            "somethingElse": true
        }"#;

        assert_eq!(OrderCreatedEvent::from_json_slice(pascal).unwrap(), sample());
        assert_eq!(OrderCreatedEvent::from_json_slice(mixed).unwrap(), sample());
    }

    #[test]
    fn accepts_fractional_second_timestamps() {
        let body = br#"{
            "orderId": "11111111-1111-1111-1111-111111111111",
            "customerEmail": "a@b.com",
            "totalAmount": 12,
            "createdAtUtc": "2024-01-01T10:20:30.1234567Z"
        }"#;
        let event = OrderCreatedEvent::from_json_slice(body).unwrap();
        assert_eq!(event.total_amount, Decimal::new(12, 0));
    }

    #[test]
    fn rejects_malformed_and_incomplete_payloads() {
        assert!(matches!(
            OrderCreatedEvent::from_json_slice(b"not json"),
            Err(WorkerError::Deserialization(_))
        ));
        assert!(matches!(
            OrderCreatedEvent::from_json_slice(br#"{"orderId":"11111111-1111-1111-1111-111111111111"}"#),
            Err(WorkerError::Deserialization(_))
        ));
        assert!(matches!(
            OrderCreatedEvent::from_json_slice(b"[1,2,3]"),
            Err(WorkerError::Deserialization(_))
        ));
    }

    #[test]
    fn validation_rules() {
        assert!(sample().validate().is_ok());

        let mut zero = sample();
        zero.total_amount = Decimal::ZERO;
        assert!(matches!(zero.validate(), Err(WorkerError::Validation(_))));

        let mut negative = sample();
        negative.total_amount = Decimal::new(-1, 0);
        assert!(matches!(negative.validate(), Err(WorkerError::Validation(_))));

        let mut nil = sample();
        nil.order_id = Uuid::nil();
        assert!(matches!(nil.validate(), Err(WorkerError::Validation(_))));
    }

    #[test]
    fn demo_event_is_valid() {
        let event = OrderCreatedEvent::demo();
        assert!(event.validate().is_ok());
        assert_eq!(event.customer_email, "customer@example.com");
        assert_eq!(event.total_amount, Decimal::new(4999, 2));
    }
}
