use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome reported by the payment service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Success,
    Failed,
}

/// Consumed from the create-payment topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCreatedEvent {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
}

/// Published on the create-order topic once an order is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub total: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_event_uses_camel_case_wire_names() {
        let order_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"orderId":"{order_id}","paymentStatus":"SUCCESS","paymentId":"ignored"}}"#
        );
        let event: PaymentCreatedEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(event.order_id, order_id);
        assert_eq!(event.payment_status, PaymentStatus::Success);
    }

    #[test]
    fn unknown_payment_status_is_rejected() {
        let raw = format!(
            r#"{{"orderId":"{}","paymentStatus":"MAYBE"}}"#,
            Uuid::new_v4()
        );
        assert!(serde_json::from_str::<PaymentCreatedEvent>(&raw).is_err());
    }
}
