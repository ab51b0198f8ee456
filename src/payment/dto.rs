use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Envelope shared by all provider events. The object itself stays untyped.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Event families the service reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutCompleted,
    PaymentSucceeded,
    PaymentFailed,
    Subscription,
    Invoice,
    Other,
}

impl EventKind {
    pub fn classify(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" => EventKind::CheckoutCompleted,
            "payment_intent.succeeded" => EventKind::PaymentSucceeded,
            "payment_intent.payment_failed" => EventKind::PaymentFailed,
            t if t.starts_with("customer.subscription.") => EventKind::Subscription,
            t if t.starts_with("invoice.") => EventKind::Invoice,
            _ => EventKind::Other,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}
