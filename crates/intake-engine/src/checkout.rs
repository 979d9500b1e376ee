//! Checkout and payment sub-flow state.
//!
//! Subscription creation and payment confirmation are asynchronous. Every
//! request is stamped with the current `generation`; `retry()` bumps it so
//! responses to abandoned requests are recognised as stale and dropped.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Idle,
    Processing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShippingField {
    Address,
    City,
    State,
    Zip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfo {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl ShippingInfo {
    pub fn set(&mut self, field: ShippingField, value: impl Into<String>) {
        let slot = match field {
            ShippingField::Address => &mut self.address,
            ShippingField::City => &mut self.city,
            ShippingField::State => &mut self.state,
            ShippingField::Zip => &mut self.zip,
        };
        *slot = value.into();
    }

    pub fn is_complete(&self) -> bool {
        [&self.address, &self.city, &self.state, &self.zip]
            .iter()
            .all(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutState {
    pub status: PaymentStatus,
    pub selected_plan_id: Option<String>,
    pub shipping: ShippingInfo,
    pub client_secret: Option<String>,
    pub subscription_id: Option<String>,
    pub payment_intent_id: Option<String>,
    /// User-facing failure message.
    pub error: Option<String>,
    pub generation: u64,
}

impl CheckoutState {
    pub fn is_processing(&self) -> bool {
        self.status == PaymentStatus::Processing
    }

    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Succeeded
    }

    /// Plan chosen and every shipping field filled in.
    pub fn can_continue(&self) -> bool {
        self.selected_plan_id.is_some() && self.shipping.is_complete()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Marks a new request in flight and returns its generation.
    pub(crate) fn begin_request(&mut self) -> u64 {
        self.generation += 1;
        self.status = PaymentStatus::Processing;
        self.error = None;
        self.generation
    }

    pub(crate) fn subscription_created(&mut self, client_secret: String, subscription_id: String) {
        self.client_secret = Some(client_secret);
        self.subscription_id = Some(subscription_id);
        self.status = PaymentStatus::Idle;
    }

    pub(crate) fn payment_confirmed(&mut self, payment_intent_id: String) {
        self.payment_intent_id = Some(payment_intent_id);
        self.status = PaymentStatus::Succeeded;
        self.error = None;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.status = PaymentStatus::Failed;
        self.error = Some(message);
    }

    /// Drops every artefact of the previous attempt; plan and shipping stay.
    pub(crate) fn reset(&mut self) {
        self.client_secret = None;
        self.subscription_id = None;
        self.payment_intent_id = None;
        self.error = None;
        self.status = PaymentStatus::Idle;
        self.generation += 1;
    }
}
