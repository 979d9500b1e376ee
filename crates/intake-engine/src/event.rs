//! Inputs to and outputs of the session reducer.

use intake_spec::{AccountField, AnswerStore, AnswerValue, StepId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::checkout::ShippingField;
use crate::gateway::SubscriptionPayload;

/// Everything that can happen to a session: host actions, timer expiry
/// and collaborator responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SetAnswer {
        key: String,
        value: AnswerValue,
    },
    /// Single-choice selection; may cascade and schedule auto-advance.
    SelectOption {
        question: String,
        value: String,
    },
    ToggleOption {
        question: String,
        option: String,
        checked: bool,
    },
    ClearAnswer {
        key: String,
    },
    SetAccountField {
        field: AccountField,
        value: String,
    },
    Next,
    Previous,
    AutoAdvanceElapsed {
        token: u64,
    },
    SelectPlan {
        plan_id: String,
    },
    SetShipping {
        field: ShippingField,
        value: String,
    },
    CreateSubscription,
    SubscriptionCreated {
        generation: u64,
        client_secret: String,
        subscription_id: String,
    },
    SubscriptionFailed {
        generation: u64,
        message: String,
    },
    ConfirmPayment,
    PaymentConfirmed {
        generation: u64,
        payment_intent_id: String,
    },
    PaymentFailed {
        generation: u64,
        message: String,
    },
    RetryPayment,
}

/// Final answers handed off once the last virtual step is passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub questionnaire_id: String,
    pub answers: AnswerStore,
    pub subscription_id: Option<String>,
    pub payment_intent_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub submitted_at: OffsetDateTime,
}

/// Why an event left the state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    #[error("step '{step}' has {count} invalid answer(s)")]
    Invalid { step: StepId, count: usize },
    #[error("step '{step}' ends the questionnaire")]
    DeadEnd { step: StepId },
    #[error("payment has not succeeded")]
    PaymentIncomplete,
    #[error("a payment request is already in flight")]
    CheckoutProcessing,
    #[error("select a plan and complete the shipping address first")]
    CheckoutIncomplete,
    #[error("plan '{plan_id}' is not offered")]
    UnknownPlan { plan_id: String },
    #[error("no subscription to confirm")]
    MissingClientSecret,
    #[error("unknown question '{question}'")]
    UnknownQuestion { question: String },
    #[error("{message}")]
    Answer { message: String },
    #[error("response for generation {generation} is stale (current {current})")]
    StaleResponse { generation: u64, current: u64 },
    #[error("auto-advance token {token} is no longer current")]
    StaleTimer { token: u64 },
    #[error("step '{step}' still has questions to answer; waiting for Next")]
    AutoAdvanceSkipped { step: StepId },
    #[error("payment already succeeded")]
    AlreadyPaid,
    #[error("the questionnaire was already submitted")]
    AlreadyCompleted,
}

/// Work the session driver performs on behalf of the reducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    ScheduleAutoAdvance { token: u64, delay_ms: u64 },
    CancelAutoAdvance,
    CreateSubscription {
        generation: u64,
        payload: SubscriptionPayload,
    },
    ConfirmPayment {
        generation: u64,
        client_secret: String,
    },
    Submit(Submission),
    Rejected(Rejection),
}
