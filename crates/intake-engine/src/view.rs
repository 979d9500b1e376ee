use intake_spec::{AnswerType, AnswerValue, ErrorMap, OptionSpec, VirtualStep, visible_questions};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::checkout::{PaymentStatus, ShippingInfo};
use crate::gateway::PlanOption;
use crate::state::SessionState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub answer_type: AnswerType,
    pub required: bool,
    pub options: Vec<OptionSpec>,
    pub placeholder: Option<String>,
    pub value: Option<AnswerValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CurrentStep {
    Step {
        id: String,
        title: String,
        description: Option<String>,
        questions: Vec<QuestionView>,
    },
    Checkout {
        plans: Vec<PlanOption>,
    },
}

/// Checkout state as the host may show it; secrets stay in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSnapshot {
    pub status: PaymentStatus,
    pub selected_plan_id: Option<String>,
    pub shipping: ShippingInfo,
    pub error: Option<String>,
    pub can_continue: bool,
}

/// Read-only projection handed to the rendering host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub current: Option<CurrentStep>,
    pub cursor: usize,
    pub total_steps: usize,
    pub errors: ErrorMap,
    pub checkout: CheckoutSnapshot,
    pub can_submit: bool,
    pub completed: bool,
}

impl SessionView {
    pub fn from_state(state: &SessionState) -> Self {
        let sequence = state.sequence();
        let current = if state.completed {
            None
        } else {
            match sequence.get(state.cursor) {
                Some(VirtualStep::Step { id }) => state.questionnaire.step(id).map(|step| {
                    let enforce = step.enforces_required();
                    CurrentStep::Step {
                        id: step.id.clone(),
                        title: step.title.clone(),
                        description: step.description.clone(),
                        questions: visible_questions(step, &state.answers)
                            .into_iter()
                            .map(|question| QuestionView {
                                id: question.id.clone(),
                                text: question.question_text.clone(),
                                answer_type: question.answer_type,
                                required: enforce && question.is_required,
                                options: question.options.clone(),
                                placeholder: question.placeholder.clone(),
                                value: state.answers.get(&question.id).cloned(),
                            })
                            .collect(),
                    }
                }),
                Some(VirtualStep::Checkout) => Some(CurrentStep::Checkout {
                    plans: state.plans.clone(),
                }),
                None => None,
            }
        };

        let checkout = &state.checkout;
        let at_last = state.cursor == sequence.last_index();
        let can_submit = !state.completed
            && at_last
            && (!matches!(sequence.get(state.cursor), Some(VirtualStep::Checkout))
                || checkout.is_paid());

        Self {
            current,
            cursor: state.cursor,
            total_steps: sequence.len(),
            errors: state.errors.clone(),
            checkout: CheckoutSnapshot {
                status: checkout.status,
                selected_plan_id: checkout.selected_plan_id.clone(),
                shipping: checkout.shipping.clone(),
                error: checkout.error.clone(),
                can_continue: checkout.can_continue(),
            },
            can_submit,
            completed: state.completed,
        }
    }

    /// Whether the checkout continue control is enabled.
    pub fn checkout_continue_enabled(&self) -> bool {
        self.checkout.status == PaymentStatus::Succeeded
    }
}
