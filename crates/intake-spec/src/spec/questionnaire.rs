use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::spec::question::QuestionSpec;
use crate::spec::step::StepSpec;

/// Sentinel for "append the checkout step after every questionnaire step".
pub const CHECKOUT_APPEND: i32 = -1;

fn default_checkout_position() -> i32 {
    CHECKOUT_APPEND
}

/// Top-level questionnaire definition, immutable for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Questionnaire {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment_id: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    #[serde(default = "default_checkout_position")]
    pub checkout_step_position: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_color: Option<String>,
}

impl Questionnaire {
    pub fn step(&self, step_id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.id == step_id)
    }

    /// Finds a question anywhere in the questionnaire, with its owning step.
    pub fn find_question(&self, question_id: &str) -> Option<(&StepSpec, &QuestionSpec)> {
        self.steps.iter().find_map(|step| {
            step.question(question_id)
                .map(|question| (step, question))
        })
    }

    pub fn has_question(&self, question_id: &str) -> bool {
        self.find_question(question_id).is_some()
    }

    /// Checkout slot inside a sequence of `visible_len` steps.
    pub fn checkout_slot(&self, visible_len: usize) -> usize {
        if self.checkout_step_position < 0 {
            return visible_len;
        }
        (self.checkout_step_position as usize).min(visible_len)
    }

    pub fn questions(&self) -> impl Iterator<Item = &QuestionSpec> {
        self.steps.iter().flat_map(|step| step.questions.iter())
    }
}
