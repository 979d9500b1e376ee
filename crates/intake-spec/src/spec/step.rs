use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::spec::question::QuestionSpec;

/// Identifier for questionnaire steps.
pub type StepId = String;

/// Tag set by the questionnaire source for steps with domain-specific rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Standard,
    AccountCreation,
    BodyMeasurements,
}

/// A page of one or more questions, optionally conditionally visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    pub id: StepId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub kind: StepKind,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_logic: Option<String>,
    /// `Some(false)` downgrades every contained question to optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default)]
    pub is_dead_end: bool,
}

impl StepSpec {
    pub fn question(&self, question_id: &str) -> Option<&QuestionSpec> {
        self.questions
            .iter()
            .find(|question| question.id == question_id)
    }

    pub fn question_by_order(&self, order: u32) -> Option<&QuestionSpec> {
        self.questions
            .iter()
            .find(|question| question.question_order == order)
    }

    /// The question other questions in the step condition upon: the level-0
    /// question, else the first question without a level.
    pub fn root_question(&self) -> Option<&QuestionSpec> {
        self.questions
            .iter()
            .find(|question| question.conditional_level == Some(0))
            .or_else(|| {
                self.questions
                    .iter()
                    .find(|question| question.conditional_level.is_none())
            })
    }

    pub fn is_root(&self, question_id: &str) -> bool {
        if let Some(question) = self.question(question_id)
            && question.conditional_level == Some(0)
        {
            return true;
        }
        self.root_question()
            .is_some_and(|root| root.id == question_id)
    }

    /// Whether required flags of contained questions are honoured.
    pub fn enforces_required(&self) -> bool {
        self.required != Some(false)
    }
}
