use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Closed set of answer kinds a question can collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    Text,
    Email,
    Phone,
    Number,
    Date,
    Textarea,
    Radio,
    Checkbox,
    Select,
    Height,
    Weight,
}

impl AnswerType {
    /// Choice kinds store an option value that maps back to display text.
    pub fn is_choice(self) -> bool {
        match self {
            AnswerType::Radio | AnswerType::Checkbox | AnswerType::Select => true,
            AnswerType::Text
            | AnswerType::Email
            | AnswerType::Phone
            | AnswerType::Number
            | AnswerType::Date
            | AnswerType::Textarea
            | AnswerType::Height
            | AnswerType::Weight => false,
        }
    }

    /// Kinds whose answer is expected to parse as a number.
    pub fn is_numeric(self) -> bool {
        matches!(self, AnswerType::Number | AnswerType::Weight)
    }
}

/// Constraints that can be enforced per question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
}

/// Selectable option of a choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptionSpec {
    pub id: String,
    pub option_value: String,
    pub option_text: String,
    #[serde(default)]
    pub option_order: u32,
    /// "None of the above" style option that completes a checkbox question.
    #[serde(default)]
    pub is_terminal: bool,
}

/// Definition of a single question inside a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSpec {
    pub id: String,
    #[serde(default)]
    pub question_text: String,
    pub answer_type: AnswerType,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub question_order: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_logic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_question_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<Constraint>,
}

impl QuestionSpec {
    /// Level used for ordering; a missing level counts as a root question.
    pub fn level(&self) -> u32 {
        self.conditional_level.unwrap_or(0)
    }

    pub fn option_by_value(&self, value: &str) -> Option<&OptionSpec> {
        self.options
            .iter()
            .find(|option| option.option_value == value)
    }

    /// Display text for a stored option value, falling back to the raw value.
    pub fn option_text<'a>(&'a self, value: &'a str) -> &'a str {
        self.option_by_value(value)
            .map(|option| option.option_text.as_str())
            .unwrap_or(value)
    }

    pub fn has_condition(&self) -> bool {
        self.conditional_logic
            .as_deref()
            .is_some_and(|expr| !expr.trim().is_empty())
    }
}
