use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::spec::{AnswerType, Questionnaire};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Authoring problem found in a questionnaire definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LintIssue {
    pub severity: Severity,
    pub path: String,
    pub message: String,
}

impl LintIssue {
    fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Structural checks a questionnaire source should pass before a session
/// is started. Malformed conditions are warnings since evaluation fails open.
pub fn lint(questionnaire: &Questionnaire) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    let mut step_ids = BTreeSet::new();
    let mut question_ids = BTreeSet::new();

    if questionnaire.checkout_step_position < -1 {
        issues.push(LintIssue::error(
            "checkoutStepPosition",
            format!(
                "position {} is invalid; use -1 to append",
                questionnaire.checkout_step_position
            ),
        ));
    } else if questionnaire.checkout_step_position as i64 > questionnaire.steps.len() as i64 {
        issues.push(LintIssue::warning(
            "checkoutStepPosition",
            "position is past the last step and will be clamped",
        ));
    }

    for step in &questionnaire.steps {
        let step_path = format!("steps.{}", step.id);
        if !step_ids.insert(step.id.as_str()) {
            issues.push(LintIssue::error(&step_path, "duplicate step id"));
        }
        if let Some(expr) = &step.conditional_logic
            && let Err(err) = Condition::parse(expr)
        {
            issues.push(LintIssue::warning(
                format!("{step_path}.conditionalLogic"),
                err.to_string(),
            ));
        }
        if !step.questions.is_empty() && step.root_question().is_none() {
            issues.push(LintIssue::warning(
                &step_path,
                "no root question (level 0 or unlevelled); conditions will never match",
            ));
        }

        let mut orders = BTreeSet::new();
        for question in &step.questions {
            let question_path = format!("{step_path}.questions.{}", question.id);
            if !question_ids.insert(question.id.as_str()) {
                issues.push(LintIssue::error(&question_path, "duplicate question id"));
            }
            if !orders.insert(question.question_order) {
                issues.push(LintIssue::warning(
                    &question_path,
                    format!("questionOrder {} repeats within the step", question.question_order),
                ));
            }
            if let Some(expr) = &question.conditional_logic
                && let Err(err) = Condition::parse(expr)
            {
                issues.push(LintIssue::warning(
                    format!("{question_path}.conditionalLogic"),
                    err.to_string(),
                ));
            }
            let needs_options = matches!(
                question.answer_type,
                AnswerType::Radio | AnswerType::Checkbox | AnswerType::Select
            );
            if needs_options && question.options.is_empty() {
                issues.push(LintIssue::error(
                    &question_path,
                    "choice question has no options",
                ));
            }
            let mut values = BTreeSet::new();
            for option in &question.options {
                if !values.insert(option.option_value.as_str()) {
                    issues.push(LintIssue::error(
                        format!("{question_path}.options.{}", option.id),
                        "duplicate option value",
                    ));
                }
            }
        }
    }

    issues
}

pub fn has_errors(issues: &[LintIssue]) -> bool {
    issues
        .iter()
        .any(|issue| issue.severity == Severity::Error)
}
