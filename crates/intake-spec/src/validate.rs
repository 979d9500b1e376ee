use std::collections::BTreeMap;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::Date;
use time::format_description;

use crate::answers::{AnswerStore, AnswerValue};
use crate::spec::{AnswerType, Constraint, QuestionSpec, StepKind, StepSpec};
use crate::visibility::visible_questions;

/// Validation error reported for a single question or answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationError {
    pub message: String,
    pub code: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
        }
    }

    fn required() -> Self {
        Self::new("This field is required", "required")
    }
}

/// Per-key errors for the step being validated.
pub type ErrorMap = BTreeMap<String, ValidationError>;

/// Declarative check applied to an answer key by step kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldCheck {
    Required,
    /// Required unless the named key holds an answer.
    RequiredUnless(&'static str),
    EmailShape,
    Range { min: f64, max: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRule {
    pub field: &'static str,
    pub check: FieldCheck,
}

const fn rule(field: &'static str, check: FieldCheck) -> FieldRule {
    FieldRule { field, check }
}

const ACCOUNT_RULES: &[FieldRule] = &[
    rule("firstName", FieldCheck::Required),
    rule("lastName", FieldCheck::Required),
    rule("email", FieldCheck::Required),
    rule("email", FieldCheck::EmailShape),
    rule("mobile", FieldCheck::Required),
];

const BODY_RULES: &[FieldRule] = &[
    rule("weight", FieldCheck::Required),
    rule(
        "weight",
        FieldCheck::Range {
            min: 50.0,
            max: 1000.0,
        },
    ),
    rule("heightFeet", FieldCheck::RequiredUnless("height")),
    rule("heightFeet", FieldCheck::Range { min: 1.0, max: 10.0 }),
    rule("heightInches", FieldCheck::RequiredUnless("height")),
    rule("heightInches", FieldCheck::Range { min: 0.0, max: 11.0 }),
];

/// Domain rules attached to a step kind.
pub fn rules_for(kind: StepKind) -> &'static [FieldRule] {
    match kind {
        StepKind::Standard => &[],
        StepKind::AccountCreation => ACCOUNT_RULES,
        StepKind::BodyMeasurements => BODY_RULES,
    }
}

/// Validates the visible questions of a step plus the step kind's domain rules.
/// Hidden questions are never reported.
pub fn validate_step(step: &StepSpec, answers: &AnswerStore) -> ErrorMap {
    let enforce_required = step.enforces_required();
    let mut errors = ErrorMap::new();

    for question in visible_questions(step, answers) {
        let required = enforce_required && question.is_required;
        match answers.get(&question.id) {
            Some(value) if !value.is_empty() => {
                if let Some(error) = validate_value(question, value) {
                    errors.insert(question.id.clone(), error);
                }
            }
            _ => {
                if required {
                    errors.insert(question.id.clone(), ValidationError::required());
                }
            }
        }
    }

    for rule in rules_for(step.kind) {
        if errors.contains_key(rule.field) {
            continue;
        }
        if let Some(error) = apply_rule(rule, answers, enforce_required) {
            errors.insert(rule.field.to_string(), error);
        }
    }

    errors
}

fn apply_rule(rule: &FieldRule, answers: &AnswerStore, enforce_required: bool) -> Option<ValidationError> {
    let value = answers.get(rule.field).filter(|value| !value.is_empty());
    match rule.check {
        FieldCheck::Required => {
            (enforce_required && value.is_none()).then(ValidationError::required)
        }
        FieldCheck::RequiredUnless(other) => {
            let covered = answers.get(other).is_some_and(|value| !value.is_empty());
            (enforce_required && value.is_none() && !covered).then(ValidationError::required)
        }
        FieldCheck::EmailShape => value
            .filter(|value| !looks_like_email(value))
            .map(|_| invalid_email()),
        FieldCheck::Range { min, max } => {
            let value = value?;
            match value.as_number() {
                None => Some(not_a_number()),
                Some(number) if number < min || number > max => Some(ValidationError::new(
                    format!("Must be between {min} and {max}"),
                    "out_of_range",
                )),
                Some(_) => None,
            }
        }
    }
}

fn validate_value(question: &QuestionSpec, value: &AnswerValue) -> Option<ValidationError> {
    let shape_error = match question.answer_type {
        AnswerType::Text | AnswerType::Textarea | AnswerType::Phone => None,
        AnswerType::Email => (!looks_like_email(value)).then(invalid_email),
        AnswerType::Number | AnswerType::Weight => {
            value.as_number().is_none().then(not_a_number)
        }
        AnswerType::Date => {
            let valid = value.as_text().is_some_and(is_iso_date);
            (!valid).then(|| ValidationError::new("Enter a date as YYYY-MM-DD", "invalid_date"))
        }
        AnswerType::Height => validate_height(value),
        AnswerType::Radio | AnswerType::Select => match value {
            AnswerValue::Text(text) => unknown_option(question, std::slice::from_ref(text)),
            AnswerValue::Multi(_) | AnswerValue::Height { .. } => Some(type_mismatch()),
        },
        AnswerType::Checkbox => match value {
            AnswerValue::Multi(values) => unknown_option(question, values),
            AnswerValue::Text(text) => unknown_option(question, std::slice::from_ref(text)),
            AnswerValue::Height { .. } => Some(type_mismatch()),
        },
    };
    if shape_error.is_some() {
        return shape_error;
    }

    question
        .constraint
        .as_ref()
        .and_then(|constraint| enforce_constraint(value, constraint))
}

fn validate_height(value: &AnswerValue) -> Option<ValidationError> {
    match value {
        AnswerValue::Height { feet, inches } => {
            if !(1.0..=10.0).contains(feet) {
                Some(ValidationError::new(
                    "Feet must be between 1 and 10",
                    "out_of_range",
                ))
            } else if !(0.0..=11.0).contains(inches) {
                Some(ValidationError::new(
                    "Inches must be between 0 and 11",
                    "out_of_range",
                ))
            } else {
                None
            }
        }
        AnswerValue::Text(_) | AnswerValue::Multi(_) => Some(type_mismatch()),
    }
}

fn unknown_option(question: &QuestionSpec, values: &[String]) -> Option<ValidationError> {
    if question.options.is_empty() {
        return None;
    }
    values
        .iter()
        .any(|value| question.option_by_value(value).is_none())
        .then(|| ValidationError::new("Select one of the listed options", "invalid_option"))
}

fn enforce_constraint(value: &AnswerValue, constraint: &Constraint) -> Option<ValidationError> {
    if let Some(text) = value.as_text() {
        if let Some(pattern) = &constraint.pattern
            && let Ok(regex) = Regex::new(pattern)
            && !regex.is_match(text)
        {
            return Some(ValidationError::new(
                "Value does not match the expected format",
                "pattern_mismatch",
            ));
        }
        let length = text.chars().count();
        if let Some(min_len) = constraint.min_len
            && length < min_len
        {
            return Some(ValidationError::new(
                format!("Must be at least {min_len} characters"),
                "min_length",
            ));
        }
        if let Some(max_len) = constraint.max_len
            && length > max_len
        {
            return Some(ValidationError::new(
                format!("Must be at most {max_len} characters"),
                "max_length",
            ));
        }
    }

    if constraint.min.is_some() || constraint.max.is_some() {
        let Some(number) = value.as_number() else {
            return Some(not_a_number());
        };
        if let Some(min) = constraint.min
            && number < min
        {
            return Some(ValidationError::new(format!("Must be at least {min}"), "min"));
        }
        if let Some(max) = constraint.max
            && number > max
        {
            return Some(ValidationError::new(format!("Must be at most {max}"), "max"));
        }
    }

    None
}

fn looks_like_email(value: &AnswerValue) -> bool {
    value.as_text().is_some_and(|text| text.contains('@'))
}

fn is_iso_date(text: &str) -> bool {
    format_description::parse("[year]-[month]-[day]")
        .ok()
        .is_some_and(|format| Date::parse(text.trim(), &format).is_ok())
}

fn invalid_email() -> ValidationError {
    ValidationError::new("Enter a valid email address", "invalid_email")
}

fn not_a_number() -> ValidationError {
    ValidationError::new("Enter a number", "not_a_number")
}

fn type_mismatch() -> ValidationError {
    ValidationError::new("Unexpected answer shape", "type_mismatch")
}
