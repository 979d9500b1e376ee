use std::collections::{BTreeMap, BTreeSet, VecDeque};

use schemars::JsonSchema;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::condition::{Scope, parse_lenient};
use crate::metrics::{DERIVED_KEYS, METRIC_INPUT_KEYS, derive_metrics};
use crate::spec::{QuestionSpec, StepSpec};

/// Value stored for a single answer key. JSON numbers and booleans are
/// read as text, the form every input kind is stored in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(
        #[serde(deserialize_with = "text_or_scalar")]
        #[schemars(with = "String")]
        String,
    ),
    Multi(Vec<String>),
    Height { feet: f64, inches: f64 },
}

fn text_or_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(D::Error::custom(format!(
            "expected text, number or boolean, found {other}"
        ))),
    }
}

impl AnswerValue {
    pub fn text(value: impl Into<String>) -> Self {
        AnswerValue::Text(value.into())
    }

    /// Condition semantics: exact string equality, or array membership.
    pub fn matches(&self, expected: &str) -> bool {
        match self {
            AnswerValue::Text(text) => text == expected,
            AnswerValue::Multi(values) => values.iter().any(|value| value == expected),
            AnswerValue::Height { .. } => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(text) => Some(text),
            AnswerValue::Multi(_) | AnswerValue::Height { .. } => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AnswerValue::Text(text) => text.trim().parse::<f64>().ok(),
            AnswerValue::Multi(_) | AnswerValue::Height { .. } => None,
        }
    }

    /// Absent-equivalent: blank text or an empty selection.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::Multi(values) => values.is_empty(),
            AnswerValue::Height { .. } => false,
        }
    }
}

/// Account fields collected outside regular questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum AccountField {
    FirstName,
    LastName,
    Email,
    Mobile,
}

impl AccountField {
    pub const ALL: [AccountField; 4] = [
        AccountField::FirstName,
        AccountField::LastName,
        AccountField::Email,
        AccountField::Mobile,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            AccountField::FirstName => "firstName",
            AccountField::LastName => "lastName",
            AccountField::Email => "email",
            AccountField::Mobile => "mobile",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerError {
    #[error("'{0}' is derived from other answers and cannot be set directly")]
    Derived(String),
}

/// Mutable answer bag for a session. Derived metric keys are kept in sync
/// with their inputs on every mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AnswerStore {
    answers: BTreeMap<String, AnswerValue>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a JSON object, recomputing derived keys.
    pub fn from_json(value: &Value) -> Result<Self, serde_json::Error> {
        let mut raw: BTreeMap<String, AnswerValue> = serde_json::from_value(value.clone())?;
        for key in DERIVED_KEYS {
            raw.remove(*key);
        }
        let mut store = Self { answers: raw };
        store.refresh_metrics();
        Ok(store)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.answers).unwrap_or(Value::Null)
    }

    pub fn get(&self, key: &str) -> Option<&AnswerValue> {
        self.answers.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AnswerValue::as_text)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.answers.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AnswerValue)> {
        self.answers.iter()
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, AnswerValue> {
        &self.answers
    }

    pub fn set_answer(&mut self, key: &str, value: AnswerValue) -> Result<(), AnswerError> {
        ensure_writable(key)?;
        self.answers.insert(key.to_string(), value);
        if METRIC_INPUT_KEYS.contains(&key) {
            self.refresh_metrics();
        }
        Ok(())
    }

    /// Sets a single-choice answer; when the step's root answer changes, every
    /// answer transitively conditioned on it is cleared. Returns cleared keys.
    pub fn set_radio_answer(
        &mut self,
        step: &StepSpec,
        key: &str,
        value: AnswerValue,
    ) -> Result<Vec<String>, AnswerError> {
        ensure_writable(key)?;
        let changed = self.answers.get(key) != Some(&value);
        self.set_answer(key, value)?;
        if !changed || !step.is_root(key) {
            return Ok(Vec::new());
        }
        let cleared = self.clear_dependents(step, key);
        if !cleared.is_empty() {
            tracing::debug!(step = %step.id, root = key, ?cleared, "cleared dependent answers");
        }
        Ok(cleared)
    }

    pub fn toggle_checkbox_option(
        &mut self,
        key: &str,
        option: &str,
        checked: bool,
    ) -> Result<(), AnswerError> {
        ensure_writable(key)?;
        let mut values = self.selected_values(key);
        if checked {
            if !values.iter().any(|value| value == option) {
                values.push(option.to_string());
            }
        } else {
            values.retain(|value| value != option);
        }
        self.set_answer(key, AnswerValue::Multi(values))
    }

    /// Checkbox toggle honouring terminal ("none of the above") options:
    /// a terminal option is exclusive with every other option.
    pub fn toggle_choice(
        &mut self,
        question: &QuestionSpec,
        option: &str,
        checked: bool,
    ) -> Result<(), AnswerError> {
        let is_terminal = question
            .option_by_value(option)
            .is_some_and(|spec| spec.is_terminal);
        if checked && is_terminal {
            return self.set_answer(&question.id, AnswerValue::Multi(vec![option.to_string()]));
        }
        if checked {
            let terminal_values = question
                .options
                .iter()
                .filter(|spec| spec.is_terminal)
                .map(|spec| spec.option_value.as_str())
                .collect::<Vec<_>>();
            let mut values = self.selected_values(&question.id);
            values.retain(|value| !terminal_values.contains(&value.as_str()));
            self.answers
                .insert(question.id.clone(), AnswerValue::Multi(values));
        }
        self.toggle_checkbox_option(&question.id, option, checked)
    }

    pub fn set_account_field(
        &mut self,
        field: AccountField,
        value: impl Into<String>,
    ) -> Result<(), AnswerError> {
        self.set_answer(field.key(), AnswerValue::Text(value.into()))
    }

    /// Removes an answer. Derived keys cannot be removed directly.
    pub fn clear(&mut self, key: &str) -> Option<AnswerValue> {
        if DERIVED_KEYS.contains(&key) {
            return None;
        }
        let removed = self.answers.remove(key);
        if removed.is_some() && METRIC_INPUT_KEYS.contains(&key) {
            self.refresh_metrics();
        }
        removed
    }

    /// Breadth-first removal of answers whose question condition depends on
    /// `key`, directly or through another dependent.
    pub fn clear_dependents(&mut self, step: &StepSpec, key: &str) -> Vec<String> {
        let Some(origin) = step.question(key) else {
            return Vec::new();
        };
        let scope = Scope::new(step);
        let mut visited = BTreeSet::from([origin.question_order]);
        let mut queue = VecDeque::from([origin]);
        let mut cleared = Vec::new();

        while let Some(current) = queue.pop_front() {
            for candidate in &step.questions {
                if candidate.id == current.id || visited.contains(&candidate.question_order) {
                    continue;
                }
                let Some(condition) = parse_lenient(candidate.conditional_logic.as_deref())
                else {
                    continue;
                };
                if !condition.references(current, &scope) {
                    continue;
                }
                visited.insert(candidate.question_order);
                if self.answers.remove(&candidate.id).is_some() {
                    cleared.push(candidate.id.clone());
                }
                queue.push_back(candidate);
            }
        }

        if cleared
            .iter()
            .any(|id| METRIC_INPUT_KEYS.contains(&id.as_str()))
        {
            self.refresh_metrics();
        }
        cleared
    }

    fn selected_values(&self, key: &str) -> Vec<String> {
        match self.answers.get(key) {
            Some(AnswerValue::Multi(values)) => values.clone(),
            Some(AnswerValue::Text(text)) if !text.trim().is_empty() => vec![text.clone()],
            _ => Vec::new(),
        }
    }

    fn refresh_metrics(&mut self) {
        match derive_metrics(&self.answers) {
            Some(metrics) => {
                for (key, value) in metrics.entries() {
                    self.answers.insert(key.to_string(), value);
                }
            }
            None => {
                for key in DERIVED_KEYS {
                    self.answers.remove(*key);
                }
            }
        }
    }
}

fn ensure_writable(key: &str) -> Result<(), AnswerError> {
    if DERIVED_KEYS.contains(&key) {
        return Err(AnswerError::Derived(key.to_string()));
    }
    Ok(())
}
