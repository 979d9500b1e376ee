//! Conditional expression mini-language used by steps and questions.
//!
//! Two forms are accepted:
//!
//! * legacy `question:<order>,answer:<value>`, resolved against the question
//!   with that `questionOrder` in the same step;
//! * `answer_equals:<value>` clauses joined by `AND` / `OR`, compared against
//!   the step's root question. In a step's own condition a clause may be
//!   qualified as `answer_equals:<questionId>:<value>` to name its question;
//!   question conditions always compare against the root.
//!
//! Chains are folded strictly left to right: `a OR b AND c` is `(a OR b) AND c`.
//! There is no operator precedence and no grouping.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::answers::AnswerStore;
use crate::spec::{QuestionSpec, Questionnaire, StepSpec};

const CLAUSE_PREFIX: &str = "answer_equals:";
const LEGACY_PREFIX: &str = "question:";

static LEGACY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^question:\s*([^,\s]+)\s*,\s*answer:(.*)$").expect("legacy condition pattern")
});

/// Reasons a conditional expression could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("unrecognised clause '{0}'")]
    UnknownClause(String),
    #[error("clause '{0}' has no value")]
    EmptyValue(String),
    #[error("operator '{0}' has no left-hand clause")]
    MissingLeftOperand(String),
    #[error("operator '{0}' has no right-hand clause")]
    MissingRightOperand(String),
    #[error("legacy question order '{0}' is not a number")]
    LegacyOrder(String),
    #[error("legacy condition '{0}' is malformed")]
    LegacyShape(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "AND" => Some(Connective::And),
            "OR" => Some(Connective::Or),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
        }
    }
}

/// Single `answer_equals:` clause; `body` is everything after the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    body: String,
}

/// What a clause compares against once resolved in a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseTarget<'a> {
    Root { value: &'a str },
    Question { id: &'a str, value: &'a str },
}

impl ClauseTarget<'_> {
    pub fn value(&self) -> &str {
        match self {
            ClauseTarget::Root { value } | ClauseTarget::Question { value, .. } => value,
        }
    }
}

impl Clause {
    fn parse(text: &str) -> Result<Self, ConditionError> {
        let body = text
            .strip_prefix(CLAUSE_PREFIX)
            .ok_or_else(|| ConditionError::UnknownClause(text.to_string()))?;
        if body.trim().is_empty() {
            return Err(ConditionError::EmptyValue(text.to_string()));
        }
        Ok(Self {
            body: body.to_string(),
        })
    }

    /// Splits off a question id when the scope accepts qualified clauses and
    /// the head of the body names a known question.
    pub fn target<'a>(&'a self, scope: &Scope<'_>) -> ClauseTarget<'a> {
        if scope.qualified
            && let Some((head, value)) = self.body.split_once(':')
            && !head.is_empty()
            && !value.is_empty()
            && !head.contains(char::is_whitespace)
            && scope.is_question(head)
        {
            return ClauseTarget::Question { id: head, value };
        }
        ClauseTarget::Root { value: &self.body }
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        match self.target(&ctx.scope) {
            ClauseTarget::Root { value } => ctx
                .scope
                .step
                .root_question()
                .and_then(|root| ctx.answers.get(&root.id))
                .is_some_and(|answer| answer.matches(value)),
            ClauseTarget::Question { id, value } => ctx
                .answers
                .get(id)
                .is_some_and(|answer| answer.matches(value)),
        }
    }

    fn references(&self, question: &QuestionSpec, scope: &Scope<'_>) -> bool {
        match self.target(scope) {
            ClauseTarget::Root { .. } => scope
                .step
                .root_question()
                .is_some_and(|root| root.id == question.id),
            ClauseTarget::Question { id, .. } => id == question.id,
        }
    }
}

/// Parsed conditional expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// No expression: always satisfied.
    Always,
    Legacy {
        order: u32,
        value: String,
    },
    Chain {
        first: Clause,
        rest: Vec<(Connective, Clause)>,
    },
}

impl Condition {
    pub fn parse(raw: &str) -> Result<Self, ConditionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Condition::Always);
        }
        if trimmed.starts_with(LEGACY_PREFIX) {
            return parse_legacy(trimmed);
        }

        let tokens = trimmed.split_whitespace().collect::<Vec<_>>();
        if !tokens
            .iter()
            .any(|token| Connective::from_token(token).is_some())
        {
            return Ok(Condition::Chain {
                first: Clause::parse(trimmed)?,
                rest: Vec::new(),
            });
        }

        let mut clauses = Vec::new();
        let mut connectives = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for token in tokens {
            match Connective::from_token(token) {
                Some(connective) => {
                    if pending.is_empty() {
                        return Err(ConditionError::MissingLeftOperand(
                            connective.as_str().to_string(),
                        ));
                    }
                    clauses.push(Clause::parse(&pending.join(" "))?);
                    pending.clear();
                    connectives.push(connective);
                }
                None => pending.push(token),
            }
        }
        if pending.is_empty() {
            let last = connectives.last().map(Connective::as_str).unwrap_or("AND");
            return Err(ConditionError::MissingRightOperand(last.to_string()));
        }
        clauses.push(Clause::parse(&pending.join(" "))?);

        let mut clauses = clauses.into_iter();
        let Some(first) = clauses.next() else {
            return Ok(Condition::Always);
        };
        Ok(Condition::Chain {
            first,
            rest: connectives.into_iter().zip(clauses).collect(),
        })
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            Condition::Always => true,
            Condition::Legacy { order, value } => ctx
                .scope
                .step
                .question_by_order(*order)
                .and_then(|question| ctx.answers.get(&question.id))
                .is_some_and(|answer| answer.matches(value)),
            Condition::Chain { first, rest } => {
                rest.iter()
                    .fold(first.evaluate(ctx), |acc, (connective, clause)| {
                        let rhs = clause.evaluate(ctx);
                        match connective {
                            Connective::And => acc && rhs,
                            Connective::Or => acc || rhs,
                        }
                    })
            }
        }
    }

    /// Whether the outcome of this condition depends on `question`'s answer.
    pub fn references(&self, question: &QuestionSpec, scope: &Scope<'_>) -> bool {
        match self {
            Condition::Always => false,
            Condition::Legacy { order, .. } => *order == question.question_order,
            Condition::Chain { first, rest } => {
                first.references(question, scope)
                    || rest
                        .iter()
                        .any(|(_, clause)| clause.references(question, scope))
            }
        }
    }

    /// `(rootOrder, requiredValue)` grouping key used to order sibling questions.
    pub fn group_key(&self, scope: &Scope<'_>) -> Option<(u32, String)> {
        match self {
            Condition::Always => None,
            Condition::Legacy { order, value } => Some((*order, value.clone())),
            Condition::Chain { first, .. } => {
                let target = first.target(scope);
                let anchor = match target {
                    ClauseTarget::Root { .. } => scope.step.root_question(),
                    ClauseTarget::Question { id, .. } => scope.step.question(id),
                };
                anchor.map(|question| (question.question_order, target.value().to_string()))
            }
        }
    }
}

fn parse_legacy(text: &str) -> Result<Condition, ConditionError> {
    let captures = LEGACY_PATTERN
        .captures(text)
        .ok_or_else(|| ConditionError::LegacyShape(text.to_string()))?;
    let order_text = &captures[1];
    let order = order_text
        .parse::<u32>()
        .map_err(|_| ConditionError::LegacyOrder(order_text.to_string()))?;
    let value = captures[2].trim();
    if value.is_empty() {
        return Err(ConditionError::EmptyValue(text.to_string()));
    }
    Ok(Condition::Legacy {
        order,
        value: value.to_string(),
    })
}

/// Step (and optionally questionnaire) a condition is resolved within.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub step: &'a StepSpec,
    pub questionnaire: Option<&'a Questionnaire>,
    /// Whether `answer_equals:<questionId>:<value>` names a question.
    pub qualified: bool,
}

impl<'a> Scope<'a> {
    /// Scope of a question condition: clauses always target the root question.
    pub fn new(step: &'a StepSpec) -> Self {
        Self {
            step,
            questionnaire: None,
            qualified: false,
        }
    }

    /// Scope of a step's own condition. Qualified clauses may name any
    /// question of the questionnaire.
    pub fn for_step(step: &'a StepSpec, questionnaire: &'a Questionnaire) -> Self {
        Self {
            step,
            questionnaire: Some(questionnaire),
            qualified: true,
        }
    }

    pub fn is_question(&self, id: &str) -> bool {
        self.step.question(id).is_some()
            || self
                .questionnaire
                .is_some_and(|questionnaire| questionnaire.has_question(id))
    }
}

/// Everything needed to evaluate a condition.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub scope: Scope<'a>,
    pub answers: &'a AnswerStore,
}

impl<'a> EvalContext<'a> {
    pub fn new(scope: Scope<'a>, answers: &'a AnswerStore) -> Self {
        Self { scope, answers }
    }
}

/// Evaluates an optional expression, failing open on parse errors.
pub fn evaluate(expr: Option<&str>, ctx: &EvalContext<'_>) -> bool {
    let Some(raw) = expr else {
        return true;
    };
    match Condition::parse(raw) {
        Ok(condition) => condition.evaluate(ctx),
        Err(err) => {
            tracing::warn!(
                step = %ctx.scope.step.id,
                expression = raw,
                error = %err,
                "conditional expression is malformed; treating it as satisfied"
            );
            true
        }
    }
}

/// Parses an expression for structural queries; malformed input yields `None`.
pub fn parse_lenient(expr: Option<&str>) -> Option<Condition> {
    let raw = expr?;
    match Condition::parse(raw) {
        Ok(Condition::Always) => None,
        Ok(condition) => Some(condition),
        Err(err) => {
            tracing::debug!(expression = raw, error = %err, "skipping malformed condition");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::AnswerValue;
    use crate::spec::AnswerType;

    fn question(id: &str, order: u32, level: Option<u32>, logic: Option<&str>) -> QuestionSpec {
        QuestionSpec {
            id: id.into(),
            question_text: id.into(),
            answer_type: AnswerType::Radio,
            is_required: true,
            question_order: order,
            options: Vec::new(),
            conditional_logic: logic.map(str::to_string),
            conditional_level: level,
            sub_question_order: None,
            placeholder: None,
            constraint: None,
        }
    }

    fn step() -> StepSpec {
        StepSpec {
            id: "history".into(),
            title: "History".into(),
            description: None,
            kind: Default::default(),
            questions: vec![
                question("smoker", 1, Some(0), None),
                question("packs", 2, Some(1), Some("answer_equals:yes")),
                question("other", 3, None, None),
            ],
            conditional_logic: None,
            required: None,
            is_dead_end: false,
        }
    }

    fn store(pairs: &[(&str, AnswerValue)]) -> AnswerStore {
        let mut store = AnswerStore::default();
        for (key, value) in pairs {
            store
                .set_answer(key, value.clone())
                .expect("plain answers are accepted");
        }
        store
    }

    fn text(value: &str) -> AnswerValue {
        AnswerValue::Text(value.into())
    }

    #[test]
    fn empty_expression_is_always() {
        assert_eq!(Condition::parse("").unwrap(), Condition::Always);
        assert_eq!(Condition::parse("   ").unwrap(), Condition::Always);
    }

    #[test]
    fn unqualified_clause_compares_root_answer() {
        let step = step();
        let answers = store(&[("smoker", text("yes"))]);
        let ctx = EvalContext::new(Scope::new(&step), &answers);
        assert!(evaluate(Some("answer_equals:yes"), &ctx));
        assert!(!evaluate(Some("answer_equals:no"), &ctx));
    }

    #[test]
    fn clause_matches_array_membership() {
        let step = step();
        let answers = store(&[(
            "smoker",
            AnswerValue::Multi(vec!["cigars".into(), "pipes".into()]),
        )]);
        let ctx = EvalContext::new(Scope::new(&step), &answers);
        assert!(evaluate(Some("answer_equals:pipes"), &ctx));
        assert!(!evaluate(Some("answer_equals:vapes"), &ctx));
    }

    fn questionnaire(step: &StepSpec) -> Questionnaire {
        Questionnaire {
            id: "intake".into(),
            title: String::new(),
            treatment_id: None,
            steps: vec![step.clone()],
            checkout_step_position: -1,
            theme_color: None,
        }
    }

    #[test]
    fn qualified_clause_names_its_question_in_step_scope() {
        let step = step();
        let questionnaire = questionnaire(&step);
        let answers = store(&[("smoker", text("no")), ("other", text("x"))]);
        let ctx = EvalContext::new(Scope::for_step(&step, &questionnaire), &answers);
        assert!(evaluate(Some("answer_equals:other:x"), &ctx));
        assert!(!evaluate(Some("answer_equals:smoker:yes"), &ctx));
    }

    #[test]
    fn question_scope_compares_whole_body_with_root() {
        let step = step();
        let answers = store(&[("smoker", text("other:x")), ("other", text("x"))]);
        let ctx = EvalContext::new(Scope::new(&step), &answers);
        assert!(evaluate(Some("answer_equals:other:x"), &ctx));

        let answers = store(&[("smoker", text("no")), ("other", text("x"))]);
        let ctx = EvalContext::new(Scope::new(&step), &answers);
        assert!(!evaluate(Some("answer_equals:other:x"), &ctx));

        let clause = Condition::parse("answer_equals:other:x").unwrap();
        let scope = Scope::new(&step);
        let smoker = step.question("smoker").unwrap();
        assert!(clause.references(smoker, &scope));
        assert_eq!(clause.group_key(&scope), Some((1, "other:x".to_string())));
    }

    #[test]
    fn unknown_head_keeps_colon_in_value() {
        let step = step();
        let answers = store(&[("smoker", text("time:10am"))]);
        let ctx = EvalContext::new(Scope::new(&step), &answers);
        assert!(evaluate(Some("answer_equals:time:10am"), &ctx));
    }

    #[test]
    fn chain_folds_left_to_right_without_precedence() {
        let step = step();
        // a=true, b=false, c=false.
        let answers = store(&[("smoker", text("a"))]);
        let ctx = EvalContext::new(Scope::new(&step), &answers);
        let expr = "answer_equals:a OR answer_equals:b AND answer_equals:c";
        // (a OR b) AND c = false; standard precedence would give true.
        assert!(!evaluate(Some(expr), &ctx));
        let expr = "answer_equals:c AND answer_equals:b OR answer_equals:a";
        assert!(evaluate(Some(expr), &ctx));
    }

    #[test]
    fn values_with_spaces_survive_tokenization() {
        let step = step();
        let answers = store(&[("smoker", text("not sure"))]);
        let ctx = EvalContext::new(Scope::new(&step), &answers);
        assert!(evaluate(Some("answer_equals:not sure"), &ctx));
        assert!(evaluate(
            Some("answer_equals:yes OR answer_equals:not sure"),
            &ctx
        ));
    }

    #[test]
    fn legacy_form_resolves_question_order() {
        let step = step();
        let answers = store(&[("packs", text("2"))]);
        let ctx = EvalContext::new(Scope::new(&step), &answers);
        assert!(evaluate(Some("question:2,answer:2"), &ctx));
        assert!(!evaluate(Some("question:2,answer:3"), &ctx));
        assert!(!evaluate(Some("question:9,answer:2"), &ctx));
    }

    #[test]
    fn malformed_expressions_fail_open() {
        let step = step();
        let answers = AnswerStore::default();
        let ctx = EvalContext::new(Scope::new(&step), &answers);
        for expr in [
            "garbage",
            "AND answer_equals:x",
            "answer_equals:x OR",
            "answer_equals:",
            "question:abc,answer:x",
            "question:1",
        ] {
            assert!(Condition::parse(expr).is_err(), "{expr} should not parse");
            assert!(evaluate(Some(expr), &ctx), "{expr} should fail open");
        }
    }

    #[test]
    fn references_track_root_and_legacy_orders() {
        let step = step();
        let scope = Scope::new(&step);
        let smoker = step.question("smoker").unwrap();
        let packs = step.question("packs").unwrap();
        let implicit = Condition::parse("answer_equals:yes").unwrap();
        assert!(implicit.references(smoker, &scope));
        assert!(!implicit.references(packs, &scope));
        let legacy = Condition::parse("question:2,answer:1").unwrap();
        assert!(legacy.references(packs, &scope));
        assert_eq!(legacy.group_key(&scope), Some((2, "1".to_string())));
        assert_eq!(implicit.group_key(&scope), Some((1, "yes".to_string())));
    }
}
