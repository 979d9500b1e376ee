#![allow(missing_docs)]

pub mod answers;
pub mod condition;
pub mod lint;
pub mod metrics;
pub mod progress;
pub mod spec;
pub mod template;
pub mod validate;
pub mod visibility;

pub use answers::{AccountField, AnswerError, AnswerStore, AnswerValue};
pub use condition::{Condition, ConditionError, EvalContext, Scope, evaluate};
pub use lint::{LintIssue, Severity, has_errors, lint};
pub use metrics::{BmiCategory, BmiReading, compute_bmi, derive_metrics};
pub use progress::{VirtualSequence, VirtualStep};
pub use spec::{
    AnswerType, Constraint, OptionSpec, QuestionSpec, Questionnaire, StepId, StepKind, StepSpec,
};
pub use template::{ResolutionMode, TemplateError, TemplateVars, substitute_variables};
pub use validate::{ErrorMap, FieldCheck, FieldRule, ValidationError, rules_for, validate_step};
pub use visibility::{
    VisibilityMap, is_question_visible, is_step_visible, order_questions, reveals_followups,
    visible_questions, visible_steps,
};
