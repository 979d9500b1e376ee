pub mod question;
pub mod questionnaire;
pub mod step;

pub use question::{AnswerType, Constraint, OptionSpec, QuestionSpec};
pub use questionnaire::{CHECKOUT_APPEND, Questionnaire};
pub use step::{StepId, StepKind, StepSpec};
