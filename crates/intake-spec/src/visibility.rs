use std::collections::BTreeMap;

use crate::answers::AnswerStore;
use crate::condition::{EvalContext, Scope, evaluate, parse_lenient};
use crate::spec::{QuestionSpec, Questionnaire, StepSpec};

pub type VisibilityMap = BTreeMap<String, bool>;

/// Whether a step's own condition holds for the current answers.
pub fn is_step_visible(
    questionnaire: &Questionnaire,
    step: &StepSpec,
    answers: &AnswerStore,
) -> bool {
    let ctx = EvalContext::new(Scope::for_step(step, questionnaire), answers);
    evaluate(step.conditional_logic.as_deref(), &ctx)
}

/// Steps whose conditions hold, in declaration order.
pub fn visible_steps<'a>(
    questionnaire: &'a Questionnaire,
    answers: &AnswerStore,
) -> Vec<&'a StepSpec> {
    questionnaire
        .steps
        .iter()
        .filter(|step| is_step_visible(questionnaire, step, answers))
        .collect()
}

pub fn resolve_step_visibility(
    questionnaire: &Questionnaire,
    answers: &AnswerStore,
) -> VisibilityMap {
    questionnaire
        .steps
        .iter()
        .map(|step| {
            (
                step.id.clone(),
                is_step_visible(questionnaire, step, answers),
            )
        })
        .collect()
}

pub fn is_question_visible(step: &StepSpec, question: &QuestionSpec, answers: &AnswerStore) -> bool {
    let ctx = EvalContext::new(Scope::new(step), answers);
    evaluate(question.conditional_logic.as_deref(), &ctx)
}

pub fn resolve_question_visibility(step: &StepSpec, answers: &AnswerStore) -> VisibilityMap {
    step.questions
        .iter()
        .map(|question| {
            (
                question.id.clone(),
                is_question_visible(step, question, answers),
            )
        })
        .collect()
}

/// Visible questions of a step in presentation order.
pub fn visible_questions<'a>(step: &'a StepSpec, answers: &AnswerStore) -> Vec<&'a QuestionSpec> {
    order_questions(step)
        .into_iter()
        .filter(|question| is_question_visible(step, question, answers))
        .collect()
}

type GroupKey = Option<(u32, String)>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    level: u32,
    anchor: u32,
    group: GroupKey,
    within: u32,
    question_order: u32,
    id: String,
}

/// Orders every question of a step: by conditional level, then by
/// conditional group `(rootOrder, requiredValue)` anchored at the group's
/// smallest `questionOrder`, then by `subQuestionOrder` inside the group.
/// Ungrouped questions fall back to `questionOrder`.
pub fn order_questions(step: &StepSpec) -> Vec<&QuestionSpec> {
    let scope = Scope::new(step);
    let groups = step
        .questions
        .iter()
        .map(|question| {
            parse_lenient(question.conditional_logic.as_deref())
                .and_then(|condition| condition.group_key(&scope))
        })
        .collect::<Vec<GroupKey>>();

    let mut anchors: BTreeMap<(u32, &GroupKey), u32> = BTreeMap::new();
    for (question, group) in step.questions.iter().zip(&groups) {
        if group.is_none() {
            continue;
        }
        let anchor = anchors
            .entry((question.level(), group))
            .or_insert(question.question_order);
        *anchor = (*anchor).min(question.question_order);
    }

    let mut keyed = step
        .questions
        .iter()
        .zip(&groups)
        .map(|(question, group)| {
            let (anchor, within) = match group {
                Some(_) => (
                    anchors
                        .get(&(question.level(), group))
                        .copied()
                        .unwrap_or(question.question_order),
                    question
                        .sub_question_order
                        .unwrap_or(question.question_order),
                ),
                None => (question.question_order, 0),
            };
            let key = OrderKey {
                level: question.level(),
                anchor,
                group: group.clone(),
                within,
                question_order: question.question_order,
                id: question.id.clone(),
            };
            (key, question)
        })
        .collect::<Vec<_>>();
    keyed.sort_by(|(left, _), (right, _)| left.cmp(right));
    keyed.into_iter().map(|(_, question)| question).collect()
}

/// Whether the current answer to `question_id` reveals a sibling question,
/// i.e. some question in the step conditions on it and is now visible.
pub fn reveals_followups(step: &StepSpec, answers: &AnswerStore, question_id: &str) -> bool {
    let Some(origin) = step.question(question_id) else {
        return false;
    };
    let scope = Scope::new(step);
    let ctx = EvalContext::new(scope, answers);
    step.questions
        .iter()
        .filter(|candidate| candidate.id != origin.id)
        .filter_map(|candidate| parse_lenient(candidate.conditional_logic.as_deref()))
        .any(|condition| condition.references(origin, &scope) && condition.evaluate(&ctx))
}
