use std::collections::{BTreeMap, BTreeSet};

use intake_spec::{
    AccountField, AnswerStore, AnswerValue, Questionnaire, visible_questions, visible_steps,
};
use uuid::Uuid;

use crate::checkout::ShippingInfo;
use crate::gateway::{Customer, PlanOption, SubscriptionPayload};

pub(crate) struct PayloadInput<'a> {
    pub questionnaire: &'a Questionnaire,
    pub answers: &'a AnswerStore,
    pub plan: &'a PlanOption,
    pub shipping: &'a ShippingInfo,
    pub currency: &'a str,
}

pub(crate) fn build_payload(input: PayloadInput<'_>) -> SubscriptionPayload {
    let PayloadInput {
        questionnaire,
        answers,
        plan,
        shipping,
        currency,
    } = input;
    SubscriptionPayload {
        idempotency_key: Uuid::new_v4(),
        questionnaire_id: questionnaire.id.clone(),
        treatment_id: questionnaire.treatment_id.clone(),
        plan_id: plan.id.clone(),
        price_ref: plan.price_ref.clone(),
        currency: currency.to_string(),
        customer: customer(answers),
        answers: flatten_answers(questionnaire, answers),
        shipping: shipping.clone(),
    }
}

fn customer(answers: &AnswerStore) -> Customer {
    let field = |field: AccountField| answers.text(field.key()).unwrap_or_default().to_string();
    Customer {
        first_name: field(AccountField::FirstName),
        last_name: field(AccountField::LastName),
        email: field(AccountField::Email),
        mobile: field(AccountField::Mobile),
    }
}

/// One string per answered key. Choice answers carry the option text the
/// patient saw; account fields travel in [`Customer`] instead. Answers to
/// questions that are hidden under the current answers are left out.
pub fn flatten_answers(
    questionnaire: &Questionnaire,
    answers: &AnswerStore,
) -> BTreeMap<String, String> {
    let account_keys = AccountField::ALL.map(|field| field.key());
    let visible = visible_steps(questionnaire, answers)
        .into_iter()
        .flat_map(|step| visible_questions(step, answers))
        .map(|question| question.id.as_str())
        .collect::<BTreeSet<_>>();
    answers
        .iter()
        .filter(|(key, _)| !account_keys.contains(&key.as_str()))
        .filter(|(_, value)| !value.is_empty())
        .filter_map(|(key, value)| match questionnaire.find_question(key) {
            Some((_, question)) if !visible.contains(question.id.as_str()) => None,
            Some((_, question)) => Some((key, value, Some(question))),
            None => Some((key, value, None)),
        })
        .map(|(key, value, question)| {
            let question = question.filter(|question| question.answer_type.is_choice());
            let text = match (value, question) {
                (AnswerValue::Text(text), Some(question)) => {
                    question.option_text(text).to_string()
                }
                (AnswerValue::Multi(values), Some(question)) => values
                    .iter()
                    .map(|value| question.option_text(value))
                    .collect::<Vec<_>>()
                    .join(", "),
                (AnswerValue::Text(text), None) => text.clone(),
                (AnswerValue::Multi(values), None) => values.join(", "),
                (AnswerValue::Height { feet, inches }, _) => format!("{feet}'{inches}\""),
            };
            (key.clone(), text)
        })
        .collect()
}
