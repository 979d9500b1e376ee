//! Pure session transitions.
//!
//! `reduce` never performs I/O. Anything that has to happen outside the
//! state (timers, gateway calls, submission) is returned as an [`Effect`]
//! for the session driver to carry out; collaborator results come back in as
//! further events.

use std::sync::Arc;

use intake_spec::{
    AccountField, AnswerType, AnswerValue, StepSpec, VirtualStep, reveals_followups, validate_step,
};
use time::OffsetDateTime;

use crate::checkout::ShippingField;
use crate::config::EngineConfig;
use crate::event::{Effect, Event, Rejection, Submission};
use crate::payload::{PayloadInput, build_payload};
use crate::state::{PendingAdvance, SessionState};

pub fn reduce(
    mut state: SessionState,
    event: Event,
    config: &EngineConfig,
) -> (SessionState, Vec<Effect>) {
    let effects = apply(&mut state, event, config);
    (state, effects)
}

/// In-place form of [`reduce`] used by the session driver.
pub fn apply(state: &mut SessionState, event: Event, config: &EngineConfig) -> Vec<Effect> {
    let mut reducer = Reducer {
        state,
        config,
        effects: Vec::new(),
    };
    reducer.apply(event);
    reducer.effects
}

struct Reducer<'a> {
    state: &'a mut SessionState,
    config: &'a EngineConfig,
    effects: Vec<Effect>,
}

impl Reducer<'_> {
    fn apply(&mut self, event: Event) {
        if self.state.completed && !is_response(&event) {
            self.reject(Rejection::AlreadyCompleted);
            return;
        }
        match event {
            Event::SetAnswer { key, value } => self.set_answer(&key, value),
            Event::SelectOption { question, value } => self.select_option(&question, value),
            Event::ToggleOption {
                question,
                option,
                checked,
            } => self.toggle_option(&question, &option, checked),
            Event::ClearAnswer { key } => self.clear_answer(&key),
            Event::SetAccountField { field, value } => self.set_account_field(field, value),
            Event::Next => {
                self.cancel_pending();
                self.next();
            }
            Event::Previous => self.previous(),
            Event::AutoAdvanceElapsed { token } => self.auto_advance_elapsed(token),
            Event::SelectPlan { plan_id } => self.select_plan(plan_id),
            Event::SetShipping { field, value } => self.set_shipping(field, value),
            Event::CreateSubscription => self.create_subscription(),
            Event::SubscriptionCreated {
                generation,
                client_secret,
                subscription_id,
            } => {
                if self.accept_response(generation) {
                    tracing::info!(generation, %subscription_id, "subscription created");
                    self.state
                        .checkout
                        .subscription_created(client_secret, subscription_id);
                }
            }
            Event::SubscriptionFailed {
                generation,
                message,
            } => {
                if self.accept_response(generation) {
                    tracing::warn!(generation, %message, "subscription failed");
                    self.state.checkout.fail(message);
                }
            }
            Event::ConfirmPayment => self.confirm_payment(),
            Event::PaymentConfirmed {
                generation,
                payment_intent_id,
            } => {
                if self.accept_response(generation) {
                    tracing::info!(generation, %payment_intent_id, "payment confirmed");
                    self.state.checkout.payment_confirmed(payment_intent_id);
                }
            }
            Event::PaymentFailed {
                generation,
                message,
            } => {
                if self.accept_response(generation) {
                    tracing::warn!(generation, %message, "payment failed");
                    self.state.checkout.fail(message);
                }
            }
            Event::RetryPayment => self.retry_payment(),
        }
    }

    fn reject(&mut self, rejection: Rejection) {
        tracing::debug!(%rejection, "event rejected");
        self.effects.push(Effect::Rejected(rejection));
    }

    // Answers

    fn set_answer(&mut self, key: &str, value: AnswerValue) {
        if let Err(err) = self.state.answers.set_answer(key, value) {
            self.reject(Rejection::Answer {
                message: err.to_string(),
            });
            return;
        }
        self.answers_changed(&[key.to_string()]);
    }

    fn select_option(&mut self, question_id: &str, value: String) {
        let questionnaire = Arc::clone(&self.state.questionnaire);
        let Some((step, question)) = questionnaire.find_question(question_id) else {
            self.reject(Rejection::UnknownQuestion {
                question: question_id.to_string(),
            });
            return;
        };
        let answer = AnswerValue::Text(value);
        let mut changed = match self
            .state
            .answers
            .set_radio_answer(step, &question.id, answer.clone())
        {
            Ok(cleared) => cleared,
            Err(err) => {
                self.reject(Rejection::Answer {
                    message: err.to_string(),
                });
                return;
            }
        };
        changed.insert(0, question.id.clone());
        self.answers_changed(&changed);
        if question.answer_type == AnswerType::Radio {
            self.schedule_auto_advance(step, &question.id, answer);
        }
    }

    fn toggle_option(&mut self, question_id: &str, option: &str, checked: bool) {
        let questionnaire = Arc::clone(&self.state.questionnaire);
        let Some((step, question)) = questionnaire.find_question(question_id) else {
            self.reject(Rejection::UnknownQuestion {
                question: question_id.to_string(),
            });
            return;
        };
        if let Err(err) = self.state.answers.toggle_choice(question, option, checked) {
            self.reject(Rejection::Answer {
                message: err.to_string(),
            });
            return;
        }
        self.answers_changed(&[question.id.clone()]);

        let terminal = question
            .option_by_value(option)
            .is_some_and(|spec| spec.is_terminal);
        if checked
            && terminal
            && question.answer_type == AnswerType::Checkbox
            && let Some(answer) = self.state.answers.get(&question.id).cloned()
        {
            self.schedule_auto_advance(step, &question.id, answer);
        }
    }

    fn clear_answer(&mut self, key: &str) {
        if self.state.answers.clear(key).is_some() {
            self.answers_changed(&[key.to_string()]);
        }
    }

    fn set_account_field(&mut self, field: AccountField, value: String) {
        if let Err(err) = self.state.answers.set_account_field(field, value) {
            self.reject(Rejection::Answer {
                message: err.to_string(),
            });
            return;
        }
        self.answers_changed(&[field.key().to_string()]);
    }

    fn answers_changed(&mut self, keys: &[String]) {
        for key in keys {
            self.state.errors.remove(key);
        }
        self.cancel_pending();
        self.resync();
    }

    // Navigation

    /// Re-points the cursor at the anchor; a hidden anchor moves forward to
    /// the next visible step, or to checkout.
    fn resync(&mut self) {
        let sequence = self.state.sequence();
        let cursor = sequence.locate(&self.state.questionnaire, &self.state.anchor);
        let anchor = sequence
            .get(cursor)
            .cloned()
            .unwrap_or(VirtualStep::Checkout);
        if cursor != self.state.cursor || anchor != self.state.anchor {
            tracing::debug!(from = self.state.cursor, to = cursor, ?anchor, "cursor resynced");
        }
        self.state.cursor = cursor;
        self.state.anchor = anchor;
    }

    fn move_to(&mut self, cursor: usize) {
        let sequence = self.state.sequence();
        let cursor = cursor.min(sequence.last_index());
        self.state.anchor = sequence
            .get(cursor)
            .cloned()
            .unwrap_or(VirtualStep::Checkout);
        self.state.cursor = cursor;
    }

    fn next(&mut self) {
        let sequence = self.state.sequence();
        let cursor = self.state.cursor.min(sequence.last_index());
        match sequence.get(cursor) {
            Some(VirtualStep::Step { id }) => {
                let questionnaire = Arc::clone(&self.state.questionnaire);
                let Some(step) = questionnaire.step(id) else {
                    self.resync();
                    return;
                };
                if step.is_dead_end {
                    self.reject(Rejection::DeadEnd {
                        step: step.id.clone(),
                    });
                    return;
                }
                let errors = validate_step(step, &self.state.answers);
                if !errors.is_empty() {
                    let count = errors.len();
                    self.state.errors = errors;
                    self.reject(Rejection::Invalid {
                        step: step.id.clone(),
                        count,
                    });
                    return;
                }
            }
            Some(VirtualStep::Checkout) => {
                if !self.state.checkout.is_paid() {
                    self.reject(Rejection::PaymentIncomplete);
                    return;
                }
            }
            None => return,
        }

        self.state.errors.clear();
        if cursor >= sequence.last_index() {
            self.submit();
        } else {
            self.move_to(cursor + 1);
            tracing::debug!(cursor = self.state.cursor, anchor = ?self.state.anchor, "advanced");
        }
    }

    fn previous(&mut self) {
        self.cancel_pending();
        self.state.errors.clear();
        self.move_to(self.state.cursor.saturating_sub(1));
    }

    fn submit(&mut self) {
        let checkout = &self.state.checkout;
        let submission = Submission {
            questionnaire_id: self.state.questionnaire.id.clone(),
            answers: self.state.answers.clone(),
            subscription_id: checkout.subscription_id.clone(),
            payment_intent_id: checkout.payment_intent_id.clone(),
            submitted_at: OffsetDateTime::now_utc(),
        };
        self.state.completed = true;
        tracing::info!(
            questionnaire = %submission.questionnaire_id,
            answers = submission.answers.len(),
            "questionnaire submitted"
        );
        self.effects.push(Effect::Submit(submission));
    }

    // Auto-advance

    fn schedule_auto_advance(&mut self, step: &StepSpec, question_id: &str, value: AnswerValue) {
        if !self.config.auto_advance || self.state.checkout.is_processing() {
            return;
        }
        if self.state.anchor.step_id() != Some(step.id.as_str()) {
            return;
        }
        if reveals_followups(step, &self.state.answers, question_id) {
            return;
        }
        let token = self.state.issue_token();
        self.state.pending_advance = Some(PendingAdvance {
            token,
            step: step.id.clone(),
            question: question_id.to_string(),
            value,
        });
        self.effects.push(Effect::ScheduleAutoAdvance {
            token,
            delay_ms: self.config.auto_advance_debounce_ms,
        });
    }

    fn cancel_pending(&mut self) {
        if self.state.pending_advance.take().is_some() {
            self.effects.push(Effect::CancelAutoAdvance);
        }
    }

    fn auto_advance_elapsed(&mut self, token: u64) {
        let Some(pending) = self.state.pending_advance.take() else {
            self.reject(Rejection::StaleTimer { token });
            return;
        };
        if pending.token != token {
            self.state.pending_advance = Some(pending);
            self.reject(Rejection::StaleTimer { token });
            return;
        }
        if self.state.checkout.is_processing() {
            self.reject(Rejection::CheckoutProcessing);
            return;
        }
        let same_step = self.state.anchor.step_id() == Some(pending.step.as_str());
        let same_answer = self.state.answers.get(&pending.question) == Some(&pending.value);
        if !same_step || !same_answer {
            self.reject(Rejection::StaleTimer { token });
            return;
        }
        // Only a step that would pass validation advances on its own; the
        // remaining questions are left for an explicit Next.
        let questionnaire = Arc::clone(&self.state.questionnaire);
        let ready = questionnaire.step(&pending.step).is_some_and(|step| {
            !step.is_dead_end && validate_step(step, &self.state.answers).is_empty()
        });
        if !ready {
            self.reject(Rejection::AutoAdvanceSkipped { step: pending.step });
            return;
        }
        self.next();
    }

    // Checkout

    fn select_plan(&mut self, plan_id: String) {
        let checkout = &self.state.checkout;
        if checkout.is_processing() {
            self.reject(Rejection::CheckoutProcessing);
            return;
        }
        if checkout.is_paid() {
            self.reject(Rejection::AlreadyPaid);
            return;
        }
        if self.state.plan(&plan_id).is_none() {
            self.reject(Rejection::UnknownPlan { plan_id });
            return;
        }
        if checkout.selected_plan_id.as_deref() == Some(plan_id.as_str()) {
            return;
        }
        if checkout.client_secret.is_some() {
            // Subscription was created for the previous plan.
            self.state.checkout.reset();
        }
        self.state.checkout.selected_plan_id = Some(plan_id);
    }

    fn set_shipping(&mut self, field: ShippingField, value: String) {
        if self.state.checkout.is_processing() {
            self.reject(Rejection::CheckoutProcessing);
            return;
        }
        self.state.checkout.shipping.set(field, value);
    }

    fn create_subscription(&mut self) {
        let checkout = &self.state.checkout;
        if checkout.is_processing() {
            self.reject(Rejection::CheckoutProcessing);
            return;
        }
        if checkout.is_paid() {
            self.reject(Rejection::AlreadyPaid);
            return;
        }
        if !checkout.can_continue() {
            self.reject(Rejection::CheckoutIncomplete);
            return;
        }
        let plan_id = checkout.selected_plan_id.clone().unwrap_or_default();
        let Some(plan) = self.state.plan(&plan_id) else {
            self.reject(Rejection::UnknownPlan { plan_id });
            return;
        };
        let payload = build_payload(PayloadInput {
            questionnaire: &self.state.questionnaire,
            answers: &self.state.answers,
            plan,
            shipping: &checkout.shipping,
            currency: &self.config.currency,
        });

        let checkout = &mut self.state.checkout;
        checkout.client_secret = None;
        checkout.subscription_id = None;
        checkout.payment_intent_id = None;
        let generation = checkout.begin_request();
        tracing::info!(generation, plan = %payload.plan_id, "creating subscription");
        self.effects
            .push(Effect::CreateSubscription { generation, payload });
    }

    fn confirm_payment(&mut self) {
        let checkout = &mut self.state.checkout;
        if checkout.is_processing() {
            self.reject(Rejection::CheckoutProcessing);
            return;
        }
        if checkout.is_paid() {
            self.reject(Rejection::AlreadyPaid);
            return;
        }
        let Some(client_secret) = checkout.client_secret.clone() else {
            self.reject(Rejection::MissingClientSecret);
            return;
        };
        let generation = checkout.begin_request();
        self.effects.push(Effect::ConfirmPayment {
            generation,
            client_secret,
        });
    }

    fn retry_payment(&mut self) {
        if self.state.checkout.is_paid() {
            self.reject(Rejection::AlreadyPaid);
            return;
        }
        self.state.checkout.reset();
        tracing::debug!(generation = self.state.checkout.generation, "checkout reset for retry");
    }

    /// Whether a collaborator response belongs to the request in flight.
    fn accept_response(&mut self, generation: u64) -> bool {
        let current = self.state.checkout.generation;
        if self.state.checkout.is_current(generation) && self.state.checkout.is_processing() {
            return true;
        }
        tracing::warn!(generation, current, "ignoring stale checkout response");
        self.reject(Rejection::StaleResponse {
            generation,
            current,
        });
        false
    }
}

fn is_response(event: &Event) -> bool {
    matches!(
        event,
        Event::SubscriptionCreated { .. }
            | Event::SubscriptionFailed { .. }
            | Event::PaymentConfirmed { .. }
            | Event::PaymentFailed { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::PaymentStatus;
    use crate::gateway::PlanOption;
    use intake_spec::Questionnaire;
    use serde_json::json;

    fn questionnaire() -> Questionnaire {
        serde_json::from_value(json!({
            "id": "intake",
            "steps": [
                { "id": "start", "questions": [{
                    "id": "goal", "answerType": "radio", "isRequired": true,
                    "questionOrder": 1, "conditionalLevel": 0,
                    "options": [
                        { "id": "a", "optionValue": "lose", "optionText": "Lose" },
                        { "id": "b", "optionValue": "other", "optionText": "Other" }
                    ]
                }, {
                    "id": "goal-detail", "answerType": "text", "isRequired": true,
                    "questionOrder": 2, "conditionalLevel": 1,
                    "conditionalLogic": "answer_equals:other"
                }]},
                { "id": "end", "questions": [{ "id": "notes", "answerType": "text", "questionOrder": 1 }] }
            ]
        }))
        .unwrap()
    }

    fn state() -> SessionState {
        let plan = PlanOption {
            id: "monthly".into(),
            name: "Monthly".into(),
            price: 9900,
            billing_interval: "month".into(),
            features: Vec::new(),
            price_ref: "price_monthly".into(),
            treatment_id: None,
        };
        SessionState::new(Arc::new(questionnaire()), Vec::new(), vec![plan])
    }

    fn run(state: SessionState, events: Vec<Event>) -> (SessionState, Vec<Effect>) {
        let config = EngineConfig::default();
        let mut effects = Vec::new();
        let mut state = state;
        for event in events {
            let (next, mut produced) = reduce(state, event, &config);
            state = next;
            effects.append(&mut produced);
        }
        (state, effects)
    }

    fn select(question: &str, value: &str) -> Event {
        Event::SelectOption {
            question: question.into(),
            value: value.into(),
        }
    }

    fn ready_checkout() -> Vec<Event> {
        let mut events = vec![Event::SelectPlan {
            plan_id: "monthly".into(),
        }];
        for (field, value) in [
            (ShippingField::Address, "1 Main St"),
            (ShippingField::City, "Springfield"),
            (ShippingField::State, "IL"),
            (ShippingField::Zip, "62701"),
        ] {
            events.push(Event::SetShipping {
                field,
                value: value.into(),
            });
        }
        events
    }

    #[test]
    fn next_blocks_on_invalid_step_and_keeps_cursor() {
        let (state, effects) = run(state(), vec![Event::Next]);
        assert_eq!(state.cursor, 0);
        assert!(state.errors.contains_key("goal"));
        assert!(matches!(
            effects.last(),
            Some(Effect::Rejected(Rejection::Invalid { count: 1, .. }))
        ));
    }

    #[test]
    fn radio_without_followups_schedules_auto_advance() {
        let (state, effects) = run(state(), vec![select("goal", "lose")]);
        assert!(matches!(
            effects.as_slice(),
            [Effect::ScheduleAutoAdvance { token: 1, delay_ms: 350 }]
        ));
        let (state, _) = run(state, vec![Event::AutoAdvanceElapsed { token: 1 }]);
        assert_eq!(state.cursor, 1);
        assert_eq!(state.anchor, VirtualStep::Step { id: "end".into() });
    }

    #[test]
    fn radio_revealing_followup_does_not_auto_advance() {
        let (state, effects) = run(state(), vec![select("goal", "other")]);
        assert!(effects.is_empty());
        assert!(state.pending_advance.is_none());
    }

    #[test]
    fn timer_is_ignored_after_navigation_or_answer_change() {
        let (state, _) = run(
            state(),
            vec![select("goal", "lose"), Event::Previous],
        );
        let (state, effects) = run(state, vec![Event::AutoAdvanceElapsed { token: 1 }]);
        assert_eq!(state.cursor, 0);
        assert!(matches!(
            effects.as_slice(),
            [Effect::Rejected(Rejection::StaleTimer { token: 1 })]
        ));

        let (state, _) = run(
            state,
            vec![select("goal", "lose"), select("goal", "other")],
        );
        let (state, effects) = run(state, vec![Event::AutoAdvanceElapsed { token: 2 }]);
        assert_eq!(state.cursor, 0);
        assert!(matches!(
            effects.as_slice(),
            [Effect::Rejected(Rejection::StaleTimer { token: 2 })]
        ));
    }

    #[test]
    fn checkout_guard_blocks_blank_shipping() {
        let (state, effects) = run(
            state(),
            vec![
                Event::SelectPlan {
                    plan_id: "monthly".into(),
                },
                Event::SetShipping {
                    field: ShippingField::Address,
                    value: "1 Main St".into(),
                },
                Event::CreateSubscription,
            ],
        );
        assert_eq!(state.checkout.status, PaymentStatus::Idle);
        assert_eq!(
            effects.last(),
            Some(&Effect::Rejected(Rejection::CheckoutIncomplete))
        );
    }

    #[test]
    fn stale_subscription_response_is_ignored_after_retry() {
        let mut events = ready_checkout();
        events.push(Event::CreateSubscription);
        let (state, effects) = run(state(), events);
        let Some(Effect::CreateSubscription { generation, payload }) = effects.last() else {
            panic!("expected a subscription request, got {effects:?}");
        };
        assert_eq!(payload.price_ref, "price_monthly");
        assert_eq!(state.checkout.status, PaymentStatus::Processing);
        let stale = *generation;

        let (state, _) = run(state, vec![Event::RetryPayment]);
        let (state, effects) = run(
            state,
            vec![Event::SubscriptionCreated {
                generation: stale,
                client_secret: "secret".into(),
                subscription_id: "sub".into(),
            }],
        );
        assert_eq!(state.checkout.status, PaymentStatus::Idle);
        assert!(state.checkout.client_secret.is_none());
        assert!(matches!(
            effects.as_slice(),
            [Effect::Rejected(Rejection::StaleResponse { .. })]
        ));
    }

    #[test]
    fn plan_changes_are_rejected_while_processing() {
        let mut events = ready_checkout();
        events.push(Event::CreateSubscription);
        events.push(Event::SelectPlan {
            plan_id: "monthly".into(),
        });
        let (_, effects) = run(state(), events);
        assert_eq!(
            effects.last(),
            Some(&Effect::Rejected(Rejection::CheckoutProcessing))
        );
    }

    #[test]
    fn checkout_slot_requires_successful_payment() {
        let (state, _) = run(
            state(),
            vec![
                select("goal", "lose"),
                Event::Next,
                Event::Next,
            ],
        );
        assert!(state.on_checkout());
        let (state, effects) = run(state, vec![Event::Next]);
        assert!(!state.completed);
        assert_eq!(
            effects.last(),
            Some(&Effect::Rejected(Rejection::PaymentIncomplete))
        );

        let mut events = ready_checkout();
        events.push(Event::CreateSubscription);
        let (state, effects) = run(state, events);
        let Some(Effect::CreateSubscription { generation, .. }) = effects.last() else {
            panic!("expected a subscription request");
        };
        let generation = *generation;
        let (state, effects) = run(
            state,
            vec![
                Event::SubscriptionCreated {
                    generation,
                    client_secret: "secret_1".into(),
                    subscription_id: "sub_1".into(),
                },
                Event::ConfirmPayment,
            ],
        );
        let Some(Effect::ConfirmPayment { generation, .. }) = effects.last() else {
            panic!("expected a confirmation request");
        };
        let generation = *generation;
        let (state, effects) = run(
            state,
            vec![
                Event::PaymentConfirmed {
                    generation,
                    payment_intent_id: "pi_1".into(),
                },
                Event::Next,
            ],
        );
        assert!(state.completed);
        let Some(Effect::Submit(submission)) = effects.last() else {
            panic!("expected submission, got {effects:?}");
        };
        assert_eq!(submission.payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(submission.subscription_id.as_deref(), Some("sub_1"));

        let (_, effects) = run(state, vec![Event::Previous]);
        assert_eq!(
            effects,
            vec![Effect::Rejected(Rejection::AlreadyCompleted)]
        );
    }

    #[test]
    fn derived_keys_are_rejected() {
        let (state, effects) = run(
            state(),
            vec![Event::SetAnswer {
                key: "bmi".into(),
                value: AnswerValue::text("20"),
            }],
        );
        assert!(state.answers.get("bmi").is_none());
        assert!(matches!(
            effects.as_slice(),
            [Effect::Rejected(Rejection::Answer { .. })]
        ));
    }
}
