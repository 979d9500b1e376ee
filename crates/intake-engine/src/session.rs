//! Async driver owning a [`SessionState`].
//!
//! The session feeds events through the reducer and carries out the effects
//! it returns: gateway calls are awaited and their outcome dispatched as the
//! next event, and auto-advance deadlines are kept until [`IntakeSession::settle`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use intake_spec::Questionnaire;
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::error::LoadError;
use crate::event::{Effect, Event, Submission};
use crate::gateway::{
    PaymentGateway, PlanOption, Product, ProductSource, QuestionnaireRef, QuestionnaireSource,
};
use crate::reduce::apply;
use crate::state::SessionState;
use crate::view::SessionView;

/// External services a session depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub questionnaires: Arc<dyn QuestionnaireSource>,
    pub products: Arc<dyn ProductSource>,
    pub payments: Arc<dyn PaymentGateway>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AutoAdvanceTimer {
    token: u64,
    deadline: Instant,
}

pub struct IntakeSession {
    state: SessionState,
    config: EngineConfig,
    payments: Arc<dyn PaymentGateway>,
    timer: Option<AutoAdvanceTimer>,
    submission: Option<Submission>,
}

impl IntakeSession {
    /// Loads the questionnaire and its catalog. Either everything loads or
    /// an error is returned; there is no partially loaded session.
    pub async fn load(
        reference: &QuestionnaireRef,
        collaborators: &Collaborators,
        config: EngineConfig,
    ) -> Result<Self, LoadError> {
        let questionnaire = collaborators
            .questionnaires
            .questionnaire(reference)
            .await
            .map_err(LoadError::Questionnaire)?;

        let treatment = questionnaire
            .treatment_id
            .clone()
            .or_else(|| match reference {
                QuestionnaireRef::Treatment(treatment) => Some(treatment.clone()),
                QuestionnaireRef::Id(_) => None,
            });
        let (products, plans) = match treatment {
            Some(treatment) => {
                let (products, plans) = tokio::join!(
                    collaborators.products.products(&treatment),
                    collaborators.products.plans(&treatment)
                );
                let products = products.map_err(|source| LoadError::Products {
                    treatment: treatment.clone(),
                    source,
                })?;
                let plans = plans.map_err(|source| LoadError::Plans {
                    treatment: treatment.clone(),
                    source,
                })?;
                (products, plans)
            }
            None => (Vec::new(), Vec::new()),
        };

        tracing::info!(
            questionnaire = %questionnaire.id,
            steps = questionnaire.steps.len(),
            plans = plans.len(),
            "questionnaire loaded"
        );
        Ok(Self::from_parts(
            Arc::new(questionnaire),
            products,
            plans,
            Arc::clone(&collaborators.payments),
            config,
        ))
    }

    pub fn from_parts(
        questionnaire: Arc<Questionnaire>,
        products: Vec<Product>,
        plans: Vec<PlanOption>,
        payments: Arc<dyn PaymentGateway>,
        config: EngineConfig,
    ) -> Self {
        let mut state = SessionState::new(questionnaire, products, plans);
        if let Some(plan_id) = config.default_plan_id.as_deref()
            && state.plan(plan_id).is_some()
        {
            state.checkout.selected_plan_id = Some(plan_id.to_string());
        }
        Self {
            state,
            config,
            payments,
            timer: None,
            submission: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn view(&self) -> SessionView {
        SessionView::from_state(&self.state)
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    /// Time left before the pending auto-advance fires, if one is pending.
    pub fn pending_auto_advance(&self) -> Option<Duration> {
        self.timer
            .map(|timer| timer.deadline.saturating_duration_since(Instant::now()))
    }

    /// Applies `event` and every follow-up produced by gateway responses.
    /// Returns all effects in the order they were produced.
    pub async fn dispatch(&mut self, event: Event) -> Vec<Effect> {
        let mut queue = VecDeque::from([event]);
        let mut produced = Vec::new();
        while let Some(event) = queue.pop_front() {
            for effect in apply(&mut self.state, event, &self.config) {
                if let Some(follow_up) = self.run_effect(&effect).await {
                    queue.push_back(follow_up);
                }
                produced.push(effect);
            }
        }
        produced
    }

    /// Waits for the pending auto-advance deadline, then dispatches it.
    pub async fn settle(&mut self) -> Vec<Effect> {
        let Some(timer) = self.timer.take() else {
            return Vec::new();
        };
        tokio::time::sleep_until(timer.deadline).await;
        self.dispatch(Event::AutoAdvanceElapsed { token: timer.token })
            .await
    }

    async fn run_effect(&mut self, effect: &Effect) -> Option<Event> {
        match effect {
            Effect::ScheduleAutoAdvance { token, delay_ms } => {
                self.timer = Some(AutoAdvanceTimer {
                    token: *token,
                    deadline: Instant::now() + Duration::from_millis(*delay_ms),
                });
                None
            }
            Effect::CancelAutoAdvance => {
                self.timer = None;
                None
            }
            Effect::CreateSubscription {
                generation,
                payload,
            } => {
                let generation = *generation;
                Some(match self.payments.create_subscription(payload).await {
                    Ok(handle) => Event::SubscriptionCreated {
                        generation,
                        client_secret: handle.client_secret,
                        subscription_id: handle.subscription_id,
                    },
                    Err(err) => Event::SubscriptionFailed {
                        generation,
                        message: err.user_message(),
                    },
                })
            }
            Effect::ConfirmPayment {
                generation,
                client_secret,
            } => {
                let generation = *generation;
                Some(match self.payments.confirm_payment(client_secret).await {
                    Ok(confirmation) => Event::PaymentConfirmed {
                        generation,
                        payment_intent_id: confirmation.payment_intent_id,
                    },
                    Err(err) => Event::PaymentFailed {
                        generation,
                        message: err.user_message(),
                    },
                })
            }
            Effect::Submit(submission) => {
                self.submission = Some(submission.clone());
                None
            }
            Effect::Rejected(_) => None,
        }
    }
}
