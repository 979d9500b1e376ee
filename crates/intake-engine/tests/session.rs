use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use intake_engine::{
    Collaborators, Effect, EngineConfig, Event, GatewayError, IntakeSession, LoadError,
    OfflineGateway, PaymentConfirmation, PaymentGateway, PaymentOutcome, PaymentStatus, PlanOption,
    QuestionnaireRef, QuestionnaireSource, Rejection, ShippingField, SourceError, StaticCatalog,
    SubscriptionHandle, SubscriptionPayload,
};
use intake_spec::{Questionnaire, VirtualStep};
use serde_json::json;

struct FixedSource(Questionnaire);

#[async_trait]
impl QuestionnaireSource for FixedSource {
    async fn questionnaire(
        &self,
        reference: &QuestionnaireRef,
    ) -> Result<Questionnaire, SourceError> {
        match reference {
            QuestionnaireRef::Id(id) if *id == self.0.id => Ok(self.0.clone()),
            QuestionnaireRef::Treatment(treatment)
                if self.0.treatment_id.as_deref() == Some(treatment.as_str()) =>
            {
                Ok(self.0.clone())
            }
            _ => Err(SourceError::NotFound("questionnaire".into())),
        }
    }
}

/// Declines the first subscription attempt, then behaves.
#[derive(Default)]
struct FlakyGateway {
    attempts: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for FlakyGateway {
    async fn create_subscription(
        &self,
        payload: &SubscriptionPayload,
    ) -> Result<SubscriptionHandle, GatewayError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(GatewayError::Unavailable("timeout".into()));
        }
        Ok(SubscriptionHandle {
            client_secret: "secret_ok".into(),
            subscription_id: format!("sub_{}", payload.plan_id),
        })
    }

    async fn confirm_payment(
        &self,
        _client_secret: &str,
    ) -> Result<PaymentConfirmation, GatewayError> {
        Ok(PaymentConfirmation {
            payment_intent_id: "pi_ok".into(),
        })
    }
}

fn questionnaire() -> Questionnaire {
    serde_json::from_value(json!({
        "id": "weight-loss",
        "treatmentId": "glp1",
        "steps": [
            {
                "id": "step1",
                "questions": [{
                    "id": "pregnant", "answerType": "radio", "isRequired": true,
                    "questionOrder": 1, "conditionalLevel": 0,
                    "options": [
                        { "id": "y", "optionValue": "yes", "optionText": "Yes" },
                        { "id": "n", "optionValue": "no", "optionText": "No" }
                    ]
                }]
            },
            {
                "id": "step2",
                "conditionalLogic": "answer_equals:pregnant:yes",
                "isDeadEnd": true,
                "questions": [{ "id": "due", "answerType": "date", "questionOrder": 1 }]
            },
            {
                "id": "step3",
                "kind": "body_measurements",
                "questions": []
            }
        ]
    }))
    .expect("fixture should deserialize")
}

fn catalog() -> StaticCatalog {
    StaticCatalog {
        products: Vec::new(),
        plans: vec![PlanOption {
            id: "monthly".into(),
            name: "Monthly".into(),
            price: 14900,
            billing_interval: "month".into(),
            features: vec!["Clinician review".into()],
            price_ref: "price_monthly".into(),
            treatment_id: Some("glp1".into()),
        }],
    }
}

fn collaborators(payments: Arc<dyn PaymentGateway>) -> Collaborators {
    Collaborators {
        questionnaires: Arc::new(FixedSource(questionnaire())),
        products: Arc::new(catalog()),
        payments,
    }
}

async fn session(payments: Arc<dyn PaymentGateway>, config: EngineConfig) -> IntakeSession {
    IntakeSession::load(
        &QuestionnaireRef::Id("weight-loss".into()),
        &collaborators(payments),
        config,
    )
    .await
    .expect("session should load")
}

async fn fill_body_and_checkout(session: &mut IntakeSession) {
    for (key, value) in [("weight", "200"), ("heightFeet", "6"), ("heightInches", "0")] {
        session
            .dispatch(Event::SetAnswer {
                key: key.into(),
                value: intake_spec::AnswerValue::text(value),
            })
            .await;
    }
    for (field, value) in [
        (ShippingField::Address, "1 Main St"),
        (ShippingField::City, "Springfield"),
        (ShippingField::State, "IL"),
        (ShippingField::Zip, "62701"),
    ] {
        session
            .dispatch(Event::SetShipping {
                field,
                value: value.into(),
            })
            .await;
    }
}

#[tokio::test]
async fn load_fails_without_partial_session() {
    let err = IntakeSession::load(
        &QuestionnaireRef::Id("missing".into()),
        &collaborators(Arc::new(OfflineGateway::default())),
        EngineConfig::default(),
    )
    .await
    .err()
    .expect("load should fail");
    assert!(matches!(err, LoadError::Questionnaire(SourceError::NotFound(_))));
}

#[tokio::test]
async fn default_plan_is_preselected_from_config() {
    let config = EngineConfig {
        default_plan_id: Some("monthly".into()),
        ..EngineConfig::default()
    };
    let session = session(Arc::new(OfflineGateway::default()), config).await;
    assert_eq!(
        session.state().checkout.selected_plan_id.as_deref(),
        Some("monthly")
    );
    assert_eq!(session.view().total_steps, 3);
}

#[tokio::test(start_paused = true)]
async fn auto_advance_waits_for_debounce() {
    let mut session = session(Arc::new(OfflineGateway::default()), EngineConfig::default()).await;
    let start = tokio::time::Instant::now();

    session
        .dispatch(Event::SelectOption {
            question: "pregnant".into(),
            value: "no".into(),
        })
        .await;
    assert_eq!(
        session.pending_auto_advance(),
        Some(Duration::from_millis(350))
    );

    tokio::time::advance(Duration::from_millis(200)).await;
    session
        .dispatch(Event::SelectOption {
            question: "pregnant".into(),
            value: "no".into(),
        })
        .await;
    session.settle().await;

    assert!(start.elapsed() >= Duration::from_millis(550));
    assert_eq!(session.state().cursor, 1);
    assert_eq!(
        session.state().anchor,
        VirtualStep::Step { id: "step3".into() },
        "hidden step2 is skipped"
    );
}

#[tokio::test(start_paused = true)]
async fn navigating_away_cancels_auto_advance() {
    let mut session = session(Arc::new(OfflineGateway::default()), EngineConfig::default()).await;
    session
        .dispatch(Event::SelectOption {
            question: "pregnant".into(),
            value: "no".into(),
        })
        .await;
    session.dispatch(Event::Previous).await;
    assert_eq!(session.pending_auto_advance(), None);
    assert!(session.settle().await.is_empty());
    assert_eq!(session.state().cursor, 0);
}

#[tokio::test]
async fn auto_advance_can_be_disabled() {
    let config = EngineConfig {
        auto_advance: false,
        ..EngineConfig::default()
    };
    let mut session = session(Arc::new(OfflineGateway::default()), config).await;
    let effects = session
        .dispatch(Event::SelectOption {
            question: "pregnant".into(),
            value: "no".into(),
        })
        .await;
    assert!(effects.is_empty());
    assert_eq!(session.pending_auto_advance(), None);
}

#[tokio::test]
async fn dead_end_step_never_advances() {
    let config = EngineConfig {
        auto_advance: false,
        ..EngineConfig::default()
    };
    let mut session = session(Arc::new(OfflineGateway::default()), config).await;
    session
        .dispatch(Event::SelectOption {
            question: "pregnant".into(),
            value: "yes".into(),
        })
        .await;
    session.dispatch(Event::Next).await;
    assert_eq!(
        session.state().anchor,
        VirtualStep::Step { id: "step2".into() }
    );
    let effects = session.dispatch(Event::Next).await;
    assert_eq!(
        effects,
        vec![Effect::Rejected(Rejection::DeadEnd {
            step: "step2".into()
        })]
    );
    assert_eq!(session.state().cursor, 1);

    // Changing the root answer hides step2; the cursor moves to step3.
    session
        .dispatch(Event::SelectOption {
            question: "pregnant".into(),
            value: "no".into(),
        })
        .await;
    assert_eq!(
        session.state().anchor,
        VirtualStep::Step { id: "step3".into() }
    );
    assert_eq!(session.state().cursor, 1);
}

#[tokio::test]
async fn full_flow_submits_after_payment() {
    let config = EngineConfig {
        auto_advance: false,
        default_plan_id: Some("monthly".into()),
        ..EngineConfig::default()
    };
    let mut session = session(Arc::new(OfflineGateway::default()), config).await;
    session
        .dispatch(Event::SelectOption {
            question: "pregnant".into(),
            value: "no".into(),
        })
        .await;
    session.dispatch(Event::Next).await;

    let effects = session.dispatch(Event::Next).await;
    assert!(matches!(
        effects.as_slice(),
        [Effect::Rejected(Rejection::Invalid { .. })]
    ));
    assert!(session.view().errors.contains_key("weight"));

    fill_body_and_checkout(&mut session).await;
    assert_eq!(session.state().answers.text("bmi"), Some("27.1"));
    session.dispatch(Event::Next).await;
    assert!(session.state().on_checkout());
    assert!(!session.view().checkout_continue_enabled());

    session.dispatch(Event::CreateSubscription).await;
    assert!(session.state().checkout.client_secret.is_some());
    session.dispatch(Event::ConfirmPayment).await;
    assert_eq!(session.state().checkout.status, PaymentStatus::Succeeded);
    assert!(session.view().can_submit);

    session.dispatch(Event::Next).await;
    let submission = session.submission().expect("submitted");
    assert_eq!(submission.questionnaire_id, "weight-loss");
    assert_eq!(submission.answers.text("bmiCategory"), Some("Overweight"));
    assert!(session.view().completed);
    assert!(session.view().current.is_none());
}

#[tokio::test]
async fn declined_payment_can_be_retried() {
    let config = EngineConfig {
        auto_advance: false,
        default_plan_id: Some("monthly".into()),
        ..EngineConfig::default()
    };
    let mut session = session(Arc::new(OfflineGateway::new(PaymentOutcome::Decline)), config).await;
    fill_body_and_checkout(&mut session).await;
    session.dispatch(Event::CreateSubscription).await;
    session.dispatch(Event::ConfirmPayment).await;
    let checkout = &session.state().checkout;
    assert_eq!(checkout.status, PaymentStatus::Failed);
    assert_eq!(checkout.error.as_deref(), Some("Your card was declined."));

    session.dispatch(Event::RetryPayment).await;
    let checkout = &session.state().checkout;
    assert_eq!(checkout.status, PaymentStatus::Idle);
    assert!(checkout.client_secret.is_none());
    assert!(checkout.error.is_none());
    assert_eq!(checkout.selected_plan_id.as_deref(), Some("monthly"));
}

#[tokio::test]
async fn gateway_failure_is_surfaced_and_recoverable() {
    let config = EngineConfig {
        auto_advance: false,
        default_plan_id: Some("monthly".into()),
        ..EngineConfig::default()
    };
    let mut session = session(Arc::new(FlakyGateway::default()), config).await;
    fill_body_and_checkout(&mut session).await;

    session.dispatch(Event::CreateSubscription).await;
    assert_eq!(session.state().checkout.status, PaymentStatus::Failed);
    assert_eq!(
        session.view().checkout.error.as_deref(),
        Some("We could not reach the payment service. Please try again.")
    );

    session.dispatch(Event::CreateSubscription).await;
    let checkout = &session.state().checkout;
    assert_eq!(checkout.status, PaymentStatus::Idle);
    assert_eq!(checkout.subscription_id.as_deref(), Some("sub_monthly"));
}
