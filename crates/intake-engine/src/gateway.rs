//! Collaborators the engine talks to: questionnaire source, product catalog
//! and payment gateway, plus local implementations used by the CLI and tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use intake_spec::{Questionnaire, ResolutionMode, TemplateVars, substitute_variables};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkout::ShippingInfo;
use crate::error::{GatewayError, SourceError};

/// How a questionnaire is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum QuestionnaireRef {
    Id(String),
    Treatment(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub treatment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanOption {
    pub id: String,
    pub name: String,
    /// Price in minor currency units.
    pub price: u64,
    pub billing_interval: String,
    #[serde(default)]
    pub features: Vec<String>,
    /// Opaque processor reference resolved at subscription time.
    pub price_ref: String,
    #[serde(default)]
    pub treatment_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPayload {
    pub idempotency_key: Uuid,
    pub questionnaire_id: String,
    #[serde(default)]
    pub treatment_id: Option<String>,
    pub plan_id: String,
    pub price_ref: String,
    pub currency: String,
    pub customer: Customer,
    /// Answers keyed by question id, choice values replaced by option text.
    pub answers: BTreeMap<String, String>,
    pub shipping: ShippingInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionHandle {
    pub client_secret: String,
    pub subscription_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub payment_intent_id: String,
}

#[async_trait]
pub trait QuestionnaireSource: Send + Sync {
    async fn questionnaire(&self, reference: &QuestionnaireRef)
    -> Result<Questionnaire, SourceError>;
}

#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn products(&self, treatment_id: &str) -> Result<Vec<Product>, SourceError>;

    async fn plans(&self, treatment_id: &str) -> Result<Vec<PlanOption>, SourceError>;
}

/// Opaque payment processor capability.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_subscription(
        &self,
        payload: &SubscriptionPayload,
    ) -> Result<SubscriptionHandle, GatewayError>;

    async fn confirm_payment(&self, client_secret: &str)
    -> Result<PaymentConfirmation, GatewayError>;
}

/// Reads `<root>/<id>.json` questionnaires and renders their template
/// variables. Treatment lookups scan the directory in file-name order.
#[derive(Debug, Clone)]
pub struct FileQuestionnaireSource {
    root: PathBuf,
    vars: TemplateVars,
    mode: ResolutionMode,
}

impl FileQuestionnaireSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            vars: TemplateVars::new(),
            mode: ResolutionMode::Lenient,
        }
    }

    pub fn with_vars(mut self, vars: TemplateVars, mode: ResolutionMode) -> Self {
        self.vars = vars;
        self.mode = mode;
        self
    }

    async fn read(&self, path: &Path) -> Result<Questionnaire, SourceError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SourceError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let mut questionnaire: Questionnaire =
            serde_json::from_str(&raw).map_err(|source| SourceError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        substitute_variables(&mut questionnaire, &self.vars, self.mode)?;
        Ok(questionnaire)
    }

    async fn json_files(&self) -> Result<Vec<PathBuf>, SourceError> {
        let io_error = |source| SourceError::Io {
            path: self.root.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(io_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl QuestionnaireSource for FileQuestionnaireSource {
    async fn questionnaire(
        &self,
        reference: &QuestionnaireRef,
    ) -> Result<Questionnaire, SourceError> {
        match reference {
            QuestionnaireRef::Id(id) => {
                let path = self.root.join(format!("{id}.json"));
                if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    return Err(SourceError::NotFound(format!("questionnaire '{id}'")));
                }
                self.read(&path).await
            }
            QuestionnaireRef::Treatment(treatment) => {
                for path in self.json_files().await? {
                    let questionnaire = match self.read(&path).await {
                        Ok(questionnaire) => questionnaire,
                        Err(err) => {
                            tracing::debug!(path = %path.display(), error = %err, "skipping unreadable questionnaire");
                            continue;
                        }
                    };
                    if questionnaire.treatment_id.as_deref() == Some(treatment.as_str()) {
                        return Ok(questionnaire);
                    }
                }
                Err(SourceError::NotFound(format!(
                    "questionnaire for treatment '{treatment}'"
                )))
            }
        }
    }
}

/// In-memory product catalog. Plans without a treatment apply to every
/// treatment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StaticCatalog {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub plans: Vec<PlanOption>,
}

impl StaticCatalog {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[async_trait]
impl ProductSource for StaticCatalog {
    async fn products(&self, treatment_id: &str) -> Result<Vec<Product>, SourceError> {
        Ok(self
            .products
            .iter()
            .filter(|product| product.treatment_id == treatment_id)
            .cloned()
            .collect())
    }

    async fn plans(&self, treatment_id: &str) -> Result<Vec<PlanOption>, SourceError> {
        Ok(self
            .plans
            .iter()
            .filter(|plan| {
                plan.treatment_id
                    .as_deref()
                    .is_none_or(|id| id == treatment_id)
            })
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    #[default]
    Succeed,
    Decline,
}

/// Gateway that never leaves the process; confirmation follows `outcome`.
#[derive(Debug, Clone, Default)]
pub struct OfflineGateway {
    outcome: PaymentOutcome,
}

impl OfflineGateway {
    pub fn new(outcome: PaymentOutcome) -> Self {
        Self { outcome }
    }
}

#[async_trait]
impl PaymentGateway for OfflineGateway {
    async fn create_subscription(
        &self,
        payload: &SubscriptionPayload,
    ) -> Result<SubscriptionHandle, GatewayError> {
        if payload.price_ref.trim().is_empty() {
            return Err(GatewayError::Rejected(format!(
                "plan '{}' has no price",
                payload.plan_id
            )));
        }
        let id = payload.idempotency_key.simple();
        Ok(SubscriptionHandle {
            client_secret: format!("secret_{id}"),
            subscription_id: format!("sub_{id}"),
        })
    }

    async fn confirm_payment(
        &self,
        client_secret: &str,
    ) -> Result<PaymentConfirmation, GatewayError> {
        match self.outcome {
            PaymentOutcome::Succeed => Ok(PaymentConfirmation {
                payment_intent_id: format!(
                    "pi_{}",
                    client_secret.trim_start_matches("secret_")
                ),
            }),
            PaymentOutcome::Decline => Err(GatewayError::Declined(
                "Your card was declined.".to_string(),
            )),
        }
    }
}
