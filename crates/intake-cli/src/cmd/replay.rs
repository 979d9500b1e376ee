//! Scripted sessions: load a questionnaire from disk, feed it a list of
//! events and print where the session ended up.
//!
//! A script is a JSON array. Each entry is either an [`Event`] or the
//! directive `{"type": "settle"}`, which waits for a pending auto-advance.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, ValueEnum};
use intake_engine::{
    Collaborators, Effect, EngineConfig, Event, FileQuestionnaireSource, IntakeSession,
    OfflineGateway, PaymentOutcome, QuestionnaireRef, Rejection, SessionView, StaticCatalog,
    Submission,
};
use intake_spec::{ResolutionMode, TemplateVars};
use serde::{Deserialize, Serialize};

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// Questionnaire JSON file; its file stem is used as the questionnaire id
    #[arg(value_name = "questionnaire.json")]
    pub questionnaire: PathBuf,
    /// JSON array of events to dispatch
    #[arg(long, value_name = "events.json")]
    pub events: PathBuf,
    /// Engine configuration (TOML)
    #[arg(long, value_name = "intake.toml")]
    pub config: Option<PathBuf>,
    /// Products and plans offered at checkout
    #[arg(long, value_name = "catalog.json")]
    pub catalog: Option<PathBuf>,
    /// Outcome of payment confirmation in the offline gateway
    #[arg(long, value_enum, default_value = "succeed")]
    pub payment: PaymentArg,
    /// Template variable, repeatable
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
    /// Fail on template variables that were not provided
    #[arg(long = "strict-vars")]
    pub strict_vars: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentArg {
    Succeed,
    Decline,
}

impl From<PaymentArg> for PaymentOutcome {
    fn from(value: PaymentArg) -> Self {
        match value {
            PaymentArg::Succeed => PaymentOutcome::Succeed,
            PaymentArg::Decline => PaymentOutcome::Decline,
        }
    }
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    Settle,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Directive(Directive),
    Event(Event),
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptRejection {
    /// Index of the script entry that produced the rejection.
    pub entry: usize,
    pub message: String,
    pub rejection: Rejection,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub view: SessionView,
    pub submission: Option<Submission>,
    pub rejections: Vec<ScriptRejection>,
}

pub fn load_script(path: &Path) -> Result<Vec<ScriptStep>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a valid script", path.display()))
}

pub fn run(args: ReplayArgs) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let report = runtime.block_on(replay(&args))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn replay(args: &ReplayArgs) -> Result<ReplayReport> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let catalog = match &args.catalog {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            StaticCatalog::from_json(&raw)
                .with_context(|| format!("{} is not a valid catalog", path.display()))?
        }
        None => StaticCatalog::default(),
    };

    let id = args
        .questionnaire
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| anyhow!("cannot derive an id from {}", args.questionnaire.display()))?;
    let root = args
        .questionnaire
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let vars: TemplateVars = args.vars.iter().cloned().collect();
    let mode = if args.strict_vars {
        ResolutionMode::Strict
    } else {
        ResolutionMode::Lenient
    };

    let collaborators = Collaborators {
        questionnaires: Arc::new(FileQuestionnaireSource::new(root).with_vars(vars, mode)),
        products: Arc::new(catalog),
        payments: Arc::new(OfflineGateway::new(args.payment.into())),
    };
    let reference = QuestionnaireRef::Id(id.to_string());
    let mut session = IntakeSession::load(&reference, &collaborators, config)
        .await
        .with_context(|| format!("failed to load {}", args.questionnaire.display()))?;

    let script = load_script(&args.events)?;
    let mut rejections = Vec::new();
    for (index, step) in script.into_iter().enumerate() {
        let effects = match step {
            ScriptStep::Directive(Directive::Settle) => session.settle().await,
            ScriptStep::Event(event) => session.dispatch(event).await,
        };
        for effect in effects {
            if let Effect::Rejected(rejection) = effect {
                tracing::debug!(entry = index, %rejection, "event rejected");
                rejections.push(ScriptRejection {
                    entry: index,
                    message: rejection.to_string(),
                    rejection,
                });
            }
        }
    }
    if let Some(remaining) = session.pending_auto_advance() {
        tracing::warn!(
            remaining_ms = remaining.as_millis() as u64,
            "script ended with an auto-advance pending; add a settle step to run it"
        );
    }

    Ok(ReplayReport {
        view: session.view(),
        submission: session.submission().cloned(),
        rejections,
    })
}
