use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use intake_spec::{LintIssue, Questionnaire, Severity, lint};
use serde::Serialize;

#[derive(Args, Debug, Clone)]
pub struct LintArgs {
    /// Questionnaire JSON file
    #[arg(value_name = "questionnaire.json")]
    pub path: PathBuf,
    /// Fail when any warning is reported
    #[arg(long)]
    pub strict: bool,
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct LintReport {
    pub questionnaire: String,
    pub issues: Vec<LintIssue>,
    pub errors: usize,
    pub warnings: usize,
}

pub fn run(args: &LintArgs) -> Result<LintReport> {
    let raw = fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read {}", args.path.display()))?;
    let questionnaire: Questionnaire = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid questionnaire", args.path.display()))?;
    let issues = lint(&questionnaire);
    let errors = issues
        .iter()
        .filter(|issue| issue.severity == Severity::Error)
        .count();
    tracing::debug!(
        questionnaire = %questionnaire.id,
        issues = issues.len(),
        "lint finished"
    );
    Ok(LintReport {
        questionnaire: questionnaire.id,
        warnings: issues.len() - errors,
        errors,
        issues,
    })
}

pub fn emit(report: &LintReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if report.issues.is_empty() {
        println!("{}: no issues found", report.questionnaire);
        return Ok(());
    }
    for issue in &report.issues {
        let label = match issue.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        println!("{label}: {}: {}", issue.path, issue.message);
    }
    Ok(())
}
