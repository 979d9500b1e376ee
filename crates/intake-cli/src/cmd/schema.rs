use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use intake_engine::{EngineConfig, Event, SessionView, StaticCatalog};
use intake_spec::Questionnaire;
use schemars::{Schema, schema_for};

#[derive(Args, Debug, Clone)]
pub struct SchemaArgs {
    /// Which document to describe
    #[arg(value_enum, default_value = "questionnaire")]
    pub target: SchemaTarget,
    /// Write the schema to a file instead of stdout
    #[arg(long, value_name = "schema.json")]
    pub out: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaTarget {
    Questionnaire,
    Event,
    Config,
    Catalog,
    View,
}

fn schema(target: SchemaTarget) -> Schema {
    match target {
        SchemaTarget::Questionnaire => schema_for!(Questionnaire),
        SchemaTarget::Event => schema_for!(Event),
        SchemaTarget::Config => schema_for!(EngineConfig),
        SchemaTarget::Catalog => schema_for!(StaticCatalog),
        SchemaTarget::View => schema_for!(SessionView),
    }
}

pub fn run(args: &SchemaArgs) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&schema(args.target))?;
    match &args.out {
        Some(path) => {
            fs::write(path, rendered + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "schema written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
