use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use intake_spec::has_errors;

use crate::cmd::{self, lint::LintArgs, replay::ReplayArgs, schema::SchemaArgs};

#[derive(Parser, Debug)]
#[command(
    name = "intake",
    about = "Toolkit for intake questionnaire authors",
    version,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Emit debug logs on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a questionnaire definition for authoring mistakes
    Lint(LintArgs),
    /// Print JSON schemas for questionnaires, events and config
    Schema(SchemaArgs),
    /// Drive a session from a scripted list of events
    Replay(ReplayArgs),
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();
    cmd::logging::init(cli.verbose);
    match cli.command {
        Commands::Lint(args) => {
            let report = cmd::lint::run(&args)?;
            cmd::lint::emit(&report, args.json)?;
            if has_errors(&report.issues) {
                bail!("intake-lint: {} error(s) found", report.errors);
            }
            if args.strict && report.warnings > 0 {
                bail!(
                    "intake-lint: {} warning(s) treated as errors (--strict)",
                    report.warnings
                );
            }
            Ok(())
        }
        Commands::Schema(args) => cmd::schema::run(&args),
        Commands::Replay(args) => cmd::replay::run(args),
    }
}
