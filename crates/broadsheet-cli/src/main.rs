// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Broadsheet command-line front end.
//
// Entry point. Initialises logging, wires the edition service, and runs one
// command. Results are printed to stdout as JSON; failures go to stderr as
// JSON with an exit code derived from the error class.

mod data_dir;
mod services;

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};

use broadsheet_archive::parse_publication_date;
use broadsheet_core::error::{BroadsheetError, ErrorClass, Result, classify_error};
use broadsheet_core::types::{EditionLookup, EditionStatus};

use services::AppServices;

#[derive(Parser, Debug)]
#[command(name = "broadsheet", version, about = "Digitize and manage newspaper editions")]
struct Cli {
    /// Configuration file (JSON). Defaults to the data directory.
    #[arg(long, global = true, env = "BROADSHEET_CONFIG")]
    config: Option<PathBuf>,

    /// Keep the database and page images in memory; nothing is persisted.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rasterize a PDF and store it as a new edition.
    Create {
        /// Edition PDF.
        pdf: PathBuf,
        #[arg(long)]
        title: String,
        /// Publication date, `YYYY-MM-DD`.
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
    },
    /// Print one edition. Accepts a native id, numeric id, or slug.
    Show { edition: String },
    /// Apply a JSON update body (`title`, `date`, `status`, `pages`).
    Update {
        edition: String,
        /// File holding the body; `-` reads stdin.
        #[arg(long, default_value = "-")]
        body: PathBuf,
    },
    /// Delete an edition and its page images.
    Delete { edition: String },
    /// List editions, newest publication date first.
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<EditionStatus>,
    },
    /// Remove leftover scratch directories. Run only while idle.
    Sweep,
    /// Write the default configuration file.
    InitConfig,
}

fn parse_date(raw: &str) -> std::result::Result<NaiveDate, String> {
    parse_publication_date(raw).ok_or_else(|| format!("'{raw}' is not a YYYY-MM-DD date"))
}

fn parse_status(raw: &str) -> std::result::Result<EditionStatus, String> {
    raw.parse().map_err(|e: BroadsheetError| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot encode output");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            let class = classify_error(&e);
            tracing::error!(error = %e, ?class, "command failed");
            eprintln!("{}", json!(ErrorReport::new(&e, class)));
            ExitCode::from(exit_code(class))
        }
    }
}

async fn run(cli: Cli) -> Result<Value> {
    if let Command::InitConfig = cli.command {
        let path = services::write_default_config(cli.config.as_deref())?;
        return Ok(json!({ "written": path }));
    }

    let app = AppServices::init(cli.config.as_deref(), cli.dry_run)?;
    let editions = &app.editions;

    let output = match cli.command {
        Command::Create { pdf, title, date } => {
            let bytes = std::fs::read(&pdf)?;
            let edition = editions.create(bytes, &title, date).await?;
            let share = editions.share_image_url(&edition);
            json!({ "edition": edition, "shareImageUrl": share })
        }
        Command::Show { edition } => {
            let edition = editions.fetch(&EditionLookup::parse(&edition)?)?;
            serde_json::to_value(edition)?
        }
        Command::Update { edition, body } => {
            let lookup = EditionLookup::parse(&edition)?;
            let outcome = editions.update(&lookup, &read_body(&body)?)?;
            serde_json::to_value(outcome)?
        }
        Command::Delete { edition } => {
            let deleted = editions.delete(&EditionLookup::parse(&edition)?).await?;
            json!({ "deleted": deleted.id, "nativeId": deleted.native_id })
        }
        Command::List { status } => serde_json::to_value(editions.list(status)?)?,
        Command::Sweep => {
            let removed = editions.sweep_scratch();
            json!({ "removed": removed, "scratchDir": app.config.scratch_dir })
        }
        Command::InitConfig => Value::Null,
    };
    Ok(output)
}

fn read_body(path: &std::path::Path) -> Result<Value> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Error payload written to stderr.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorReport {
    class: ErrorClass,
    status: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<broadsheet_core::ValidationErrors>,
}

impl ErrorReport {
    fn new(err: &BroadsheetError, class: ErrorClass) -> Self {
        let fields = match err {
            BroadsheetError::Validation(errors) => Some(errors.clone()),
            _ => None,
        };
        Self {
            class,
            status: class.status_code(),
            message: err.to_string(),
            fields,
        }
    }
}

fn exit_code(class: ErrorClass) -> u8 {
    match class {
        ErrorClass::Internal => 1,
        ErrorClass::Input => 2,
        ErrorClass::Validation => 3,
        ErrorClass::NotFound => 4,
        ErrorClass::Render => 5,
        ErrorClass::Upload => 6,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn create_parses_title_and_date() {
        let cli = Cli::try_parse_from([
            "broadsheet",
            "create",
            "today.pdf",
            "--title",
            "आज",
            "--date",
            "2024-01-15",
        ])
        .expect("parse");
        match cli.command {
            Command::Create { pdf, title, date } => {
                assert_eq!(pdf, PathBuf::from("today.pdf"));
                assert_eq!(title, "आज");
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).expect("date"));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(!cli.dry_run);
    }

    #[test]
    fn bad_status_and_date_are_rejected() {
        assert!(Cli::try_parse_from(["broadsheet", "list", "--status", "gone"]).is_err());
        assert!(
            Cli::try_parse_from(["broadsheet", "create", "x.pdf", "--title", "t", "--date", "15/01/2024"])
                .is_err()
        );
    }

    #[test]
    fn error_report_carries_validation_fields() {
        let mut errors = broadsheet_core::ValidationErrors::new();
        errors.add("colour", "unknown field");
        let err = BroadsheetError::Validation(errors);
        let report = json!(ErrorReport::new(&err, classify_error(&err)));
        assert_eq!(report["class"], "Validation");
        assert_eq!(report["status"], 422);
        assert_eq!(report["fields"]["colour"], "unknown field");
    }

    #[test]
    fn exit_codes_are_distinct() {
        let classes = [
            ErrorClass::Internal,
            ErrorClass::Input,
            ErrorClass::Validation,
            ErrorClass::NotFound,
            ErrorClass::Render,
            ErrorClass::Upload,
        ];
        let mut codes: Vec<u8> = classes.iter().map(|c| exit_code(*c)).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), classes.len());
    }
}
