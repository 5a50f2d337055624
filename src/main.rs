use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod clock;
mod config;
mod db;
mod error;
mod extract;
mod ingest;
mod models;
mod parser;
mod source;

use config::{Config, SourceConfig};
use db::PgStore;
use ingest::Ingestor;
use models::{Records, ReportType};
use source::{DirSource, FtpSource};

#[derive(Parser)]
#[command(name = "bcms-ingest")]
#[command(about = "Loads BCMS call-center interval reports into Postgres", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Ingest every report file not yet stored
    Ingest,
    /// Parse a local report file and print its records
    Parse {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bcms_ingest=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let config = Config::from_env()?;
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Ingest => {
            let config = Config::from_env()?;
            let pool = connect(&config).await?;
            let store = PgStore::new(pool);

            let summary = match config.source {
                SourceConfig::Ftp(ftp) => {
                    tracing::info!(host = %ftp.host, path = %ftp.path, "reading reports over FTP");
                    Arc::new(Ingestor::new(FtpSource::new(ftp), store))
                        .run(config.concurrency)
                        .await?
                }
                SourceConfig::Dir(dir) => {
                    tracing::info!(dir = %dir.display(), "reading reports from directory");
                    Arc::new(Ingestor::new(DirSource::new(dir), store))
                        .run(config.concurrency)
                        .await?
                }
            };

            println!(
                "Stored {} reports ({} records); {} already stored, {} skipped of {} files.",
                summary.stored,
                summary.records,
                summary.already_processed,
                summary.skipped,
                summary.candidates
            );
        }
        Commands::Parse { file, format } => {
            let file_name = file
                .file_name()
                .and_then(|name| name.to_str())
                .context("report path has no file name")?
                .to_string();
            let kind = ReportType::for_file(&file_name)
                .with_context(|| format!("{file_name} is not a known interval report"))?;
            let text = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let report = parser::parse_report(kind, &file_name, &text)
                .with_context(|| format!("failed to parse {file_name}"))?;

            eprintln!(
                "{} report {} ({} {}), {} records",
                kind,
                report.file_name,
                report.switch_name,
                report.number,
                report.records.len()
            );
            let stdout = std::io::stdout();
            match format {
                Format::Csv => write_csv(stdout.lock(), &report.records)?,
                Format::Json => write_json(stdout.lock(), &report.records)?,
            }
        }
    }

    Ok(())
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")
}

fn write_csv<W: std::io::Write>(out: W, records: &Records) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    match records {
        Records::Split(rows) => rows.iter().try_for_each(|r| writer.serialize(r))?,
        Records::Trunk(rows) => rows.iter().try_for_each(|r| writer.serialize(r))?,
        Records::Agent(rows) => rows.iter().try_for_each(|r| writer.serialize(r))?,
        Records::Vdn(rows) => rows.iter().try_for_each(|r| writer.serialize(r))?,
    }
    writer.flush()?;
    Ok(())
}

fn write_json<W: std::io::Write>(out: W, records: &Records) -> anyhow::Result<()> {
    match records {
        Records::Split(rows) => serde_json::to_writer_pretty(out, rows)?,
        Records::Trunk(rows) => serde_json::to_writer_pretty(out, rows)?,
        Records::Agent(rows) => serde_json::to_writer_pretty(out, rows)?,
        Records::Vdn(rows) => serde_json::to_writer_pretty(out, rows)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::fixtures::report_text;

    #[test]
    fn csv_output_has_header_and_one_line_per_record() {
        let text = report_text(ReportType::Trunk);
        let report = parser::parse_report(ReportType::Trunk, "bcms_tru1.txt", &text).unwrap();
        let mut out = Vec::new();
        write_csv(&mut out, &report.records).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 22);
        assert!(lines[0].starts_with("time,incoming_calls,incoming_aband"));
    }

    #[test]
    fn json_output_is_an_array_of_records() {
        let text = report_text(ReportType::Agent);
        let report = parser::parse_report(ReportType::Agent, "bcms_ag_1.txt", &text).unwrap();
        let mut out = Vec::new();
        write_json(&mut out, &report.records).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 21);
        assert_eq!(rows[0]["total_avail_time"], 1200);
    }
}
