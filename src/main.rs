use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod config;
mod db;
mod error;
mod gpa;
mod models;
mod normalize;
mod ocr;
mod parser;
mod report;
mod service;
mod store;

use config::Config;
use db::PgStore;
use ocr::TesseractRecognizer;
use store::{MemoryStore, ResultStore};

#[derive(Parser)]
#[command(name = "result-sheet-gpa")]
#[command(about = "Extracts results from scanned sheets and computes GPA standings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// OCR a scanned result sheet and store every student row
    Submit {
        #[arg(long)]
        image: PathBuf,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
        semester: u8,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
        year: u8,
    },
    /// Store a result sheet that has already been transcribed to text
    SubmitText {
        #[arg(long)]
        text: PathBuf,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
        semester: u8,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
        year: u8,
    },
    /// Parse a transcribed sheet and print the rows without storing them
    Preview {
        #[arg(long)]
        text: PathBuf,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
        semester: u8,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
        year: u8,
    },
    /// Recompute yearly GPA, final GPA and class for every student
    Recalculate,
    /// Show a student's most recent result
    Lookup {
        index_no: String,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown standings report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export final standings as CSV
    Export {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_environment();

    let cli = Cli::parse();

    if let Commands::Preview {
        text,
        semester,
        year,
    } = &cli.command
    {
        return preview(text, *semester, *year).await;
    }

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgStore::new(pool.clone());

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Submit {
            image,
            semester,
            year,
        } => {
            let bytes = tokio::fs::read(&image)
                .await
                .with_context(|| format!("failed to read {}", image.display()))?;
            let recognizer = TesseractRecognizer::new(config.tesseract_cmd, config.tesseract_lang);
            let outcome = service::submit_sheet(&store, &recognizer, &bytes, semester, year).await?;
            println!(
                "Stored {} results from {}.",
                outcome.records_created,
                image.display()
            );
        }
        Commands::SubmitText {
            text,
            semester,
            year,
        } => {
            let raw = tokio::fs::read_to_string(&text)
                .await
                .with_context(|| format!("failed to read {}", text.display()))?;
            let outcome = service::submit_text(&store, &raw, semester, year).await?;
            println!(
                "Stored {} results from {}.",
                outcome.records_created,
                text.display()
            );
        }
        Commands::Preview {
            text,
            semester,
            year,
        } => preview(&text, semester, year).await?,
        Commands::Recalculate => {
            let outcome = service::recalculate_all(&store).await?;
            println!(
                "Updated {} students ({} rows).",
                outcome.students_updated, outcome.rows_updated
            );
        }
        Commands::Lookup { index_no, json } => {
            let record = service::lookup_student(&store, &index_no).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
                return Ok(());
            }

            let result = &record.result;
            println!(
                "{} ({}) year {} semester {}: GPA {:.2}",
                result.name, result.index_no, result.year, result.semester, result.semester_gpa
            );
            for course in &result.courses {
                println!(
                    "- {} {} ({} credits, {:.1} quality points)",
                    course.code, course.grade, course.credit_hours, course.quality_points
                );
            }
            match &record.aggregate {
                Some(aggregate) => println!(
                    "Final GPA {:.2}: {}",
                    aggregate.final_gpa, aggregate.final_class
                ),
                None => println!("Final GPA not calculated yet."),
            }
        }
        Commands::Report { out } => {
            let rows = store.find_all().await?;
            let report = report::build_report(&rows);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { csv } => {
            let rows = store.find_all().await?;
            let exported = report::export_csv(&csv, &rows)?;
            println!("Exported {exported} students to {}.", csv.display());
        }
    }

    Ok(())
}

async fn preview(text: &Path, semester: u8, year: u8) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(text)
        .await
        .with_context(|| format!("failed to read {}", text.display()))?;

    let scratch = MemoryStore::new();
    let outcome = service::submit_text(&scratch, &raw, semester, year).await?;
    println!("Parsed {} results from {}.", outcome.records_created, text.display());

    for row in scratch.find_all().await? {
        let grades = row
            .result
            .courses
            .iter()
            .map(|course| format!("{}={}", course.code, course.grade))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "- {} ({}) GPA {:.2}: {}",
            row.result.name, row.result.index_no, row.result.semester_gpa, grades
        );
    }

    Ok(())
}
