use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;

use serde::Serialize;

use crate::models::{FinalClass, StoredResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ClassSummary {
    pub final_class: FinalClass,
    pub count: usize,
    pub avg_gpa: f64,
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    index_no: &'a str,
    name: &'a str,
    year_1_gpa: Option<f64>,
    year_2_gpa: Option<f64>,
    year_3_gpa: Option<f64>,
    final_gpa: f64,
    final_class: &'static str,
}

/// The most recently stored row of each student, in first-appearance order.
pub fn latest_per_student(rows: &[StoredResult]) -> Vec<&StoredResult> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut latest: Vec<&StoredResult> = Vec::new();

    for row in rows {
        match positions.get(row.result.index_no.as_str()) {
            Some(&position) => latest[position] = row,
            None => {
                positions.insert(&row.result.index_no, latest.len());
                latest.push(row);
            }
        }
    }

    latest
}

pub fn summarize_by_class(students: &[&StoredResult]) -> Vec<ClassSummary> {
    FinalClass::ALL
        .into_iter()
        .filter_map(|final_class| {
            let gpas: Vec<f64> = students
                .iter()
                .filter_map(|row| row.aggregate.as_ref())
                .filter(|aggregate| aggregate.final_class == final_class)
                .map(|aggregate| aggregate.final_gpa)
                .collect();
            if gpas.is_empty() {
                return None;
            }
            Some(ClassSummary {
                final_class,
                count: gpas.len(),
                avg_gpa: gpas.iter().sum::<f64>() / gpas.len() as f64,
            })
        })
        .collect()
}

pub fn build_report(rows: &[StoredResult]) -> String {
    let students = latest_per_student(rows);
    let summaries = summarize_by_class(&students);

    let mut ranked: Vec<&StoredResult> = students
        .iter()
        .copied()
        .filter(|row| row.aggregate.is_some())
        .collect();
    ranked.sort_by(|a, b| {
        let a_gpa = a.aggregate.as_ref().map_or(0.0, |agg| agg.final_gpa);
        let b_gpa = b.aggregate.as_ref().map_or(0.0, |agg| agg.final_gpa);
        b_gpa
            .partial_cmp(&a_gpa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.result.index_no.cmp(&b.result.index_no))
    });
    let pending: Vec<&StoredResult> = students
        .iter()
        .copied()
        .filter(|row| row.aggregate.is_none())
        .collect();

    let mut output = String::new();

    let _ = writeln!(output, "# Final Standings Report");
    let _ = writeln!(
        output,
        "{} students across {} stored semester results",
        students.len(),
        rows.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Class Distribution");

    if summaries.is_empty() {
        let _ = writeln!(output, "No students have been classified yet.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} students (avg GPA {:.2})",
                summary.final_class, summary.count, summary.avg_gpa
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Standings");

    if ranked.is_empty() {
        let _ = writeln!(output, "Run a recalculation to populate standings.");
    } else {
        for row in ranked.iter() {
            if let Some(aggregate) = &row.aggregate {
                let years = aggregate
                    .year_gpa
                    .iter()
                    .map(|(year, gpa)| format!("Y{year} {gpa:.2}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = writeln!(
                    output,
                    "- {} ({}) final GPA {:.2}, {} [{}]",
                    row.result.name,
                    row.result.index_no,
                    aggregate.final_gpa,
                    aggregate.final_class,
                    years
                );
            }
        }
    }

    if !pending.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Not Yet Calculated");
        for row in pending.iter() {
            let _ = writeln!(output, "- {} ({})", row.result.name, row.result.index_no);
        }
    }

    output
}

/// Writes one CSV line per classified student; unclassified students are skipped.
pub fn export_csv(path: &Path, rows: &[StoredResult]) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    let exported = write_csv(&mut writer, rows)?;
    writer.flush()?;
    Ok(exported)
}

fn write_csv<W: std::io::Write>(
    writer: &mut csv::Writer<W>,
    rows: &[StoredResult],
) -> anyhow::Result<usize> {
    let mut exported = 0;

    for row in latest_per_student(rows) {
        let Some(aggregate) = &row.aggregate else {
            continue;
        };
        writer.serialize(ExportRow {
            index_no: &row.result.index_no,
            name: &row.result.name,
            year_1_gpa: aggregate.year_gpa.get(&1).copied(),
            year_2_gpa: aggregate.year_gpa.get(&2).copied(),
            year_3_gpa: aggregate.year_gpa.get(&3).copied(),
            final_gpa: aggregate.final_gpa,
            final_class: aggregate.final_class.label(),
        })?;
        exported += 1;
    }

    Ok(exported)
}
