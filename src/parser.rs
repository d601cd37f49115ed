use crate::error::ParseError;
use crate::models::{CourseEntry, Grade, SemesterResult};

/// Columns before the first course: index number and name.
const LEADING_COLUMNS: usize = 2;
/// Every sheet carries exactly this many course columns.
pub const COURSES_PER_ROW: usize = 5;
const MIN_ROW_COLUMNS: usize = LEADING_COLUMNS + COURSES_PER_ROW;
/// Applied when a course code does not encode its own credit hours.
pub const DEFAULT_CREDIT_HOURS: u32 = 2;

/// Turns raw OCR text from one result sheet into per-student records.
///
/// The first surviving line is the header; its course codes label columns
/// 2..7 of every data row. Rows with fewer than seven columns are dropped as
/// OCR noise. An unknown grade anywhere aborts the whole sheet, so callers
/// never see a partial batch.
pub fn parse_sheet(raw_text: &str, semester: u8, year: u8) -> Result<Vec<SemesterResult>, ParseError> {
    let lines = clean_lines(raw_text);
    if lines.len() < 2 {
        return Err(ParseError::InsufficientData);
    }

    let header = split_columns(&lines[0]);
    let codes: Vec<String> = (LEADING_COLUMNS..MIN_ROW_COLUMNS)
        .map(|column| {
            header
                .get(column)
                .map(|code| code.to_string())
                .unwrap_or_else(|| fallback_code(year, semester, column))
        })
        .collect();

    let mut results = Vec::new();
    for (line_no, line) in lines.iter().enumerate().skip(1) {
        let columns = split_columns(line);
        if columns.len() < MIN_ROW_COLUMNS {
            tracing::debug!(
                "Skipping line {} with {} columns: {:?}",
                line_no,
                columns.len(),
                line
            );
            continue;
        }
        results.push(parse_row(&columns, &codes, semester, year)?);
    }

    Ok(results)
}

fn parse_row(
    columns: &[&str],
    codes: &[String],
    semester: u8,
    year: u8,
) -> Result<SemesterResult, ParseError> {
    let index_no = columns[0].trim().to_string();
    let name = columns[1].trim().to_string();

    let mut courses = Vec::with_capacity(COURSES_PER_ROW);
    let mut total_quality_points = 0.0;
    let mut total_credit_hours = 0u32;

    for (code, cell) in codes.iter().zip(&columns[LEADING_COLUMNS..MIN_ROW_COLUMNS]) {
        let token = cell.trim().to_uppercase();
        let grade: Grade = token.parse().map_err(|_| ParseError::InvalidGrade {
            grade: token.clone(),
            name: name.clone(),
        })?;

        let entry = CourseEntry::new(code.clone(), grade, credit_hours_for(code));
        total_quality_points += entry.quality_points;
        total_credit_hours += entry.credit_hours;
        courses.push(entry);
    }

    Ok(SemesterResult {
        index_no,
        name,
        semester,
        year,
        courses,
        semester_gpa: total_quality_points / total_credit_hours as f64,
    })
}

/// Strips table borders and blank/rule lines left behind by the OCR engine.
fn clean_lines(raw_text: &str) -> Vec<String> {
    raw_text
        .lines()
        .map(|line| line.replace('|', "").trim().to_string())
        .filter(|line| !line.is_empty())
        .filter(|line| !line.chars().all(|c| c == '-'))
        .collect()
}

/// Columns are separated by gaps of two or more whitespace characters, so
/// single spaces inside a student's name survive.
fn split_columns(line: &str) -> Vec<&str> {
    let mut columns = Vec::new();
    let mut start = 0;
    let mut gap_start: Option<usize> = None;
    let mut gap_len = 0;

    for (offset, c) in line.char_indices() {
        if c.is_whitespace() {
            if gap_start.is_none() {
                gap_start = Some(offset);
                gap_len = 0;
            }
            gap_len += 1;
            continue;
        }
        if let Some(gap) = gap_start.take() {
            if gap_len >= 2 {
                columns.push(&line[start..gap]);
                start = offset;
            }
        }
    }
    columns.push(&line[start..gap_start.unwrap_or(line.len())]);

    columns.into_iter().filter(|column| !column.is_empty()).collect()
}

/// Fourth character of the course code, when it is a non-zero digit.
///
/// Sheets encode credit hours in that position (e.g. `CSC301` is three hours). A zero or
/// anything non-numeric falls back to the default.
pub fn credit_hours_for(code: &str) -> u32 {
    code.chars()
        .nth(3)
        .and_then(|c| c.to_digit(10))
        .filter(|hours| *hours > 0)
        .unwrap_or(DEFAULT_CREDIT_HOURS)
}

/// Code used when the header has no label for a course column.
fn fallback_code(year: u8, semester: u8, column: usize) -> String {
    format!("CO{year}{semester}{column}{column}")
}
