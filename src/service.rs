use crate::error::SheetError;
use crate::gpa;
use crate::models::StoredResult;
use crate::normalize;
use crate::ocr::Recognizer;
use crate::parser;
use crate::store::ResultStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub records_created: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalculateOutcome {
    pub students_updated: usize,
    pub rows_updated: u64,
}

/// Normalizes, recognizes and parses an uploaded sheet, then stores every
/// extracted row. Nothing is written unless the whole sheet parses.
pub async fn submit_sheet<S, R>(
    store: &S,
    recognizer: &R,
    image_bytes: &[u8],
    semester: u8,
    year: u8,
) -> Result<SubmitOutcome, SheetError>
where
    S: ResultStore,
    R: Recognizer,
{
    check_term(semester, year)?;
    let bitmap = normalize::normalize_bytes(image_bytes)?;
    let text = recognizer.recognize(&bitmap).await?;
    store_sheet(store, &text, semester, year).await
}

/// Same as [`submit_sheet`] for a sheet that has already been through OCR.
pub async fn submit_text<S: ResultStore>(
    store: &S,
    raw_text: &str,
    semester: u8,
    year: u8,
) -> Result<SubmitOutcome, SheetError> {
    check_term(semester, year)?;
    store_sheet(store, raw_text, semester, year).await
}

async fn store_sheet<S: ResultStore>(
    store: &S,
    raw_text: &str,
    semester: u8,
    year: u8,
) -> Result<SubmitOutcome, SheetError> {
    let results = match parser::parse_sheet(raw_text, semester, year) {
        Ok(results) => results,
        Err(err) => {
            tracing::warn!("Rejected sheet for year {} semester {}: {}", year, semester, err);
            return Err(err.into());
        }
    };

    let records_created = if results.is_empty() {
        0
    } else {
        store.insert_all(&results).await?
    };
    tracing::info!(
        "Stored {} results for year {} semester {}",
        records_created,
        year,
        semester
    );

    Ok(SubmitOutcome { records_created })
}

/// Recomputes every student's yearly and final GPA and writes the result onto
/// all of that student's stored rows.
///
/// The read and every write happen under the store's recalculation guard, so
/// two runs never interleave. Sheets submitted while a run holds the guard
/// are picked up by the next run.
pub async fn recalculate_all<S: ResultStore>(store: &S) -> Result<RecalculateOutcome, SheetError> {
    let writes = store
        .recalculate_exclusive(|rows| gpa::aggregate(rows.iter().map(|row| &row.result)))
        .await?;

    let mut rows_updated = 0;
    for write in &writes {
        tracing::debug!(
            "{}: final GPA {:.2} ({}) on {} rows",
            write.index_no,
            write.aggregate.final_gpa,
            write.aggregate.final_class,
            write.rows_updated
        );
        rows_updated += write.rows_updated;
    }

    tracing::info!(
        "Recalculated {} students across {} rows",
        writes.len(),
        rows_updated
    );

    Ok(RecalculateOutcome {
        students_updated: writes.len(),
        rows_updated,
    })
}

pub async fn lookup_student<S: ResultStore>(
    store: &S,
    index_no: &str,
) -> Result<StoredResult, SheetError> {
    store
        .find_latest(index_no.trim())
        .await?
        .ok_or_else(|| SheetError::NotFound(index_no.trim().to_string()))
}

fn check_term(semester: u8, year: u8) -> Result<(), SheetError> {
    if (1..=2).contains(&semester) && (1..=3).contains(&year) {
        Ok(())
    } else {
        Err(SheetError::InvalidTerm { semester, year })
    }
}
