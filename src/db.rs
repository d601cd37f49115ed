use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgExecutor, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{CourseEntry, SemesterResult, StoredResult, StudentAggregate};
use crate::store::{AggregateWrite, ResultStore};

const SELECT_COLUMNS: &str = "SELECT id, index_no, name, semester, year, courses, semester_gpa, \
     year_gpa, final_gpa, final_class, recorded_at \
     FROM result_sheets.semester_results";

/// Advisory lock key held for the length of a recalculation transaction.
const RECALCULATION_LOCK: i64 = 0x5245_5355_4c54;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ResultStore for PgStore {
    async fn insert_all(&self, results: &[SemesterResult]) -> anyhow::Result<usize> {
        let mut tx = self.pool.begin().await?;

        for result in results {
            sqlx::query(
                r#"
                INSERT INTO result_sheets.semester_results
                (id, index_no, name, semester, year, courses, semester_gpa)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&result.index_no)
            .bind(&result.name)
            .bind(i16::from(result.semester))
            .bind(i16::from(result.year))
            .bind(Json(&result.courses))
            .bind(result.semester_gpa)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert result for {}", result.index_no))?;
        }

        tx.commit().await?;
        Ok(results.len())
    }

    async fn find_all(&self) -> anyhow::Result<Vec<StoredResult>> {
        fetch_all(&self.pool).await
    }

    async fn find_latest(&self, index_no: &str) -> anyhow::Result<Option<StoredResult>> {
        let query = format!("{SELECT_COLUMNS} WHERE index_no = $1 ORDER BY seq DESC LIMIT 1");
        let row = sqlx::query(&query)
            .bind(index_no)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(stored_result).transpose()
    }

    async fn update_aggregate(
        &self,
        index_no: &str,
        aggregate: &StudentAggregate,
    ) -> anyhow::Result<u64> {
        write_aggregate(&self.pool, index_no, aggregate).await
    }

    async fn recalculate_exclusive<F>(&self, compute: F) -> anyhow::Result<Vec<AggregateWrite>>
    where
        F: FnOnce(&[StoredResult]) -> Vec<(String, StudentAggregate)> + Send,
    {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(RECALCULATION_LOCK)
            .execute(&mut *tx)
            .await
            .context("failed to acquire recalculation lock")?;

        let rows = fetch_all(&mut *tx).await?;
        let mut writes = Vec::new();
        for (index_no, aggregate) in compute(&rows) {
            let rows_updated = write_aggregate(&mut *tx, &index_no, &aggregate).await?;
            writes.push(AggregateWrite {
                index_no,
                aggregate,
                rows_updated,
            });
        }

        tx.commit().await?;
        Ok(writes)
    }
}

async fn fetch_all<'c, E: PgExecutor<'c>>(executor: E) -> anyhow::Result<Vec<StoredResult>> {
    let query = format!("{SELECT_COLUMNS} ORDER BY seq");
    let rows = sqlx::query(&query).fetch_all(executor).await?;
    rows.iter().map(stored_result).collect()
}

async fn write_aggregate<'c, E: PgExecutor<'c>>(
    executor: E,
    index_no: &str,
    aggregate: &StudentAggregate,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE result_sheets.semester_results
        SET year_gpa = $2, final_gpa = $3, final_class = $4
        WHERE index_no = $1
        "#,
    )
    .bind(index_no)
    .bind(Json(&aggregate.year_gpa))
    .bind(aggregate.final_gpa)
    .bind(aggregate.final_class.label())
    .execute(executor)
    .await
    .with_context(|| format!("failed to update aggregate for {index_no}"))?;

    Ok(result.rows_affected())
}

fn stored_result(row: &PgRow) -> anyhow::Result<StoredResult> {
    let semester: i16 = row.try_get("semester")?;
    let year: i16 = row.try_get("year")?;
    let courses: Json<Vec<CourseEntry>> = row.try_get("courses")?;

    let year_gpa: Option<Json<BTreeMap<u8, f64>>> = row.try_get("year_gpa")?;
    let final_gpa: Option<f64> = row.try_get("final_gpa")?;
    let final_class: Option<String> = row.try_get("final_class")?;

    let aggregate = match (year_gpa, final_gpa, final_class) {
        (Some(Json(year_gpa)), Some(final_gpa), Some(final_class)) => Some(StudentAggregate {
            year_gpa,
            final_gpa,
            final_class: final_class.parse()?,
        }),
        _ => None,
    };

    let recorded_at: DateTime<Utc> = row.try_get("recorded_at")?;

    Ok(StoredResult {
        id: row.try_get("id")?,
        recorded_at,
        result: SemesterResult {
            index_no: row.try_get("index_no")?,
            name: row.try_get("name")?,
            semester: u8::try_from(semester).context("semester out of range")?,
            year: u8::try_from(year).context("year out of range")?,
            courses: courses.0,
            semester_gpa: row.try_get("semester_gpa")?,
        },
        aggregate,
    })
}
